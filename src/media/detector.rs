use chrono::{DateTime, Utc};
use url::Url;
use super::{ContextId, MediaInfo, MediaKind, MediaRecord};

/// Host fragments of ad and tracking services.
const BLOCKED_HOST_FRAGMENTS: &[&str] = &[
    "ads", "ad.", "analytics", "tracker", "pixel",
    "doubleclick", "google-analytics", "facebook",
];

/// Substrings that mark a URL as media.
const MEDIA_PATTERNS: &[&str] = &[
    "/video/", "/media/", "/stream/", "/watch/", "/embed/",
    ".mp4", ".m3u8", ".ts", ".m4v", ".mkv", ".webm", ".mov", ".avi",
    ".jpg", ".jpeg", ".png", ".gif", ".webp",
];

const WEB_MANIFEST: &str = "manifest.webmanifest";

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mkv", "webm", "mov", "avi"];
const STREAM_EXTENSIONS: &[&str] = &["m3u8", "ts"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "ogg", "oga", "wav", "flac", "aac", "opus"];

/// URL heuristics for spotting playable media in page traffic.
pub struct MediaDetector;

impl MediaDetector {
    pub fn new() -> Self {
        Self
    }

    fn youtube_video_id(url: &Url) -> Option<String> {
        let host = url.host_str()?;
        if host.contains("youtube.com") {
            if url.path() != "/watch" {
                return None;
            }
            return url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned());
        }
        if host.contains("youtu.be") && url.path().len() > 1 {
            return url.path_segments()?.next().map(str::to_string);
        }
        None
    }

    fn is_youtube_host(url: &Url) -> bool {
        url.host_str()
            .map(|host| host.contains("youtube.com") || host.contains("youtu.be"))
            .unwrap_or(false)
    }

    pub fn is_media_url(&self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(_) => return false,
        };

        // on YouTube only actual video pages count
        if Self::is_youtube_host(&parsed) {
            return Self::youtube_video_id(&parsed).is_some();
        }

        let host = parsed.host_str().unwrap_or_default();
        if BLOCKED_HOST_FRAGMENTS.iter().any(|fragment| host.contains(fragment)) {
            return false;
        }

        let lower = url.to_lowercase();
        MEDIA_PATTERNS.iter().any(|pattern| lower.contains(pattern))
    }

    /// Kind of a URL already known to be media.
    pub fn kind_of(&self, url: &str) -> MediaKind {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(_) => return MediaKind::Page,
        };
        if Self::is_youtube_host(&parsed) {
            return MediaKind::YouTube;
        }

        let path = parsed.path().to_lowercase();
        let extension = path
            .rsplit('/')
            .next()
            .and_then(|segment| segment.rsplit_once('.'))
            .map(|(_, ext)| ext.to_string());

        if let Some(ext) = extension.as_deref() {
            if VIDEO_EXTENSIONS.contains(&ext) {
                return MediaKind::Video;
            }
            if STREAM_EXTENSIONS.contains(&ext) {
                return MediaKind::Stream;
            }
            if IMAGE_EXTENSIONS.contains(&ext) {
                return MediaKind::Image;
            }
            if AUDIO_EXTENSIONS.contains(&ext) {
                return MediaKind::Audio;
            }
        }

        if path.contains("/stream/") {
            MediaKind::Stream
        } else if path.contains("/video/") {
            MediaKind::Video
        } else {
            MediaKind::Page
        }
    }

    /// `https://www.youtube.com/watch?v=<id>` for YouTube video URLs; other
    /// URLs come back unchanged.
    pub fn canonical_url(&self, url: &str) -> String {
        Url::parse(url)
            .ok()
            .filter(Self::is_youtube_host)
            .and_then(|parsed| Self::youtube_video_id(&parsed))
            .map(|id| format!("https://www.youtube.com/watch?v={}", id))
            .unwrap_or_else(|| url.to_string())
    }

    /// Turns an observed resource request into a record, if it is media.
    pub fn detect(&self, url: &str, title: Option<&str>, context: ContextId, now: DateTime<Utc>) -> Option<MediaRecord> {
        if url.contains(WEB_MANIFEST) || !self.is_media_url(url) {
            return None;
        }

        let kind = self.kind_of(url);
        Some(MediaRecord {
            url: self.canonical_url(url),
            title: Self::title_or_default(title),
            kind,
            is_youtube: kind.is_youtube(),
            context,
            detected_at: now,
            channel_name: None,
            thumbnail: None,
        })
    }

    /// Turns media reported by a page script into a record. Page scripts read
    /// `<video>`/`<audio>` sources directly, so only the manifest filter and
    /// URL parsing apply.
    pub fn from_page_report(&self, info: MediaInfo, context: ContextId, now: DateTime<Utc>) -> Option<MediaRecord> {
        if info.url.contains(WEB_MANIFEST) || Url::parse(&info.url).is_err() {
            return None;
        }

        let kind = if info.is_youtube.unwrap_or(false) {
            MediaKind::YouTube
        } else {
            self.kind_of(&info.url)
        };
        let url = if kind.is_youtube() {
            self.canonical_url(&info.url)
        } else {
            info.url
        };

        Some(MediaRecord {
            url,
            title: Self::title_or_default(info.title.as_deref()),
            kind,
            is_youtube: kind.is_youtube(),
            context,
            detected_at: now,
            channel_name: info.channel_name.filter(|name| !name.is_empty()),
            thumbnail: info.thumbnail.filter(|thumb| !thumb.is_empty()),
        })
    }

    fn title_or_default(title: Option<&str>) -> String {
        title
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or("Untitled")
            .to_string()
    }
}

impl Default for MediaDetector {
    fn default() -> Self {
        Self::new()
    }
}
