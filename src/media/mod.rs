pub mod detector;
pub mod registry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use detector::MediaDetector;
pub use registry::MediaRegistry;

/// Browsing context (tab) a piece of media was seen in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub u64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    YouTube,
    Video,
    Audio,
    Image,
    Stream,
    Page,
}

impl MediaKind {
    pub fn is_youtube(&self) -> bool {
        matches!(self, MediaKind::YouTube)
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            MediaKind::YouTube => "youtube",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Image => "image",
            MediaKind::Stream => "stream",
            MediaKind::Page => "page",
        };
        f.write_str(label)
    }
}

/// A detected candidate media resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub url: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    #[serde(rename = "isYouTube")]
    pub is_youtube: bool,
    #[serde(rename = "tabId")]
    pub context: ContextId,
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub detected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// Media as reported by a page script.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "isYouTube")]
    pub is_youtube: Option<bool>,
    #[serde(default)]
    pub channel_name: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}
