use lazy_static::lazy_static;
use log::info;
use regex::Regex;
use crate::errors::Result;

lazy_static! {
    static ref CONTENT_DISPOSITION_FILENAME: Regex =
        Regex::new(r#"filename[^;=\n]*=(?:"([^"]*)"|'([^']*)'|([^;\n]*))"#)
            .expect("content-disposition pattern is valid");
}

/// Extensions accepted as-is for files produced by remote extraction.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "mov", "m4v", "avi"];

/// Extension appended when a remotely extracted file has none of the above.
pub const DEFAULT_VIDEO_EXTENSION: &str = "mp4";

/// Replaces characters that are illegal in file names on common filesystems.
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '/' | '\\' | '?' | '%' | '*' | ':' | '|' | '"' | '<' | '>' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect()
}

/// Pulls the suggested filename out of a `Content-Disposition` header value.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let captures = CONTENT_DISPOSITION_FILENAME.captures(header)?;
    let raw = captures
        .get(1)
        .or_else(|| captures.get(2))
        .or_else(|| captures.get(3))?
        .as_str();

    let cleaned: String = raw.chars().filter(|c| *c != '"' && *c != '\'').collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Appends `.mp4` unless the name already ends in a known video extension.
pub fn ensure_video_extension(filename: &str) -> String {
    let has_video_extension = filename
        .rsplit_once('.')
        .map(|(stem, ext)| !stem.is_empty() && VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);

    if has_video_extension {
        filename.to_string()
    } else {
        format!("{}.{}", filename, DEFAULT_VIDEO_EXTENSION)
    }
}

/// Final on-disk name for a remotely extracted video.
pub fn resolve_remote_filename(content_disposition: Option<&str>, fallback: &str) -> String {
    let suggested = content_disposition
        .and_then(filename_from_content_disposition)
        .unwrap_or_else(|| fallback.to_string());

    sanitize_filename(&ensure_video_extension(&suggested))
}

/// Creates a directory if it doesn't exist
pub async fn ensure_dir_exists(path: &std::path::Path) -> Result<()> {
    if !path.exists() {
        tokio::fs::create_dir_all(path).await?;
        info!("Created directory: {:?}", path);
    }
    Ok(())
}

/// Generates a unique ID for downloads
pub fn generate_download_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
