use crate::errors::{AppError, Result};
use url::Url;

pub struct InputValidator;

impl InputValidator {
    pub fn new() -> Self {
        Self
    }

    /// A download source must be a non-empty absolute URL.
    pub fn validate_url(&self, url: &str) -> Result<Url> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AppError::Validation("URL cannot be empty".to_string()));
        }

        Url::parse(url).map_err(|e| AppError::Validation(format!("Invalid URL: {}", e)))
    }

    /// Loose host check used to infer whether a request needs remote extraction.
    pub fn looks_like_youtube(&self, url: &str) -> bool {
        url.contains("youtube.com") || url.contains("youtu.be")
    }

    /// Strict check for a hosted-video page the extraction server can handle:
    /// a `youtube.com/watch?v=<id>` page or a `youtu.be/<id>` short link.
    pub fn validate_youtube_url(&self, url: &str) -> Result<()> {
        let parsed = Url::parse(url)
            .map_err(|_| AppError::Validation("Invalid YouTube URL".to_string()))?;
        let host = parsed.host_str().unwrap_or_default();

        let is_watch_page = host.contains("youtube.com")
            && parsed.path() == "/watch"
            && parsed.query_pairs().any(|(key, _)| key == "v");
        let is_short_link = host.contains("youtu.be") && parsed.path().len() > 1;

        if is_watch_page || is_short_link {
            Ok(())
        } else {
            Err(AppError::Validation("Invalid YouTube URL".to_string()))
        }
    }

    pub fn validate_user_id(&self, user_id: &str) -> Result<()> {
        if user_id.trim().is_empty() {
            return Err(AppError::Validation("User id cannot be empty".to_string()));
        }

        if user_id.len() > 128 {
            return Err(AppError::Validation("User id too long (max 128 characters)".to_string()));
        }

        Ok(())
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_relative_urls_are_rejected() {
        let validator = InputValidator::new();
        assert!(validator.validate_url("").is_err());
        assert!(validator.validate_url("   ").is_err());
        assert!(validator.validate_url("videos/clip.mp4").is_err());
        assert!(validator.validate_url("https://cdn.example.com/clip.mp4").is_ok());
    }

    #[test]
    fn strict_youtube_forms() {
        let validator = InputValidator::new();
        assert!(validator.validate_youtube_url("https://www.youtube.com/watch?v=abc123").is_ok());
        assert!(validator.validate_youtube_url("https://youtu.be/abc123").is_ok());

        assert!(validator.validate_youtube_url("https://www.youtube.com/").is_err());
        assert!(validator.validate_youtube_url("https://www.youtube.com/watch").is_err());
        assert!(validator.validate_youtube_url("https://www.youtube.com/channel/xyz").is_err());
        assert!(validator.validate_youtube_url("https://youtu.be/").is_err());
        assert!(validator.validate_youtube_url("not a url").is_err());
    }

    #[test]
    fn loose_youtube_inference() {
        let validator = InputValidator::new();
        assert!(validator.looks_like_youtube("https://m.youtube.com/watch?v=1"));
        assert!(validator.looks_like_youtube("https://youtu.be/1"));
        assert!(!validator.looks_like_youtube("https://vimeo.com/1"));
    }
}
