use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Server is offline")]
    Offline,

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Server responded with {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Server error: {0}")]
    Remote(String),

    #[error("Download manager error: {0}")]
    NativeManager(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Coarse classification of a failure, carried to the UI with the reason text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Offline,
    Timeout,
    Network,
    Server,
    NativeManager,
    Interrupted,
    Expired,
    Internal,
}

impl AppError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            AppError::Validation(_) => FailureKind::Validation,
            AppError::Offline => FailureKind::Offline,
            AppError::Timeout(_) => FailureKind::Timeout,
            AppError::Http(e) if e.is_timeout() => FailureKind::Timeout,
            AppError::Http(_) => FailureKind::Network,
            AppError::Server { .. } | AppError::Remote(_) => FailureKind::Server,
            AppError::NativeManager(_) => FailureKind::NativeManager,
            _ => FailureKind::Internal,
        }
    }

    /// Whether the HTTP layer should spend another attempt on this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Timeout(_) | AppError::Server { .. } | AppError::Http(_)
        )
    }

    /// Text shown to the user when a download ends with this error.
    pub fn user_message(&self) -> String {
        let detail = match self {
            AppError::Offline => {
                "Server is offline. Please make sure the download server is running.".to_string()
            }
            AppError::Timeout(_) => "Request timed out. Please try again.".to_string(),
            AppError::Http(e) if e.is_timeout() => "Request timed out. Please try again.".to_string(),
            AppError::Http(e) if e.is_connect() => {
                "Could not connect to server. Please check if the server is running.".to_string()
            }
            AppError::Validation(msg) | AppError::NativeManager(msg) | AppError::Remote(msg) => {
                msg.clone()
            }
            other => other.to_string(),
        };
        format!("Download failed: {}", detail)
    }
}

/// Reason attached to a download that ended in the error state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl DownloadFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn interrupted() -> Self {
        Self::new(FailureKind::Interrupted, "Download interrupted")
    }
}

impl From<&AppError> for DownloadFailure {
    fn from(error: &AppError) -> Self {
        Self::new(error.failure_kind(), error.user_message())
    }
}

impl std::fmt::Display for DownloadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
