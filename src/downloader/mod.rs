pub mod cache;
pub mod file_size;
pub mod http_pool;
pub mod manager;
pub mod native;
pub mod queue;
pub mod strategies;

use serde::{Deserialize, Serialize};
use crate::errors::{AppError, DownloadFailure, Result};
use native::NativeHandle;

/// Caller-supplied download request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadRequest {
    pub url: String,
    pub filename: Option<String>,
    pub user_id: String,
    /// `None` lets the queue infer it from the URL.
    pub needs_extraction: Option<bool>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: None,
            user_id: "default".to_string(),
            needs_extraction: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_extraction(mut self, needs_extraction: bool) -> Self {
        self.needs_extraction = Some(needs_extraction);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Direct,
    RemoteExtraction,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Active,
    Complete,
    Error,
}

impl DownloadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadStatus::Complete | DownloadStatus::Error)
    }

    /// Statuses only move forward: pending -> active -> complete | error.
    pub fn can_transition_to(&self, next: DownloadStatus) -> bool {
        matches!(
            (self, next),
            (DownloadStatus::Pending, DownloadStatus::Active)
                | (DownloadStatus::Active, DownloadStatus::Complete)
                | (DownloadStatus::Active, DownloadStatus::Error)
        )
    }

    pub fn transition(self, next: DownloadStatus) -> Result<DownloadStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(AppError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::Active => "active",
            DownloadStatus::Complete => "complete",
            DownloadStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// A queued download. Owned by the queue; callers only ever see clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub id: String,
    pub url: String,
    pub filename: Option<String>,
    pub user_id: String,
    pub needs_extraction: bool,
    pub strategy: StrategyKind,
    pub status: DownloadStatus,
    pub error: Option<DownloadFailure>,
    pub native_handle: Option<NativeHandle>,
    pub bytes_received: Option<u64>,
    pub total_bytes: Option<u64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Admission order; the FIFO key.
    pub sequence: u64,
}

/// What a strategy (or the native download manager behind it) reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    Started {
        handle: NativeHandle,
        filename: Option<String>,
    },
    Progress {
        received: u64,
        total: u64,
    },
    Complete,
    Failed(DownloadFailure),
}

impl StrategyOutcome {
    pub fn target_status(&self) -> Option<DownloadStatus> {
        match self {
            StrategyOutcome::Complete => Some(DownloadStatus::Complete),
            StrategyOutcome::Failed(_) => Some(DownloadStatus::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub active: usize,
    pub max_concurrent: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_only() {
        use DownloadStatus::*;

        assert!(Pending.can_transition_to(Active));
        assert!(Active.can_transition_to(Complete));
        assert!(Active.can_transition_to(Error));

        assert!(!Active.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Complete));
        assert!(!Complete.can_transition_to(Error));
        assert!(!Error.can_transition_to(Active));
        assert!(!Complete.can_transition_to(Complete));
    }

    #[test]
    fn rejected_transition_names_both_ends() {
        let err = DownloadStatus::Complete.transition(DownloadStatus::Pending).unwrap_err();
        assert_eq!(err.to_string(), "Invalid status transition: complete -> pending");
    }
}
