//! Fan-out of download, server and media events to whatever UI is listening.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use crate::downloader::native::NativeHandle;
use crate::errors::FailureKind;
use crate::media::MediaRecord;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProgressEvent {
    Queued {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    Started {
        #[serde(rename = "nativeHandle")]
        native_handle: NativeHandle,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    Progress {
        received: u64,
        total: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    Complete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
        success: bool,
    },
    Error {
        error: String,
        kind: FailureKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Complete { .. } | ProgressEvent::Error { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub download_id: String,
    pub progress: ProgressEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayMessage {
    DownloadProgress(DownloadProgress),
    ServerStatusChanged {
        #[serde(rename = "isOnline")]
        is_online: bool,
    },
    NewMediaDetected {
        #[serde(rename = "mediaInfo")]
        media_info: MediaRecord,
    },
}

/// Cloneable handle onto one broadcast channel. Publishing with nobody
/// subscribed is not an error.
#[derive(Clone)]
pub struct ProgressRelay {
    sender: broadcast::Sender<RelayMessage>,
}

impl ProgressRelay {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayMessage> {
        self.sender.subscribe()
    }

    pub fn publish(&self, message: RelayMessage) {
        if self.sender.send(message).is_err() {
            log::trace!("[RELAY] No listeners");
        }
    }

    pub fn download(&self, download_id: &str, progress: ProgressEvent) {
        self.publish(RelayMessage::DownloadProgress(DownloadProgress {
            download_id: download_id.to_string(),
            progress,
        }));
    }

    pub fn server_status(&self, is_online: bool) {
        self.publish(RelayMessage::ServerStatusChanged { is_online });
    }

    pub fn media_detected(&self, media_info: MediaRecord) {
        self.publish(RelayMessage::NewMediaDetected { media_info });
    }
}

impl Default for ProgressRelay {
    fn default() -> Self {
        Self::new()
    }
}
