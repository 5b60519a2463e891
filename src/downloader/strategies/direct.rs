use std::sync::Arc;
use async_trait::async_trait;
use super::{DownloadStrategy, StartedDownload};
use crate::downloader::native::{ConflictPolicy, DownloadSource, NativeDownloader};
use crate::downloader::{DownloadRecord, StrategyKind};
use crate::errors::{AppError, Result};

const DEFAULT_FILENAME: &str = "download";

/// Hands the source URL straight to the native download manager.
pub struct DirectStrategy {
    native: Arc<dyn NativeDownloader>,
}

impl DirectStrategy {
    pub fn new(native: Arc<dyn NativeDownloader>) -> Self {
        Self { native }
    }
}

#[async_trait]
impl DownloadStrategy for DirectStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Direct
    }

    async fn dispatch(&self, record: &DownloadRecord) -> Result<StartedDownload> {
        let filename = record
            .filename
            .clone()
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string());

        log::info!("[DIRECT] Starting {} -> {}", record.url, filename);

        let handle = self
            .native
            .start(DownloadSource::Url(record.url.clone()), &filename, ConflictPolicy::Uniquify)
            .await
            .map_err(|e| match e {
                AppError::NativeManager(_) => e,
                other => AppError::NativeManager(other.to_string()),
            })?;

        Ok(StartedDownload { handle, filename })
    }
}
