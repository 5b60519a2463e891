use std::sync::Arc;
use async_trait::async_trait;
use super::{DownloadStrategy, StartedDownload};
use crate::api::remote::RemoteService;
use crate::api::RemoteDownloadRequest;
use crate::downloader::native::{ConflictPolicy, DownloadSource, NativeDownloader};
use crate::downloader::{DownloadRecord, StrategyKind};
use crate::errors::{AppError, Result};
use crate::health::HealthMonitor;
use crate::security::InputValidator;
use crate::utils::resolve_remote_filename;

const DEFAULT_FILENAME: &str = "video";

/// Fetches hosted-video pages through the extraction server, then saves the
/// returned bytes with the native download manager.
pub struct RemoteExtractionStrategy {
    remote: Arc<dyn RemoteService>,
    native: Arc<dyn NativeDownloader>,
    health: Arc<HealthMonitor>,
    validator: InputValidator,
}

impl RemoteExtractionStrategy {
    pub fn new(remote: Arc<dyn RemoteService>, native: Arc<dyn NativeDownloader>, health: Arc<HealthMonitor>) -> Self {
        Self {
            remote,
            native,
            health,
            validator: InputValidator::new(),
        }
    }
}

#[async_trait]
impl DownloadStrategy for RemoteExtractionStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RemoteExtraction
    }

    async fn dispatch(&self, record: &DownloadRecord) -> Result<StartedDownload> {
        if !self.health.is_online() {
            log::warn!("[EXTRACT] Server offline, not dispatching {}", record.url);
            return Err(AppError::Offline);
        }

        self.validator.validate_youtube_url(&record.url)?;

        let requested_name = record
            .filename
            .clone()
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
        let request = RemoteDownloadRequest {
            url: record.url.clone(),
            is_youtube: true,
            filename: requested_name.clone(),
            user_id: record.user_id.clone(),
        };

        let started_at = std::time::Instant::now();
        log::info!("🚀 [EXTRACT] Requesting {} from server", record.url);
        let payload = self.remote.download(&request).await?;

        let filename = resolve_remote_filename(payload.content_disposition.as_deref(), &requested_name);
        log::info!(
            "✅ [EXTRACT] Got {} bytes for {} as {} (took {:.2} seconds)",
            payload.bytes.len(),
            record.url,
            filename,
            started_at.elapsed().as_secs_f64()
        );

        let handle = self
            .native
            .start(DownloadSource::Bytes(payload.bytes), &filename, ConflictPolicy::Uniquify)
            .await
            .map_err(|e| match e {
                AppError::NativeManager(_) => e,
                other => AppError::NativeManager(other.to_string()),
            })?;

        Ok(StartedDownload { handle, filename })
    }
}
