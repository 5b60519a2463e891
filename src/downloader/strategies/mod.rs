pub mod direct;
pub mod remote_extraction;

use std::sync::Arc;
use async_trait::async_trait;
use crate::downloader::native::NativeHandle;
use crate::downloader::{DownloadRecord, StrategyKind};
use crate::errors::Result;

// Re-export strategies for easy access
pub use direct::DirectStrategy;
pub use remote_extraction::RemoteExtractionStrategy;

/// A download handed to the native download manager.
#[derive(Debug, Clone, PartialEq)]
pub struct StartedDownload {
    pub handle: NativeHandle,
    pub filename: String,
}

/// One way of getting a record's bytes to the native download manager.
/// Errors returned here become the record's `failed` outcome.
#[async_trait]
pub trait DownloadStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn dispatch(&self, record: &DownloadRecord) -> Result<StartedDownload>;
}

/// The pair of strategies a manager chooses between.
#[derive(Clone)]
pub struct StrategySet {
    direct: Arc<dyn DownloadStrategy>,
    remote_extraction: Arc<dyn DownloadStrategy>,
}

impl StrategySet {
    pub fn new(direct: Arc<dyn DownloadStrategy>, remote_extraction: Arc<dyn DownloadStrategy>) -> Self {
        Self {
            direct,
            remote_extraction,
        }
    }

    pub fn for_kind(&self, kind: StrategyKind) -> &Arc<dyn DownloadStrategy> {
        match kind {
            StrategyKind::Direct => &self.direct,
            StrategyKind::RemoteExtraction => &self.remote_extraction,
        }
    }
}
