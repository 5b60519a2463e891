use std::sync::Arc;
use crate::api::remote::RemoteService;
use crate::api::FileSizeRequest;
use crate::downloader::cache::FileSizeCache;
use crate::health::HealthMonitor;

/// Size lookups for the popup: cache first, then the server if it is up.
pub struct FileSizeService {
    cache: Arc<FileSizeCache>,
    remote: Arc<dyn RemoteService>,
    health: Arc<HealthMonitor>,
}

impl FileSizeService {
    pub fn new(cache: Arc<FileSizeCache>, remote: Arc<dyn RemoteService>, health: Arc<HealthMonitor>) -> Self {
        Self { cache, remote, health }
    }

    pub fn cache(&self) -> &Arc<FileSizeCache> {
        &self.cache
    }

    /// `None` when the size is unknown, the server is offline, or the lookup failed.
    pub async fn get_file_size(&self, url: &str, is_youtube: bool) -> Option<u64> {
        if let Some(size) = self.cache.get(url, is_youtube).await {
            log::debug!("[CACHE] Size hit for {}: {}", url, size);
            return Some(size);
        }

        if !self.health.is_online() {
            log::warn!("[CACHE] Server is offline, cannot fetch file size for {}", url);
            return None;
        }

        let request = FileSizeRequest {
            url: url.to_string(),
            is_youtube,
        };
        match self.remote.file_size(&request).await {
            Ok(Some(size)) => {
                self.cache.set(url, is_youtube, size).await;
                Some(size)
            }
            Ok(None) => None,
            Err(e) => {
                log::error!("[CACHE] Error fetching file size for {}: {}", url, e);
                None
            }
        }
    }
}
