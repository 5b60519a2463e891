use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Cache key: the same URL may have different sizes depending on whether it
/// goes through remote extraction.
pub type FileSizeKey = (String, bool);

#[derive(Debug, Clone, Copy)]
pub struct CacheEntry {
    pub size: u64,
    pub fetched_at: Instant,
}

impl CacheEntry {
    pub fn new(size: u64) -> Self {
        Self {
            size,
            fetched_at: Instant::now(),
        }
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() >= ttl
    }
}

/// Time-bounded memo of content-length lookups.
pub struct FileSizeCache {
    entries: RwLock<HashMap<FileSizeKey, CacheEntry>>,
    ttl: Duration,
}

impl FileSizeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Expired entries read as absent and are dropped on the spot.
    pub async fn get(&self, url: &str, is_youtube: bool) -> Option<u64> {
        let key = (url.to_string(), is_youtube);
        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                Some(entry) if !entry.is_expired(self.ttl) => return Some(entry.size),
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(&key).map_or(false, |entry| entry.is_expired(self.ttl)) {
            entries.remove(&key);
            log::debug!("[CACHE] Evicted expired size for {}", url);
        }
        None
    }

    pub async fn set(&self, url: &str, is_youtube: bool, size: u64) {
        let mut entries = self.entries.write().await;
        entries.insert((url.to_string(), is_youtube), CacheEntry::new(size));
    }

    /// Deletes every expired entry and returns how many went.
    pub async fn clear_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(self.ttl));
        before - entries.len()
    }

    pub async fn size(&self) -> usize {
        let entries = self.entries.read().await;
        entries.len()
    }

    /// Runs [`clear_expired`](Self::clear_expired) every `period`.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;

            loop {
                interval.tick().await;
                let removed = cache.clear_expired().await;
                if removed > 0 {
                    log::debug!("[CACHE] Swept {} expired file size entries", removed);
                }
            }
        })
    }
}
