use std::sync::Arc;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::api::remote::{HttpRemoteService, RemoteService};
use crate::api::{EnqueueRequest, EnqueueResponse, FileSizeRequest};
use crate::config::AppConfig;
use crate::downloader::cache::FileSizeCache;
use crate::downloader::file_size::FileSizeService;
use crate::downloader::http_pool::HttpPool;
use crate::downloader::manager::DownloadManager;
use crate::downloader::native::{FsDownloader, NativeDownloadEvent, NativeDownloader};
use crate::downloader::strategies::{DirectStrategy, RemoteExtractionStrategy, StrategySet};
use crate::downloader::DownloadRequest;
use crate::errors::Result;
use crate::health::HealthMonitor;
use crate::media::{ContextId, MediaDetector, MediaInfo, MediaRecord, MediaRegistry};
use crate::notifications::{LogNotifier, Notifier};
use crate::relay::ProgressRelay;
use crate::utils::ensure_dir_exists;

// State management
pub struct AppState {
    pub config: AppConfig,
    pub relay: ProgressRelay,
    pub health: Arc<HealthMonitor>,
    pub downloads: DownloadManager,
    pub file_sizes: FileSizeService,
    pub media: Arc<Mutex<MediaRegistry>>,
    detector: MediaDetector,
    background: Vec<JoinHandle<()>>,
}

impl AppState {
    /// Wires the components together around the given capabilities. No
    /// background task is started.
    pub fn assemble(
        config: AppConfig,
        remote: Arc<dyn RemoteService>,
        native: Arc<dyn NativeDownloader>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let relay = ProgressRelay::new();
        let health = Arc::new(HealthMonitor::new(
            Arc::clone(&remote),
            relay.clone(),
            config.health_check_timeout(),
        ));

        let strategies = StrategySet::new(
            Arc::new(DirectStrategy::new(Arc::clone(&native))),
            Arc::new(RemoteExtractionStrategy::new(Arc::clone(&remote), native, Arc::clone(&health))),
        );
        let downloads = DownloadManager::new(config.max_concurrent_downloads, strategies, relay.clone(), notifier);

        let cache = Arc::new(FileSizeCache::new(config.file_size_cache_ttl()));
        let file_sizes = FileSizeService::new(cache, remote, Arc::clone(&health));

        Self {
            config,
            relay,
            health,
            downloads,
            file_sizes,
            media: Arc::new(Mutex::new(MediaRegistry::new())),
            detector: MediaDetector::new(),
            background: Vec::new(),
        }
    }

    /// Builds the HTTP-backed services from `config` and starts background
    /// maintenance.
    pub async fn start(config: AppConfig) -> Result<Self> {
        config.validate()?;
        ensure_dir_exists(&config.download_path).await?;

        let pool = HttpPool::from_settings(config.max_concurrent_downloads, config.proxy.as_deref())?;
        let remote: Arc<dyn RemoteService> = Arc::new(
            HttpRemoteService::new(pool.client(), config.server_url.clone(), config.retry_policy())
                .with_status_timeout(config.health_check_timeout()),
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let native: Arc<dyn NativeDownloader> =
            Arc::new(FsDownloader::new(pool.client(), config.download_path.clone(), events_tx));
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier::new(config.show_notifications));

        log::info!(
            "Using server {} with {} concurrent downloads into {}",
            config.server_url,
            config.max_concurrent_downloads,
            config.download_path.display()
        );

        let mut state = Self::assemble(config, remote, native, notifier);
        state.spawn_background(events_rx);
        Ok(state)
    }

    /// Starts health polling, the cache sweep, stale reclamation and the
    /// native event listener. They are aborted when the state is dropped.
    pub fn spawn_background(&mut self, native_events: mpsc::UnboundedReceiver<NativeDownloadEvent>) {
        let config = &self.config;
        let tasks = [
            self.health.spawn_polling(config.health_check_interval()),
            self.file_sizes.cache().spawn_sweeper(config.cache_sweep_interval()),
            self.downloads
                .spawn_stale_reclaimer(config.stale_sweep_interval(), config.stale_download_max_age()),
            self.downloads.spawn_native_listener(native_events),
        ];
        self.background.extend(tasks);
    }

    async fn record_media(&self, record: MediaRecord) -> bool {
        let added = self.media.lock().await.add(record.clone());
        if added {
            self.relay.media_detected(record);
        }
        added
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        for task in &self.background {
            task.abort();
        }
    }
}

pub async fn download(state: &AppState, request: EnqueueRequest) -> EnqueueResponse {
    let user_id = request
        .user_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| state.config.default_user_id.clone());

    let mut download = DownloadRequest::new(request.url).with_user_id(user_id);
    if let Some(filename) = request.filename {
        download = download.with_filename(filename);
    }
    if let Some(is_youtube) = request.is_youtube {
        download = download.with_extraction(is_youtube);
    }

    match state.downloads.enqueue(download) {
        Ok(download_id) => EnqueueResponse::Accepted { download_id },
        Err(e) => {
            log::warn!("[QUEUE] Rejected download request: {}", e);
            EnqueueResponse::Rejected { error: e.to_string() }
        }
    }
}

pub async fn get_file_size(state: &AppState, request: FileSizeRequest) -> Option<u64> {
    state.file_sizes.get_file_size(&request.url, request.is_youtube).await
}

/// Answers with the current flag and refreshes it in the background; the
/// outcome of the refresh arrives as `SERVER_STATUS_CHANGED`.
pub async fn check_server_status(state: &AppState) -> bool {
    let current = state.health.is_online();
    let health = Arc::clone(&state.health);
    tokio::spawn(async move {
        health.check_now().await;
    });
    current
}

pub async fn new_media(state: &AppState, context: ContextId, info: MediaInfo) -> bool {
    match state.detector.from_page_report(info, context, Utc::now()) {
        Some(record) => state.record_media(record).await,
        None => false,
    }
}

pub async fn resource_requested(state: &AppState, context: ContextId, url: &str, title: Option<&str>) -> bool {
    match state.detector.detect(url, title, context, Utc::now()) {
        Some(record) => state.record_media(record).await,
        None => false,
    }
}

pub async fn get_media(state: &AppState) -> Vec<MediaRecord> {
    state.media.lock().await.all_media()
}

pub async fn clear_all_media(state: &AppState) {
    state.media.lock().await.clear_all();
}

pub async fn clear_tab_media(state: &AppState, context: ContextId) -> usize {
    state.media.lock().await.clear_context(context)
}

pub async fn tab_loading(state: &AppState, context: ContextId) -> usize {
    state.media.lock().await.on_navigation(context)
}

pub async fn tab_removed(state: &AppState, context: ContextId) -> usize {
    state.media.lock().await.on_closed(context)
}

/// Runtime messages accepted from a front end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    Download(EnqueueRequest),
    GetFileSize(FileSizeRequest),
    CheckServerStatus,
    NewMedia {
        #[serde(rename = "tabId")]
        tab_id: ContextId,
        #[serde(rename = "videoInfo")]
        video_info: MediaInfo,
    },
    ResourceRequested {
        #[serde(rename = "tabId")]
        tab_id: ContextId,
        url: String,
        #[serde(default)]
        title: Option<String>,
    },
    GetMedia,
    ClearAllMedia,
    ClearTabMedia {
        #[serde(rename = "tabId")]
        tab_id: ContextId,
    },
    TabLoading {
        #[serde(rename = "tabId")]
        tab_id: ContextId,
    },
    TabRemoved {
        #[serde(rename = "tabId")]
        tab_id: ContextId,
    },
}

fn to_reply<T: Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| json!({ "error": e.to_string() }))
}

pub async fn handle_message(state: &AppState, message: Message) -> Value {
    match message {
        Message::Download(request) => to_reply(download(state, request).await),
        Message::GetFileSize(request) => json!({ "size": get_file_size(state, request).await }),
        Message::CheckServerStatus => json!({ "isOnline": check_server_status(state).await }),
        Message::NewMedia { tab_id, video_info } => {
            new_media(state, tab_id, video_info).await;
            json!({ "success": true })
        }
        Message::ResourceRequested { tab_id, url, title } => {
            let added = resource_requested(state, tab_id, &url, title.as_deref()).await;
            json!({ "success": true, "added": added })
        }
        Message::GetMedia => to_reply(get_media(state).await),
        Message::ClearAllMedia => {
            clear_all_media(state).await;
            json!({ "success": true })
        }
        Message::ClearTabMedia { tab_id } => {
            clear_tab_media(state, tab_id).await;
            json!({ "success": true })
        }
        Message::TabLoading { tab_id } => {
            tab_loading(state, tab_id).await;
            json!({ "success": true })
        }
        Message::TabRemoved { tab_id } => {
            tab_removed(state, tab_id).await;
            json!({ "success": true })
        }
    }
}

/// Parses one JSON message and handles it. Malformed input gets an
/// `{error}` reply instead of failing the host loop.
pub async fn handle_line(state: &AppState, line: &str) -> Value {
    match serde_json::from_str::<Message>(line) {
        Ok(message) => handle_message(state, message).await,
        Err(e) => {
            log::warn!("Ignoring malformed message: {}", e);
            json!({ "error": format!("Invalid message: {}", e) })
        }
    }
}
