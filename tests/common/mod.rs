#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use mediagrab::api::remote::RemoteService;
use mediagrab::api::{FileSizeRequest, RemoteDownloadRequest, RemotePayload};
use mediagrab::downloader::manager::DownloadManager;
use mediagrab::downloader::native::{ConflictPolicy, DownloadSource, NativeDownloadEvent, NativeDownloader, NativeHandle};
use mediagrab::downloader::strategies::{DirectStrategy, RemoteExtractionStrategy, StrategySet};
use mediagrab::errors::{AppError, Result};
use mediagrab::health::HealthMonitor;
use mediagrab::notifications::Notifier;
use mediagrab::relay::{DownloadProgress, ProgressEvent, ProgressRelay, RelayMessage};

/// Native download manager that only hands out handles.
#[derive(Default)]
pub struct FakeNative {
    next_handle: AtomicU64,
    pub fail_with: Mutex<Option<String>>,
    pub started: Mutex<Vec<(DownloadSource, String)>>,
}

impl FakeNative {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(message: &str) -> Arc<Self> {
        let native = Self::default();
        *native.fail_with.lock().unwrap() = Some(message.to_string());
        Arc::new(native)
    }

    pub fn filenames(&self) -> Vec<String> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .map(|(_, name)| name.clone())
            .collect()
    }
}

#[async_trait]
impl NativeDownloader for FakeNative {
    async fn start(&self, source: DownloadSource, filename: &str, _conflict: ConflictPolicy) -> Result<NativeHandle> {
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(AppError::NativeManager(message));
        }
        self.started.lock().unwrap().push((source, filename.to_string()));
        Ok(NativeHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

/// Native download manager that reports a finished transfer for every start.
/// Odd handles report before `start` returns; even ones from another thread
/// shortly after.
pub struct EmittingNative {
    next_handle: AtomicU64,
    events: mpsc::UnboundedSender<NativeDownloadEvent>,
}

impl EmittingNative {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<NativeDownloadEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let native = Arc::new(Self {
            next_handle: AtomicU64::new(0),
            events,
        });
        (native, rx)
    }
}

#[async_trait]
impl NativeDownloader for EmittingNative {
    async fn start(&self, _source: DownloadSource, _filename: &str, _conflict: ConflictPolicy) -> Result<NativeHandle> {
        let handle = NativeHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        let report = vec![
            NativeDownloadEvent::progress(handle, 10, 10),
            NativeDownloadEvent::complete(handle),
        ];

        if handle.0 % 2 == 1 {
            for event in report {
                let _ = self.events.send(event);
            }
        } else {
            let events = self.events.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(1));
                for event in report {
                    let _ = events.send(event);
                }
            });
        }
        Ok(handle)
    }
}

/// Extraction server double with call counters.
pub struct FakeRemote {
    pub online: AtomicBool,
    pub content_disposition: Mutex<Option<String>>,
    pub download_error: Mutex<Option<AppError>>,
    pub size: Mutex<Option<u64>>,
    pub download_calls: AtomicUsize,
    pub size_calls: AtomicUsize,
    pub requests: Mutex<Vec<RemoteDownloadRequest>>,
}

impl FakeRemote {
    pub fn new(online: bool) -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(online),
            content_disposition: Mutex::new(None),
            download_error: Mutex::new(None),
            size: Mutex::new(None),
            download_calls: AtomicUsize::new(0),
            size_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn serving_as(self: Arc<Self>, content_disposition: &str) -> Arc<Self> {
        *self.content_disposition.lock().unwrap() = Some(content_disposition.to_string());
        self
    }

    pub fn downloads(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteService for FakeRemote {
    async fn download(&self, request: &RemoteDownloadRequest) -> Result<RemotePayload> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(error) = self.download_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(RemotePayload {
            bytes: b"video-bytes".to_vec(),
            content_disposition: self.content_disposition.lock().unwrap().clone(),
        })
    }

    async fn file_size(&self, _request: &FileSizeRequest) -> Result<Option<u64>> {
        self.size_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.size.lock().unwrap())
    }

    async fn status(&self) -> Result<bool> {
        Ok(self.online.load(Ordering::SeqCst))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn titles(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(title, _)| title.clone()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, message: &str) {
        self.sent.lock().unwrap().push((title.to_string(), message.to_string()));
    }
}

pub struct Harness {
    pub manager: DownloadManager,
    pub native: Arc<FakeNative>,
    pub remote: Arc<FakeRemote>,
    pub health: Arc<HealthMonitor>,
    pub notifier: Arc<RecordingNotifier>,
    pub events: broadcast::Receiver<RelayMessage>,
}

/// Manager wired to fakes. The health flag is refreshed from `remote` once.
pub async fn harness(max_concurrent: usize, native: Arc<FakeNative>, remote: Arc<FakeRemote>) -> Harness {
    harness_with_relay(max_concurrent, native, remote, ProgressRelay::new()).await
}

pub async fn harness_with_relay(
    max_concurrent: usize,
    native: Arc<FakeNative>,
    remote: Arc<FakeRemote>,
    relay: ProgressRelay,
) -> Harness {
    let events = relay.subscribe();
    let health = Arc::new(HealthMonitor::new(remote.clone(), relay.clone(), Duration::from_secs(1)));
    health.check_now().await;

    let strategies = StrategySet::new(
        Arc::new(DirectStrategy::new(native.clone())),
        Arc::new(RemoteExtractionStrategy::new(remote.clone(), native.clone(), health.clone())),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let manager = DownloadManager::new(max_concurrent, strategies, relay, notifier.clone());

    Harness {
        manager,
        native,
        remote,
        health,
        notifier,
        events,
    }
}

/// Next download progress event, skipping other relay traffic.
pub async fn next_progress(events: &mut broadcast::Receiver<RelayMessage>) -> DownloadProgress {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("relay event within timeout")
            .expect("relay open");
        if let RelayMessage::DownloadProgress(progress) = message {
            return progress;
        }
    }
}

/// Skips events until one for `id` matches `wanted`.
pub async fn wait_for(
    events: &mut broadcast::Receiver<RelayMessage>,
    id: &str,
    wanted: impl Fn(&ProgressEvent) -> bool,
) -> ProgressEvent {
    loop {
        let update = next_progress(events).await;
        if update.download_id == id && wanted(&update.progress) {
            return update.progress;
        }
    }
}

pub fn is_started(event: &ProgressEvent) -> bool {
    matches!(event, ProgressEvent::Started { .. })
}

pub fn is_terminal(event: &ProgressEvent) -> bool {
    event.is_terminal()
}
