use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use crate::downloader::StrategyOutcome;
use crate::errors::{AppError, DownloadFailure, FailureKind, Result};
use crate::utils::{ensure_dir_exists, sanitize_filename};

const MAX_UNIQUIFY_ATTEMPTS: u32 = 10_000;

/// Identifier the native download manager assigns to a started download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeHandle(pub u64);

impl std::fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NativeState {
    Complete,
    Interrupted,
}

/// Change notification from the native download manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeDownloadEvent {
    pub handle: NativeHandle,
    pub state: Option<NativeState>,
    pub bytes_received: Option<u64>,
    pub total_bytes: Option<u64>,
    pub error: Option<String>,
}

impl NativeDownloadEvent {
    pub fn progress(handle: NativeHandle, received: u64, total: u64) -> Self {
        Self {
            handle,
            state: None,
            bytes_received: Some(received),
            total_bytes: Some(total),
            error: None,
        }
    }

    pub fn complete(handle: NativeHandle) -> Self {
        Self {
            handle,
            state: Some(NativeState::Complete),
            bytes_received: None,
            total_bytes: None,
            error: None,
        }
    }

    pub fn interrupted(handle: NativeHandle, error: impl Into<String>) -> Self {
        Self {
            handle,
            state: Some(NativeState::Interrupted),
            bytes_received: None,
            total_bytes: None,
            error: Some(error.into()),
        }
    }

    /// Byte progress first, then the state change, if any.
    pub fn outcomes(&self) -> Vec<StrategyOutcome> {
        let mut outcomes = Vec::with_capacity(2);

        if let (Some(received), Some(total)) = (self.bytes_received, self.total_bytes) {
            outcomes.push(StrategyOutcome::Progress { received, total });
        }

        match self.state {
            Some(NativeState::Complete) => outcomes.push(StrategyOutcome::Complete),
            Some(NativeState::Interrupted) => {
                let failure = match &self.error {
                    Some(detail) if !detail.is_empty() => DownloadFailure::new(
                        FailureKind::Interrupted,
                        format!("Download interrupted: {}", detail),
                    ),
                    _ => DownloadFailure::interrupted(),
                };
                outcomes.push(StrategyOutcome::Failed(failure));
            }
            None => {}
        }

        outcomes
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadSource {
    Url(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    #[default]
    Uniquify,
    Overwrite,
}

/// The platform download manager the strategies hand finished sources to.
#[async_trait]
pub trait NativeDownloader: Send + Sync {
    /// Starts a download and returns its handle. Progress and completion are
    /// reported afterwards as [`NativeDownloadEvent`]s.
    async fn start(&self, source: DownloadSource, filename: &str, conflict: ConflictPolicy) -> Result<NativeHandle>;
}

/// Native download manager that writes into a local directory.
pub struct FsDownloader {
    client: Client,
    download_dir: PathBuf,
    next_handle: AtomicU64,
    events: mpsc::UnboundedSender<NativeDownloadEvent>,
}

impl FsDownloader {
    pub fn new(client: Client, download_dir: PathBuf, events: mpsc::UnboundedSender<NativeDownloadEvent>) -> Self {
        Self {
            client,
            download_dir,
            next_handle: AtomicU64::new(0),
            events,
        }
    }

    fn safe_name(filename: &str) -> String {
        let sanitized = sanitize_filename(filename);
        let trimmed = sanitized.trim_start_matches('.').trim();
        if trimmed.is_empty() {
            "download".to_string()
        } else {
            trimmed.to_string()
        }
    }

    fn split_extension(name: &str) -> (&str, &str) {
        match name.rfind('.') {
            Some(index) if index > 0 => name.split_at(index),
            _ => (name, ""),
        }
    }

    /// Creates the target file, picking `name (n).ext` under the uniquify policy.
    async fn reserve_target(&self, filename: &str, conflict: ConflictPolicy) -> Result<(PathBuf, tokio::fs::File)> {
        let name = Self::safe_name(filename);

        if conflict == ConflictPolicy::Overwrite {
            let path = self.download_dir.join(&name);
            let file = tokio::fs::File::create(&path)
                .await
                .map_err(|e| AppError::NativeManager(format!("Cannot create {:?}: {}", path, e)))?;
            return Ok((path, file));
        }

        let (stem, extension) = Self::split_extension(&name);
        for attempt in 0..MAX_UNIQUIFY_ATTEMPTS {
            let candidate = if attempt == 0 {
                name.clone()
            } else {
                format!("{} ({}){}", stem, attempt, extension)
            };
            let path = self.download_dir.join(candidate);

            match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(AppError::NativeManager(format!("Cannot create {:?}: {}", path, e)));
                }
            }
        }

        Err(AppError::NativeManager(format!("No free file name for {}", name)))
    }

    fn parse_source_url(url: &str) -> Result<url::Url> {
        let parsed = url::Url::parse(url)
            .map_err(|e| AppError::NativeManager(format!("Invalid download URL: {}", e)))?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            scheme => Err(AppError::NativeManager(format!("Unsupported URL scheme: {}", scheme))),
        }
    }

    async fn write_bytes(
        handle: NativeHandle,
        mut file: tokio::fs::File,
        data: Vec<u8>,
        events: &mpsc::UnboundedSender<NativeDownloadEvent>,
    ) -> Result<()> {
        let total = data.len() as u64;
        file.write_all(&data).await?;
        file.flush().await?;
        let _ = events.send(NativeDownloadEvent::progress(handle, total, total));
        Ok(())
    }

    async fn stream_url(
        client: &Client,
        url: url::Url,
        handle: NativeHandle,
        mut file: tokio::fs::File,
        events: &mpsc::UnboundedSender<NativeDownloadEvent>,
    ) -> Result<()> {
        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::NativeManager(format!("HTTP error: {}", response.status())));
        }

        let total = response.content_length();
        let mut received = 0u64;
        let mut last_reported = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;

            if let Some(total) = total {
                let step = (total / 100).max(1);
                if received - last_reported >= step || received == total {
                    let _ = events.send(NativeDownloadEvent::progress(handle, received, total));
                    last_reported = received;
                }
            }
        }

        file.flush().await?;
        Ok(())
    }

    async fn finish(
        handle: NativeHandle,
        path: &Path,
        result: Result<()>,
        events: &mpsc::UnboundedSender<NativeDownloadEvent>,
    ) {
        match result {
            Ok(()) => {
                log::info!("[NATIVE] {} finished: {:?}", handle, path);
                let _ = events.send(NativeDownloadEvent::complete(handle));
            }
            Err(e) => {
                log::warn!("[NATIVE] {} interrupted: {}", handle, e);
                if let Err(remove_err) = tokio::fs::remove_file(path).await {
                    log::debug!("[NATIVE] Could not remove partial file {:?}: {}", path, remove_err);
                }
                let _ = events.send(NativeDownloadEvent::interrupted(handle, e.to_string()));
            }
        }
    }
}

#[async_trait]
impl NativeDownloader for FsDownloader {
    async fn start(&self, source: DownloadSource, filename: &str, conflict: ConflictPolicy) -> Result<NativeHandle> {
        let source_url = match &source {
            DownloadSource::Url(url) => Some(Self::parse_source_url(url)?),
            DownloadSource::Bytes(_) => None,
        };

        ensure_dir_exists(&self.download_dir)
            .await
            .map_err(|e| AppError::NativeManager(format!("Download directory unavailable: {}", e)))?;
        let (path, file) = self.reserve_target(filename, conflict).await?;

        let handle = NativeHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        log::info!("[NATIVE] {} started -> {:?}", handle, path);

        let events = self.events.clone();
        match (source, source_url) {
            (DownloadSource::Url(_), Some(url)) => {
                let client = self.client.clone();
                tokio::spawn(async move {
                    let result = Self::stream_url(&client, url, handle, file, &events).await;
                    Self::finish(handle, &path, result, &events).await;
                });
            }
            (DownloadSource::Bytes(data), _) => {
                tokio::spawn(async move {
                    let result = Self::write_bytes(handle, file, data, &events).await;
                    Self::finish(handle, &path, result, &events).await;
                });
            }
            (DownloadSource::Url(url), None) => {
                return Err(AppError::NativeManager(format!("Invalid download URL: {}", url)));
            }
        }

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn downloader(dir: &Path) -> (FsDownloader, mpsc::UnboundedReceiver<NativeDownloadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (FsDownloader::new(Client::new(), dir.to_path_buf(), tx), rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<NativeDownloadEvent>) -> NativeDownloadEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event within timeout")
            .expect("channel open")
    }

    #[tokio::test]
    async fn byte_payload_is_written_and_completed() {
        let dir = tempfile::tempdir().unwrap();
        let (native, mut rx) = downloader(dir.path());

        let handle = native
            .start(DownloadSource::Bytes(b"frames".to_vec()), "clip.mp4", ConflictPolicy::Uniquify)
            .await
            .unwrap();

        assert_eq!(next_event(&mut rx).await, NativeDownloadEvent::progress(handle, 6, 6));
        assert_eq!(next_event(&mut rx).await, NativeDownloadEvent::complete(handle));
        assert_eq!(std::fs::read(dir.path().join("clip.mp4")).unwrap(), b"frames");
    }

    #[tokio::test]
    async fn uniquify_reserves_numbered_names() {
        let dir = tempfile::tempdir().unwrap();
        let (native, _rx) = downloader(dir.path());

        let first = native
            .start(DownloadSource::Bytes(vec![1]), "clip.mp4", ConflictPolicy::Uniquify)
            .await
            .unwrap();
        let second = native
            .start(DownloadSource::Bytes(vec![2]), "clip.mp4", ConflictPolicy::Uniquify)
            .await
            .unwrap();

        assert_ne!(first, second);
        assert!(dir.path().join("clip.mp4").exists());
        assert!(dir.path().join("clip (1).mp4").exists());
    }

    #[tokio::test]
    async fn unsupported_scheme_is_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let (native, _rx) = downloader(dir.path());

        let err = native
            .start(DownloadSource::Url("ftp://host/file.mp4".into()), "file.mp4", ConflictPolicy::Uniquify)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NativeManager(_)));
        assert!(!dir.path().join("file.mp4").exists());
    }

    #[test]
    fn traversal_names_stay_inside_the_directory() {
        assert_eq!(FsDownloader::safe_name("../../etc/passwd"), "-..-etc-passwd");
        assert_eq!(FsDownloader::safe_name(".."), "download");
        assert_eq!(FsDownloader::safe_name(""), "download");
    }

    #[test]
    fn interrupted_event_maps_to_failure() {
        let outcomes = NativeDownloadEvent::interrupted(NativeHandle(3), "").outcomes();
        assert_eq!(outcomes, vec![StrategyOutcome::Failed(DownloadFailure::interrupted())]);

        let event = NativeDownloadEvent {
            handle: NativeHandle(3),
            state: Some(NativeState::Complete),
            bytes_received: Some(10),
            total_bytes: Some(10),
            error: None,
        };
        assert_eq!(
            event.outcomes(),
            vec![StrategyOutcome::Progress { received: 10, total: 10 }, StrategyOutcome::Complete]
        );
    }
}
