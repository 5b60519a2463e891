use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use crate::downloader::native::NativeDownloadEvent;
use crate::downloader::queue::{Applied, DownloadQueue};
use crate::downloader::strategies::StrategySet;
use crate::downloader::{DownloadRecord, DownloadRequest, QueueStats, StrategyOutcome};
use crate::errors::{DownloadFailure, FailureKind, Result};
use crate::notifications::{Notifier, DOWNLOAD_COMPLETE_TITLE, DOWNLOAD_ERROR_TITLE};
use crate::relay::{DownloadProgress, ProgressEvent, ProgressRelay, RelayMessage};

const EXPIRED_MESSAGE: &str = "Download failed: Download expired before it finished.";

/// Owns the download queue and drives it: admission, promotion under the
/// concurrency cap, strategy dispatch, outcome handling and maintenance.
///
/// Cheap to clone; clones share the same queue. The queue lock is never held
/// across an await, so every state change runs to completion before the next.
#[derive(Clone)]
pub struct DownloadManager {
    queue: Arc<Mutex<DownloadQueue>>,
    strategies: StrategySet,
    relay: ProgressRelay,
    notifier: Arc<dyn Notifier>,
}

impl DownloadManager {
    pub fn new(max_concurrent: usize, strategies: StrategySet, relay: ProgressRelay, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            queue: Arc::new(Mutex::new(DownloadQueue::new(max_concurrent))),
            strategies,
            relay,
            notifier,
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, DownloadQueue> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayMessage> {
        self.relay.subscribe()
    }

    /// Subscribes a [`DownloadWatch`]. Create it before enqueueing the ids it
    /// will track.
    pub fn watch(&self) -> DownloadWatch {
        DownloadWatch {
            manager: self.clone(),
            events: self.relay.subscribe(),
            outstanding: HashSet::new(),
            lost: VecDeque::new(),
        }
    }

    /// Admits a request and returns its id. Rejects malformed requests
    /// synchronously; everything later is reported through the relay.
    ///
    /// Must be called from within a tokio runtime, since promotion may spawn
    /// the strategy.
    pub fn enqueue(&self, request: DownloadRequest) -> Result<String> {
        let record = {
            let mut queue = self.lock_queue();
            let record = queue.enqueue(request, Utc::now())?;
            // relayed under the lock so `queued` precedes anything a
            // concurrent promotion reports for this id
            self.relay.download(
                &record.id,
                ProgressEvent::Queued {
                    filename: record.filename.clone(),
                },
            );
            record
        };

        log::info!(
            "[QUEUE] Queued {} via {:?}: {}",
            record.id, record.strategy, record.url
        );

        self.advance();
        Ok(record.id)
    }

    /// Promotes pending records, oldest first, until the cap is reached.
    /// Returns how many were started.
    pub fn advance(&self) -> usize {
        let mut promoted: Vec<DownloadRecord> = Vec::new();
        {
            let mut queue = self.lock_queue();
            let now = Utc::now();
            while let Some(record) = queue.promote_next(now) {
                promoted.push(record);
            }
        }

        for record in &promoted {
            log::info!("[QUEUE] Starting {} ({:?})", record.id, record.strategy);
            self.spawn_dispatch(record.clone());
        }

        promoted.len()
    }

    fn spawn_dispatch(&self, record: DownloadRecord) {
        let manager = self.clone();
        tokio::spawn(async move {
            manager.dispatch(record).await;
        });
    }

    async fn dispatch(&self, record: DownloadRecord) {
        let strategy = Arc::clone(self.strategies.for_kind(record.strategy));

        let outcome = match strategy.dispatch(&record).await {
            Ok(started) => StrategyOutcome::Started {
                handle: started.handle,
                filename: Some(started.filename),
            },
            Err(e) => {
                log::warn!("[QUEUE] {} failed to start: {}", record.id, e);
                StrategyOutcome::Failed(DownloadFailure::from(&e))
            }
        };

        if let Err(e) = self.on_strategy_outcome(&record.id, outcome) {
            log::debug!("[QUEUE] Dropped dispatch outcome for {}: {}", record.id, e);
        }
    }

    /// Applies a strategy report to its record, relays it, and frees the
    /// slot on `complete` / `failed`.
    ///
    /// The relay event is sent before the queue lock is released, so events
    /// for one id leave in the order their outcomes were applied. Native
    /// events stashed for a `started` handle are applied in the same critical
    /// section, ahead of anything the listener delivers afterwards.
    pub fn on_strategy_outcome(&self, id: &str, outcome: StrategyOutcome) -> Result<()> {
        let mut settled: Vec<(Applied, StrategyOutcome)> = Vec::new();
        {
            let mut queue = self.lock_queue();
            let applied = self.apply_and_relay(&mut queue, id, outcome.clone())?;
            let mut terminal = applied.terminal;
            settled.push((applied, outcome.clone()));

            if let StrategyOutcome::Started { handle, .. } = &outcome {
                let stashed = queue.take_early_events(*handle);
                for early in stashed.iter().flat_map(|event| event.outcomes()) {
                    if terminal {
                        break;
                    }
                    match self.apply_and_relay(&mut queue, id, early.clone()) {
                        Ok(applied) => {
                            terminal = applied.terminal;
                            settled.push((applied, early));
                        }
                        Err(e) => {
                            log::debug!("[QUEUE] Ignored early event for {}: {}", id, e);
                            break;
                        }
                    }
                }
            }
        }

        let mut freed = false;
        for (applied, outcome) in &settled {
            self.report_outcome(id, &applied.record, outcome);
            freed |= applied.terminal;
        }

        if freed {
            self.advance();
        }
        Ok(())
    }

    fn apply_and_relay(&self, queue: &mut DownloadQueue, id: &str, outcome: StrategyOutcome) -> Result<Applied> {
        let event = outcome.clone();
        let applied = queue.apply(id, outcome)?;
        self.relay.download(id, Self::progress_event(&applied.record, &event));
        Ok(applied)
    }

    fn report_outcome(&self, id: &str, record: &DownloadRecord, outcome: &StrategyOutcome) {
        match outcome {
            StrategyOutcome::Started { handle, .. } => {
                log::info!("[QUEUE] {} handed to download manager as {}", id, handle);
            }
            StrategyOutcome::Progress { .. } => {}
            StrategyOutcome::Complete => {
                log::info!("[QUEUE] ✅ {} complete", id);
                let name = record.filename.as_deref().unwrap_or(&record.url);
                self.notifier
                    .notify(DOWNLOAD_COMPLETE_TITLE, &format!("Successfully downloaded: {}", name));
            }
            StrategyOutcome::Failed(failure) => {
                log::warn!("[QUEUE] ❌ {} failed: {}", id, failure);
                self.notifier.notify(DOWNLOAD_ERROR_TITLE, &failure.message);
            }
        }
    }

    fn progress_event(record: &DownloadRecord, outcome: &StrategyOutcome) -> ProgressEvent {
        let filename = record.filename.clone();
        match outcome {
            StrategyOutcome::Started { handle, .. } => ProgressEvent::Started {
                native_handle: *handle,
                filename,
            },
            StrategyOutcome::Progress { received, total } => ProgressEvent::Progress {
                received: *received,
                total: *total,
                filename,
            },
            StrategyOutcome::Complete => ProgressEvent::Complete {
                filename,
                success: true,
            },
            StrategyOutcome::Failed(failure) => ProgressEvent::Error {
                error: failure.message.clone(),
                kind: failure.kind,
                filename,
            },
        }
    }

    /// Routes a native download manager notification to its record.
    pub fn on_native_event(&self, event: NativeDownloadEvent) {
        let id = {
            let mut queue = self.lock_queue();
            match queue.find_by_handle(event.handle).map(|record| record.id.clone()) {
                Some(id) => id,
                None => {
                    log::debug!("[QUEUE] Holding event for unbound handle {}", event.handle);
                    queue.stash_early_event(event, Utc::now());
                    return;
                }
            }
        };

        for outcome in event.outcomes() {
            if let Err(e) = self.on_strategy_outcome(&id, outcome) {
                log::debug!("[QUEUE] Ignored native event for {}: {}", id, e);
                break;
            }
        }
    }

    /// Removes records older than `max_age` whatever their status, then
    /// refills any slots that freed up. Returns how many were removed.
    pub fn reclaim_stale(&self, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        let stale = self.lock_queue().reclaim_stale(Utc::now(), max_age);

        for record in &stale {
            log::warn!(
                "[QUEUE] Reclaimed stale download {} ({}) created at {}",
                record.id, record.status, record.created_at
            );
            self.relay.download(
                &record.id,
                ProgressEvent::Error {
                    error: EXPIRED_MESSAGE.to_string(),
                    kind: FailureKind::Expired,
                    filename: record.filename.clone(),
                },
            );
            self.notifier.notify(DOWNLOAD_ERROR_TITLE, EXPIRED_MESSAGE);
        }

        if !stale.is_empty() {
            self.advance();
        }
        stale.len()
    }

    pub fn get(&self, id: &str) -> Option<DownloadRecord> {
        self.lock_queue().get(id).cloned()
    }

    /// Live records in admission order.
    pub fn records(&self) -> Vec<DownloadRecord> {
        self.lock_queue().records().to_vec()
    }

    pub fn stats(&self) -> QueueStats {
        self.lock_queue().stats()
    }

    /// Forwards native download notifications into the queue until the
    /// sending side is dropped.
    pub fn spawn_native_listener(&self, mut events: mpsc::UnboundedReceiver<NativeDownloadEvent>) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                manager.on_native_event(event);
            }
            log::debug!("[QUEUE] Native event channel closed");
        })
    }

    pub fn spawn_stale_reclaimer(&self, period: Duration, max_age: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;

            loop {
                interval.tick().await;
                manager.reclaim_stale(max_age);
            }
        })
    }
}

/// What a [`DownloadWatch`] saw next.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchUpdate {
    Progress(DownloadProgress),
    /// The download left the queue while the subscriber lagged behind the
    /// relay; its terminal event was not seen.
    Lost(String),
}

/// Follows relay traffic for a set of downloads until each has settled.
///
/// A lagging subscriber may miss terminal events, so after a lag every
/// tracked id is checked against the queue and ids no longer live are
/// reported as [`WatchUpdate::Lost`].
pub struct DownloadWatch {
    manager: DownloadManager,
    events: broadcast::Receiver<RelayMessage>,
    outstanding: HashSet<String>,
    lost: VecDeque<String>,
}

impl DownloadWatch {
    pub fn track(&mut self, id: impl Into<String>) {
        self.outstanding.insert(id.into());
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// `None` once every tracked id has settled or the relay has closed.
    pub async fn next(&mut self) -> Option<WatchUpdate> {
        loop {
            if let Some(id) = self.lost.pop_front() {
                return Some(WatchUpdate::Lost(id));
            }
            if self.outstanding.is_empty() {
                return None;
            }

            match self.events.recv().await {
                Ok(RelayMessage::DownloadProgress(update)) => {
                    if !self.outstanding.contains(&update.download_id) {
                        continue;
                    }
                    if update.progress.is_terminal() {
                        self.outstanding.remove(&update.download_id);
                    }
                    return Some(WatchUpdate::Progress(update));
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!(
                        "[QUEUE] Watch lagged by {} events, rechecking {} downloads",
                        skipped,
                        self.outstanding.len()
                    );
                    self.resync();
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn resync(&mut self) {
        let mut gone: Vec<String> = self
            .outstanding
            .iter()
            .filter(|id| self.manager.get(id).is_none())
            .cloned()
            .collect();
        gone.sort();

        for id in gone {
            self.outstanding.remove(&id);
            self.lost.push_back(id);
        }
    }
}
