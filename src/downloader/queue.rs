use std::collections::HashMap;
use chrono::{DateTime, Utc};
use crate::downloader::native::{NativeDownloadEvent, NativeHandle};
use crate::downloader::{DownloadRecord, DownloadRequest, DownloadStatus, QueueStats, StrategyKind, StrategyOutcome};
use crate::errors::{AppError, Result};
use crate::security::InputValidator;
use crate::utils::generate_download_id;

/// Result of applying a strategy outcome to a live record.
#[derive(Debug, Clone)]
pub struct Applied {
    /// The record after the update. For terminal outcomes this is the final
    /// copy; the record has already left the live set.
    pub record: DownloadRecord,
    pub terminal: bool,
}

/// Live download records in admission order, plus the concurrency cap.
///
/// Synchronous and lock-free on its own; [`super::manager::DownloadManager`]
/// owns one behind a mutex and drives the side effects.
pub struct DownloadQueue {
    records: Vec<DownloadRecord>,
    max_concurrent: usize,
    next_sequence: u64,
    early_events: HashMap<NativeHandle, Vec<(DateTime<Utc>, NativeDownloadEvent)>>,
    validator: InputValidator,
}

impl DownloadQueue {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            records: Vec::new(),
            max_concurrent: max_concurrent.max(1),
            next_sequence: 0,
            early_events: HashMap::new(),
            validator: InputValidator::new(),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Validates the request and admits it as a pending record.
    pub fn enqueue(&mut self, request: DownloadRequest, now: DateTime<Utc>) -> Result<DownloadRecord> {
        self.validator.validate_url(&request.url)?;
        let url = request.url.trim().to_string();
        self.validator.validate_user_id(&request.user_id)?;

        let needs_extraction = request
            .needs_extraction
            .unwrap_or_else(|| self.validator.looks_like_youtube(&request.url));
        let strategy = if needs_extraction {
            StrategyKind::RemoteExtraction
        } else {
            StrategyKind::Direct
        };

        let filename = request
            .filename
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        self.next_sequence += 1;
        let record = DownloadRecord {
            id: generate_download_id(),
            url,
            filename,
            user_id: request.user_id,
            needs_extraction,
            strategy,
            status: DownloadStatus::Pending,
            error: None,
            native_handle: None,
            bytes_received: None,
            total_bytes: None,
            created_at: now,
            started_at: None,
            sequence: self.next_sequence,
        };

        self.records.push(record.clone());
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Option<&DownloadRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn records(&self) -> &[DownloadRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.count(DownloadStatus::Active)
    }

    pub fn pending_count(&self) -> usize {
        self.count(DownloadStatus::Pending)
    }

    fn count(&self, status: DownloadStatus) -> usize {
        self.records.iter().filter(|record| record.status == status).count()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.pending_count(),
            active: self.active_count(),
            max_concurrent: self.max_concurrent,
        }
    }

    /// Moves the oldest pending record to active if a slot is free.
    pub fn promote_next(&mut self, now: DateTime<Utc>) -> Option<DownloadRecord> {
        if self.active_count() >= self.max_concurrent {
            return None;
        }

        // records is kept in admission order, so the first pending one is the oldest
        let record = self
            .records
            .iter_mut()
            .find(|record| record.status == DownloadStatus::Pending)?;
        record.status = record.status.transition(DownloadStatus::Active).ok()?;
        record.started_at = Some(now);
        Some(record.clone())
    }

    /// Applies a strategy outcome. Terminal outcomes remove the record.
    pub fn apply(&mut self, id: &str, outcome: StrategyOutcome) -> Result<Applied> {
        let index = self
            .records
            .iter()
            .position(|record| record.id == id)
            .ok_or_else(|| AppError::NotFound(format!("download {}", id)))?;

        let record = &mut self.records[index];
        if record.status != DownloadStatus::Active {
            let to = outcome
                .target_status()
                .unwrap_or(DownloadStatus::Active)
                .to_string();
            return Err(AppError::InvalidTransition {
                from: record.status.to_string(),
                to,
            });
        }

        match outcome {
            StrategyOutcome::Started { handle, filename } => {
                record.native_handle = Some(handle);
                if filename.is_some() {
                    record.filename = filename;
                }
            }
            StrategyOutcome::Progress { received, total } => {
                record.bytes_received = Some(received);
                record.total_bytes = Some(total);
            }
            StrategyOutcome::Complete => {
                record.status = record.status.transition(DownloadStatus::Complete)?;
            }
            StrategyOutcome::Failed(failure) => {
                record.status = record.status.transition(DownloadStatus::Error)?;
                record.error = Some(failure);
            }
        }

        if record.status.is_terminal() {
            let record = self.records.remove(index);
            if let Some(handle) = record.native_handle {
                self.early_events.remove(&handle);
            }
            return Ok(Applied { record, terminal: true });
        }

        Ok(Applied {
            record: record.clone(),
            terminal: false,
        })
    }

    pub fn find_by_handle(&self, handle: NativeHandle) -> Option<&DownloadRecord> {
        self.records
            .iter()
            .find(|record| record.native_handle == Some(handle))
    }

    /// Holds a native event that arrived before its record reported `started`.
    pub fn stash_early_event(&mut self, event: NativeDownloadEvent, now: DateTime<Utc>) {
        self.early_events
            .entry(event.handle)
            .or_default()
            .push((now, event));
    }

    pub fn take_early_events(&mut self, handle: NativeHandle) -> Vec<NativeDownloadEvent> {
        self.early_events
            .remove(&handle)
            .map(|events| events.into_iter().map(|(_, event)| event).collect())
            .unwrap_or_default()
    }

    /// Drops records (in any status) and stashed events older than `max_age`.
    pub fn reclaim_stale(&mut self, now: DateTime<Utc>, max_age: chrono::Duration) -> Vec<DownloadRecord> {
        let cutoff = now - max_age;

        let (stale, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|record| record.created_at < cutoff);
        self.records = live;

        self.early_events.retain(|_, events| {
            events.retain(|(seen_at, _)| *seen_at >= cutoff);
            !events.is_empty()
        });

        stale
    }

    #[cfg(test)]
    pub(crate) fn early_event_count(&self) -> usize {
        self.early_events.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{DownloadFailure, FailureKind};
    use proptest::prelude::*;

    fn direct(n: usize) -> DownloadRequest {
        DownloadRequest::new(format!("https://cdn.example.com/{}.mp4", n))
    }

    #[test]
    fn enqueue_rejects_malformed_requests() {
        let mut queue = DownloadQueue::new(3);
        let err = queue.enqueue(DownloadRequest::new(""), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = queue.enqueue(DownloadRequest::new("not a url"), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(queue.is_empty());
    }

    #[test]
    fn extraction_is_inferred_unless_given() {
        let mut queue = DownloadQueue::new(3);
        let now = Utc::now();

        let yt = queue.enqueue(DownloadRequest::new("https://www.youtube.com/watch?v=abc"), now).unwrap();
        assert_eq!(yt.strategy, StrategyKind::RemoteExtraction);

        let file = queue.enqueue(direct(1), now).unwrap();
        assert_eq!(file.strategy, StrategyKind::Direct);

        let forced = queue
            .enqueue(DownloadRequest::new("https://youtu.be/abc").with_extraction(false), now)
            .unwrap();
        assert_eq!(forced.strategy, StrategyKind::Direct);
    }

    #[test]
    fn promotion_is_fifo_and_capped() {
        let mut queue = DownloadQueue::new(2);
        let now = Utc::now();
        let ids: Vec<String> = (0..4).map(|n| queue.enqueue(direct(n), now).unwrap().id).collect();

        assert_eq!(queue.promote_next(now).unwrap().id, ids[0]);
        assert_eq!(queue.promote_next(now).unwrap().id, ids[1]);
        assert!(queue.promote_next(now).is_none());

        let applied = queue.apply(&ids[1], StrategyOutcome::Complete).unwrap();
        assert!(applied.terminal);
        assert_eq!(applied.record.status, DownloadStatus::Complete);
        assert!(queue.get(&ids[1]).is_none());

        assert_eq!(queue.promote_next(now).unwrap().id, ids[2]);
        assert!(queue.promote_next(now).is_none());
    }

    #[test]
    fn outcomes_on_pending_records_are_rejected() {
        let mut queue = DownloadQueue::new(1);
        let id = queue.enqueue(direct(0), Utc::now()).unwrap().id;

        let err = queue.apply(&id, StrategyOutcome::Complete).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert_eq!(queue.get(&id).unwrap().status, DownloadStatus::Pending);
    }

    #[test]
    fn failure_keeps_reason_and_started_binds_handle() {
        let mut queue = DownloadQueue::new(1);
        let now = Utc::now();
        let id = queue.enqueue(direct(0), now).unwrap().id;
        queue.promote_next(now).unwrap();

        let started = queue
            .apply(&id, StrategyOutcome::Started { handle: NativeHandle(7), filename: Some("a.mp4".into()) })
            .unwrap();
        assert!(!started.terminal);
        assert_eq!(queue.find_by_handle(NativeHandle(7)).unwrap().id, id);

        let failure = DownloadFailure::new(FailureKind::Network, "Download failed: reset");
        let applied = queue.apply(&id, StrategyOutcome::Failed(failure.clone())).unwrap();
        assert_eq!(applied.record.error, Some(failure));
        assert_eq!(applied.record.filename.as_deref(), Some("a.mp4"));
        assert!(queue.is_empty());
    }

    #[test]
    fn stale_records_and_events_are_reclaimed() {
        let mut queue = DownloadQueue::new(1);
        let old = Utc::now() - chrono::Duration::hours(2);
        let now = Utc::now();

        let stale_id = queue.enqueue(direct(0), old).unwrap().id;
        queue.promote_next(old).unwrap();
        let fresh_id = queue.enqueue(direct(1), now).unwrap().id;
        queue.stash_early_event(NativeDownloadEvent::complete(NativeHandle(99)), old);

        let reclaimed = queue.reclaim_stale(now, chrono::Duration::hours(1));
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, stale_id);
        assert_eq!(queue.early_event_count(), 0);

        // the freed slot goes to the remaining pending record
        assert_eq!(queue.promote_next(now).unwrap().id, fresh_id);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Enqueue,
        Advance,
        Complete(usize),
        Fail(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => Just(Op::Enqueue),
            2 => Just(Op::Advance),
            1 => (0usize..8).prop_map(Op::Complete),
            1 => (0usize..8).prop_map(Op::Fail),
        ]
    }

    proptest! {
        #[test]
        fn queue_invariants_hold(limit in 1usize..5, ops in proptest::collection::vec(op(), 1..60)) {
            let mut queue = DownloadQueue::new(limit);
            let now = Utc::now();
            let mut admitted: Vec<String> = Vec::new();
            let mut finished: Vec<String> = Vec::new();

            for (n, op) in ops.into_iter().enumerate() {
                match op {
                    Op::Enqueue => admitted.push(queue.enqueue(direct(n), now).unwrap().id),
                    Op::Advance => {
                        let oldest_pending = queue
                            .records()
                            .iter()
                            .filter(|r| r.status == DownloadStatus::Pending)
                            .min_by_key(|r| r.sequence)
                            .map(|r| r.id.clone());
                        let had_slot = queue.active_count() < limit;
                        let promoted = queue.promote_next(now).map(|r| r.id);
                        if had_slot {
                            prop_assert_eq!(promoted, oldest_pending);
                        } else {
                            prop_assert!(promoted.is_none());
                        }
                    }
                    Op::Complete(i) | Op::Fail(i) => {
                        let active: Vec<String> = queue
                            .records()
                            .iter()
                            .filter(|r| r.status == DownloadStatus::Active)
                            .map(|r| r.id.clone())
                            .collect();
                        if let Some(id) = active.get(i % active.len().max(1)).cloned() {
                            let outcome = if matches!(op, Op::Complete(_)) {
                                StrategyOutcome::Complete
                            } else {
                                StrategyOutcome::Failed(DownloadFailure::interrupted())
                            };
                            prop_assert!(queue.apply(&id, outcome).unwrap().terminal);
                            finished.push(id);
                        }
                    }
                }

                prop_assert!(queue.active_count() <= limit);
            }

            // terminal records never come back, and ids are never reused
            for id in &finished {
                prop_assert!(queue.get(id).is_none());
                prop_assert!(queue.apply(id, StrategyOutcome::Complete).is_err());
            }
            let mut unique = admitted.clone();
            unique.sort();
            unique.dedup();
            prop_assert_eq!(unique.len(), admitted.len());
        }
    }
}
