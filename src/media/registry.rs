use std::collections::{BTreeMap, HashSet};
use super::{ContextId, MediaRecord};

/// Detected media grouped by browsing context.
///
/// A URL is stored at most once per context. The same URL may be held by
/// several contexts; [`MediaRegistry::all_media`] collapses those.
#[derive(Debug, Default)]
pub struct MediaRegistry {
    contexts: BTreeMap<ContextId, Vec<MediaRecord>>,
}

impl MediaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record under its context. Returns `false` if the context
    /// already holds the URL.
    pub fn add(&mut self, record: MediaRecord) -> bool {
        let entries = self.contexts.entry(record.context).or_default();
        if entries.iter().any(|existing| existing.url == record.url) {
            return false;
        }

        log::debug!("[MEDIA] {} in context {}: {}", record.kind, record.context.0, record.url);
        entries.push(record);
        true
    }

    /// A context started loading a new page; its media belongs to the old one.
    pub fn on_navigation(&mut self, context: ContextId) -> usize {
        self.clear_context(context)
    }

    pub fn on_closed(&mut self, context: ContextId) -> usize {
        self.clear_context(context)
    }

    pub fn clear_context(&mut self, context: ContextId) -> usize {
        self.contexts
            .remove(&context)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    pub fn clear_all(&mut self) {
        self.contexts.clear();
    }

    pub fn media_for(&self, context: ContextId) -> &[MediaRecord] {
        self.contexts
            .get(&context)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every context's media flattened, one record per URL (the earliest
    /// detection wins), ordered by detection time.
    pub fn all_media(&self) -> Vec<MediaRecord> {
        let mut flattened: Vec<MediaRecord> = self.contexts.values().flatten().cloned().collect();
        flattened.sort_by_key(|record| record.detected_at);

        let mut seen = HashSet::new();
        flattened.retain(|record| seen.insert(record.url.clone()));
        flattened
    }

    /// Records across all contexts, duplicates included.
    pub fn len(&self) -> usize {
        self.contexts.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.values().all(Vec::is_empty)
    }
}
