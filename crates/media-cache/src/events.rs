//! Cache lifecycle events
//!
//! Consumers pass an `mpsc::Sender<CacheEvent>` at construction. Events are
//! sent with `try_send`, so a slow or absent consumer never stalls the cache.

use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Least recently used entry dropped to stay within `max_entries`
    Capacity,
    /// Removed by an explicit `evict` call
    Explicit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Stored { key: String, size_bytes: u64 },
    Hit { key: String },
    Evicted { key: String, reason: EvictionReason },
    Cleared { count: usize },
    DownloadFailed { key: String, error: String },
    /// The persistent store is unusable; the cache runs in memory only
    Degraded { reason: String },
}

#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink {
    tx: Option<mpsc::Sender<CacheEvent>>,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::Sender<CacheEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub(crate) fn emit(&self, event: CacheEvent) {
        let Some(tx) = &self.tx else {
            return;
        };

        if let Err(mpsc::error::TrySendError::Full(event)) = tx.try_send(event) {
            debug!(?event, "Cache event channel full, dropping event");
        }
    }
}
