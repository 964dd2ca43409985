//! LRU media cache with coalesced downloads

use crate::error::{FetchError, StorageError};
use crate::events::{CacheEvent, EventSink, EvictionReason};
use crate::index::LruIndex;
use crate::store::{MediaStore, MemoryStore};
use crate::types::{
    display_name_for, CacheConfig, CacheEntry, CacheStats, EntryMeta, FetchOrigin,
};
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

type SharedDownload = Shared<BoxFuture<'static, Result<CacheEntry, FetchError>>>;

struct Pending {
    episode: u64,
    download: SharedDownload,
}

struct Inner {
    config: CacheConfig,
    /// Swapped for a `MemoryStore` when the persistent store cannot be opened
    store: RwLock<Arc<dyn MediaStore>>,
    degraded: AtomicBool,
    /// Held across insert, capacity eviction and the paired store delete
    index: AsyncMutex<LruIndex>,
    /// Never held across an await
    pending: Mutex<HashMap<String, Pending>>,
    recency: AtomicU64,
    episodes: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    events: EventSink,
}

impl Inner {
    fn store(&self) -> Arc<dyn MediaStore> {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_recency(&self) -> u64 {
        self.recency.fetch_add(1, Ordering::Relaxed)
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears a key's in-flight marker when its download task finishes,
/// whether it succeeded, failed, timed out or panicked.
struct PendingGuard {
    inner: Arc<Inner>,
    key: String,
    episode: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut pending = self.inner.pending();
        if pending.get(&self.key).map(|p| p.episode) == Some(self.episode) {
            pending.remove(&self.key);
        }
    }
}

enum Lookup<F> {
    Hit(EntryMeta, F),
    Download(SharedDownload),
}

/// Bounded LRU cache of downloaded media, keyed by source URL
///
/// Cloning is cheap; clones share the same index, store and in-flight
/// downloads.
#[derive(Clone)]
pub struct MediaCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MediaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaCache")
            .field("config", &self.inner.config)
            .field("degraded", &self.is_degraded())
            .finish_non_exhaustive()
    }
}

impl MediaCache {
    /// Create a cache over `store`. Call [`MediaCache::initialize`] before use.
    pub fn new(store: Arc<dyn MediaStore>, config: CacheConfig) -> Self {
        Self::build(store, config, EventSink::default())
    }

    /// Like [`MediaCache::new`], publishing lifecycle events to `events`
    pub fn with_events(
        store: Arc<dyn MediaStore>,
        config: CacheConfig,
        events: mpsc::Sender<CacheEvent>,
    ) -> Self {
        Self::build(store, config, EventSink::new(events))
    }

    /// Non-persistent cache
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    fn build(store: Arc<dyn MediaStore>, config: CacheConfig, events: EventSink) -> Self {
        let index = LruIndex::new(config.max_entries);
        Self {
            inner: Arc::new(Inner {
                config,
                store: RwLock::new(store),
                degraded: AtomicBool::new(false),
                index: AsyncMutex::new(index),
                pending: Mutex::new(HashMap::new()),
                recency: AtomicU64::new(1),
                episodes: AtomicU64::new(0),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                events,
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Whether the cache fell back to memory-only storage
    pub fn is_degraded(&self) -> bool {
        self.inner.degraded.load(Ordering::Relaxed)
    }

    /// Open the store and load persisted metadata into the index
    ///
    /// Safe to call repeatedly; each call rebuilds the index from the store.
    /// If the store cannot be opened or listed, the cache switches to an
    /// in-memory store and keeps working; the error is returned so the
    /// caller can report it.
    pub async fn initialize(&self) -> Result<(), StorageError> {
        let store = self.inner.store();
        let listed = match store.open().await {
            Ok(()) => store.list_all().await,
            Err(e) => Err(e),
        };

        let metas = match listed {
            Ok(metas) => metas,
            Err(e) => {
                warn!(error = %e, "Persistent store unavailable, caching in memory only");
                self.degrade();
                self.inner.index.lock().await.clear();
                self.inner.events.emit(CacheEvent::Degraded {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let max_recency = metas.iter().map(|m| m.recency).max().unwrap_or(0);
        self.inner
            .recency
            .fetch_max(max_recency + 1, Ordering::Relaxed);

        let mut index = self.inner.index.lock().await;
        let surplus = index.load(metas);
        for meta in &surplus {
            if let Err(e) = store.delete(&meta.key).await {
                warn!(key = %meta.key, error = %e, "Failed to delete surplus cache entry");
            }
        }

        info!(
            entries = index.len(),
            total_size = index.total_size(),
            trimmed = surplus.len(),
            "Media cache initialized"
        );
        Ok(())
    }

    fn degrade(&self) {
        let mut store = self
            .inner
            .store
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *store = Arc::new(MemoryStore::new());
        self.inner.degraded.store(true, Ordering::Relaxed);
    }

    /// Whether `key` has a persisted entry. Does not affect recency.
    pub async fn is_cached(&self, key: &str) -> bool {
        match self.inner.store().contains(key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to check cache store");
                false
            }
        }
    }

    /// Look up `key` without downloading, marking it most recently used
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let touched = {
            let mut index = self.inner.index.lock().await;
            index.touch(key, self.inner.next_recency())
        };

        let Some(meta) = touched else {
            self.inner.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let entry = self.load_hit(&meta).await;
        if entry.is_none() {
            self.inner.misses.fetch_add(1, Ordering::Relaxed);
        }
        entry
    }

    /// Return the cached entry for `key`, downloading it on a miss
    ///
    /// `downloader` is called with the key at most once, and only when no
    /// download for the key is already running; concurrent callers for the
    /// same key share one download and receive the same result. A failed
    /// download stores nothing, so a later call retries.
    pub async fn fetch_or_download<F, Fut, E>(
        &self,
        key: &str,
        downloader: F,
    ) -> Result<CacheEntry, FetchError>
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Bytes, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.fetch_with_origin(key, downloader)
            .await
            .map(|(entry, _)| entry)
    }

    /// Like [`MediaCache::fetch_or_download`], also reporting whether the
    /// entry was served from the cache or from a download
    pub async fn fetch_with_origin<F, Fut, E>(
        &self,
        key: &str,
        downloader: F,
    ) -> Result<(CacheEntry, FetchOrigin), FetchError>
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Bytes, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        if key.is_empty() {
            return Err(FetchError::InvalidKey("empty key".to_string()));
        }

        let mut downloader = downloader;
        loop {
            match self.lookup(key, downloader).await {
                Lookup::Download(download) => {
                    return download.await.map(|entry| (entry, FetchOrigin::Downloaded))
                }
                Lookup::Hit(meta, unused) => {
                    if let Some(entry) = self.load_hit(&meta).await {
                        return Ok((entry, FetchOrigin::Cache));
                    }
                    // The record vanished from the store; load_hit dropped it
                    // from the index, so the next lookup downloads.
                    downloader = unused;
                }
            }
        }
    }

    /// Hit, or join/start the download for `key`
    ///
    /// Runs under the index lock: a download task inserts into the index
    /// before its marker is cleared, so a caller sees either the entry or
    /// the marker, never a gap that would start a duplicate download.
    async fn lookup<F, Fut, E>(&self, key: &str, downloader: F) -> Lookup<F>
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Bytes, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut index = self.inner.index.lock().await;
        if let Some(meta) = index.touch(key, self.inner.next_recency()) {
            return Lookup::Hit(meta, downloader);
        }

        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        let download = self.join_or_start(key, downloader);
        drop(index);
        Lookup::Download(download)
    }

    fn join_or_start<F, Fut, E>(&self, key: &str, downloader: F) -> SharedDownload
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Bytes, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut pending = self.inner.pending();
        if let Some(existing) = pending.get(key) {
            debug!(key = %key, "Joining in-flight download");
            return existing.download.clone();
        }

        let episode = self.inner.episodes.fetch_add(1, Ordering::Relaxed);
        let guard = PendingGuard {
            inner: self.inner.clone(),
            key: key.to_string(),
            episode,
        };
        let cache = self.clone();
        let owned_key = key.to_string();

        // The guard lives in the task, so the marker is cleared even if every
        // caller stops waiting. The pending lock is held until the marker is
        // inserted, so the guard cannot run first.
        let task = tokio::spawn(async move {
            let _guard = guard;
            cache.populate(owned_key, downloader).await
        });

        let download = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(FetchError::Aborted(e.to_string())),
            }
        }
        .boxed()
        .shared();

        pending.insert(
            key.to_string(),
            Pending {
                episode,
                download: download.clone(),
            },
        );
        debug!(key = %key, episode, "Started download");
        download
    }

    async fn populate<F, Fut, E>(&self, key: String, downloader: F) -> Result<CacheEntry, FetchError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let download = downloader(key.clone());
        let result = match self.inner.config.download_timeout {
            Some(limit) => match tokio::time::timeout(limit, download).await {
                Ok(result) => result,
                Err(_) => return Err(self.download_failed(&key, FetchError::TimedOut(limit))),
            },
            None => download.await,
        };

        let payload = match result {
            Ok(payload) => payload,
            Err(e) => return Err(self.download_failed(&key, FetchError::Download(Arc::new(e)))),
        };

        let display_name = display_name_for(&key);
        Ok(self.insert(&key, display_name, payload).await)
    }

    fn download_failed(&self, key: &str, err: FetchError) -> FetchError {
        warn!(key = %key, error = %err, "Media download failed");
        self.inner.events.emit(CacheEvent::DownloadFailed {
            key: key.to_string(),
            error: err.to_string(),
        });
        err
    }

    /// Store bytes obtained elsewhere under `key`
    ///
    /// Replaces any existing entry for the key and marks it most recently
    /// used, evicting the least recently used entry if over capacity.
    pub async fn store(
        &self,
        key: &str,
        display_name: impl Into<String>,
        payload: Bytes,
    ) -> CacheEntry {
        self.insert(key, display_name.into(), payload).await
    }

    async fn insert(&self, key: &str, display_name: String, payload: Bytes) -> CacheEntry {
        // The index lock covers the recency stamp, the write, the index update
        // and the paired delete of any evicted entry.
        let mut index = self.inner.index.lock().await;
        let store = self.inner.store();
        let entry = CacheEntry::new(key, display_name, payload, self.inner.next_recency());

        // A failed write still updates the index; the missing record reads
        // as a miss later.
        if let Err(e) = store.put(&entry).await {
            warn!(key = %key, error = %e, "Failed to persist cached media");
        }

        let evicted = index.insert(entry.meta());
        if let Some(evicted) = &evicted {
            if let Err(e) = store.delete(&evicted.key).await {
                warn!(key = %evicted.key, error = %e, "Failed to delete evicted media");
            }
        }
        drop(index);

        debug!(key = %key, size = entry.size_bytes, "Cached media");
        self.inner.events.emit(CacheEvent::Stored {
            key: entry.key.clone(),
            size_bytes: entry.size_bytes,
        });
        if let Some(evicted) = evicted {
            debug!(key = %evicted.key, "Evicted least recently used media");
            self.inner.events.emit(CacheEvent::Evicted {
                key: evicted.key,
                reason: EvictionReason::Capacity,
            });
        }
        entry
    }

    /// Read a hit's payload from the store, persisting its new recency
    ///
    /// A record missing from the store is dropped from the index.
    async fn load_hit(&self, meta: &EntryMeta) -> Option<CacheEntry> {
        let store = self.inner.store();
        let loaded = match store.get(&meta.key).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(key = %meta.key, error = %e, "Failed to read cached media");
                None
            }
        };

        let mut index = self.inner.index.lock().await;
        let Some(mut entry) = loaded else {
            warn!(key = %meta.key, "Indexed media missing from store, treating as miss");
            index.remove_stale(&meta.key, meta.recency);
            return None;
        };

        // Persist only while the index still holds this touch
        if index.holds(&meta.key, meta.recency) {
            if let Err(e) = store.touch(&meta.key, meta.recency).await {
                warn!(key = %meta.key, error = %e, "Failed to persist cache recency");
            }
        }
        drop(index);

        entry.recency = meta.recency;
        self.inner.hits.fetch_add(1, Ordering::Relaxed);
        debug!(key = %meta.key, "Cache hit");
        self.inner.events.emit(CacheEvent::Hit {
            key: meta.key.clone(),
        });
        Some(entry)
    }

    /// Remove `key` from the index and the store
    ///
    /// Returns whether the index held the key.
    pub async fn evict(&self, key: &str) -> bool {
        let store = self.inner.store();
        let mut index = self.inner.index.lock().await;
        let removed = index.remove(key);
        if let Err(e) = store.delete(key).await {
            warn!(key = %key, error = %e, "Failed to delete media from store");
        }
        drop(index);

        if removed.is_none() {
            return false;
        }
        debug!(key = %key, "Evicted media");
        self.inner.events.emit(CacheEvent::Evicted {
            key: key.to_string(),
            reason: EvictionReason::Explicit,
        });
        true
    }

    /// Remove every entry from the index and the store
    ///
    /// Downloads already in flight are not cancelled and are stored when
    /// they complete.
    pub async fn clear(&self) {
        let store = self.inner.store();
        let mut index = self.inner.index.lock().await;
        let count = index.clear();
        if let Err(e) = store.clear().await {
            warn!(error = %e, "Failed to clear media store");
        }
        drop(index);

        info!(count, "Media cache cleared");
        self.inner.events.emit(CacheEvent::Cleared { count });
    }

    /// Occupancy snapshot from the in-memory index, keys LRU first
    pub async fn stats(&self) -> CacheStats {
        let index = self.inner.index.lock().await;
        CacheStats {
            count: index.len(),
            max_entries: index.max_entries(),
            total_size_bytes: index.total_size(),
            keys: index.keys_lru_first(),
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            in_flight: self.inner.pending().len(),
        }
    }

    /// Metadata of every indexed entry, least recently used first
    pub async fn entries(&self) -> Vec<EntryMeta> {
        self.inner.index.lock().await.entries_lru_first()
    }
}
