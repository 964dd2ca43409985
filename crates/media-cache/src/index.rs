//! In-memory LRU index over cached entry metadata
//!
//! The index is unbounded at the `lru` level; capacity is enforced here so
//! every eviction is handed back to the caller, which pairs it with a delete
//! in the persistent store.

use crate::types::EntryMeta;
use lru::LruCache;

pub(crate) struct LruIndex {
    entries: LruCache<String, EntryMeta>,
    max_entries: usize,
    total_size: u64,
}

impl LruIndex {
    pub(crate) fn new(max_entries: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            max_entries: max_entries.max(1),
            total_size: 0,
        }
    }

    /// Replace the index contents with persisted metadata
    ///
    /// Entries are ordered by recency ascending. Returns the oldest surplus
    /// entries that did not fit within `max_entries`.
    pub(crate) fn load(&mut self, mut metas: Vec<EntryMeta>) -> Vec<EntryMeta> {
        self.clear();
        metas.sort_by_key(|m| m.recency);

        let surplus_len = metas.len().saturating_sub(self.max_entries);
        let kept = metas.split_off(surplus_len);
        for meta in kept {
            self.total_size += meta.size_bytes;
            if let Some(previous) = self.entries.put(meta.key.clone(), meta) {
                self.total_size -= previous.size_bytes;
            }
        }
        metas
    }

    /// Insert or refresh an entry as most recently used
    ///
    /// Returns the entry evicted to stay within capacity, if any. At most one
    /// entry is evicted per insertion.
    pub(crate) fn insert(&mut self, meta: EntryMeta) -> Option<EntryMeta> {
        self.total_size += meta.size_bytes;
        if let Some(previous) = self.entries.put(meta.key.clone(), meta) {
            self.total_size -= previous.size_bytes;
            return None;
        }

        if self.entries.len() > self.max_entries {
            let (_, evicted) = self.entries.pop_lru()?;
            self.total_size -= evicted.size_bytes;
            return Some(evicted);
        }
        None
    }

    /// Mark `key` most recently used, returning its updated metadata
    pub(crate) fn touch(&mut self, key: &str, recency: u64) -> Option<EntryMeta> {
        let meta = self.entries.get_mut(key)?;
        meta.recency = recency;
        Some(meta.clone())
    }

    #[cfg(test)]
    fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<EntryMeta> {
        let removed = self.entries.pop(key)?;
        self.total_size -= removed.size_bytes;
        Some(removed)
    }

    /// Whether `key` is indexed and still carries `recency`
    pub(crate) fn holds(&self, key: &str, recency: u64) -> bool {
        self.entries
            .peek(key)
            .is_some_and(|meta| meta.recency == recency)
    }

    /// Remove `key` only if it still carries `recency`
    pub(crate) fn remove_stale(&mut self, key: &str, recency: u64) -> Option<EntryMeta> {
        if !self.holds(key, recency) {
            return None;
        }
        self.remove(key)
    }

    pub(crate) fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.total_size = 0;
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub(crate) fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Entries in eviction order, least recently used first
    pub(crate) fn entries_lru_first(&self) -> Vec<EntryMeta> {
        self.entries.iter().rev().map(|(_, meta)| meta.clone()).collect()
    }

    pub(crate) fn keys_lru_first(&self) -> Vec<String> {
        self.entries.iter().rev().map(|(key, _)| key.clone()).collect()
    }
}
