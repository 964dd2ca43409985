//! Volatile in-memory store

use super::{MediaStore, Result};
use crate::types::{CacheEntry, EntryMeta};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Store that keeps records in process memory
///
/// Used when no durable storage is available and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MediaStore for MemoryStore {
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let records = self.records.read().await;
        Ok(records.get(key).cloned())
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let records = self.records.read().await;
        Ok(records.contains_key(key))
    }

    async fn touch(&self, key: &str, recency: u64) -> Result<()> {
        let mut records = self.records.write().await;
        if let Some(entry) = records.get_mut(key) {
            entry.recency = recency;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut records = self.records.write().await;
        records.remove(key);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<EntryMeta>> {
        let records = self.records.read().await;
        Ok(records.values().map(CacheEntry::meta).collect())
    }

    async fn clear(&self) -> Result<()> {
        self.records.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryStore::new();
        let entry = CacheEntry::new("k1", "one", Bytes::from_static(b"abc"), 1);

        store.put(&entry).await.unwrap();
        assert!(store.contains("k1").await.unwrap());

        let loaded = store.get("k1").await.unwrap().unwrap();
        assert_eq!(loaded.payload, entry.payload);

        store.delete("k1").await.unwrap();
        store.delete("k1").await.unwrap();
        assert!(store.get("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_record() {
        let store = MemoryStore::new();
        store
            .put(&CacheEntry::new("k1", "one", Bytes::from_static(b"old"), 1))
            .await
            .unwrap();
        store
            .put(&CacheEntry::new("k1", "one", Bytes::from_static(b"newer"), 2))
            .await
            .unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].size_bytes, 5);
    }

    #[tokio::test]
    async fn test_touch_and_clear() {
        let store = MemoryStore::new();
        store
            .put(&CacheEntry::new("k1", "one", Bytes::from_static(b"abc"), 1))
            .await
            .unwrap();

        store.touch("k1", 42).await.unwrap();
        store.touch("missing", 43).await.unwrap();
        assert_eq!(store.get("k1").await.unwrap().unwrap().recency, 42);

        store.clear().await.unwrap();
        assert!(store.list_all().await.unwrap().is_empty());
    }
}
