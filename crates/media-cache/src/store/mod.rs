//! Persistent store adapters
//!
//! The cache only talks to storage through [`MediaStore`]. Payloads are read
//! back from the store on every hit; the cache itself keeps metadata only.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::StorageError;
use crate::types::{CacheEntry, EntryMeta};
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Durable key-value storage for cached media
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Create the backing storage if it does not exist yet
    async fn open(&self) -> Result<()>;

    /// Insert or fully replace the record for `entry.key`
    async fn put(&self, entry: &CacheEntry) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    async fn contains(&self, key: &str) -> Result<bool>;

    /// Persist a new recency for `key` without rewriting its payload.
    /// Missing keys are ignored.
    async fn touch(&self, key: &str, recency: u64) -> Result<()>;

    /// Idempotent
    async fn delete(&self, key: &str) -> Result<()>;

    /// Metadata of every stored record, in no particular order
    async fn list_all(&self) -> Result<Vec<EntryMeta>>;

    async fn clear(&self) -> Result<()>;
}
