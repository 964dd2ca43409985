//! Bounded LRU media cache with persistent storage and coalesced downloads
//!
//! Caches downloaded media blobs keyed by their source URL. Payloads live in a
//! [`MediaStore`] (files on disk, or memory when no durable storage is
//! available) while an in-memory LRU index bounds the number of entries.
//! Concurrent misses for the same URL share a single download.

mod cache;
mod error;
mod events;
mod index;
pub mod store;
mod types;

pub use cache::MediaCache;
pub use error::{FetchError, StorageError};
pub use events::{CacheEvent, EvictionReason};
pub use store::{FileStore, MediaStore, MemoryStore};
pub use types::{
    display_name_for, CacheConfig, CacheEntry, CacheStats, EntryMeta, FetchOrigin,
};
