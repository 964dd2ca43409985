//! Cache types

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Default number of entries kept by the cache
pub const DEFAULT_MAX_ENTRIES: usize = 20;

/// Metadata for a cached media entry, without its payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub key: String,
    pub display_name: String,
    pub size_bytes: u64,
    /// Logical timestamp; larger means more recently used
    pub recency: u64,
    pub cached_at: DateTime<Utc>,
}

/// A cached media blob
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub display_name: String,
    pub payload: Bytes,
    pub size_bytes: u64,
    pub recency: u64,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, display_name: impl Into<String>, payload: Bytes, recency: u64) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            size_bytes: payload.len() as u64,
            payload,
            recency,
            cached_at: Utc::now(),
        }
    }

    /// Rebuild an entry from stored metadata and payload
    pub fn from_parts(meta: EntryMeta, payload: Bytes) -> Self {
        Self {
            key: meta.key,
            display_name: meta.display_name,
            size_bytes: payload.len() as u64,
            payload,
            recency: meta.recency,
            cached_at: meta.cached_at,
        }
    }

    pub fn meta(&self) -> EntryMeta {
        EntryMeta {
            key: self.key.clone(),
            display_name: self.display_name.clone(),
            size_bytes: self.size_bytes,
            recency: self.recency,
            cached_at: self.cached_at,
        }
    }
}

/// Snapshot of cache occupancy, computed from the in-memory index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub count: usize,
    pub max_entries: usize,
    pub total_size_bytes: u64,
    /// Cached keys, least recently used first
    pub keys: Vec<String>,
    pub hits: u64,
    pub misses: u64,
    pub in_flight: usize,
}

/// Where a fetched entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrigin {
    /// Served from a stored record
    Cache,
    /// Produced by a download, started by this caller or joined
    Downloaded,
}

/// Cache construction options
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    /// Upper bound on a single download; `None` waits indefinitely
    pub download_timeout: Option<Duration>,
}

impl CacheConfig {
    /// Values below 1 are treated as 1.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            download_timeout: None,
        }
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = Some(timeout);
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

/// Derive a human-readable label from a source URL
///
/// Uses the last non-empty path segment (percent-decoded), then the host,
/// then the raw key.
pub fn display_name_for(key: &str) -> String {
    let Ok(url) = Url::parse(key) else {
        return key.to_string();
    };

    let segment = url
        .path_segments()
        .and_then(|segments| segments.rev().find(|s| !s.is_empty()))
        .map(|s| {
            urlencoding::decode(s)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| s.to_string())
        });

    segment
        .or_else(|| url.host_str().map(str::to_string))
        .unwrap_or_else(|| key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.total_size_bytes, 0);
        assert!(stats.keys.is_empty());
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_config_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.max_entries, 20);
        assert!(config.download_timeout.is_none());

        assert_eq!(CacheConfig::new(0).max_entries, 1);
        let config = CacheConfig::new(5).with_download_timeout(Duration::from_secs(3));
        assert_eq!(config.download_timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_entry_meta_serialization() {
        let entry = CacheEntry::new(
            "https://music.example.com/a/track.mp3",
            "track.mp3",
            Bytes::from_static(b"0123456789"),
            7,
        );
        assert_eq!(entry.size_bytes, 10);

        let json = serde_json::to_string(&entry.meta()).unwrap();
        assert!(json.contains("track.mp3"));
        assert!(!json.contains("payload"));

        let meta: EntryMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(meta, entry.meta());
    }

    #[test]
    fn test_display_name_for() {
        assert_eq!(
            display_name_for("https://cdn.example.com/music/My%20Song.flac"),
            "My Song.flac"
        );
        assert_eq!(
            display_name_for("https://cdn.example.com/music/album/"),
            "album"
        );
        assert_eq!(display_name_for("https://cdn.example.com"), "cdn.example.com");
        assert_eq!(display_name_for("not a url"), "not a url");
    }
}
