//! Core types for the media cache proxy

use crate::downloader::DEFAULT_USER_AGENT;
use media_cache::{CacheStats, EntryMeta};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the media cache proxy
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub cache_dir: PathBuf,
    pub max_entries: usize,
    /// `None` lets downloads run until the HTTP client gives up
    pub download_timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            cache_dir: PathBuf::from("./cache/media"),
            max_entries: 20,
            download_timeout: Some(Duration::from_secs(60)),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Query string carrying a track's source URL
#[derive(Debug, Deserialize)]
pub struct TrackQuery {
    pub url: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    /// True when the cache runs without persistent storage
    pub degraded: bool,
    pub cache: CacheStats,
}

/// Cache contents listing
#[derive(Debug, Serialize)]
pub struct CacheListing {
    pub stats: CacheStats,
    pub entries: Vec<EntryMeta>,
}

/// Guess an audio MIME type from a file name
pub fn content_type_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "m4a" | "mp4" => "audio/mp4",
        "aac" => "audio/aac",
        "wav" => "audio/wav",
        "webm" => "audio/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProxyConfig::default();
        assert_eq!(config.port, 3001);
        assert_eq!(config.cache_dir, PathBuf::from("./cache/media"));
        assert_eq!(config.max_entries, 20);
        assert_eq!(config.download_timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("song.mp3"), "audio/mpeg");
        assert_eq!(content_type_for("Song.FLAC"), "audio/flac");
        assert_eq!(content_type_for("a.b.m4a"), "audio/mp4");
        assert_eq!(content_type_for("README"), "application/octet-stream");
        assert_eq!(content_type_for("track.xyz"), "application/octet-stream");
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok".to_string(),
            uptime_secs: 3600,
            degraded: false,
            cache: CacheStats {
                count: 2,
                max_entries: 20,
                total_size_bytes: 300,
                keys: vec!["https://example.com/a.mp3".to_string()],
                hits: 5,
                misses: 2,
                in_flight: 0,
            },
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"uptime_secs\":3600"));
        assert!(json.contains("\"total_size_bytes\":300"));
        assert!(json.contains("\"degraded\":false"));
    }

    #[test]
    fn test_track_query_deserialization() {
        let query: TrackQuery =
            serde_json::from_str(r#"{"url": "https://example.com/a.mp3"}"#).unwrap();
        assert_eq!(query.url.as_deref(), Some("https://example.com/a.mp3"));

        let query: TrackQuery = serde_json::from_str("{}").unwrap();
        assert!(query.url.is_none());
    }
}
