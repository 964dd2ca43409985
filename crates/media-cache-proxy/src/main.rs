//! Media Cache Proxy - LRU cache in front of streamed audio tracks
//!
//! Serves track bytes from a bounded on-disk cache, downloading each source
//! once on first play and evicting the least recently played track when the
//! cache is full.

mod downloader;
mod error;
mod server;
mod types;

use crate::downloader::HttpDownloader;
use crate::error::{ProxyError, Result};
use crate::server::{start_server, ServerState, SharedState};
use crate::types::ProxyConfig;
use media_cache::{CacheConfig, CacheEvent, FileStore, MediaCache};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Client-side ceiling used when downloads have no cache-level timeout
const UNBOUNDED_CLIENT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("media_cache_proxy=info".parse()?)
        .add_directive("media_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Media Cache Proxy...");

    let config = load_config()?;
    info!("Port: {}", config.port);
    info!("Cache dir: {:?}", config.cache_dir);
    info!("Max cached tracks: {}", config.max_entries);
    match config.download_timeout {
        Some(timeout) => info!("Download timeout: {} seconds", timeout.as_secs()),
        None => info!("Download timeout: disabled"),
    }

    // Cache events are logged by a background consumer
    let (event_tx, event_rx) = mpsc::channel(256);
    tokio::spawn(log_events(event_rx));

    let mut cache_config = CacheConfig::new(config.max_entries);
    if let Some(timeout) = config.download_timeout {
        cache_config = cache_config.with_download_timeout(timeout);
    }
    let cache = MediaCache::with_events(
        Arc::new(FileStore::new(config.cache_dir.clone())),
        cache_config,
        event_tx,
    );

    if let Err(e) = cache.initialize().await {
        warn!(error = %e, "Cache storage unavailable, serving from memory only");
    }

    let downloader = HttpDownloader::with_options(
        config.download_timeout.unwrap_or(UNBOUNDED_CLIENT_TIMEOUT),
        &config.user_agent,
    )?;

    let state: SharedState = Arc::new(ServerState::new(cache, downloader));

    // Start HTTP server (blocking)
    start_server(state, config.port).await?;

    Ok(())
}

async fn log_events(mut events: mpsc::Receiver<CacheEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            CacheEvent::Stored { key, size_bytes } => {
                info!(key = %key, size_bytes, "Cached track")
            }
            CacheEvent::Hit { key } => debug!(key = %key, "Cache hit"),
            CacheEvent::Evicted { key, reason } => {
                info!(key = %key, reason = ?reason, "Evicted track")
            }
            CacheEvent::Cleared { count } => info!(count, "Cleared cache"),
            CacheEvent::DownloadFailed { key, error } => {
                warn!(key = %key, error = %error, "Track download failed")
            }
            CacheEvent::Degraded { reason } => {
                warn!(reason = %reason, "Cache degraded to memory only")
            }
        }
    }
}

fn load_config() -> Result<ProxyConfig> {
    let defaults = ProxyConfig::default();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(defaults.port);

    let cache_dir = std::env::var("CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.cache_dir);

    let max_entries = match std::env::var("CACHE_MAX_ENTRIES") {
        Ok(raw) => parse_max_entries(&raw)?,
        Err(_) => defaults.max_entries,
    };

    // 0 disables the cache-level timeout
    let download_timeout = match std::env::var("DOWNLOAD_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
    {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => defaults.download_timeout,
    };

    let user_agent = std::env::var("USER_AGENT").unwrap_or(defaults.user_agent);

    Ok(ProxyConfig {
        port,
        cache_dir,
        max_entries,
        download_timeout,
        user_agent,
    })
}

fn parse_max_entries(raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(ProxyError::Config(
            "CACHE_MAX_ENTRIES must be positive".to_string(),
        )),
        Ok(n) => Ok(n),
        Err(e) => Err(ProxyError::Config(format!(
            "Invalid CACHE_MAX_ENTRIES {:?}: {}",
            raw, e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_max_entries() {
        assert_eq!(parse_max_entries("20").unwrap(), 20);
        assert_eq!(parse_max_entries(" 5 ").unwrap(), 5);
        assert!(matches!(
            parse_max_entries("0"),
            Err(ProxyError::Config(_))
        ));
        assert!(matches!(
            parse_max_entries("lots"),
            Err(ProxyError::Config(_))
        ));
    }
}
