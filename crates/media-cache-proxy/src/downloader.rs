//! Source media downloads over HTTP

use crate::error::{ProxyError, Result};
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

pub(crate) const DEFAULT_USER_AGENT: &str = concat!("media-cache-proxy/", env!("CARGO_PKG_VERSION"));

/// HTTP client that fetches source media for cache misses
#[derive(Clone)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn with_options(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    /// Download the full body of `url`
    pub async fn fetch(&self, url: &str) -> Result<Bytes> {
        debug!(url = %url, "Downloading source media");

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), url = %url, "Source download failed");
            return Err(ProxyError::UpstreamStatus(response.status().as_u16()));
        }

        let data = response.bytes().await?;

        debug!(url = %url, size = data.len(), "Downloaded source media");
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_user_agent() {
        assert!(DEFAULT_USER_AGENT.starts_with("media-cache-proxy/"));
    }

    #[test]
    fn test_with_options_builds_client() {
        assert!(HttpDownloader::with_options(Duration::from_secs(5), "test-agent").is_ok());
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let downloader = HttpDownloader::with_options(Duration::from_secs(2), "test").unwrap();

        // Port 9 (discard) is closed on loopback in test environments
        let result = downloader.fetch("http://127.0.0.1:9/track.mp3").await;
        assert!(matches!(result, Err(ProxyError::Http(_))));
    }
}
