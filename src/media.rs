//! Thumbnail side-channel downloads.
//!
//! Thumbnails live on provider CDNs behind expiring URLs, so a successful
//! metrics write must never wait on or fail because of one. Downloads run
//! under a hard timeout and fall back to an empty string; only a
//! successfully fetched-and-rehosted asset (or empty) is ever persisted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use tracing::{debug, warn};

/// Errors from the media store backend.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("media store rejected blob: {0}")]
    Store(String),
}

/// Accepts a downloaded byte blob and returns a stable public URL.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn store(&self, key: &str, bytes: Vec<u8>) -> Result<String, MediaError>;
}

/// In-memory media store used by tests and local profiles; hands back a
/// synthetic stable URL without retaining the bytes.
pub struct NullMediaStore;

#[async_trait]
impl MediaStore for NullMediaStore {
    async fn store(&self, key: &str, _bytes: Vec<u8>) -> Result<String, MediaError> {
        Ok(format!("memory://thumbnails/{key}"))
    }
}

/// Downloads thumbnails with a hard per-item timeout and rehosts them.
pub struct ThumbnailFetcher {
    client: reqwest::Client,
    timeout: Duration,
    store: Arc<dyn MediaStore>,
}

impl ThumbnailFetcher {
    pub fn new(timeout_ms: u64, store: Arc<dyn MediaStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_millis(timeout_ms),
            store,
        }
    }

    /// Fetch `source_url` and rehost it under `key`.
    ///
    /// Returns the rehosted URL, or an empty string on any failure. The
    /// expiring source URL is never returned as a persistable value.
    pub async fn fetch_and_rehost(&self, source_url: &str, key: &str) -> String {
        let download = async {
            let response = self.client.get(source_url).send().await?;
            let response = response.error_for_status()?;
            response.bytes().await
        };

        let bytes = match tokio::time::timeout(self.timeout, download).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(err)) => {
                warn!(key, error = %err, "Thumbnail download failed; storing empty");
                counter!("thumbnail_fetch_failures_total").increment(1);
                return String::new();
            }
            Err(_) => {
                warn!(key, timeout_ms = self.timeout.as_millis() as u64,
                    "Thumbnail download timed out; storing empty");
                counter!("thumbnail_fetch_timeouts_total").increment(1);
                return String::new();
            }
        };

        match self.store.store(key, bytes.to_vec()).await {
            Ok(url) => {
                debug!(key, url, "Thumbnail rehosted");
                url
            }
            Err(err) => {
                warn!(key, error = %err, "Thumbnail rehost failed; storing empty");
                counter!("thumbnail_store_failures_total").increment(1);
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn rehosts_successful_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thumb.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpegdata".to_vec()))
            .mount(&server)
            .await;

        let fetcher = ThumbnailFetcher::new(2_000, Arc::new(NullMediaStore));
        let url = fetcher
            .fetch_and_rehost(&format!("{}/thumb.jpg", server.uri()), "acct/v1")
            .await;
        assert_eq!(url, "memory://thumbnails/acct/v1");
    }

    #[tokio::test]
    async fn slow_cdn_falls_back_to_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thumb.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"jpegdata".to_vec())
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let fetcher = ThumbnailFetcher::new(50, Arc::new(NullMediaStore));
        let url = fetcher
            .fetch_and_rehost(&format!("{}/thumb.jpg", server.uri()), "acct/v1")
            .await;
        assert_eq!(url, "");
    }

    #[tokio::test]
    async fn http_error_falls_back_to_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thumb.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = ThumbnailFetcher::new(1_000, Arc::new(NullMediaStore));
        let url = fetcher
            .fetch_and_rehost(&format!("{}/thumb.jpg", server.uri()), "acct/v1")
            .await;
        assert_eq!(url, "");
    }
}
