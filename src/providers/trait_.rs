//! Platform provider trait definition
//!
//! Defines the contract every platform scraper implements. Providers are
//! opaque collaborators: the engine only assumes `fetch_recent` returns
//! items in reverse-chronological order and that `fetch_by_ids` may cap its
//! batch size (callers chunk to `batch_limit`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ProviderFailure, SyncError};
use crate::models::account::Model as Account;

/// One content item as reported by a platform provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderItem {
    /// Item identifier on the external platform
    pub external_id: String,
    /// Item title, when the platform exposes one
    pub title: Option<String>,
    /// Source URL of the item thumbnail, fetched and rehosted separately
    pub thumbnail_url: Option<String>,
    /// Publication date reported by the platform
    pub upload_date: Option<DateTime<Utc>>,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub saves: i64,
}

/// Structured provider failure, mapped to [`SyncError::Provider`] at the
/// coordinator boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("authentication rejected: {details}")]
    Unauthorized { details: String },
    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("transient provider failure: {details}")]
    Transient { details: String },
    #[error("permanent provider failure: {details}")]
    Permanent { details: String },
}

impl From<ProviderError> for SyncError {
    fn from(error: ProviderError) -> Self {
        let message = error.to_string();
        match error {
            ProviderError::Unauthorized { .. } => SyncError::Provider {
                failure: ProviderFailure::Unauthorized,
                message,
                retry_after_secs: None,
            },
            ProviderError::RateLimited { retry_after_secs } => SyncError::Provider {
                failure: ProviderFailure::RateLimited,
                message,
                retry_after_secs,
            },
            ProviderError::Transient { .. } => SyncError::Provider {
                failure: ProviderFailure::Transient,
                message,
                retry_after_secs: None,
            },
            ProviderError::Permanent { .. } => SyncError::Provider {
                failure: ProviderFailure::Permanent,
                message,
                retry_after_secs: None,
            },
        }
    }
}

/// Contract implemented by every platform scraper.
#[async_trait]
pub trait PlatformProvider: Send + Sync {
    /// Platform slug this provider serves (e.g., "tiktok").
    fn platform(&self) -> &str;

    /// Hard cap on ids per `fetch_by_ids` call; callers chunk to this.
    fn batch_limit(&self) -> usize {
        50
    }

    /// Fetch the `limit` most recent items for an account, newest first.
    async fn fetch_recent(
        &self,
        account: &Account,
        limit: usize,
    ) -> Result<Vec<ProviderItem>, ProviderError>;

    /// Re-fetch current metrics for known items. Items deleted upstream are
    /// simply absent from the response.
    async fn fetch_by_ids(
        &self,
        account: &Account,
        external_ids: &[String],
    ) -> Result<Vec<ProviderItem>, ProviderError>;
}
