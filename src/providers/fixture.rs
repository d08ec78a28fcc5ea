//! Fixture provider implementation
//!
//! A scripted in-memory provider that serves a fixed catalog of items,
//! newest first. Used by tests and by local profiles that have no real
//! scraper credentials; also a reference for implementing real providers.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::account::Model as Account;
use crate::providers::trait_::{PlatformProvider, ProviderError, ProviderItem};

/// Scripted provider backed by an in-memory catalog.
pub struct FixtureProvider {
    platform: String,
    batch_limit: usize,
    catalog: Mutex<Vec<ProviderItem>>,
    fail_with: Mutex<Option<ProviderError>>,
    latency: Mutex<Option<Duration>>,
}

impl FixtureProvider {
    /// A provider with no items.
    pub fn empty(platform: &str) -> Self {
        Self::with_items(platform, Vec::new())
    }

    /// A provider serving the given catalog (expected newest first).
    pub fn with_items(platform: &str, items: Vec<ProviderItem>) -> Self {
        Self {
            platform: platform.to_string(),
            batch_limit: 50,
            catalog: Mutex::new(items),
            fail_with: Mutex::new(None),
            latency: Mutex::new(None),
        }
    }

    /// Cap `fetch_by_ids` batches at `limit`.
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    /// Replace the served catalog.
    pub fn set_items(&self, items: Vec<ProviderItem>) {
        *self.catalog.lock().expect("catalog lock") = items;
    }

    /// Make every subsequent call fail with the given error.
    pub fn fail_with(&self, error: ProviderError) {
        *self.fail_with.lock().expect("failure lock") = Some(error);
    }

    /// Clear any injected failure.
    pub fn recover(&self) {
        *self.fail_with.lock().expect("failure lock") = None;
    }

    /// Sleep for `latency` inside every fetch, simulating a slow platform.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().expect("latency lock") = Some(latency);
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock().expect("latency lock");
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_failure(&self) -> Result<(), ProviderError> {
        match &*self.fail_with.lock().expect("failure lock") {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PlatformProvider for FixtureProvider {
    fn platform(&self) -> &str {
        &self.platform
    }

    fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    async fn fetch_recent(
        &self,
        _account: &Account,
        limit: usize,
    ) -> Result<Vec<ProviderItem>, ProviderError> {
        self.simulate_latency().await;
        self.check_failure()?;
        let catalog = self.catalog.lock().expect("catalog lock");
        Ok(catalog.iter().take(limit).cloned().collect())
    }

    async fn fetch_by_ids(
        &self,
        _account: &Account,
        external_ids: &[String],
    ) -> Result<Vec<ProviderItem>, ProviderError> {
        self.simulate_latency().await;
        self.check_failure()?;
        if external_ids.len() > self.batch_limit {
            return Err(ProviderError::Permanent {
                details: format!(
                    "batch of {} exceeds limit {}",
                    external_ids.len(),
                    self.batch_limit
                ),
            });
        }
        let catalog = self.catalog.lock().expect("catalog lock");
        Ok(catalog
            .iter()
            .filter(|item| external_ids.contains(&item.external_id))
            .cloned()
            .collect())
    }
}

/// Build a catalog item for fixtures and tests.
pub fn fixture_item(external_id: &str, upload_date: DateTime<Utc>, views: i64) -> ProviderItem {
    ProviderItem {
        external_id: external_id.to_string(),
        title: Some(format!("Item {external_id}")),
        thumbnail_url: None,
        upload_date: Some(upload_date),
        views,
        likes: views / 10,
        comments: views / 100,
        shares: views / 200,
        saves: views / 500,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn account() -> Account {
        let now = Utc::now().fixed_offset();
        Account {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            platform: "fixture".into(),
            handle: "creator".into(),
            discovery_mode: "automatic".into(),
            sync_status: "idle".into(),
            last_synced: None,
            lock_id: None,
            locked_at: None,
            retry_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn fetch_recent_respects_limit_and_order() {
        let now = Utc::now();
        let provider = FixtureProvider::with_items(
            "fixture",
            vec![
                fixture_item("v3", now, 300),
                fixture_item("v2", now - Duration::hours(1), 200),
                fixture_item("v1", now - Duration::hours(2), 100),
            ],
        );

        let items = provider.fetch_recent(&account(), 2).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].external_id, "v3");
        assert_eq!(items[1].external_id, "v2");
    }

    #[tokio::test]
    async fn fetch_by_ids_enforces_batch_limit() {
        let provider = FixtureProvider::empty("fixture").with_batch_limit(2);
        let ids: Vec<String> = (0..3).map(|i| format!("v{i}")).collect();
        let err = provider.fetch_by_ids(&account(), &ids).await.unwrap_err();
        assert!(matches!(err, ProviderError::Permanent { .. }));
    }

    #[tokio::test]
    async fn injected_failure_propagates() {
        let provider = FixtureProvider::empty("fixture");
        provider.fail_with(ProviderError::Transient {
            details: "scripted outage".into(),
        });
        assert!(provider.fetch_recent(&account(), 5).await.is_err());

        provider.recover();
        assert!(provider.fetch_recent(&account(), 5).await.is_ok());
    }
}
