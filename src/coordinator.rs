//! # Sync Coordinator
//!
//! Runs one account sync end to end: acquire the advisory lock, discover
//! new items, refresh known ones, persist through the buffered record
//! writer, and always release the lock on the way out. Errors are caught at
//! this boundary so the account's user-visible sync_status is written
//! before the error re-raises to the queue worker for retry accounting.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use metrics::{counter, histogram};
use sea_orm::DatabaseConnection;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::media::ThumbnailFetcher;
use crate::models::account::Model as Account;
use crate::models::record::record_key;
use crate::models::snapshot::SnapshotReason;
use crate::models::sync_job::SyncStrategy;
use crate::providers::{ProviderItem, Registry};
use crate::repositories::{
    AccountRepository, LockAcquisition, PersistOutcome, RecordRepository, RecordWriter,
};

/// Result of one account sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub new_records: i64,
    pub updated_records: i64,
    pub skipped_records: i64,
}

impl From<PersistOutcome> for SyncOutcome {
    fn from(persist: PersistOutcome) -> Self {
        Self {
            new_records: persist.new_records,
            updated_records: persist.updated_records,
            skipped_records: persist.skipped,
        }
    }
}

/// Coordinates the per-account sync pipeline.
#[derive(Clone)]
pub struct SyncCoordinator {
    db: DatabaseConnection,
    registry: Arc<Registry>,
    thumbnails: Arc<ThumbnailFetcher>,
    config: SyncConfig,
}

impl SyncCoordinator {
    pub fn new(
        db: DatabaseConnection,
        registry: Arc<Registry>,
        thumbnails: Arc<ThumbnailFetcher>,
        config: SyncConfig,
    ) -> Self {
        Self {
            db,
            registry,
            thumbnails,
            config,
        }
    }

    /// Sync one account under its advisory lock.
    ///
    /// Lock contention surfaces as [`SyncError::LockContention`], which the
    /// worker treats as a skip. Any other error has already released the
    /// lock and written sync_status=error before it reaches the caller.
    #[instrument(skip(self), fields(account_id = %account_id, strategy = %strategy))]
    pub async fn sync_account(
        &self,
        account_id: Uuid,
        strategy: SyncStrategy,
        reason: SnapshotReason,
    ) -> Result<SyncOutcome, SyncError> {
        let started = std::time::Instant::now();
        let accounts = AccountRepository::new(&self.db);

        let account = accounts
            .find(account_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("account {account_id}")))?;

        let staleness = Duration::seconds(self.config.lock_staleness_seconds as i64);
        let lock_id = match accounts.acquire_lock(account_id, staleness).await? {
            LockAcquisition::Acquired { lock_id } => lock_id,
            LockAcquisition::NotAcquired { age_seconds } => {
                counter!("sync_lock_contention_total").increment(1);
                return Err(SyncError::LockContention { age_seconds });
            }
        };

        accounts.mark_syncing(account_id).await?;

        let result = self.run_locked(&account, strategy, reason).await;

        match result {
            Ok(outcome) => {
                accounts.mark_completed(account_id).await?;
                accounts.release_lock(account_id, lock_id).await?;
                histogram!("sync_account_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                info!(
                    new = outcome.new_records,
                    updated = outcome.updated_records,
                    "Account sync completed"
                );
                Ok(outcome)
            }
            Err(error) => {
                counter!("sync_account_failures_total").increment(1);
                warn!(error = %error, "Account sync failed");
                // Status first; a release failure must not mask the cause.
                if let Err(status_err) = accounts.mark_error(account_id, &error.to_string()).await
                {
                    warn!(error = %status_err, "Failed to record sync error status");
                }
                if let Err(release_err) = accounts.release_lock(account_id, lock_id).await {
                    warn!(error = %release_err, "Failed to release account lock");
                }
                Err(error)
            }
        }
    }

    /// Discovery + refresh under a held lock.
    async fn run_locked(
        &self,
        account: &Account,
        strategy: SyncStrategy,
        reason: SnapshotReason,
    ) -> Result<SyncOutcome, SyncError> {
        let provider = self.registry.get(&account.platform).map_err(|e| {
            SyncError::provider(crate::error::ProviderFailure::Permanent, e.to_string())
        })?;

        let records = RecordRepository::new(&self.db);
        let known_ids: HashSet<String> = records
            .known_external_ids(account.id)
            .await?
            .into_iter()
            .collect();

        let mut writer = RecordWriter::new(
            &self.db,
            account.id,
            &account.platform,
            reason,
            self.config.flush_threshold,
        );
        let mut discovered_ids: HashSet<String> = HashSet::new();

        if strategy.runs_discovery() && account.discovers_automatically() {
            let recent = provider
                .fetch_recent(account, self.config.discovery_limit)
                .await?;

            // Reverse-chronological walk: the first already-known id means
            // everything after it is older than what we have.
            let mut fresh: Vec<ProviderItem> = Vec::new();
            for item in recent {
                if known_ids.contains(&item.external_id) {
                    break;
                }
                fresh.push(item);
            }

            // Backfill guard: an unseen id older than the oldest known item
            // is the provider surfacing history, not new content. With zero
            // known records everything counts.
            if !known_ids.is_empty()
                && let Some(oldest) = records.oldest_upload_date(account.id).await?
            {
                fresh.retain(|item| match item.upload_date {
                    Some(date) => date >= oldest,
                    None => true,
                });
            }

            for item in fresh {
                let thumbnail_url = match &item.thumbnail_url {
                    Some(source) => {
                        let key = record_key(&account.platform, account.id, &item.external_id);
                        self.thumbnails.fetch_and_rehost(source, &key).await
                    }
                    None => String::new(),
                };
                discovered_ids.insert(item.external_id.clone());
                writer.stage_discovery(item, thumbnail_url).await?;
            }
        }

        if strategy.runs_refresh() && !known_ids.is_empty() {
            let stale_ids: Vec<String> = known_ids
                .iter()
                .filter(|id| !discovered_ids.contains(*id))
                .cloned()
                .collect();

            for chunk in stale_ids.chunks(provider.batch_limit().max(1)) {
                let items = provider.fetch_by_ids(account, chunk).await?;
                for item in items {
                    writer.stage_refresh(item).await?;
                }
            }
        }

        Ok(writer.finish().await?.into())
    }
}
