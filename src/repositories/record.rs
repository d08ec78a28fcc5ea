//! # Record Repository & Writer
//!
//! Storage for discovered content items and their metric snapshots. Record
//! identity is the deterministic `{platform}:{account_id}:{external_item_id}`
//! key, so writes are idempotent across retries. The writer buffers staged
//! items and flushes a transaction every `flush_threshold` operations, not
//! only at the end, bounding what a mid-job failure can lose.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
    sea_query::{Expr, OnConflict},
};
use tracing::debug;
use uuid::Uuid;

use crate::models::record::{self, Column, Entity as Record, record_key};
use crate::models::snapshot::{self, SnapshotReason};
use crate::providers::ProviderItem;

/// Aggregate result of one persistence pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    /// Records created by this pass.
    pub new_records: i64,
    /// Known records whose metrics were refreshed.
    pub updated_records: i64,
    /// Refresh items skipped because their record no longer exists.
    pub skipped: i64,
}

/// Repository for record reads used by the sync pipeline.
pub struct RecordRepository<'a, C: ConnectionTrait> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> RecordRepository<'a, C> {
    /// Create a new RecordRepository with the given connection
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    /// External item ids already known for an account.
    pub async fn known_external_ids(&self, account_id: Uuid) -> Result<Vec<String>, DbErr> {
        let rows = Record::find()
            .filter(Column::AccountId.eq(account_id))
            .order_by_desc(Column::UploadDate)
            .all(self.db)
            .await?;
        Ok(rows.into_iter().map(|r| r.external_item_id).collect())
    }

    /// Oldest known upload date for an account, if any record carries one.
    ///
    /// Discovery uses this as the backfill guard: unseen ids older than the
    /// oldest known item are provider backfill, not new content.
    pub async fn oldest_upload_date(
        &self,
        account_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, DbErr> {
        let oldest = Record::find()
            .filter(Column::AccountId.eq(account_id))
            .filter(Column::UploadDate.is_not_null())
            .order_by_asc(Column::UploadDate)
            .limit(1)
            .all(self.db)
            .await?;
        Ok(oldest
            .into_iter()
            .next()
            .and_then(|r| r.upload_date)
            .map(|d| d.with_timezone(&Utc)))
    }
}

enum StagedWrite {
    /// Discovery pass: create if absent, otherwise refresh metadata + metrics.
    Discovery {
        item: ProviderItem,
        thumbnail_url: String,
    },
    /// Refresh pass: metrics only, never creates or resurrects a record.
    Refresh { item: ProviderItem },
}

impl StagedWrite {
    fn item(&self) -> &ProviderItem {
        match self {
            StagedWrite::Discovery { item, .. } | StagedWrite::Refresh { item } => item,
        }
    }
}

/// Buffered, chunk-committing writer for one account's sync pass.
pub struct RecordWriter<'a, C: ConnectionTrait + TransactionTrait> {
    db: &'a C,
    account_id: Uuid,
    platform: String,
    reason: SnapshotReason,
    flush_threshold: usize,
    buffer: Vec<StagedWrite>,
    snapshotted: HashSet<String>,
    outcome: PersistOutcome,
}

impl<'a, C: ConnectionTrait + TransactionTrait> RecordWriter<'a, C> {
    pub fn new(
        db: &'a C,
        account_id: Uuid,
        platform: &str,
        reason: SnapshotReason,
        flush_threshold: usize,
    ) -> Self {
        Self {
            db,
            account_id,
            platform: platform.to_string(),
            reason,
            flush_threshold: flush_threshold.max(1),
            buffer: Vec::new(),
            snapshotted: HashSet::new(),
            outcome: PersistOutcome::default(),
        }
    }

    /// Stage a discovery-pass item; may create a record.
    pub async fn stage_discovery(
        &mut self,
        item: ProviderItem,
        thumbnail_url: String,
    ) -> Result<(), DbErr> {
        self.buffer.push(StagedWrite::Discovery {
            item,
            thumbnail_url,
        });
        self.maybe_flush().await
    }

    /// Stage a refresh-pass item; metrics only.
    pub async fn stage_refresh(&mut self, item: ProviderItem) -> Result<(), DbErr> {
        self.buffer.push(StagedWrite::Refresh { item });
        self.maybe_flush().await
    }

    /// Flush remaining staged writes and return the aggregate outcome.
    pub async fn finish(mut self) -> Result<PersistOutcome, DbErr> {
        self.flush().await?;
        Ok(self.outcome)
    }

    async fn maybe_flush(&mut self) -> Result<(), DbErr> {
        if self.buffer.len() >= self.flush_threshold {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), DbErr> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch: Vec<StagedWrite> = self.buffer.drain(..).collect();
        let now = Utc::now().fixed_offset();

        let txn = self.db.begin().await?;

        let keys: Vec<String> = batch
            .iter()
            .map(|w| record_key(&self.platform, self.account_id, &w.item().external_id))
            .collect();
        let existing: HashSet<String> = Record::find()
            .filter(Column::Id.is_in(keys.clone()))
            .all(&txn)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        for (write, key) in batch.into_iter().zip(keys) {
            let known = existing.contains(&key);
            let item = write.item().clone();

            match write {
                StagedWrite::Discovery { thumbnail_url, .. } => {
                    let active = record::ActiveModel {
                        id: Set(key.clone()),
                        account_id: Set(self.account_id),
                        platform: Set(self.platform.clone()),
                        external_item_id: Set(item.external_id.clone()),
                        title: Set(item.title.clone()),
                        thumbnail_url: Set(Some(thumbnail_url)),
                        upload_date: Set(item.upload_date.map(|d| d.fixed_offset())),
                        views: Set(item.views),
                        likes: Set(item.likes),
                        comments: Set(item.comments),
                        shares: Set(item.shares),
                        saves: Set(item.saves),
                        last_refreshed: Set(now),
                        created_at: Set(now),
                        updated_at: Set(now),
                    };
                    // Discovery is allowed to touch metadata; created_at stays
                    // first-discovery on conflict.
                    Record::insert(active)
                        .on_conflict(
                            OnConflict::column(Column::Id)
                                .update_columns([
                                    Column::Title,
                                    Column::ThumbnailUrl,
                                    Column::UploadDate,
                                    Column::Views,
                                    Column::Likes,
                                    Column::Comments,
                                    Column::Shares,
                                    Column::Saves,
                                    Column::LastRefreshed,
                                    Column::UpdatedAt,
                                ])
                                .to_owned(),
                        )
                        .exec(&txn)
                        .await?;

                    if known {
                        self.outcome.updated_records += 1;
                    } else {
                        self.outcome.new_records += 1;
                    }
                    self.append_snapshot(&txn, &key, &item, !known).await?;
                }
                StagedWrite::Refresh { .. } => {
                    if !known {
                        // Deleted upstream; never resurrect from a refresh.
                        self.outcome.skipped += 1;
                        continue;
                    }
                    Record::update_many()
                        .col_expr(Column::Views, Expr::value(item.views))
                        .col_expr(Column::Likes, Expr::value(item.likes))
                        .col_expr(Column::Comments, Expr::value(item.comments))
                        .col_expr(Column::Shares, Expr::value(item.shares))
                        .col_expr(Column::Saves, Expr::value(item.saves))
                        .col_expr(Column::LastRefreshed, Expr::value(now))
                        .col_expr(Column::UpdatedAt, Expr::value(now))
                        .filter(Column::Id.eq(key.clone()))
                        .exec(&txn)
                        .await?;

                    self.outcome.updated_records += 1;
                    self.append_snapshot(&txn, &key, &item, false).await?;
                }
            }
        }

        txn.commit().await?;
        debug!(
            account_id = %self.account_id,
            new = self.outcome.new_records,
            updated = self.outcome.updated_records,
            "Flushed record batch"
        );
        Ok(())
    }

    /// Append at most one snapshot per record per pass.
    async fn append_snapshot<T: ConnectionTrait>(
        &mut self,
        txn: &T,
        record_id: &str,
        item: &ProviderItem,
        first_discovery: bool,
    ) -> Result<(), DbErr> {
        if !self.snapshotted.insert(record_id.to_string()) {
            return Ok(());
        }
        let reason = if first_discovery {
            SnapshotReason::InitialSync
        } else {
            self.reason
        };
        let active = snapshot::ActiveModel {
            id: Set(Uuid::new_v4()),
            record_id: Set(record_id.to_string()),
            captured_at: Set(Utc::now().fixed_offset()),
            reason: Set(reason.as_str().to_string()),
            views: Set(item.views),
            likes: Set(item.likes),
            comments: Set(item.comments),
            shares: Set(item.shares),
            saves: Set(item.saves),
        };
        snapshot::Entity::insert(active).exec(txn).await?;
        Ok(())
    }
}
