//! # Account Repository
//!
//! Data access for tracked accounts, including the advisory per-account
//! sync lock. The lock is a (lock_id, locked_at) field pair on the account
//! row: acquisition writes a fresh random id and verifies it via re-read,
//! release clears the pair only while the caller's id still matches. The
//! staleness window reclaims locks abandoned by a crashed holder.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
    sea_query::Expr,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::account::{ActiveModel, Column, Entity as Account, Model};

/// Result of one lock acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAcquisition {
    /// The caller now holds the lock under this id.
    Acquired { lock_id: Uuid },
    /// A live lock is held elsewhere; `age_seconds` is how long it has been held.
    NotAcquired { age_seconds: i64 },
}

/// Repository for account database operations
pub struct AccountRepository<'a, C: ConnectionTrait> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> AccountRepository<'a, C> {
    /// Create a new AccountRepository with the given connection
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    /// Find an account by id.
    pub async fn find(&self, account_id: Uuid) -> Result<Option<Model>, DbErr> {
        Account::find_by_id(account_id).one(self.db).await
    }

    /// Accounts of an organization due for a scheduled refresh at `cutoff`.
    pub async fn due_accounts(
        &self,
        organization_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Model>, DbErr> {
        Account::find()
            .filter(Column::OrganizationId.eq(organization_id))
            .filter(
                Column::LastSynced
                    .is_null()
                    .or(Column::LastSynced.lte(cutoff)),
            )
            .all(self.db)
            .await
    }

    /// Attempt to take the advisory sync lock for an account.
    ///
    /// A fresh lock id is written when no lock is present or the present
    /// one is older than `staleness`, then verified via re-read: if the
    /// stored id is no longer ours, an interleaved acquirer won and we
    /// report contention.
    pub async fn acquire_lock(
        &self,
        account_id: Uuid,
        staleness: Duration,
    ) -> Result<LockAcquisition, DbErr> {
        let account = self
            .find(account_id)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("account {account_id}")))?;

        let now = Utc::now();
        if let (Some(holder), Some(locked_at)) = (account.lock_id, account.locked_at) {
            let age = now - locked_at.with_timezone(&Utc);
            if age < staleness {
                debug!(
                    account_id = %account_id,
                    holder = %holder,
                    age_seconds = age.num_seconds(),
                    "Account lock held; not acquiring"
                );
                return Ok(LockAcquisition::NotAcquired {
                    age_seconds: age.num_seconds(),
                });
            }
            warn!(
                account_id = %account_id,
                holder = %holder,
                age_seconds = age.num_seconds(),
                "Reclaiming stale account lock"
            );
        }

        let fresh = Uuid::new_v4();
        let active = ActiveModel {
            id: Set(account_id),
            lock_id: Set(Some(fresh)),
            locked_at: Set(Some(now.fixed_offset())),
            updated_at: Set(now.fixed_offset()),
            ..Default::default()
        };
        active.update(self.db).await?;

        // Re-read to catch an interleaved acquirer that wrote after us.
        let verified = self
            .find(account_id)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("account {account_id}")))?;

        if verified.lock_id == Some(fresh) {
            Ok(LockAcquisition::Acquired { lock_id: fresh })
        } else {
            debug!(account_id = %account_id, "Lost lock acquisition race");
            Ok(LockAcquisition::NotAcquired { age_seconds: 0 })
        }
    }

    /// Release the lock, only if `lock_id` is still the stored holder.
    ///
    /// A stale release (holder changed since) is a no-op so it can never
    /// clobber a newer legitimate holder.
    pub async fn release_lock(&self, account_id: Uuid, lock_id: Uuid) -> Result<bool, DbErr> {
        let result = Account::update_many()
            .col_expr(Column::LockId, Expr::value(Option::<Uuid>::None))
            .col_expr(
                Column::LockedAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(account_id))
            .filter(Column::LockId.eq(lock_id))
            .exec(self.db)
            .await?;

        if result.rows_affected == 0 {
            debug!(account_id = %account_id, lock_id = %lock_id, "Stale lock release ignored");
        }
        Ok(result.rows_affected > 0)
    }

    /// Mark the account as actively syncing.
    pub async fn mark_syncing(&self, account_id: Uuid) -> Result<(), DbErr> {
        let active = ActiveModel {
            id: Set(account_id),
            sync_status: Set("syncing".to_string()),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };
        active.update(self.db).await?;
        Ok(())
    }

    /// Record a successful sync: status completed, error state cleared.
    pub async fn mark_completed(&self, account_id: Uuid) -> Result<(), DbErr> {
        let now = Utc::now().fixed_offset();
        let active = ActiveModel {
            id: Set(account_id),
            sync_status: Set("completed".to_string()),
            last_synced: Set(Some(now)),
            retry_count: Set(0),
            last_error: Set(None),
            updated_at: Set(now),
            ..Default::default()
        };
        active.update(self.db).await?;
        Ok(())
    }

    /// Record a failed sync: user-visible error string plus retry counter.
    pub async fn mark_error(&self, account_id: Uuid, message: &str) -> Result<(), DbErr> {
        Account::update_many()
            .col_expr(Column::SyncStatus, Expr::value("error"))
            .col_expr(Column::LastError, Expr::value(message))
            .col_expr(
                Column::RetryCount,
                Expr::col(Column::RetryCount).add(1),
            )
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(account_id))
            .exec(self.db)
            .await?;
        Ok(())
    }
}
