//! # SyncJob Repository
//!
//! Queue operations for the sync_jobs table. Claiming is a two-step
//! conditional transition inside a transaction: select candidate ids, then
//! UPDATE re-filtered on status=queued so a competing drain's claim matches
//! zero rows for anything already taken.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait, sea_query::Expr,
};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::sync_job::{
    ActiveModel, Column, DEFAULT_MAX_ATTEMPTS, Entity as SyncJob, Model, SyncStrategy,
};

/// Parameters for enqueueing one job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub organization_id: Uuid,
    pub project_id: Uuid,
    pub account_id: Uuid,
    pub session_id: Option<Uuid>,
    pub strategy: SyncStrategy,
    pub priority: i16,
}

/// Terminal routing decision for a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobDisposition {
    /// Returned to the queue; eligible again at `next_run`.
    Retried { next_run: DateTime<Utc> },
    /// Attempts exhausted; the job is failed terminally.
    Failed,
}

/// Repository for sync job database operations
pub struct SyncJobRepository<'a, C: ConnectionTrait + TransactionTrait> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait + TransactionTrait> SyncJobRepository<'a, C> {
    /// Create a new SyncJobRepository with the given connection
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    /// Enqueue a new sync job for an account.
    pub async fn enqueue(&self, new_job: NewJob) -> Result<Model, DbErr> {
        let now = Utc::now().fixed_offset();

        let job = ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(new_job.organization_id),
            project_id: Set(new_job.project_id),
            account_id: Set(new_job.account_id),
            session_id: Set(new_job.session_id),
            strategy: Set(new_job.strategy.as_str().to_string()),
            status: Set("queued".to_string()),
            priority: Set(new_job.priority),
            attempts: Set(0),
            max_attempts: Set(DEFAULT_MAX_ATTEMPTS),
            scheduled_at: Set(now),
            started_at: Set(None),
            finished_at: Set(None),
            result: Set(None),
            error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let result = job.insert(self.db).await?;

        info!(
            job_id = %result.id,
            account_id = %result.account_id,
            strategy = %result.strategy,
            priority = result.priority,
            "Sync job enqueued"
        );

        Ok(result)
    }

    /// Find a sync job by id.
    pub async fn find(&self, job_id: Uuid) -> Result<Option<Model>, DbErr> {
        SyncJob::find_by_id(job_id).one(self.db).await
    }

    /// Whether a queued or running job already exists for an account.
    ///
    /// The scheduler uses this to avoid stacking duplicate work on an
    /// account that has not been drained yet.
    pub async fn has_pending(&self, account_id: Uuid) -> Result<bool, DbErr> {
        let pending = SyncJob::find()
            .filter(Column::AccountId.eq(account_id))
            .filter(Column::Status.is_in(["queued", "running"]))
            .limit(1)
            .all(self.db)
            .await?;
        Ok(!pending.is_empty())
    }

    /// List sync jobs with optional status/account filters, newest first.
    pub async fn list(
        &self,
        status: Option<String>,
        account_id: Option<Uuid>,
        limit: u64,
    ) -> Result<Vec<Model>, DbErr> {
        let mut query = SyncJob::find().order_by_desc(Column::CreatedAt);

        if let Some(status_filter) = status {
            query = query.filter(Column::Status.eq(status_filter));
        }
        if let Some(account) = account_id {
            query = query.filter(Column::AccountId.eq(account));
        }

        query.limit(limit).all(self.db).await
    }

    /// Count jobs in status=queued, for the backlog gauge.
    pub async fn queued_backlog(&self) -> Result<u64, DbErr> {
        SyncJob::find()
            .filter(Column::Status.eq("queued"))
            .count(self.db)
            .await
    }

    /// Atomically claim runnable jobs up to the in-flight ceiling.
    ///
    /// `ceiling` bounds jobs in status=running across the whole system, not
    /// per call: the claim subtracts the current running count inside the
    /// transaction, so concurrent drains (background tick, /worker/run,
    /// inline manual syncs) share one budget. Candidates are queued, under
    /// their attempt ceiling, and due (`scheduled_at <= now`), ordered
    /// priority DESC then created_at ASC. The queued→running transition and
    /// the attempts increment happen in one UPDATE re-filtered on
    /// status=queued, so two concurrent drains can never both claim the
    /// same job.
    pub async fn claim_batch(&self, ceiling: u64) -> Result<Vec<Model>, DbErr> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let running = SyncJob::find()
            .filter(Column::Status.eq("running"))
            .count(&txn)
            .await?;
        let headroom = ceiling.saturating_sub(running);
        if headroom == 0 {
            txn.commit().await?;
            return Ok(Vec::new());
        }

        let candidate_ids: Vec<Uuid> = SyncJob::find()
            .filter(Column::Status.eq("queued"))
            .filter(Expr::col(Column::Attempts).lt(Expr::col(Column::MaxAttempts)))
            .filter(Column::ScheduledAt.lte(now))
            .order_by_desc(Column::Priority)
            .order_by_asc(Column::CreatedAt)
            .limit(headroom)
            .all(&txn)
            .await?
            .into_iter()
            .map(|job| job.id)
            .collect();

        if candidate_ids.is_empty() {
            txn.commit().await?;
            return Ok(Vec::new());
        }

        let updated = SyncJob::update_many()
            .col_expr(Column::Status, Expr::value("running"))
            .col_expr(Column::StartedAt, Expr::value(now))
            .col_expr(Column::Attempts, Expr::col(Column::Attempts).add(1))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.is_in(candidate_ids.clone()))
            .filter(Column::Status.eq("queued"))
            .exec(&txn)
            .await?;

        let claimed = SyncJob::find()
            .filter(Column::Id.is_in(candidate_ids))
            .filter(Column::Status.eq("running"))
            .filter(Column::StartedAt.eq(now))
            .order_by_desc(Column::Priority)
            .order_by_asc(Column::CreatedAt)
            .all(&txn)
            .await?;

        txn.commit().await?;

        debug!(
            ceiling,
            running,
            claimed = claimed.len(),
            updated = updated.rows_affected,
            "Claimed job batch"
        );

        Ok(claimed)
    }

    /// Mark a running job as succeeded with a result summary.
    pub async fn mark_succeeded(&self, job_id: Uuid, result: JsonValue) -> Result<(), DbErr> {
        let now = Utc::now().fixed_offset();
        let job = ActiveModel {
            id: Set(job_id),
            status: Set("succeeded".to_string()),
            finished_at: Set(Some(now)),
            result: Set(Some(result)),
            updated_at: Set(now),
            ..Default::default()
        };
        job.update(self.db).await?;
        Ok(())
    }

    /// Route a failed attempt: back to the queue with backoff while under
    /// the attempt ceiling, failed terminally otherwise.
    pub async fn mark_retry_or_failed(
        &self,
        job: &Model,
        error: JsonValue,
        backoff: chrono::Duration,
    ) -> Result<JobDisposition, DbErr> {
        let now = Utc::now();

        if job.attempts < job.max_attempts {
            let next_run = now + backoff;
            let active = ActiveModel {
                id: Set(job.id),
                status: Set("queued".to_string()),
                scheduled_at: Set(next_run.fixed_offset()),
                error: Set(Some(error)),
                updated_at: Set(now.fixed_offset()),
                ..Default::default()
            };
            active.update(self.db).await?;

            info!(
                job_id = %job.id,
                account_id = %job.account_id,
                attempt = job.attempts,
                max_attempts = job.max_attempts,
                next_run = %next_run,
                "Sync job requeued for retry"
            );
            Ok(JobDisposition::Retried { next_run })
        } else {
            let active = ActiveModel {
                id: Set(job.id),
                status: Set("failed".to_string()),
                finished_at: Set(Some(now.fixed_offset())),
                error: Set(Some(error)),
                updated_at: Set(now.fixed_offset()),
                ..Default::default()
            };
            active.update(self.db).await?;

            warn!(
                job_id = %job.id,
                account_id = %job.account_id,
                attempts = job.attempts,
                "Sync job failed terminally"
            );
            Ok(JobDisposition::Failed)
        }
    }

    /// Fail a job terminally regardless of remaining attempts.
    ///
    /// Used for non-retryable outcomes (missing account, permanent provider
    /// rejection) where further attempts cannot succeed.
    pub async fn mark_failed(&self, job_id: Uuid, error: JsonValue) -> Result<(), DbErr> {
        let now = Utc::now().fixed_offset();
        let job = ActiveModel {
            id: Set(job_id),
            status: Set("failed".to_string()),
            finished_at: Set(Some(now)),
            error: Set(Some(error)),
            updated_at: Set(now),
            ..Default::default()
        };
        job.update(self.db).await?;
        Ok(())
    }

    /// Requeue running jobs whose holder went away.
    ///
    /// A job still in status=running with started_at older than the timeout
    /// belongs to a crashed or wedged drain. Attempts were already counted
    /// on claim, so the requeue does not touch the counter; jobs at their
    /// ceiling fail terminally instead of looping.
    pub async fn requeue_timed_out(&self, started_before: DateTime<Utc>) -> Result<u64, DbErr> {
        let now = Utc::now();

        let requeued = SyncJob::update_many()
            .col_expr(Column::Status, Expr::value("queued"))
            .col_expr(Column::StartedAt, Expr::value(Option::<DateTime<Utc>>::None))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Status.eq("running"))
            .filter(Column::StartedAt.lt(started_before))
            .filter(Expr::col(Column::Attempts).lt(Expr::col(Column::MaxAttempts)))
            .exec(self.db)
            .await?;

        let failed = SyncJob::update_many()
            .col_expr(Column::Status, Expr::value("failed"))
            .col_expr(Column::FinishedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Status.eq("running"))
            .filter(Column::StartedAt.lt(started_before))
            .exec(self.db)
            .await?;

        let total = requeued.rows_affected + failed.rows_affected;
        if total > 0 {
            warn!(
                requeued = requeued.rows_affected,
                failed = failed.rows_affected,
                "Reclaimed timed-out running jobs"
            );
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{Database, DatabaseConnection};

    use crate::models::sync_job::{PRIORITY_MANUAL, PRIORITY_SCHEDULED};
    use crate::test_support::{insert_account, insert_org_and_project};

    async fn setup() -> (DatabaseConnection, NewJob) {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("in-memory db");
        Migrator::up(&db, None).await.expect("apply migrations");
        let (org_id, project_id) = insert_org_and_project(&db).await;
        let account_id = insert_account(&db, org_id, project_id, "tiktok", "creator").await;
        let template = NewJob {
            organization_id: org_id,
            project_id,
            account_id,
            session_id: None,
            strategy: SyncStrategy::Progressive,
            priority: PRIORITY_SCHEDULED,
        };
        (db, template)
    }

    #[tokio::test]
    async fn claim_orders_by_priority_then_age() {
        let (db, template) = setup().await;
        let repo = SyncJobRepository::new(&db);

        let scheduled = repo.enqueue(template.clone()).await.unwrap();
        let manual = repo
            .enqueue(NewJob {
                priority: PRIORITY_MANUAL,
                ..template.clone()
            })
            .await
            .unwrap();

        let claimed = repo.claim_batch(10).await.unwrap();
        assert_eq!(claimed.len(), 2);
        assert_eq!(claimed[0].id, manual.id);
        assert_eq!(claimed[1].id, scheduled.id);
        assert!(claimed.iter().all(|job| job.status == "running"));
        assert!(claimed.iter().all(|job| job.attempts == 1));
    }

    #[tokio::test]
    async fn second_claim_finds_nothing() {
        let (db, template) = setup().await;
        let repo = SyncJobRepository::new(&db);

        repo.enqueue(template).await.unwrap();
        assert_eq!(repo.claim_batch(10).await.unwrap().len(), 1);
        assert!(repo.claim_batch(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn future_scheduled_jobs_are_not_claimable() {
        let (db, template) = setup().await;
        let repo = SyncJobRepository::new(&db);

        let job = repo.enqueue(template).await.unwrap();
        let future = Utc::now() + chrono::Duration::minutes(5);
        let active = ActiveModel {
            id: Set(job.id),
            scheduled_at: Set(future.fixed_offset()),
            ..Default::default()
        };
        active.update(&db).await.unwrap();

        assert!(repo.claim_batch(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retry_routing_respects_attempt_ceiling() {
        let (db, template) = setup().await;
        let repo = SyncJobRepository::new(&db);
        let error = serde_json::json!({"kind": "provider", "message": "timeout"});

        repo.enqueue(template).await.unwrap();

        // Attempts 1 and 2 retry, attempt 3 (== max) fails terminally.
        for expected_attempt in 1..=DEFAULT_MAX_ATTEMPTS {
            let claimed = repo.claim_batch(1).await.unwrap();
            assert_eq!(claimed.len(), 1, "attempt {expected_attempt} claim");
            let job = &claimed[0];
            assert_eq!(job.attempts, expected_attempt);

            let disposition = repo
                .mark_retry_or_failed(job, error.clone(), chrono::Duration::zero())
                .await
                .unwrap();
            if expected_attempt < DEFAULT_MAX_ATTEMPTS {
                assert!(matches!(disposition, JobDisposition::Retried { .. }));
            } else {
                assert_eq!(disposition, JobDisposition::Failed);
            }
        }

        // A terminally failed job is never reclaimed.
        assert!(repo.claim_batch(10).await.unwrap().is_empty());
        let failed = repo
            .list(Some("failed".to_string()), None, 10)
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
    }

    #[tokio::test]
    async fn claim_headroom_accounts_for_running_jobs() {
        let (db, template) = setup().await;
        let repo = SyncJobRepository::new(&db);

        for _ in 0..4 {
            repo.enqueue(template.clone()).await.unwrap();
        }

        // Ceiling of 2: the first claim fills it.
        let first = repo.claim_batch(2).await.unwrap();
        assert_eq!(first.len(), 2);

        // With 2 jobs still running there is no headroom left, even though
        // 2 more are queued and claimable in isolation.
        assert!(repo.claim_batch(2).await.unwrap().is_empty());

        // Finishing one job frees exactly one slot.
        repo.mark_succeeded(first[0].id, serde_json::json!({"new": 0}))
            .await
            .unwrap();
        assert_eq!(repo.claim_batch(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pending_check_sees_queued_and_running() {
        let (db, template) = setup().await;
        let repo = SyncJobRepository::new(&db);
        let account_id = template.account_id;

        assert!(!repo.has_pending(account_id).await.unwrap());
        repo.enqueue(template).await.unwrap();
        assert!(repo.has_pending(account_id).await.unwrap());

        let claimed = repo.claim_batch(1).await.unwrap();
        assert!(repo.has_pending(account_id).await.unwrap());

        repo.mark_succeeded(claimed[0].id, serde_json::json!({"new": 0}))
            .await
            .unwrap();
        assert!(!repo.has_pending(account_id).await.unwrap());
    }
}
