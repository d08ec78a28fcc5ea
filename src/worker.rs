//! # Queue Worker
//!
//! Drains the sync_jobs queue: claims batches of runnable jobs, dispatches
//! them concurrently under the global concurrency ceiling, and routes each
//! outcome (succeeded, skipped, retried, failed) back to the queue and the
//! owning session. Also invocable inline through the HTTP surface for
//! low-latency manual syncs.

use std::sync::Arc;

use chrono::{Duration, Utc};
use metrics::{counter, gauge, histogram};
use rand::Rng;
use sea_orm::DatabaseConnection;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::coordinator::{SyncCoordinator, SyncOutcome};
use crate::error::SyncError;
use crate::models::snapshot::SnapshotReason;
use crate::models::sync_job::{Model as Job, PRIORITY_MANUAL, SyncStrategy};
use crate::notifier::SessionNotifier;
use crate::repositories::{JobDisposition, SessionOutcome, SyncJobRepository};

/// Aggregate result of one drain invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub claimed: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub retried: usize,
    pub failed: usize,
}

impl DrainStats {
    pub fn processed(&self) -> usize {
        self.claimed
    }

    fn absorb(&mut self, outcome: &JobResult) {
        match outcome {
            JobResult::Succeeded => self.succeeded += 1,
            JobResult::Skipped => self.skipped += 1,
            JobResult::Retried => self.retried += 1,
            JobResult::Failed => self.failed += 1,
        }
    }
}

enum JobResult {
    Succeeded,
    Skipped,
    Retried,
    Failed,
}

/// Claims and executes queued sync jobs.
#[derive(Clone)]
pub struct QueueWorker {
    db: DatabaseConnection,
    coordinator: SyncCoordinator,
    notifier: SessionNotifier,
    config: WorkerConfig,
}

impl QueueWorker {
    pub fn new(
        db: DatabaseConnection,
        coordinator: SyncCoordinator,
        notifier: SessionNotifier,
        config: WorkerConfig,
    ) -> Self {
        Self {
            db,
            coordinator,
            notifier,
            config,
        }
    }

    /// Drain the queue: claim and run batches until nothing claimable
    /// remains, `max_batches` is hit, or the wall-clock budget runs out.
    pub async fn drain(&self) -> DrainStats {
        let started = std::time::Instant::now();
        let budget = std::time::Duration::from_millis(self.config.run_budget_ms);
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut stats = DrainStats::default();

        let jobs = SyncJobRepository::new(&self.db);

        // Reclaim jobs orphaned by a crashed or wedged drain before taking
        // new work.
        let timed_out_cutoff =
            Utc::now() - Duration::seconds(self.config.job_timeout_seconds as i64);
        if let Err(err) = jobs.requeue_timed_out(timed_out_cutoff).await {
            error!(error = %err, "Failed to reclaim timed-out jobs");
        }

        for batch_index in 0..self.config.max_batches {
            if started.elapsed() >= budget {
                info!(batches = batch_index, "Drain budget exhausted; deferring to next tick");
                break;
            }

            let batch = match jobs.claim_batch(self.config.concurrency as u64).await {
                Ok(batch) => batch,
                Err(err) => {
                    error!(error = %err, "Job claim failed; aborting drain");
                    break;
                }
            };
            if batch.is_empty() {
                break;
            }
            stats.claimed += batch.len();

            let mut handles = Vec::with_capacity(batch.len());
            for job in batch {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("worker semaphore closed");
                let worker = self.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = permit;
                    worker.run_job(job).await
                }));
            }

            for handle in handles {
                match handle.await {
                    Ok(outcome) => stats.absorb(&outcome),
                    Err(err) => {
                        error!(error = %err, "Job task panicked");
                        stats.failed += 1;
                    }
                }
            }
        }

        if let Ok(backlog) = jobs.queued_backlog().await {
            gauge!("sync_jobs_backlog").set(backlog as f64);
        }
        histogram!("worker_drain_duration_seconds").record(started.elapsed().as_secs_f64());

        if stats.claimed > 0 {
            info!(
                claimed = stats.claimed,
                succeeded = stats.succeeded,
                skipped = stats.skipped,
                retried = stats.retried,
                failed = stats.failed,
                "Drain finished"
            );
        }
        stats
    }

    /// Execute one claimed job and route its outcome.
    async fn run_job(&self, job: Job) -> JobResult {
        let jobs = SyncJobRepository::new(&self.db);

        let strategy = match job.strategy.parse::<SyncStrategy>() {
            Ok(strategy) => strategy,
            Err(parse_err) => {
                // Corrupt row; retrying cannot help.
                error!(job_id = %job.id, error = %parse_err, "Unparseable job strategy");
                let _ = jobs
                    .mark_failed(job.id, json!({ "kind": "invalid_strategy", "message": parse_err }))
                    .await;
                self.fold_session(&job, SessionOutcome::Failed).await;
                return JobResult::Failed;
            }
        };

        let reason = if job.priority >= PRIORITY_MANUAL {
            SnapshotReason::ManualRefresh
        } else {
            SnapshotReason::ScheduledRefresh
        };

        match self
            .coordinator
            .sync_account(job.account_id, strategy, reason)
            .await
        {
            Ok(outcome) => {
                counter!("sync_jobs_succeeded_total").increment(1);
                if let Err(err) = jobs.mark_succeeded(job.id, success_summary(&outcome)).await {
                    error!(job_id = %job.id, error = %err, "Failed to record job success");
                }
                self.fold_session(
                    &job,
                    SessionOutcome::Completed {
                        new_records: outcome.new_records,
                        updated_records: outcome.updated_records,
                    },
                )
                .await;
                JobResult::Succeeded
            }
            Err(error) if error.is_skip() => {
                // Another sync holds the account; done, not failed.
                counter!("sync_jobs_skipped_total").increment(1);
                let summary = json!({ "skipped": true, "cause": error.to_string() });
                if let Err(err) = jobs.mark_succeeded(job.id, summary).await {
                    error!(job_id = %job.id, error = %err, "Failed to record job skip");
                }
                self.fold_session(
                    &job,
                    SessionOutcome::Completed {
                        new_records: 0,
                        updated_records: 0,
                    },
                )
                .await;
                JobResult::Skipped
            }
            Err(error) if error.is_retryable() => {
                counter!("sync_jobs_retried_total").increment(1);
                let backoff = self.backoff_for(&job, &error);
                match jobs
                    .mark_retry_or_failed(&job, error_payload(&error), backoff)
                    .await
                {
                    Ok(JobDisposition::Retried { .. }) => JobResult::Retried,
                    Ok(JobDisposition::Failed) => {
                        self.fold_session(&job, SessionOutcome::Failed).await;
                        JobResult::Failed
                    }
                    Err(err) => {
                        error!(job_id = %job.id, error = %err, "Failed to route job retry");
                        JobResult::Failed
                    }
                }
            }
            Err(error) => {
                counter!("sync_jobs_failed_total").increment(1);
                warn!(job_id = %job.id, error = %error, "Job failed terminally");
                if let Err(err) = jobs.mark_failed(job.id, error_payload(&error)).await {
                    error!(job_id = %job.id, error = %err, "Failed to record job failure");
                }
                self.fold_session(&job, SessionOutcome::Failed).await;
                JobResult::Failed
            }
        }
    }

    /// Exponential backoff with jitter, floored by a provider retry-after.
    fn backoff_for(&self, job: &Job, error: &SyncError) -> Duration {
        let base = self.config.retry_base_seconds;
        let exponent = (job.attempts.max(1) - 1).min(16) as u32;
        let backoff = base
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(self.config.retry_max_seconds);
        let jitter = rand::thread_rng().gen_range(0..=base);
        let mut total = backoff + jitter;

        if let SyncError::Provider {
            retry_after_secs: Some(retry_after),
            ..
        } = error
        {
            total = total.max(*retry_after);
        }
        Duration::seconds(total as i64)
    }

    async fn fold_session(&self, job: &Job, outcome: SessionOutcome) {
        let Some(session_id) = job.session_id else {
            return;
        };
        if let Err(err) = self.notifier.record_outcome(session_id, outcome).await {
            error!(
                job_id = %job.id,
                session_id = %session_id,
                error = %err,
                "Failed to fold job outcome into session"
            );
        }
    }

    /// Tick loop, cancelled via the token.
    pub async fn run(&self, shutdown: CancellationToken) {
        let interval = std::time::Duration::from_millis(self.config.tick_ms);
        info!(tick_ms = self.config.tick_ms, concurrency = self.config.concurrency, "Queue worker started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Queue worker shutting down");
                    return;
                }
                _ = tokio::time::sleep(interval) => {
                    self.drain().await;
                }
            }
        }
    }
}

fn success_summary(outcome: &SyncOutcome) -> serde_json::Value {
    json!({
        "new_records": outcome.new_records,
        "updated_records": outcome.updated_records,
        "skipped_records": outcome.skipped_records,
    })
}

fn error_payload(error: &SyncError) -> serde_json::Value {
    json!({ "kind": error_kind(error), "message": error.to_string() })
}

fn error_kind(error: &SyncError) -> &'static str {
    match error {
        SyncError::NotFound(_) => "not_found",
        SyncError::LockContention { .. } => "lock_contention",
        SyncError::Provider { .. } => "provider",
        SyncError::Persistence(_) => "persistence",
        SyncError::Notification(_) => "notification",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;

    use crate::config::{NotifierConfig, SyncConfig};
    use crate::media::{NullMediaStore, ThumbnailFetcher};
    use crate::models::sync_job::{DEFAULT_MAX_ATTEMPTS, PRIORITY_SCHEDULED};
    use crate::notifier::LogChannel;
    use crate::providers::fixture::{FixtureProvider, fixture_item};
    use crate::providers::{ProviderError, Registry};
    use crate::repositories::{NewJob, SyncSessionRepository};
    use crate::test_support::{insert_account, insert_org_and_project};
    use uuid::Uuid;

    struct Harness {
        db: DatabaseConnection,
        provider: Arc<FixtureProvider>,
        worker: QueueWorker,
        org_id: Uuid,
        project_id: Uuid,
        account_id: Uuid,
    }

    async fn harness(config: WorkerConfig) -> Harness {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("in-memory db");
        Migrator::up(&db, None).await.expect("apply migrations");
        let (org_id, project_id) = insert_org_and_project(&db).await;
        let account_id = insert_account(&db, org_id, project_id, "fixture", "creator").await;

        let provider = Arc::new(FixtureProvider::empty("fixture"));
        let mut registry = Registry::new();
        registry.register(provider.clone());

        let coordinator = SyncCoordinator::new(
            db.clone(),
            Arc::new(registry),
            Arc::new(ThumbnailFetcher::new(1_000, Arc::new(NullMediaStore))),
            SyncConfig::default(),
        );
        let notifier =
            SessionNotifier::new(db.clone(), Arc::new(LogChannel), NotifierConfig::default());
        let worker = QueueWorker::new(db.clone(), coordinator, notifier, config);

        Harness {
            db,
            provider,
            worker,
            org_id,
            project_id,
            account_id,
        }
    }

    fn zero_backoff(mut config: WorkerConfig) -> WorkerConfig {
        config.retry_base_seconds = 0;
        config.retry_max_seconds = 0;
        // One batch per drain, so a zero-backoff requeue is not re-claimed
        // within the same invocation.
        config.max_batches = 1;
        config
    }

    fn new_job(h: &Harness, session_id: Option<Uuid>) -> NewJob {
        NewJob {
            organization_id: h.org_id,
            project_id: h.project_id,
            account_id: h.account_id,
            session_id,
            strategy: SyncStrategy::Progressive,
            priority: PRIORITY_SCHEDULED,
        }
    }

    #[tokio::test]
    async fn drain_processes_queued_job_to_success() {
        let h = harness(WorkerConfig::default()).await;
        h.provider
            .set_items(vec![fixture_item("v1", Utc::now(), 100)]);

        let jobs = SyncJobRepository::new(&h.db);
        let job = jobs.enqueue(new_job(&h, None)).await.unwrap();

        let stats = h.worker.drain().await;
        assert_eq!(stats.claimed, 1);
        assert_eq!(stats.succeeded, 1);

        let job = jobs.find(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, "succeeded");
        let result = job.result.unwrap();
        assert_eq!(result["new_records"], 1);
    }

    #[tokio::test]
    async fn retryable_failure_requeues_then_fails_terminally() {
        let h = harness(zero_backoff(WorkerConfig::default())).await;
        h.provider.fail_with(ProviderError::Transient {
            details: "upstream 503".into(),
        });

        let jobs = SyncJobRepository::new(&h.db);
        let job = jobs.enqueue(new_job(&h, None)).await.unwrap();

        for attempt in 1..DEFAULT_MAX_ATTEMPTS {
            let stats = h.worker.drain().await;
            assert_eq!(stats.retried, 1, "attempt {attempt} should retry");
        }
        let stats = h.worker.drain().await;
        assert_eq!(stats.failed, 1);

        let job = jobs.find(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, "failed");
        assert_eq!(job.attempts, DEFAULT_MAX_ATTEMPTS);

        // Terminal: further drains find nothing.
        assert_eq!(h.worker.drain().await.claimed, 0);
    }

    #[tokio::test]
    async fn permanent_failure_is_terminal_on_first_attempt() {
        let h = harness(WorkerConfig::default()).await;
        h.provider.fail_with(ProviderError::Unauthorized {
            details: "token revoked".into(),
        });

        let jobs = SyncJobRepository::new(&h.db);
        let job = jobs.enqueue(new_job(&h, None)).await.unwrap();

        let stats = h.worker.drain().await;
        assert_eq!(stats.failed, 1);

        let job = jobs.find(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, "failed");
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn locked_account_job_completes_as_skipped() {
        let h = harness(WorkerConfig::default()).await;

        use crate::repositories::{AccountRepository, LockAcquisition};
        let accounts = AccountRepository::new(&h.db);
        assert!(matches!(
            accounts
                .acquire_lock(h.account_id, chrono::Duration::minutes(10))
                .await
                .unwrap(),
            LockAcquisition::Acquired { .. }
        ));

        let jobs = SyncJobRepository::new(&h.db);
        let job = jobs.enqueue(new_job(&h, None)).await.unwrap();

        let stats = h.worker.drain().await;
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 0);

        let job = jobs.find(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, "succeeded");
        assert_eq!(job.result.unwrap()["skipped"], true);
    }

    #[tokio::test]
    async fn session_counters_follow_job_outcomes() {
        let h = harness(WorkerConfig::default()).await;
        h.provider
            .set_items(vec![fixture_item("v1", Utc::now(), 100)]);

        let sessions = SyncSessionRepository::new(&h.db);
        let session = sessions
            .create(h.org_id, Some(h.project_id), "scheduled", 2)
            .await
            .unwrap();

        let second_account =
            insert_account(&h.db, h.org_id, h.project_id, "fixture", "other").await;
        let jobs = SyncJobRepository::new(&h.db);
        jobs.enqueue(new_job(&h, Some(session.id))).await.unwrap();
        jobs.enqueue(NewJob {
            account_id: second_account,
            ..new_job(&h, Some(session.id))
        })
        .await
        .unwrap();

        let stats = h.worker.drain().await;
        assert_eq!(stats.succeeded, 2);

        let session = sessions.find(session.id).await.unwrap().unwrap();
        assert_eq!(session.status, "completed");
        assert_eq!(session.completed_accounts, 2);
        assert_eq!(session.failed_accounts, 0);
        assert!(session.completed_at.is_some());
    }

    #[tokio::test]
    async fn claim_batches_never_exceed_concurrency() {
        let mut config = WorkerConfig::default();
        config.concurrency = 2;
        config.max_batches = 1;
        let h = harness(config).await;
        h.provider
            .set_items(vec![fixture_item("v1", Utc::now(), 100)]);

        let jobs = SyncJobRepository::new(&h.db);
        for i in 0..5 {
            let account =
                insert_account(&h.db, h.org_id, h.project_id, "fixture", &format!("a{i}")).await;
            jobs.enqueue(NewJob {
                account_id: account,
                ..new_job(&h, None)
            })
            .await
            .unwrap();
        }

        // One batch per drain, bounded by the ceiling.
        let stats = h.worker.drain().await;
        assert_eq!(stats.claimed, 2);
        let stats = h.worker.drain().await;
        assert_eq!(stats.claimed, 2);
    }

    #[tokio::test]
    async fn concurrent_drains_share_the_concurrency_ceiling() {
        use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

        let mut config = WorkerConfig::default();
        config.concurrency = 2;
        let h = harness(config).await;
        h.provider
            .set_latency(std::time::Duration::from_millis(100));

        let jobs = SyncJobRepository::new(&h.db);
        for i in 0..4 {
            let account =
                insert_account(&h.db, h.org_id, h.project_id, "fixture", &format!("a{i}")).await;
            jobs.enqueue(NewJob {
                account_id: account,
                ..new_job(&h, None)
            })
            .await
            .unwrap();
        }

        // Two overlapping drains, as when the background tick fires while an
        // inline sync is already draining. The ceiling is shared between them.
        let first = tokio::spawn({
            let worker = h.worker.clone();
            async move { worker.drain().await }
        });
        let second = tokio::spawn({
            let worker = h.worker.clone();
            async move { worker.drain().await }
        });

        let mut max_running = 0;
        while !(first.is_finished() && second.is_finished()) {
            let running = crate::models::sync_job::Entity::find()
                .filter(crate::models::sync_job::Column::Status.eq("running"))
                .count(&h.db)
                .await
                .unwrap();
            max_running = max_running.max(running);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(
            max_running <= 2,
            "{max_running} jobs were running with a ceiling of 2"
        );

        let first = first.await.unwrap();
        let second = second.await.unwrap();
        assert_eq!(first.succeeded + second.succeeded, 4);
        assert_eq!(jobs.queued_backlog().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unparseable_strategy_fails_without_retry() {
        let h = harness(WorkerConfig::default()).await;
        let jobs = SyncJobRepository::new(&h.db);
        let job = jobs.enqueue(new_job(&h, None)).await.unwrap();

        use sea_orm::{ActiveModelTrait, Set};
        crate::models::sync_job::ActiveModel {
            id: Set(job.id),
            strategy: Set("full_resync".to_string()),
            ..Default::default()
        }
        .update(&h.db)
        .await
        .unwrap();

        let stats = h.worker.drain().await;
        assert_eq!(stats.failed, 1);
        let job = jobs.find(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, "failed");
        assert_eq!(job.error.unwrap()["kind"], "invalid_strategy");
    }
}
