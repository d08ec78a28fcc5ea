//! # Scheduler
//!
//! Periodic fan-out: walks every organization, resolves its plan-tier
//! refresh cadence, and enqueues one sync job per due account, grouped
//! under one session per organization. Enqueues are staggered by a few
//! milliseconds so a large fan-out does not thundering-herd the queue.
//! A failed account never aborts the rest of the tick.

use chrono::{Duration, Utc};
use metrics::{counter, histogram};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::models::organization::{self, refresh_interval_seconds};
use crate::models::project;
use crate::models::sync_job::{PRIORITY_SCHEDULED, SyncStrategy};
use crate::repositories::{
    AccountRepository, NewJob, SessionOutcome, SyncJobRepository, SyncSessionRepository,
};

/// Aggregate result of one scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub organizations: usize,
    pub accounts_due: usize,
    pub jobs_enqueued: usize,
    pub enqueue_failures: usize,
    pub sessions_opened: usize,
}

/// Periodic fan-out of scheduled sync jobs.
#[derive(Clone)]
pub struct Scheduler {
    db: DatabaseConnection,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(db: DatabaseConnection, config: SchedulerConfig) -> Self {
        Self { db, config }
    }

    /// One fan-out pass over every organization.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> TickStats {
        let started = std::time::Instant::now();
        let mut stats = TickStats::default();

        let organizations = match organization::Entity::find().all(&self.db).await {
            Ok(organizations) => organizations,
            Err(err) => {
                error!(error = %err, "Failed to list organizations; skipping tick");
                return stats;
            }
        };

        for org in organizations {
            stats.organizations += 1;
            if let Err(err) = self.fan_out_organization(&org, &mut stats).await {
                // One organization's failure must not starve the rest.
                error!(
                    organization_id = %org.id,
                    error = %err,
                    "Organization fan-out failed"
                );
            }
        }

        histogram!("scheduler_tick_duration_seconds").record(started.elapsed().as_secs_f64());
        counter!("scheduler_jobs_enqueued_total").increment(stats.jobs_enqueued as u64);

        if stats.jobs_enqueued > 0 || stats.enqueue_failures > 0 {
            info!(
                organizations = stats.organizations,
                due = stats.accounts_due,
                enqueued = stats.jobs_enqueued,
                failures = stats.enqueue_failures,
                "Scheduler tick finished"
            );
        }
        stats
    }

    async fn fan_out_organization(
        &self,
        org: &organization::Model,
        stats: &mut TickStats,
    ) -> Result<(), sea_orm::DbErr> {
        let accounts = AccountRepository::new(&self.db);
        let jobs = SyncJobRepository::new(&self.db);
        let sessions = SyncSessionRepository::new(&self.db);

        let interval = Duration::seconds(refresh_interval_seconds(&org.plan_tier));
        let cutoff = Utc::now() - interval;

        let mut due = Vec::new();
        for account in accounts.due_accounts(org.id, cutoff).await? {
            // An undrained job already covers this account.
            if jobs.has_pending(account.id).await? {
                continue;
            }
            due.push(account);
        }
        if due.is_empty() {
            return Ok(());
        }
        stats.accounts_due += due.len();

        let session = sessions
            .create(org.id, None, "scheduled", due.len() as i32)
            .await?;
        stats.sessions_opened += 1;

        let mut touched_projects: Vec<Uuid> = Vec::new();
        let stagger = std::time::Duration::from_millis(self.config.stagger_ms);

        for account in &due {
            let strategy = if account.discovers_automatically() {
                SyncStrategy::Progressive
            } else {
                SyncStrategy::RefreshOnly
            };

            let enqueued = jobs
                .enqueue(NewJob {
                    organization_id: org.id,
                    project_id: account.project_id,
                    account_id: account.id,
                    session_id: Some(session.id),
                    strategy,
                    priority: PRIORITY_SCHEDULED,
                })
                .await;

            match enqueued {
                Ok(_) => {
                    stats.jobs_enqueued += 1;
                    if !touched_projects.contains(&account.project_id) {
                        touched_projects.push(account.project_id);
                    }
                }
                Err(err) => {
                    stats.enqueue_failures += 1;
                    warn!(
                        account_id = %account.id,
                        error = %err,
                        "Failed to enqueue scheduled sync"
                    );
                    // Keep the session's settle arithmetic honest: the
                    // account was counted in expected_accounts but will
                    // never produce a job outcome.
                    if let Err(fold_err) = sessions
                        .record_job_outcome(session.id, SessionOutcome::Failed)
                        .await
                    {
                        error!(
                            session_id = %session.id,
                            error = %fold_err,
                            "Failed to account for enqueue failure"
                        );
                    }
                }
            }

            if !stagger.is_zero() {
                tokio::time::sleep(stagger).await;
            }
        }

        let now = Utc::now().fixed_offset();
        for project_id in touched_projects {
            let touched = project::ActiveModel {
                id: Set(project_id),
                last_global_refresh: Set(Some(now)),
                updated_at: Set(now),
                ..Default::default()
            };
            if let Err(err) = touched.update(&self.db).await {
                warn!(project_id = %project_id, error = %err, "Failed to stamp project refresh");
            }
        }

        Ok(())
    }

    /// Tick loop, cancelled via the token.
    pub async fn run(&self, shutdown: CancellationToken) {
        let interval = std::time::Duration::from_secs(self.config.tick_interval_seconds);
        info!(
            interval_seconds = self.config.tick_interval_seconds,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Scheduler shutting down");
                    return;
                }
                _ = tokio::time::sleep(interval) => {
                    self.tick().await;
                }
            }
        }
    }
}
