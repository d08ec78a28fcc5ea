//! # Session Notifier
//!
//! "Last one out sends the email": every job completion folds its outcome
//! into the owning session, and whichever job settles the session attempts
//! the aggregate summary send, guarded by a compare-and-set on email_sent.
//! A sweep loop retries completed sessions whose send never happened.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use metrics::counter;
use sea_orm::{DatabaseConnection, EntityTrait};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::NotifierConfig;
use crate::models::organization;
use crate::models::sync_session::Model as Session;
use crate::repositories::{SessionOutcome, SyncSessionRepository};

/// Aggregate summary delivered when a session settles.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub organization_id: Uuid,
    pub trigger: String,
    pub expected_accounts: i32,
    pub completed_accounts: i32,
    pub failed_accounts: i32,
    pub new_records: i64,
    pub updated_records: i64,
}

impl SessionSummary {
    fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.id,
            organization_id: session.organization_id,
            trigger: session.trigger.clone(),
            expected_accounts: session.expected_accounts,
            completed_accounts: session.completed_accounts,
            failed_accounts: session.failed_accounts,
            new_records: session.new_records,
            updated_records: session.updated_records,
        }
    }
}

/// Delivery errors surfaced by a notification channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Outbound delivery seam for session summaries.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, recipient: &str, summary: &SessionSummary) -> Result<(), ChannelError>;
}

/// Channel that only logs; used when no mail transport is configured.
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn send(&self, recipient: &str, summary: &SessionSummary) -> Result<(), ChannelError> {
        info!(
            recipient,
            session_id = %summary.session_id,
            new_records = summary.new_records,
            updated_records = summary.updated_records,
            "Session summary (log channel)"
        );
        Ok(())
    }
}

/// Folds job outcomes into sessions and owns the summary delivery.
#[derive(Clone)]
pub struct SessionNotifier {
    db: DatabaseConnection,
    channel: Arc<dyn NotificationChannel>,
    config: NotifierConfig,
}

impl SessionNotifier {
    pub fn new(
        db: DatabaseConnection,
        channel: Arc<dyn NotificationChannel>,
        config: NotifierConfig,
    ) -> Self {
        Self {
            db,
            channel,
            config,
        }
    }

    /// Fold one job outcome into its session; when this was the last one
    /// out, attempt the summary send.
    ///
    /// Delivery failures are logged and recovered by the sweep, never
    /// propagated to the job.
    pub async fn record_outcome(
        &self,
        session_id: Uuid,
        outcome: SessionOutcome,
    ) -> Result<(), sea_orm::DbErr> {
        let sessions = SyncSessionRepository::new(&self.db);
        if let Some(settled) = sessions.record_job_outcome(session_id, outcome).await? {
            self.try_send(&settled).await?;
        }
        Ok(())
    }

    /// CAS-guarded summary send for a settled session.
    ///
    /// Exactly one caller wins the claim. A winner whose delivery fails
    /// releases the claim so the sweep gets another shot.
    async fn try_send(&self, session: &Session) -> Result<(), sea_orm::DbErr> {
        let sessions = SyncSessionRepository::new(&self.db);
        if !sessions.try_claim_email(session.id).await? {
            return Ok(());
        }

        let recipient = organization::Entity::find_by_id(session.organization_id)
            .one(&self.db)
            .await?
            .and_then(|org| org.notification_email);

        let Some(recipient) = recipient else {
            // Nothing to deliver; keep the claim so the sweep stays quiet.
            info!(session_id = %session.id, "No notification email configured; skipping summary");
            return Ok(());
        };

        let summary = SessionSummary::from_session(session);
        match self.channel.send(&recipient, &summary).await {
            Ok(()) => {
                counter!("session_summaries_sent_total").increment(1);
                info!(session_id = %session.id, recipient, "Session summary sent");
            }
            Err(err) => {
                counter!("session_summary_failures_total").increment(1);
                error!(session_id = %session.id, error = %err, "Session summary delivery failed");
                sessions.release_email_claim(session.id).await?;
            }
        }
        Ok(())
    }

    /// One sweep pass: retry completed sessions whose summary never went
    /// out, past the grace window. Returns the number of sessions retried.
    pub async fn sweep_once(&self) -> Result<usize, sea_orm::DbErr> {
        let sessions = SyncSessionRepository::new(&self.db);
        let cutoff = Utc::now() - Duration::seconds(self.config.grace_seconds as i64);
        let orphaned = sessions.find_orphaned(cutoff).await?;

        let count = orphaned.len();
        if count > 0 {
            warn!(count, "Retrying orphaned session notifications");
        }
        for session in &orphaned {
            self.try_send(session).await?;
        }
        Ok(count)
    }

    /// Sweep loop, cancelled via the token.
    pub async fn run_sweep(&self, shutdown: CancellationToken) {
        let interval = std::time::Duration::from_secs(self.config.sweep_interval_seconds);
        info!(interval_seconds = self.config.sweep_interval_seconds, "Orphan sweep started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Orphan sweep shutting down");
                    return;
                }
                _ = tokio::time::sleep(interval) => {
                    if let Err(err) = self.sweep_once().await {
                        error!(error = %err, "Orphan sweep pass failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;
    use std::sync::Mutex;

    use crate::test_support::insert_org_and_project;

    /// Channel that records deliveries and can be scripted to fail.
    struct RecordingChannel {
        sent: Mutex<Vec<(String, SessionSummary)>>,
        failing: Mutex<bool>,
    }

    impl RecordingChannel {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                failing: Mutex::new(false),
            })
        }

        fn set_failing(&self, failing: bool) {
            *self.failing.lock().unwrap() = failing;
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        async fn send(
            &self,
            recipient: &str,
            summary: &SessionSummary,
        ) -> Result<(), ChannelError> {
            if *self.failing.lock().unwrap() {
                return Err(ChannelError::Delivery("scripted outage".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), summary.clone()));
            Ok(())
        }
    }

    async fn setup() -> (DatabaseConnection, Uuid, Arc<RecordingChannel>, SessionNotifier) {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("in-memory db");
        Migrator::up(&db, None).await.expect("apply migrations");
        let (org_id, _) = insert_org_and_project(&db).await;

        let channel = RecordingChannel::new();
        let notifier = SessionNotifier::new(
            db.clone(),
            channel.clone(),
            NotifierConfig {
                sweep_interval_seconds: 60,
                grace_seconds: 0,
            },
        );
        (db, org_id, channel, notifier)
    }

    #[tokio::test]
    async fn last_one_out_sends_exactly_once() {
        let (db, org_id, channel, notifier) = setup().await;
        let sessions = SyncSessionRepository::new(&db);
        let session = sessions.create(org_id, None, "scheduled", 2).await.unwrap();

        notifier
            .record_outcome(
                session.id,
                SessionOutcome::Completed {
                    new_records: 3,
                    updated_records: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(channel.sent_count(), 0, "not settled yet");

        notifier
            .record_outcome(session.id, SessionOutcome::Failed)
            .await
            .unwrap();
        assert_eq!(channel.sent_count(), 1);

        let (recipient, summary) = channel.sent.lock().unwrap()[0].clone();
        assert_eq!(recipient, "team@example.com");
        assert_eq!(summary.completed_accounts, 1);
        assert_eq!(summary.failed_accounts, 1);
        assert_eq!(summary.new_records, 3);

        // Sweep finds nothing to re-send.
        assert_eq!(notifier.sweep_once().await.unwrap(), 0);
        assert_eq!(channel.sent_count(), 1);
    }

    #[tokio::test]
    async fn failed_delivery_is_recovered_by_sweep() {
        let (db, org_id, channel, notifier) = setup().await;
        let sessions = SyncSessionRepository::new(&db);
        let session = sessions.create(org_id, None, "manual", 1).await.unwrap();

        channel.set_failing(true);
        notifier
            .record_outcome(
                session.id,
                SessionOutcome::Completed {
                    new_records: 0,
                    updated_records: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(channel.sent_count(), 0);

        // The failed winner released its claim; the sweep retries once.
        channel.set_failing(false);
        assert_eq!(notifier.sweep_once().await.unwrap(), 1);
        assert_eq!(channel.sent_count(), 1);

        // Idempotent thereafter.
        assert_eq!(notifier.sweep_once().await.unwrap(), 0);
        assert_eq!(channel.sent_count(), 1);
    }

    #[tokio::test]
    async fn missing_recipient_skips_quietly() {
        let (db, _, channel, notifier) = setup().await;

        // Organization without a notification email.
        use sea_orm::{ActiveModelTrait, Set};
        let now = Utc::now().fixed_offset();
        let org_id = Uuid::new_v4();
        organization::ActiveModel {
            id: Set(org_id),
            name: Set("Quiet Org".to_string()),
            plan_tier: Set("starter".to_string()),
            notification_email: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&db)
        .await
        .unwrap();

        let sessions = SyncSessionRepository::new(&db);
        let session = sessions.create(org_id, None, "scheduled", 1).await.unwrap();
        notifier
            .record_outcome(
                session.id,
                SessionOutcome::Completed {
                    new_records: 0,
                    updated_records: 0,
                },
            )
            .await
            .unwrap();

        assert_eq!(channel.sent_count(), 0);
        // Claim kept: the sweep does not spin on it either.
        assert_eq!(notifier.sweep_once().await.unwrap(), 0);
    }
}
