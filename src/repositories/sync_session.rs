//! # SyncSession Repository
//!
//! Session lifecycle and the "last one out" accounting. Each job completion
//! folds its outcome into the session counters with arithmetic expressions
//! in one UPDATE; the job observing `completed + failed == expected` settles
//! the session. The summary email claim is a compare-and-set on email_sent,
//! so concurrent finishers and the orphan sweep cannot double-send.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
    sea_query::Expr,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::sync_session::{ActiveModel, Column, Entity as SyncSession, Model};

/// How one job's result folds into its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Job succeeded (including lock-contention skips).
    Completed {
        new_records: i64,
        updated_records: i64,
    },
    /// Job failed terminally.
    Failed,
}

/// Repository for sync session database operations
pub struct SyncSessionRepository<'a, C: ConnectionTrait> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> SyncSessionRepository<'a, C> {
    /// Create a new SyncSessionRepository with the given connection
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    /// Open a session for one fan-out.
    pub async fn create(
        &self,
        organization_id: Uuid,
        project_id: Option<Uuid>,
        trigger: &str,
        expected_accounts: i32,
    ) -> Result<Model, DbErr> {
        let now = Utc::now().fixed_offset();
        let session = ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(organization_id),
            project_id: Set(project_id),
            trigger: Set(trigger.to_string()),
            status: Set("running".to_string()),
            expected_accounts: Set(expected_accounts),
            completed_accounts: Set(0),
            failed_accounts: Set(0),
            new_records: Set(0),
            updated_records: Set(0),
            email_sent: Set(false),
            completed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let created = session.insert(self.db).await?;
        info!(
            session_id = %created.id,
            organization_id = %organization_id,
            expected_accounts,
            trigger,
            "Sync session opened"
        );
        Ok(created)
    }

    /// Find a session by id.
    pub async fn find(&self, session_id: Uuid) -> Result<Option<Model>, DbErr> {
        SyncSession::find_by_id(session_id).one(self.db).await
    }

    /// Fold one job outcome into the session counters.
    ///
    /// The increments run as arithmetic expressions in a single UPDATE, so
    /// concurrent finishers never lose counts. Returns the session when this
    /// outcome was the last one out (every dispatched account settled), with
    /// status flipped to completed; the caller owns the notification
    /// attempt.
    pub async fn record_job_outcome(
        &self,
        session_id: Uuid,
        outcome: SessionOutcome,
    ) -> Result<Option<Model>, DbErr> {
        let now = Utc::now();
        let mut update = SyncSession::update_many()
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(session_id));

        update = match outcome {
            SessionOutcome::Completed {
                new_records,
                updated_records,
            } => update
                .col_expr(
                    Column::CompletedAccounts,
                    Expr::col(Column::CompletedAccounts).add(1),
                )
                .col_expr(
                    Column::NewRecords,
                    Expr::col(Column::NewRecords).add(new_records),
                )
                .col_expr(
                    Column::UpdatedRecords,
                    Expr::col(Column::UpdatedRecords).add(updated_records),
                ),
            SessionOutcome::Failed => update.col_expr(
                Column::FailedAccounts,
                Expr::col(Column::FailedAccounts).add(1),
            ),
        };
        update.exec(self.db).await?;

        let session = match self.find(session_id).await? {
            Some(session) => session,
            None => return Ok(None),
        };
        if !session.all_accounts_settled() {
            return Ok(None);
        }

        // Settle at most once; a concurrent finisher's UPDATE matches zero
        // rows when the status already flipped.
        let settled = SyncSession::update_many()
            .col_expr(Column::Status, Expr::value("completed"))
            .col_expr(Column::CompletedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(session_id))
            .filter(Column::Status.eq("running"))
            .exec(self.db)
            .await?;

        if settled.rows_affected == 0 {
            debug!(session_id = %session_id, "Session already settled by a concurrent finisher");
            return Ok(None);
        }

        info!(
            session_id = %session_id,
            completed = session.completed_accounts,
            failed = session.failed_accounts,
            "Last account settled; session completed"
        );
        self.find(session_id).await
    }

    /// Claim the right to send the session summary email.
    ///
    /// CAS on email_sent: exactly one caller observes rows_affected = 1.
    pub async fn try_claim_email(&self, session_id: Uuid) -> Result<bool, DbErr> {
        let result = SyncSession::update_many()
            .col_expr(Column::EmailSent, Expr::value(true))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(session_id))
            .filter(Column::EmailSent.eq(false))
            .exec(self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Give the claim back after a failed delivery so the sweep retries.
    pub async fn release_email_claim(&self, session_id: Uuid) -> Result<(), DbErr> {
        SyncSession::update_many()
            .col_expr(Column::EmailSent, Expr::value(false))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(session_id))
            .exec(self.db)
            .await?;
        Ok(())
    }

    /// Completed sessions whose summary email never went out, past the
    /// sweep grace window.
    pub async fn find_orphaned(
        &self,
        completed_before: DateTime<Utc>,
    ) -> Result<Vec<Model>, DbErr> {
        SyncSession::find()
            .filter(Column::Status.eq("completed"))
            .filter(Column::EmailSent.eq(false))
            .filter(Column::CompletedAt.lte(completed_before))
            .all(self.db)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{Database, DatabaseConnection};

    use crate::test_support::insert_org_and_project;

    async fn setup() -> (DatabaseConnection, Uuid, Uuid) {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("in-memory db");
        Migrator::up(&db, None).await.expect("apply migrations");
        let (org_id, project_id) = insert_org_and_project(&db).await;
        (db, org_id, project_id)
    }

    #[tokio::test]
    async fn last_one_out_settles_exactly_once() {
        let (db, org_id, project_id) = setup().await;
        let repo = SyncSessionRepository::new(&db);
        let session = repo
            .create(org_id, Some(project_id), "scheduled", 3)
            .await
            .unwrap();

        let first = repo
            .record_job_outcome(
                session.id,
                SessionOutcome::Completed {
                    new_records: 2,
                    updated_records: 5,
                },
            )
            .await
            .unwrap();
        assert!(first.is_none());

        let second = repo
            .record_job_outcome(session.id, SessionOutcome::Failed)
            .await
            .unwrap();
        assert!(second.is_none());

        let last = repo
            .record_job_outcome(
                session.id,
                SessionOutcome::Completed {
                    new_records: 1,
                    updated_records: 0,
                },
            )
            .await
            .unwrap()
            .expect("last outcome settles the session");

        assert_eq!(last.status, "completed");
        assert_eq!(last.completed_accounts, 2);
        assert_eq!(last.failed_accounts, 1);
        assert_eq!(last.new_records, 3);
        assert_eq!(last.updated_records, 5);
        assert!(last.completed_at.is_some());
    }

    #[tokio::test]
    async fn email_claim_is_single_winner() {
        let (db, org_id, _) = setup().await;
        let repo = SyncSessionRepository::new(&db);
        let session = repo.create(org_id, None, "manual", 1).await.unwrap();

        assert!(repo.try_claim_email(session.id).await.unwrap());
        assert!(!repo.try_claim_email(session.id).await.unwrap());

        // Releasing the claim makes the session claimable again (failed
        // delivery path, recovered by the sweep).
        repo.release_email_claim(session.id).await.unwrap();
        assert!(repo.try_claim_email(session.id).await.unwrap());
    }

    #[tokio::test]
    async fn orphan_query_honors_grace_window() {
        let (db, org_id, _) = setup().await;
        let repo = SyncSessionRepository::new(&db);
        let session = repo.create(org_id, None, "scheduled", 1).await.unwrap();

        let settled = repo
            .record_job_outcome(
                session.id,
                SessionOutcome::Completed {
                    new_records: 0,
                    updated_records: 0,
                },
            )
            .await
            .unwrap();
        assert!(settled.is_some());

        // Inside the grace window nothing is orphaned yet.
        let cutoff = Utc::now() - chrono::Duration::minutes(5);
        assert!(repo.find_orphaned(cutoff).await.unwrap().is_empty());

        // Past the window the unsent session shows up; a sent one does not.
        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(repo.find_orphaned(cutoff).await.unwrap().len(), 1);

        assert!(repo.try_claim_email(session.id).await.unwrap());
        assert!(repo.find_orphaned(cutoff).await.unwrap().is_empty());
    }
}
