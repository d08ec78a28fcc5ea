//! SyncSession entity model
//!
//! A session groups the jobs dispatched by one fan-out and accumulates
//! aggregate stats. The email_sent flag transitions false -> true exactly
//! once, guarded by a compare-and-set in the session repository.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// SyncSession entity grouping jobs triggered together
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_sessions")]
pub struct Model {
    /// Unique identifier for the session (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning organization
    pub organization_id: Uuid,

    /// Owning project, when the fan-out was project-scoped
    pub project_id: Option<Uuid>,

    /// What triggered this session (one of: scheduled, manual)
    pub trigger: String,

    /// Session status (one of: running, completed)
    pub status: String,

    /// Number of accounts the fan-out dispatched jobs for
    pub expected_accounts: i32,

    /// Accounts whose job finished successfully (including skips)
    pub completed_accounts: i32,

    /// Accounts whose job failed terminally
    pub failed_accounts: i32,

    /// New records discovered across the session
    pub new_records: i64,

    /// Known records refreshed across the session
    pub updated_records: i64,

    /// Whether the aggregate summary email has been sent
    pub email_sent: bool,

    /// Timestamp when the last job of the session finished
    pub completed_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the session was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the session was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sync_job::Entity")]
    SyncJob,
}

impl Related<super::sync_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SyncJob.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Canonical "last one out" test: every dispatched account has either
    /// completed or failed terminally.
    pub fn all_accounts_settled(&self) -> bool {
        self.completed_accounts + self.failed_accounts >= self.expected_accounts
    }
}
