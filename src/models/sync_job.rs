//! SyncJob entity model
//!
//! This module contains the SeaORM entity model for the sync_jobs table,
//! the durable queue of per-account sync work units. Status transitions are
//! monotone: queued -> running -> {succeeded | queued(retry) | failed}, and
//! attempts increments exactly once per running transition.

use std::fmt;
use std::str::FromStr;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

/// Default attempt ceiling for new jobs.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Priority assigned to scheduler-enqueued jobs.
pub const PRIORITY_SCHEDULED: i16 = 30;

/// Priority assigned to user-triggered jobs.
pub const PRIORITY_MANUAL: i16 = 50;

/// SyncJob entity representing one queued unit of sync work for one account
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_jobs")]
pub struct Model {
    /// Unique identifier for the sync job (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning organization
    pub organization_id: Uuid,

    /// Owning project
    pub project_id: Uuid,

    /// Account this job synchronizes
    pub account_id: Uuid,

    /// Session this job belongs to, when dispatched by a fan-out
    pub session_id: Option<Uuid>,

    /// Sync strategy (one of: progressive, discovery_only, refresh_only, direct)
    pub strategy: String,

    /// Current status of the job (one of: queued, running, succeeded, failed)
    pub status: String,

    /// Job priority for scheduling (higher values = sooner)
    pub priority: i16,

    /// Number of attempts made for this job
    pub attempts: i32,

    /// Attempt ceiling before the job fails terminally
    pub max_attempts: i32,

    /// Timestamp when the job is eligible to run (retry backoff pushes this out)
    pub scheduled_at: DateTimeWithTimeZone,

    /// Timestamp when the job started execution
    pub started_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the job finished execution
    pub finished_at: Option<DateTimeWithTimeZone>,

    /// Result summary for succeeded jobs (new/updated counts, skip marker)
    #[sea_orm(column_type = "JsonBinary")]
    pub result: Option<JsonValue>,

    /// Structured error details if the job failed
    #[sea_orm(column_type = "JsonBinary")]
    pub error: Option<JsonValue>,

    /// Timestamp when the sync job was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the sync job was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::AccountId",
        to = "super::account::Column::Id"
    )]
    Account,
    #[sea_orm(
        belongs_to = "super::sync_session::Entity",
        from = "Column::SessionId",
        to = "super::sync_session::Column::Id"
    )]
    SyncSession,
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl Related<super::sync_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SyncSession.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// How much of the discovery/refresh pipeline a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Discovery followed by a metrics refresh of known items
    Progressive,
    /// Discovery pass only
    DiscoveryOnly,
    /// Metrics refresh only; never creates records
    RefreshOnly,
    /// Same pipeline as progressive, reserved for inline dispatch
    Direct,
}

impl SyncStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStrategy::Progressive => "progressive",
            SyncStrategy::DiscoveryOnly => "discovery_only",
            SyncStrategy::RefreshOnly => "refresh_only",
            SyncStrategy::Direct => "direct",
        }
    }

    /// Whether this strategy runs the discovery phase.
    pub fn runs_discovery(&self) -> bool {
        !matches!(self, SyncStrategy::RefreshOnly)
    }

    /// Whether this strategy runs the refresh phase.
    pub fn runs_refresh(&self) -> bool {
        !matches!(self, SyncStrategy::DiscoveryOnly)
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "progressive" => Ok(SyncStrategy::Progressive),
            "discovery_only" => Ok(SyncStrategy::DiscoveryOnly),
            "refresh_only" => Ok(SyncStrategy::RefreshOnly),
            "direct" => Ok(SyncStrategy::Direct),
            other => Err(format!("unknown sync strategy: {other}")),
        }
    }
}
