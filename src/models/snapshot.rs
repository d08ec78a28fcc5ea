//! Snapshot entity model
//!
//! Snapshots are immutable, append-only metrics observations owned by a
//! record. The sequence per record is monotone in captured_at, and a sync
//! pass appends at most one snapshot per record.

use std::fmt;
use std::str::FromStr;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Snapshot entity: one timestamped metrics observation of a record
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "snapshots")]
pub struct Model {
    /// Unique identifier for the snapshot (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning record (deterministic composite key)
    pub record_id: String,

    /// Timestamp of this observation
    pub captured_at: DateTimeWithTimeZone,

    /// Capture reason (one of: initial_sync, manual_refresh, scheduled_refresh)
    pub reason: String,

    /// Observed view count
    pub views: i64,

    /// Observed like count
    pub likes: i64,

    /// Observed comment count
    pub comments: i64,

    /// Observed share count
    pub shares: i64,

    /// Observed save count
    pub saves: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::record::Entity",
        from = "Column::RecordId",
        to = "super::record::Column::Id"
    )]
    Record,
}

impl Related<super::record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Record.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Why a snapshot was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotReason {
    InitialSync,
    ManualRefresh,
    ScheduledRefresh,
}

impl SnapshotReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotReason::InitialSync => "initial_sync",
            SnapshotReason::ManualRefresh => "manual_refresh",
            SnapshotReason::ScheduledRefresh => "scheduled_refresh",
        }
    }
}

impl fmt::Display for SnapshotReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotReason {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "initial_sync" => Ok(SnapshotReason::InitialSync),
            "manual_refresh" => Ok(SnapshotReason::ManualRefresh),
            "scheduled_refresh" => Ok(SnapshotReason::ScheduledRefresh),
            other => Err(format!("unknown snapshot reason: {other}")),
        }
    }
}
