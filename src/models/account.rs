//! Account entity model
//!
//! This module contains the SeaORM entity model for the accounts table,
//! which represents one externally-tracked profile. The lock_id/locked_at
//! pair carries the advisory per-account sync lock: sync_status = syncing
//! holds exactly while an unexpired lock is held.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Account entity representing one externally-tracked profile
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    /// Unique identifier for the account (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning organization
    pub organization_id: Uuid,

    /// Owning project
    pub project_id: Uuid,

    /// Platform slug (e.g., tiktok, youtube, instagram)
    pub platform: String,

    /// External username or channel identifier on the platform
    pub handle: String,

    /// Discovery mode (automatic: scheduled discovery runs; manual: refresh only)
    pub discovery_mode: String,

    /// Current sync status (one of: idle, syncing, completed, error)
    pub sync_status: String,

    /// Timestamp of the last successful sync
    pub last_synced: Option<DateTimeWithTimeZone>,

    /// Advisory lock holder identifier
    pub lock_id: Option<Uuid>,

    /// Timestamp when the advisory lock was taken
    pub locked_at: Option<DateTimeWithTimeZone>,

    /// Number of consecutive failed syncs
    pub retry_count: i32,

    /// Last sync error message shown on the product surface
    pub last_error: Option<String>,

    /// Timestamp when the account was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the account was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::organization::Entity",
        from = "Column::OrganizationId",
        to = "super::organization::Column::Id"
    )]
    Organization,
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id"
    )]
    Project,
    #[sea_orm(has_many = "super::record::Entity")]
    Record,
}

impl Related<super::organization::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organization.def()
    }
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl Related<super::record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Record.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether scheduled syncs should run discovery for this account.
    pub fn discovers_automatically(&self) -> bool {
        self.discovery_mode == "automatic"
    }
}
