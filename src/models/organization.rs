//! Organization entity model
//!
//! This module contains the SeaORM entity model for the organizations table.
//! An organization's plan tier decides how often its accounts are refreshed
//! by the scheduler fan-out.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Organization entity owning projects and tracked accounts
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "organizations")]
pub struct Model {
    /// Unique identifier for the organization (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Display name of the organization
    pub name: String,

    /// Subscription tier (one of: starter, growth, scale, enterprise)
    pub plan_tier: String,

    /// Recipient for aggregate sync summary emails
    pub notification_email: Option<String>,

    /// Timestamp when the organization was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the organization was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::account::Entity")]
    Account,
    #[sea_orm(has_many = "super::project::Entity")]
    Project,
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Refresh interval in seconds for a plan tier.
///
/// Unknown tiers fall back to the starter cadence.
pub fn refresh_interval_seconds(plan_tier: &str) -> i64 {
    match plan_tier {
        "enterprise" => 6 * 3600,
        "scale" => 12 * 3600,
        "growth" => 24 * 3600,
        _ => 48 * 3600,
    }
}
