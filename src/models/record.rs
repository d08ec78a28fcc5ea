//! Record entity model
//!
//! A record is one discovered content item (e.g., a video). Its primary key
//! is the deterministic `{platform}:{account_id}:{external_item_id}`
//! composite, so a write to that key is naturally idempotent no matter which
//! job or retry produced it.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Record entity representing one fetched content unit
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "records")]
pub struct Model {
    /// Deterministic composite key `{platform}:{account_id}:{external_item_id}`
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Owning tracked account
    pub account_id: Uuid,

    /// Platform slug this item was fetched from
    pub platform: String,

    /// Item identifier on the external platform
    pub external_item_id: String,

    /// Item title; set by discovery, never regressed by refresh passes
    pub title: Option<String>,

    /// Rehosted thumbnail URL, or empty when the media fetch failed
    pub thumbnail_url: Option<String>,

    /// Publication date reported by the provider
    pub upload_date: Option<DateTimeWithTimeZone>,

    /// View count at the last refresh
    pub views: i64,

    /// Like count at the last refresh
    pub likes: i64,

    /// Comment count at the last refresh
    pub comments: i64,

    /// Share count at the last refresh
    pub shares: i64,

    /// Save count at the last refresh
    pub saves: i64,

    /// Timestamp of the last metrics write
    pub last_refreshed: DateTimeWithTimeZone,

    /// Timestamp when the record was first discovered
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the record was last updated
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
    #[sea_orm(has_many = "super::snapshot::Entity")]
    Snapshot,
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl Related<super::snapshot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Snapshot.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Build the deterministic record key for an item.
pub fn record_key(platform: &str, account_id: Uuid, external_item_id: &str) -> String {
    format!("{platform}:{account_id}:{external_item_id}")
}
