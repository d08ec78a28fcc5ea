//! # Data Models
//!
//! This module contains all the SeaORM entity models used throughout the
//! CreatorSync service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod account;
pub mod organization;
pub mod project;
pub mod record;
pub mod snapshot;
pub mod sync_job;
pub mod sync_session;

pub use account::Entity as Account;
pub use organization::Entity as Organization;
pub use project::Entity as Project;
pub use record::Entity as Record;
pub use snapshot::Entity as Snapshot;
pub use sync_job::Entity as SyncJob;
pub use sync_session::Entity as SyncSession;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
    /// Platform slugs with a registered provider
    pub platforms: Vec<String>,
}

impl ServiceInfo {
    pub fn new(platforms: Vec<String>) -> Self {
        Self {
            service: "creatorsync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            platforms,
        }
    }
}
