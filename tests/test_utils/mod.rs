//! Test utilities for integration tests.
//!
//! Sets up an in-memory SQLite database with migrations applied and seeds
//! the organization/project/account rows the sync flow needs.

use anyhow::Result;
use chrono::Utc;
use creatorsync::migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use uuid::Uuid;

use creatorsync::models::{account, organization, project};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Creates an organization with the given plan tier and notification email.
pub async fn create_organization(
    db: &DatabaseConnection,
    plan_tier: &str,
    notification_email: Option<&str>,
) -> Result<Uuid> {
    let now = Utc::now().fixed_offset();
    let org_id = Uuid::new_v4();
    organization::ActiveModel {
        id: Set(org_id),
        name: Set("Integration Org".to_string()),
        plan_tier: Set(plan_tier.to_string()),
        notification_email: Set(notification_email.map(str::to_string)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;
    Ok(org_id)
}

/// Creates a project under the organization.
pub async fn create_project(db: &DatabaseConnection, organization_id: Uuid) -> Result<Uuid> {
    let now = Utc::now().fixed_offset();
    let project_id = Uuid::new_v4();
    project::ActiveModel {
        id: Set(project_id),
        organization_id: Set(organization_id),
        name: Set("Integration Project".to_string()),
        last_global_refresh: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;
    Ok(project_id)
}

/// Creates an idle automatic-discovery account on the given platform.
pub async fn create_account(
    db: &DatabaseConnection,
    organization_id: Uuid,
    project_id: Uuid,
    platform: &str,
    handle: &str,
) -> Result<Uuid> {
    let now = Utc::now().fixed_offset();
    let account_id = Uuid::new_v4();
    account::ActiveModel {
        id: Set(account_id),
        organization_id: Set(organization_id),
        project_id: Set(project_id),
        platform: Set(platform.to_string()),
        handle: Set(handle.to_string()),
        discovery_mode: Set("automatic".to_string()),
        sync_status: Set("idle".to_string()),
        last_synced: Set(None),
        lock_id: Set(None),
        locked_at: Set(None),
        retry_count: Set(0),
        last_error: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;
    Ok(account_id)
}
