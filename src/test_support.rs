//! Shared fixtures for unit tests.
//!
//! Inserts the minimal organization/project/account rows most repository
//! and pipeline tests need, via the entity models directly.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};
use uuid::Uuid;

use crate::models::{account, organization, project};

/// Insert an organization (growth tier) and a project under it.
pub async fn insert_org_and_project<C: ConnectionTrait>(db: &C) -> (Uuid, Uuid) {
    let now = Utc::now().fixed_offset();
    let org_id = Uuid::new_v4();
    let org = organization::ActiveModel {
        id: Set(org_id),
        name: Set("Test Org".to_string()),
        plan_tier: Set("growth".to_string()),
        notification_email: Set(Some("team@example.com".to_string())),
        created_at: Set(now),
        updated_at: Set(now),
    };
    org.insert(db).await.expect("insert organization");

    let project_id = Uuid::new_v4();
    let project = project::ActiveModel {
        id: Set(project_id),
        organization_id: Set(org_id),
        name: Set("Test Project".to_string()),
        last_global_refresh: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };
    project.insert(db).await.expect("insert project");

    (org_id, project_id)
}

/// Insert an idle, automatic-discovery account.
pub async fn insert_account<C: ConnectionTrait>(
    db: &C,
    organization_id: Uuid,
    project_id: Uuid,
    platform: &str,
    handle: &str,
) -> Uuid {
    let now = Utc::now().fixed_offset();
    let account_id = Uuid::new_v4();
    let account = account::ActiveModel {
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
    };
    account.insert(db).await.expect("insert account");
    account_id
}

/// Insert an account with discovery_mode = manual (refresh-only scheduling).
pub async fn insert_manual_account<C: ConnectionTrait>(
    db: &C,
    organization_id: Uuid,
    project_id: Uuid,
    platform: &str,
    handle: &str,
) -> Uuid {
    let now = Utc::now().fixed_offset();
    let account_id = Uuid::new_v4();
    let account = account::ActiveModel {
        id: Set(account_id),
        organization_id: Set(organization_id),
        project_id: Set(project_id),
        platform: Set(platform.to_string()),
        handle: Set(handle.to_string()),
        discovery_mode: Set("manual".to_string()),
        sync_status: Set("idle".to_string()),
        last_synced: Set(None),
        lock_id: Set(None),
        locked_at: Set(None),
        retry_count: Set(0),
        last_error: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };
    account.insert(db).await.expect("insert account");
    account_id
}
