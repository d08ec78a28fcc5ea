//! Database migrations for the CreatorSync service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_06_10_100000_create_organizations;
mod m2025_06_10_100100_create_projects;
mod m2025_06_10_100200_create_accounts;
mod m2025_06_10_100300_create_sync_sessions;
mod m2025_06_10_100400_create_sync_jobs;
mod m2025_06_10_100500_create_records;
mod m2025_06_10_100600_create_snapshots;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_06_10_100000_create_organizations::Migration),
            Box::new(m2025_06_10_100100_create_projects::Migration),
            Box::new(m2025_06_10_100200_create_accounts::Migration),
            Box::new(m2025_06_10_100300_create_sync_sessions::Migration),
            Box::new(m2025_06_10_100400_create_sync_jobs::Migration),
            Box::new(m2025_06_10_100500_create_records::Migration),
            Box::new(m2025_06_10_100600_create_snapshots::Migration),
        ]
    }
}
