//! Migration to create the accounts table.
//!
//! Accounts are externally-tracked profiles. The lock_id/locked_at pair
//! implements the advisory per-account sync lock, and sync_status mirrors
//! the coordinator state for the product surface.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Accounts::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Accounts::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Accounts::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(Accounts::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(Accounts::Platform).text().not_null())
                    .col(ColumnDef::new(Accounts::Handle).text().not_null())
                    .col(
                        ColumnDef::new(Accounts::DiscoveryMode)
                            .text()
                            .not_null()
                            .default("automatic"),
                    )
                    .col(
                        ColumnDef::new(Accounts::SyncStatus)
                            .text()
                            .not_null()
                            .default("idle"),
                    )
                    .col(
                        ColumnDef::new(Accounts::LastSynced)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Accounts::LockId).uuid().null())
                    .col(
                        ColumnDef::new(Accounts::LockedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Accounts::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Accounts::LastError).text().null())
                    .col(
                        ColumnDef::new(Accounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Accounts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_accounts_organization_id")
                            .from(Accounts::Table, Accounts::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_accounts_project_id")
                            .from(Accounts::Table, Accounts::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_accounts_project_platform_handle")
                    .table(Accounts::Table)
                    .col(Accounts::ProjectId)
                    .col(Accounts::Platform)
                    .col(Accounts::Handle)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Scheduler due-account scan
        manager
            .create_index(
                Index::create()
                    .name("idx_accounts_organization_last_synced")
                    .table(Accounts::Table)
                    .col(Accounts::OrganizationId)
                    .col(Accounts::LastSynced)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_accounts_project_platform_handle")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_accounts_organization_last_synced")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Accounts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Accounts {
    Table,
    Id,
    OrganizationId,
    ProjectId,
    Platform,
    Handle,
    DiscoveryMode,
    SyncStatus,
    LastSynced,
    LockId,
    LockedAt,
    RetryCount,
    LastError,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Organizations {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Projects {
    Table,
    Id,
}
