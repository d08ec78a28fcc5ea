//! Migration to create the sync_sessions table.
//!
//! A session groups the jobs dispatched by one fan-out and accumulates
//! aggregate stats for the "last one out" summary notification.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncSessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncSessions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::OrganizationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SyncSessions::ProjectId).uuid().null())
                    .col(
                        ColumnDef::new(SyncSessions::Trigger)
                            .text()
                            .not_null()
                            .default("scheduled"),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::Status)
                            .text()
                            .not_null()
                            .default("running"),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::ExpectedAccounts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::CompletedAccounts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::FailedAccounts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::NewRecords)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::UpdatedRecords)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::EmailSent)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sync_sessions_organization_id")
                            .from(SyncSessions::Table, SyncSessions::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Orphan sweep scan: completed sessions still awaiting their email
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_sessions_status_email_completed")
                    .table(SyncSessions::Table)
                    .col(SyncSessions::Status)
                    .col(SyncSessions::EmailSent)
                    .col(SyncSessions::CompletedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_sync_sessions_status_email_completed")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(SyncSessions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncSessions {
    Table,
    Id,
    OrganizationId,
    ProjectId,
    Trigger,
    Status,
    ExpectedAccounts,
    CompletedAccounts,
    FailedAccounts,
    NewRecords,
    UpdatedRecords,
    EmailSent,
    CompletedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Organizations {
    Table,
    Id,
}
