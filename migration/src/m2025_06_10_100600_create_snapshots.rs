//! Migration to create the snapshots table.
//!
//! Snapshots are append-only metrics observations owned by a record,
//! timestamped and tagged with the capture reason.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Snapshots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Snapshots::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Snapshots::RecordId).text().not_null())
                    .col(
                        ColumnDef::new(Snapshots::CapturedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Snapshots::Reason)
                            .text()
                            .not_null()
                            .default("initial_sync"),
                    )
                    .col(
                        ColumnDef::new(Snapshots::Views)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Snapshots::Likes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Snapshots::Comments)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Snapshots::Shares)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Snapshots::Saves)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_snapshots_record_id")
                            .from(Snapshots::Table, Snapshots::RecordId)
                            .to(Records::Table, Records::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_snapshots_record_captured")
                    .table(Snapshots::Table)
                    .col(Snapshots::RecordId)
                    .col(Snapshots::CapturedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_snapshots_record_captured")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Snapshots::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Snapshots {
    Table,
    Id,
    RecordId,
    CapturedAt,
    Reason,
    Views,
    Likes,
    Comments,
    Shares,
    Saves,
}

#[derive(DeriveIden)]
enum Records {
    Table,
    Id,
}
