//! Migration to create the records table.
//!
//! Records are discovered content items keyed by the deterministic
//! `{platform}:{account_id}:{external_item_id}` composite, which makes
//! every write naturally idempotent.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Records::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Records::Id).text().not_null().primary_key())
                    .col(ColumnDef::new(Records::AccountId).uuid().not_null())
                    .col(ColumnDef::new(Records::Platform).text().not_null())
                    .col(ColumnDef::new(Records::ExternalItemId).text().not_null())
                    .col(ColumnDef::new(Records::Title).text().null())
                    .col(ColumnDef::new(Records::ThumbnailUrl).text().null())
                    .col(
                        ColumnDef::new(Records::UploadDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Records::Views)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Records::Likes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Records::Comments)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Records::Shares)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Records::Saves)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Records::LastRefreshed)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Records::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Records::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_records_account_id")
                            .from(Records::Table, Records::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Discovery early-stop and oldest-known date filter both scan by account
        manager
            .create_index(
                Index::create()
                    .name("idx_records_account_upload_date")
                    .table(Records::Table)
                    .col(Records::AccountId)
                    .col(Records::UploadDate)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_records_account_upload_date")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Records::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Records {
    Table,
    Id,
    AccountId,
    Platform,
    ExternalItemId,
    Title,
    ThumbnailUrl,
    UploadDate,
    Views,
    Likes,
    Comments,
    Shares,
    Saves,
    LastRefreshed,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Accounts {
    Table,
    Id,
}
