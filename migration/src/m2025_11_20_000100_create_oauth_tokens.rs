//! Migration to create the oauth_tokens table.
//!
//! The table is a key-value shaped store: one row per portal, holding the
//! encrypted JSON blob of the portal's OAuth credential set plus a mirrored
//! expiry column used for reaping expired rows.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OAuthTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuthTokens::PortalId)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OAuthTokens::Ciphertext).binary().not_null())
                    .col(
                        ColumnDef::new(OAuthTokens::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthTokens::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(OAuthTokens::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index on expires_at for expired-row reaping queries
        manager
            .create_index(
                Index::create()
                    .name("idx_oauth_tokens_expires_at")
                    .table(OAuthTokens::Table)
                    .col(OAuthTokens::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth_tokens_expires_at")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(OAuthTokens::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum OAuthTokens {
    Table,
    PortalId,
    Ciphertext,
    ExpiresAt,
    CreatedAt,
    UpdatedAt,
}
