//! Migration to create the tenant_credentials table.
//!
//! Stores per-tenant source-system credentials. The password is held as
//! AES-256-GCM ciphertext; tenants without a row fall back to the shared
//! default credentials from configuration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TenantCredentials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TenantCredentials::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TenantCredentials::TenantId).uuid().not_null())
                    .col(ColumnDef::new(TenantCredentials::Username).text().not_null())
                    .col(
                        ColumnDef::new(TenantCredentials::PasswordCiphertext)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TenantCredentials::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(TenantCredentials::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tenant_credentials_tenant")
                            .from(TenantCredentials::Table, TenantCredentials::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_tenant_credentials_tenant_id")
                    .table(TenantCredentials::Table)
                    .col(TenantCredentials::TenantId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TenantCredentials::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TenantCredentials {
    Table,
    Id,
    TenantId,
    Username,
    PasswordCiphertext,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}
