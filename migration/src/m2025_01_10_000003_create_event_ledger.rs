//! Migration to create the event_ledger table.
//!
//! One row per unique event-message identifier. The unique index on
//! `event_message_id` is the dedupe primitive the intake path relies on.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EventLedger::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(EventLedger::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(EventLedger::EventMessageId).text().not_null())
                    .col(ColumnDef::new(EventLedger::TenantId).uuid().not_null())
                    .col(ColumnDef::new(EventLedger::CommunityId).text().null())
                    .col(ColumnDef::new(EventLedger::EventType).text().not_null())
                    .col(
                        ColumnDef::new(EventLedger::Payload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EventLedger::Status).text().not_null())
                    .col(ColumnDef::new(EventLedger::Error).text().null())
                    .col(
                        ColumnDef::new(EventLedger::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(EventLedger::ProcessedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_event_ledger_tenant")
                            .from(EventLedger::Table, EventLedger::TenantId)
                            .to(Tenants::Table, Tenants::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_event_ledger_event_message_id")
                    .table(EventLedger::Table)
                    .col(EventLedger::EventMessageId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_event_ledger_status")
                    .table(EventLedger::Table)
                    .col(EventLedger::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EventLedger::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EventLedger {
    Table,
    Id,
    EventMessageId,
    TenantId,
    CommunityId,
    EventType,
    Payload,
    Status,
    Error,
    ReceivedAt,
    ProcessedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}
