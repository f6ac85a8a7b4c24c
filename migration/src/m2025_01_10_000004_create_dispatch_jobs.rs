//! Migration to create the dispatch_jobs table.
//!
//! Durable job channel between webhook intake and the event dispatcher.
//! Jobs are keyed by event-message id so a duplicate enqueue is rejected by
//! the unique index, and exhausted jobs are retained for inspection.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DispatchJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DispatchJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DispatchJobs::EventMessageId).text().not_null())
                    .col(ColumnDef::new(DispatchJobs::Status).text().not_null())
                    .col(
                        ColumnDef::new(DispatchJobs::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DispatchJobs::ScheduledAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DispatchJobs::RetryAfter)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DispatchJobs::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DispatchJobs::FinishedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(DispatchJobs::Error).json_binary().null())
                    .col(
                        ColumnDef::new(DispatchJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(DispatchJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_dispatch_jobs_event_message_id")
                    .table(DispatchJobs::Table)
                    .col(DispatchJobs::EventMessageId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_dispatch_jobs_status_retry_after")
                    .table(DispatchJobs::Table)
                    .col(DispatchJobs::Status)
                    .col(DispatchJobs::RetryAfter)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DispatchJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DispatchJobs {
    Table,
    Id,
    EventMessageId,
    Status,
    Attempts,
    ScheduledAt,
    RetryAfter,
    StartedAt,
    FinishedAt,
    Error,
    CreatedAt,
    UpdatedAt,
}
