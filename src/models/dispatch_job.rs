//! DispatchJob entity model
//!
//! Durable job channel entries between webhook intake and the dispatcher.
//! Keyed by event-message id so a duplicate enqueue is rejected by the
//! unique index; exhausted jobs stay in the table as `failed`.

use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Dispatch job status values.
pub mod status {
    pub const QUEUED: &str = "queued";
    pub const RUNNING: &str = "running";
    pub const SUCCEEDED: &str = "succeeded";
    pub const FAILED: &str = "failed";
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "dispatch_jobs")]
pub struct Model {
    /// Unique identifier for the job (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Event-message id this job processes (unique index)
    pub event_message_id: String,

    /// Current status of the job (see [`status`])
    pub status: String,

    /// Number of attempts made for this job
    pub attempts: i32,

    /// Timestamp when the job became eligible to run
    pub scheduled_at: DateTimeWithTimeZone,

    /// Timestamp before which the job must not be retried
    pub retry_after: Option<DateTimeWithTimeZone>,

    /// Timestamp when the job last started execution
    pub started_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the job finished execution
    pub finished_at: Option<DateTimeWithTimeZone>,

    /// Structured error details if the job failed
    #[sea_orm(column_type = "JsonBinary")]
    pub error: Option<JsonValue>,

    /// Timestamp when the job was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the job was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
