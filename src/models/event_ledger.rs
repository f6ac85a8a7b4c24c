//! EventLedger entity model
//!
//! One row per unique event-message identifier: the durable record of every
//! received webhook and the single source of truth for exactly-once intake.
//!
//! Lifecycle: `received -> queued -> {processed | failed | ignored}`.

use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Ledger entry status values.
pub mod status {
    pub const RECEIVED: &str = "received";
    pub const QUEUED: &str = "queued";
    pub const PROCESSED: &str = "processed";
    pub const FAILED: &str = "failed";
    pub const IGNORED: &str = "ignored";
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "event_ledger")]
pub struct Model {
    /// Unique identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Globally unique event-message identifier from the source system;
    /// the idempotency key (unique index)
    pub event_message_id: String,

    /// Tenant the event belongs to
    pub tenant_id: Uuid,

    /// Community identifier, when present on the event
    pub community_id: Option<String>,

    /// Event type string as received
    pub event_type: String,

    /// Raw event payload, retained for inspection and operator retry
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: JsonValue,

    /// Lifecycle status (see [`status`])
    pub status: String,

    /// Truncated error text for failed entries
    pub error: Option<String>,

    /// Timestamp when the event was received
    pub received_at: DateTimeWithTimeZone,

    /// Timestamp when the event reached a terminal state
    pub processed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id"
    )]
    Tenant,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
