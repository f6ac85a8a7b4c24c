//! Inbound lifecycle event model
//!
//! The webhook envelope sent by the source system and the classification of
//! its `eventType` string into the processing categories the orchestrator
//! routes on.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::mapper::extract;

/// Webhook envelope as received from the source system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    /// Stable tenant key identifying the sending customer.
    pub tenant_key: String,
    /// Community (facility) identifier, when the source knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_id: Option<String>,
    /// Event type string, e.g. `resident_move_in`.
    pub event_type: String,
    /// Globally unique event-message identifier; the idempotency key.
    pub event_message_id: String,
    /// Timestamp the source assigned to the event.
    pub event_message_date: String,
    /// Open-ended notification payload. Carries at least a resident id, and
    /// a leave id for leave events.
    #[serde(default)]
    pub notification_data: JsonValue,
}

/// Processing category for an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    MoveIn,
    MoveOut,
    LeaveStart,
    LeaveEnd,
    /// Profile/contact/insurance changes: full recompute minus move-in date.
    GenericUpdate,
}

impl EventKind {
    /// Classify a raw event type string. Returns `None` for unsupported and
    /// explicit test event types, which the intake path records as ignored.
    pub fn classify(event_type: &str) -> Option<Self> {
        match event_type {
            "resident_move_in" | "move_in" => Some(Self::MoveIn),
            "resident_move_out" | "move_out" => Some(Self::MoveOut),
            "leave_of_absence_start" | "leave_start" => Some(Self::LeaveStart),
            "leave_of_absence_end" | "leave_end" => Some(Self::LeaveEnd),
            "resident_update" | "profile_update" | "contact_update" | "insurance_update"
            | "diagnosis_update" | "room_change" => Some(Self::GenericUpdate),
            _ => None,
        }
    }
}

impl LifecycleEvent {
    /// Processing category of this event, if supported.
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::classify(&self.event_type)
    }

    /// Resident identifier from the notification payload.
    pub fn resident_id(&self) -> Option<String> {
        extract::first_string(&self.notification_data, &["ResidentId", "residentId", "ResidentID"])
    }

    /// Leave identifier from the notification payload (leave events only).
    pub fn leave_id(&self) -> Option<String> {
        extract::first_string(&self.notification_data, &["LeaveId", "leaveId", "LeaveID"])
    }

    /// Basic shape validation applied before any ledger write.
    pub fn validate(&self) -> Result<(), String> {
        if self.tenant_key.trim().is_empty() {
            return Err("tenantKey must not be empty".to_string());
        }
        if self.event_message_id.trim().is_empty() {
            return Err("eventMessageId must not be empty".to_string());
        }
        if self.event_type.trim().is_empty() {
            return Err("eventType must not be empty".to_string());
        }
        Ok(())
    }
}
