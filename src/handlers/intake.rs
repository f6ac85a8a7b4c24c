//! # Webhook Intake
//!
//! The single inbound surface: `POST /webhooks/events`. Acknowledgement is
//! decoupled from processing; a valid event is ledgered and enqueued, and
//! the caller never waits on (or sees) downstream sink work.
//!
//! Responses: 400 for a malformed envelope, 200 for a duplicate delivery,
//! 202 with `status: ignored` for unsupported or test event types, and 202
//! with `status: queued` plus the ledger entry id otherwise.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use metrics::counter;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ApiError;
use crate::events::LifecycleEvent;
use crate::repositories::{DispatchRepository, LedgerRepository, TenantRepository};
use crate::server::AppState;

/// Acknowledgement body for the intake endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeResponse {
    pub status: &'static str,
    pub event_message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

/// Accept a lifecycle event webhook.
pub async fn receive_event(
    State(state): State<AppState>,
    payload: Result<Json<LifecycleEvent>, JsonRejection>,
) -> Result<(StatusCode, Json<IntakeResponse>), ApiError> {
    let Json(event) = payload?;
    counter!("intake_events_received").increment(1);

    event.validate().map_err(|message| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED".to_string(),
            message,
        )
    })?;

    let tenant = TenantRepository::new(&state.db)
        .find_or_create_by_key(&event.tenant_key)
        .await?;

    let ledger = LedgerRepository::new(&state.db);
    let (entry, duplicate) = ledger.record_incoming_event(&event, tenant.id).await?;

    if duplicate {
        counter!("intake_events_duplicate").increment(1);
        debug!(
            event_message_id = %event.event_message_id,
            "duplicate delivery acknowledged"
        );
        return Ok((
            StatusCode::OK,
            Json(IntakeResponse {
                status: "duplicate",
                event_message_id: event.event_message_id,
                id: None,
            }),
        ));
    }

    if event.kind().is_none() {
        counter!("intake_events_ignored").increment(1);
        info!(
            event_message_id = %event.event_message_id,
            event_type = %event.event_type,
            "unsupported event type, recorded as ignored"
        );
        ledger.mark_ignored(&event.event_message_id).await?;
        return Ok((
            StatusCode::ACCEPTED,
            Json(IntakeResponse {
                status: "ignored",
                event_message_id: event.event_message_id,
                id: None,
            }),
        ));
    }

    DispatchRepository::new(&state.db)
        .enqueue(&event.event_message_id)
        .await?;
    ledger.mark_queued(&event.event_message_id).await?;

    counter!("intake_events_queued").increment(1);
    info!(
        event_message_id = %event.event_message_id,
        event_type = %event.event_type,
        tenant_key = %event.tenant_key,
        "event queued for dispatch"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(IntakeResponse {
            status: "queued",
            event_message_id: event.event_message_id,
            id: Some(entry.id),
        }),
    ))
}
