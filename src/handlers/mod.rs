//! # HTTP Handlers
//!
//! Axum handlers for the service surface: the webhook intake endpoint and
//! the service/health probes.

pub mod intake;

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::error::ApiError;
use crate::server::AppState;

pub use intake::receive_event;

/// Basic service information returned by the root endpoint.
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub profile: String,
}

/// Root endpoint describing the service.
pub async fn root(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        profile: state.config.profile.clone(),
    })
}

/// Liveness/readiness probe; verifies database connectivity.
pub async fn healthz(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    crate::db::health_check(&state.db).await.map_err(|err| {
        tracing::error!(error = %err, "health check failed");
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "UNHEALTHY",
            "database unreachable",
        )
    })?;
    Ok(StatusCode::OK)
}
