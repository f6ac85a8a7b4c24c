//! Source-system REST client
//!
//! Thin wrapper over the vendor API. Credentials are passed per request
//! because each tenant authenticates with its own basic-auth pair; the
//! client itself is shared and holds only the connection pool.

use reqwest::StatusCode;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Basic-auth credential pair for the source API.
#[derive(Clone)]
pub struct SourceCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for SourceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Errors from source API calls.
#[derive(Debug, thiserror::Error)]
pub enum SourceApiError {
    #[error("invalid source API base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    #[error("source API request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("source API rejected credentials (401)")]
    Unauthorized,

    #[error("source API denied access (403)")]
    Forbidden,

    #[error("source API returned {status} for {path}")]
    Status { status: StatusCode, path: String },

    #[error("source API returned a non-JSON body for {path}")]
    Decode { path: String },
}

/// HTTP client for the source system's resident endpoints.
#[derive(Clone)]
pub struct SourceClient {
    http: reqwest::Client,
    base_url: String,
}

impl SourceClient {
    pub fn new(base_url: &str) -> Result<Self, SourceApiError> {
        let base = Url::parse(base_url)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base.as_str().trim_end_matches('/').to_string(),
        })
    }

    /// Build a client on an existing connection pool. Used by tests and by
    /// callers that already hold a configured `reqwest::Client`.
    pub fn with_http(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json(
        &self,
        creds: &SourceCredentials,
        path: &str,
    ) -> Result<JsonValue, SourceApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(path = %path, "source API request");

        let response = self
            .http
            .get(&url)
            .basic_auth(&creds.username, Some(&creds.password))
            .header("Accept", "application/json")
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(SourceApiError::Unauthorized),
            StatusCode::FORBIDDEN => Err(SourceApiError::Forbidden),
            status if !status.is_success() => Err(SourceApiError::Status {
                status,
                path: path.to_string(),
            }),
            _ => response
                .json::<JsonValue>()
                .await
                .map_err(|_| SourceApiError::Decode {
                    path: path.to_string(),
                }),
        }
    }

    /// Full resident detail record.
    pub async fn resident(
        &self,
        creds: &SourceCredentials,
        resident_id: &str,
    ) -> Result<JsonValue, SourceApiError> {
        self.get_json(creds, &format!("/api/residents/{resident_id}"))
            .await
    }

    /// Resident basic-information record (name, birth date, diagnosis
    /// summary fields).
    pub async fn basic_information(
        &self,
        creds: &SourceCredentials,
        resident_id: &str,
    ) -> Result<JsonValue, SourceApiError> {
        self.get_json(
            creds,
            &format!("/api/residents/{resident_id}/basic-information"),
        )
        .await
    }

    /// A single leave-of-absence record.
    pub async fn leave(
        &self,
        creds: &SourceCredentials,
        resident_id: &str,
        leave_id: &str,
    ) -> Result<JsonValue, SourceApiError> {
        self.get_json(
            creds,
            &format!("/api/residents/{resident_id}/leaves/{leave_id}"),
        )
        .await
    }

    /// Community (facility) record.
    pub async fn community(
        &self,
        creds: &SourceCredentials,
        community_id: &str,
    ) -> Result<JsonValue, SourceApiError> {
        self.get_json(creds, &format!("/api/communities/{community_id}"))
            .await
    }

    /// Insurance policies for a resident.
    pub async fn insurance_policies(
        &self,
        creds: &SourceCredentials,
        resident_id: &str,
    ) -> Result<JsonValue, SourceApiError> {
        self.get_json(
            creds,
            &format!("/api/residents/{resident_id}/insurance-policies"),
        )
        .await
    }

    /// Room assignments for a resident.
    pub async fn room_assignments(
        &self,
        creds: &SourceCredentials,
        resident_id: &str,
    ) -> Result<JsonValue, SourceApiError> {
        self.get_json(
            creds,
            &format!("/api/residents/{resident_id}/room-assignments"),
        )
        .await
    }

    /// Summarized diagnoses record.
    pub async fn diagnoses_summary(
        &self,
        creds: &SourceCredentials,
        resident_id: &str,
    ) -> Result<JsonValue, SourceApiError> {
        self.get_json(
            creds,
            &format!("/api/residents/{resident_id}/diagnoses/summary"),
        )
        .await
    }

    /// Full diagnosis list.
    pub async fn diagnoses(
        &self,
        creds: &SourceCredentials,
        resident_id: &str,
    ) -> Result<JsonValue, SourceApiError> {
        self.get_json(creds, &format!("/api/residents/{resident_id}/diagnoses"))
            .await
    }

    /// Contacts on file for a resident.
    pub async fn contacts(
        &self,
        creds: &SourceCredentials,
        resident_id: &str,
    ) -> Result<JsonValue, SourceApiError> {
        self.get_json(creds, &format!("/api/residents/{resident_id}/contacts"))
            .await
    }
}
