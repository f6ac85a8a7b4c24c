//! OAuth token lifecycle for the sink API
//!
//! Client-credentials tokens are cached in memory and refreshed ahead of
//! expiry with a safety margin, so concurrent dispatch workers share one
//! token instead of hammering the token endpoint. A 401 from the sink
//! invalidates the cache so the next call fetches a fresh token.

use metrics::counter;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Refresh this long before the token actually expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("token endpoint returned {0}")]
    Status(reqwest::StatusCode),

    #[error("token endpoint returned an unreadable body")]
    Decode,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Shared cache for the sink's client-credentials token.
pub struct TokenCache {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    state: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(
        http: reqwest::Client,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Self {
        Self {
            http,
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            state: Mutex::new(None),
        }
    }

    /// Current bearer token, refreshed if absent or within the expiry
    /// margin. The lock is held across the refresh so concurrent workers
    /// never race duplicate token requests.
    pub async fn bearer(&self) -> Result<String, TokenError> {
        let mut state = self.state.lock().await;

        if let Some(cached) = state.as_ref() {
            if cached.expires_at.saturating_duration_since(Instant::now()) > EXPIRY_MARGIN {
                return Ok(cached.access_token.clone());
            }
        }

        let fresh = self.request_token().await?;
        let token = fresh.access_token.clone();
        *state = Some(fresh);
        Ok(token)
    }

    /// Drop the cached token. Called after the sink answers 401 so the
    /// retry authenticates with a fresh token.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        *state = None;
        debug!("sink token cache invalidated");
    }

    async fn request_token(&self) -> Result<CachedToken, TokenError> {
        counter!("sink_token_refreshes").increment(1);
        debug!(token_url = %self.token_url, "requesting sink access token");
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TokenError::Status(response.status()));
        }

        let body: TokenResponse = response.json().await.map_err(|_| TokenError::Decode)?;
        Ok(CachedToken {
            access_token: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        })
    }
}
