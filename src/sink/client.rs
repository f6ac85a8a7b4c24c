//! Sink table-API client
//!
//! Record lookup and idempotent upserts against the sink's REST table API.
//! All calls go through one retry wrapper: a 401 invalidates the token
//! cache and retries exactly once, while 429, 5xx and transport timeouts
//! back off exponentially up to the configured attempt budget. Any other
//! failure surfaces immediately.

use metrics::counter;
use reqwest::{Method, StatusCode};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::SinkConfig;
use crate::mapper::extract;
use crate::mapper::fields;
use crate::sink::token::{TokenCache, TokenError};

/// A flat set of sink column values, keyed by column name.
pub type RecordPatch = BTreeMap<String, JsonValue>;

/// A record as returned by the sink's table API.
#[derive(Debug, Clone)]
pub struct SinkRow {
    /// System-assigned row identifier. Read-only; never sent back.
    pub row_id: Option<String>,
    /// Raw column values.
    pub values: JsonValue,
}

impl SinkRow {
    fn from_value(value: &JsonValue) -> Self {
        Self {
            row_id: extract::first_string(value, &[fields::ROW_ID, "row_id", "RowId", "id"]),
            values: value.clone(),
        }
    }

    /// Column value as a trimmed non-empty string.
    pub fn value_str(&self, column: &str) -> Option<String> {
        extract::first_string(&self.values, &[column])
    }

    /// Whether the row already carries a non-empty value for a column.
    pub fn has_value(&self, column: &str) -> bool {
        self.value_str(column).is_some()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("invalid sink URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("sink request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("sink returned {status} for {operation}: {body}")]
    Status {
        status: StatusCode,
        operation: String,
        body: String,
    },

    #[error("sink returned a non-JSON body for {operation}")]
    Decode { operation: String },

    #[error("sink still failing after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// HTTP client for the sink's table API.
pub struct SinkClient {
    http: reqwest::Client,
    tokens: Arc<TokenCache>,
    api_base: String,
    table: String,
    max_attempts: u32,
}

impl SinkClient {
    pub fn new(config: &SinkConfig) -> Result<Self, SinkError> {
        let api_base = Url::parse(&config.api_base)?;
        Url::parse(&config.token_url)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let tokens = Arc::new(TokenCache::new(
            http.clone(),
            &config.token_url,
            &config.client_id,
            &config.client_secret,
        ));
        Ok(Self {
            http,
            tokens,
            api_base: api_base.as_str().trim_end_matches('/').to_string(),
            table: config.table.clone(),
            max_attempts: config.max_attempts.max(1),
        })
    }

    fn records_url(&self) -> String {
        format!("{}/tables/{}/records", self.api_base, self.table)
    }

    /// Find the occupancy record for a resident in a community.
    ///
    /// Looks up by the composite (community id, resident id) key first.
    /// When nothing matches, falls back to a resident-only lookup so
    /// records written before community ids were tracked are still found;
    /// a fallback row whose community id contradicts the expected one is
    /// never adopted.
    pub async fn find_record(
        &self,
        community_id: Option<&str>,
        resident_id: &str,
    ) -> Result<Option<SinkRow>, SinkError> {
        if let Some(community_id) = community_id {
            let filter = serde_json::json!({
                fields::COMMUNITY_ID: community_id,
                fields::RESIDENT_ID: resident_id,
            });
            let rows = self.query_records(&filter).await?;
            if !rows.is_empty() {
                if rows.len() > 1 {
                    warn!(
                        resident_id = %resident_id,
                        community_id = %community_id,
                        matches = rows.len(),
                        "multiple sink records match composite key, using first"
                    );
                }
                return Ok(rows.into_iter().next());
            }
        }

        let filter = serde_json::json!({ fields::RESIDENT_ID: resident_id });
        let rows = self.query_records(&filter).await?;
        for row in rows {
            match (community_id, row.value_str(fields::COMMUNITY_ID)) {
                (Some(expected), Some(actual)) if actual != expected => continue,
                _ => {
                    warn!(
                        resident_id = %resident_id,
                        row_id = row.row_id.as_deref().unwrap_or("-"),
                        "adopted legacy sink record found by resident-only lookup"
                    );
                    return Ok(Some(row));
                }
            }
        }
        Ok(None)
    }

    /// Insert a new record. The system-assigned row id column is stripped
    /// before sending.
    pub async fn insert_record(&self, patch: &RecordPatch) -> Result<(), SinkError> {
        let body = sanitized(patch);
        let url = self.records_url();
        self.send(Method::POST, &url, Some(&body), "insert record")
            .await?;
        Ok(())
    }

    /// Update an existing record by row id. The row id column itself is
    /// stripped from the body before sending.
    pub async fn update_record(&self, row_id: &str, patch: &RecordPatch) -> Result<(), SinkError> {
        let body = sanitized(patch);
        let url = format!("{}/{}", self.records_url(), row_id);
        self.send(Method::PATCH, &url, Some(&body), "update record")
            .await?;
        Ok(())
    }

    async fn query_records(&self, filter: &JsonValue) -> Result<Vec<SinkRow>, SinkError> {
        let url = self.records_url();
        let filter_param = filter.to_string();
        let operation = "query records";

        let body = self
            .send_with(operation, |token| {
                self.http
                    .request(Method::GET, &url)
                    .bearer_auth(token)
                    .header("Accept", "application/json")
                    .query(&[("filter", filter_param.as_str())])
            })
            .await?;

        let rows = extract::unwrap_list(&body)
            .map(|items| items.iter().map(SinkRow::from_value).collect())
            .unwrap_or_default();
        Ok(rows)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&JsonValue>,
        operation: &str,
    ) -> Result<JsonValue, SinkError> {
        self.send_with(operation, |token| {
            let mut request = self
                .http
                .request(method.clone(), url)
                .bearer_auth(token)
                .header("Accept", "application/json");
            if let Some(body) = body {
                request = request.json(body);
            }
            request
        })
        .await
    }

    /// Retry wrapper shared by every sink call.
    async fn send_with<F>(&self, operation: &str, build: F) -> Result<JsonValue, SinkError>
    where
        F: Fn(String) -> reqwest::RequestBuilder,
    {
        let mut attempt: u32 = 1;
        let mut reauthed = false;

        loop {
            let token = self.tokens.bearer().await?;
            let result = build(token).send().await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        if status == StatusCode::NO_CONTENT {
                            return Ok(JsonValue::Null);
                        }
                        return response.json::<JsonValue>().await.map_err(|_| {
                            SinkError::Decode {
                                operation: operation.to_string(),
                            }
                        });
                    }

                    if status == StatusCode::UNAUTHORIZED && !reauthed {
                        debug!(operation = %operation, "sink returned 401, refreshing token");
                        self.tokens.invalidate().await;
                        reauthed = true;
                        continue;
                    }

                    let retryable = status == StatusCode::TOO_MANY_REQUESTS
                        || status.is_server_error();
                    if retryable && attempt < self.max_attempts {
                        let delay = backoff_delay(attempt);
                        counter!("sink_request_retries").increment(1);
                        warn!(
                            operation = %operation,
                            status = %status,
                            attempt = attempt,
                            delay_secs = delay.as_secs(),
                            "sink request failed, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();
                    let err = SinkError::Status {
                        status,
                        operation: operation.to_string(),
                        body: truncate(&body, 500),
                    };
                    if retryable {
                        return Err(SinkError::RetriesExhausted {
                            attempts: attempt,
                            last: err.to_string(),
                        });
                    }
                    return Err(err);
                }
                Err(err) => {
                    let retryable = err.is_timeout() || err.is_connect();
                    if retryable && attempt < self.max_attempts {
                        let delay = backoff_delay(attempt);
                        counter!("sink_request_retries").increment(1);
                        warn!(
                            operation = %operation,
                            error = %err,
                            attempt = attempt,
                            delay_secs = delay.as_secs(),
                            "sink request errored, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    if retryable {
                        return Err(SinkError::RetriesExhausted {
                            attempts: attempt,
                            last: err.to_string(),
                        });
                    }
                    return Err(SinkError::Network(err));
                }
            }
        }
    }
}

/// 1s, 2s, 4s, ... for attempts 1, 2, 3, ...
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << (attempt.saturating_sub(1)).min(6))
}

/// Copy of the patch without the system-assigned row id column.
fn sanitized(patch: &RecordPatch) -> JsonValue {
    let map: serde_json::Map<String, JsonValue> = patch
        .iter()
        .filter(|(key, _)| key.as_str() != fields::ROW_ID)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    JsonValue::Object(map)
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    }
}
