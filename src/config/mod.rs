//! Configuration loading for the resident-sync service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `RESSYNC_`, producing a typed [`AppConfig`].

use std::{env, net::SocketAddr, path::PathBuf};

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application configuration derived from `RESSYNC_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    /// AES-256-GCM key protecting stored tenant credentials (32 bytes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_key: Option<Vec<u8>>,
    /// Base URL of the source system's REST API.
    #[serde(default = "default_source_api_base")]
    pub source_api_base: String,
    /// Shared default source credentials for tenants without their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_default_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_default_password: Option<String>,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Sink (tabular store) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Base URL of the sink's REST API.
    #[serde(default = "default_sink_api_base")]
    pub api_base: String,
    /// OAuth2 client-credentials token endpoint.
    #[serde(default = "default_sink_token_url")]
    pub token_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Target table name for resident records.
    #[serde(default = "default_sink_table")]
    pub table: String,
    /// Maximum attempts per sink call, including the first (default: 3).
    #[serde(default = "default_sink_max_attempts")]
    pub max_attempts: u32,
}

/// Dispatch queue worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Milliseconds between worker ticks (default: 2000).
    #[serde(default = "default_dispatch_tick_ms")]
    pub tick_ms: u64,
    /// Maximum number of jobs executed concurrently (default: 5).
    #[serde(default = "default_dispatch_concurrency")]
    pub concurrency: usize,
    /// Maximum jobs claimed per tick (default: 25).
    #[serde(default = "default_dispatch_claim_batch")]
    pub claim_batch: usize,
    /// Attempt budget per job before it is retained as failed (default: 5).
    #[serde(default = "default_dispatch_max_attempts")]
    pub max_attempts: i32,
    /// Base retry backoff in seconds; doubles per completed attempt.
    #[serde(default = "default_dispatch_base_seconds")]
    pub base_seconds: u64,
    /// Upper bound for retry backoff in seconds.
    #[serde(default = "default_dispatch_max_seconds")]
    pub max_seconds: u64,
    /// Jitter factor applied to backoff (0.0 to 1.0).
    #[serde(default = "default_dispatch_jitter_factor")]
    pub jitter_factor: f64,
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
    #[error("credential key must be 32 bytes after base64 decoding, got {got}")]
    InvalidCredentialKeyLength { got: usize },
    #[error("failed to decode RESSYNC_CREDENTIAL_KEY as base64: {0}")]
    InvalidCredentialKeyEncoding(String),
    #[error("dispatch backoff bounds invalid: base {base}s exceeds max {max}s")]
    InvalidDispatchBackoff { base: u64, max: u64 },
    #[error("dispatch jitter factor {value} outside 0.0..=1.0")]
    InvalidDispatchJitter { value: f64 },
    #[error("dispatch concurrency must be between 1 and 64, got {value}")]
    InvalidDispatchConcurrency { value: usize },
    #[error("sink max attempts must be between 1 and 10, got {value}")]
    InvalidSinkAttempts { value: u32 },
    #[error("failed to serialize configuration: {0}")]
    Serialization(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            credential_key: None,
            source_api_base: default_source_api_base(),
            source_default_username: None,
            source_default_password: None,
            sink: SinkConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            api_base: default_sink_api_base(),
            token_url: default_sink_token_url(),
            client_id: String::new(),
            client_secret: String::new(),
            table: default_sink_table(),
            max_attempts: default_sink_max_attempts(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_dispatch_tick_ms(),
            concurrency: default_dispatch_concurrency(),
            claim_batch: default_dispatch_claim_batch(),
            max_attempts: default_dispatch_max_attempts(),
            base_seconds: default_dispatch_base_seconds(),
            max_seconds: default_dispatch_max_seconds(),
            jitter_factor: default_dispatch_jitter_factor(),
        }
    }
}

impl DispatchConfig {
    /// Validate dispatch configuration bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_seconds > self.max_seconds {
            return Err(ConfigError::InvalidDispatchBackoff {
                base: self.base_seconds,
                max: self.max_seconds,
            });
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::InvalidDispatchJitter {
                value: self.jitter_factor,
            });
        }
        if self.concurrency == 0 || self.concurrency > 64 {
            return Err(ConfigError::InvalidDispatchConcurrency {
                value: self.concurrency,
            });
        }
        Ok(())
    }
}

impl SinkConfig {
    /// Validate sink configuration bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 || self.max_attempts > 10 {
            return Err(ConfigError::InvalidSinkAttempts {
                value: self.max_attempts,
            });
        }
        Ok(())
    }
}

impl AppConfig {
    /// Validate the full configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(key) = &self.credential_key
            && key.len() != 32
        {
            return Err(ConfigError::InvalidCredentialKeyLength { got: key.len() });
        }
        self.dispatch.validate()?;
        self.sink.validate()?;
        Ok(())
    }

    /// Resolve the configured API bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Serialize the configuration with secrets redacted, for startup logging.
    pub fn redacted_json(&self) -> Result<String, ConfigError> {
        let mut clone = self.clone();
        clone.credential_key = None;
        if clone.source_default_password.is_some() {
            clone.source_default_password = Some("[REDACTED]".to_string());
        }
        if !clone.sink.client_secret.is_empty() {
            clone.sink.client_secret = "[REDACTED]".to_string();
        }
        serde_json::to_string(&clone).map_err(|e| ConfigError::Serialization(e.to_string()))
    }
}

/// Loads [`AppConfig`] from layered `.env` files and the process environment.
pub struct ConfigLoader {
    env_dir: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { env_dir: None }
    }

    /// Load `.env` files from an explicit directory instead of the CWD.
    pub fn with_env_dir(dir: PathBuf) -> Self {
        Self { env_dir: Some(dir) }
    }

    /// Load configuration: `.env`, then `.env.<profile>`, then process
    /// environment variables, later layers winning.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let base = self.env_dir.clone().unwrap_or_else(|| PathBuf::from("."));

        // Missing files are fine; only the process env is mandatory.
        let _ = dotenvy::from_path(base.join(".env"));
        let profile = env_var("PROFILE").unwrap_or_else(default_profile);
        let _ = dotenvy::from_path_override(base.join(format!(".env.{profile}")));

        let mut config = AppConfig {
            profile,
            ..AppConfig::default()
        };

        if let Some(v) = env_var("API_BIND_ADDR") {
            config.api_bind_addr = v;
        }
        if let Some(v) = env_var("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Some(v) = env_var("LOG_FORMAT") {
            config.log_format = v;
        }
        if let Some(v) = env_var("DATABASE_URL") {
            config.database_url = v;
        }
        if let Some(v) = env_var("DB_MAX_CONNECTIONS") {
            config.db_max_connections = parse_var("DB_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = env_var("DB_ACQUIRE_TIMEOUT_MS") {
            config.db_acquire_timeout_ms = parse_var("DB_ACQUIRE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = env_var("CREDENTIAL_KEY") {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(v.trim())
                .map_err(|e| ConfigError::InvalidCredentialKeyEncoding(e.to_string()))?;
            config.credential_key = Some(decoded);
        }
        if let Some(v) = env_var("SOURCE_API_BASE") {
            config.source_api_base = v;
        }
        config.source_default_username = env_var("SOURCE_DEFAULT_USERNAME");
        config.source_default_password = env_var("SOURCE_DEFAULT_PASSWORD");

        if let Some(v) = env_var("SINK_API_BASE") {
            config.sink.api_base = v;
        }
        if let Some(v) = env_var("SINK_TOKEN_URL") {
            config.sink.token_url = v;
        }
        if let Some(v) = env_var("SINK_CLIENT_ID") {
            config.sink.client_id = v;
        }
        if let Some(v) = env_var("SINK_CLIENT_SECRET") {
            config.sink.client_secret = v;
        }
        if let Some(v) = env_var("SINK_TABLE") {
            config.sink.table = v;
        }
        if let Some(v) = env_var("SINK_MAX_ATTEMPTS") {
            config.sink.max_attempts = parse_var("SINK_MAX_ATTEMPTS", &v)?;
        }

        if let Some(v) = env_var("DISPATCH_TICK_MS") {
            config.dispatch.tick_ms = parse_var("DISPATCH_TICK_MS", &v)?;
        }
        if let Some(v) = env_var("DISPATCH_CONCURRENCY") {
            config.dispatch.concurrency = parse_var("DISPATCH_CONCURRENCY", &v)?;
        }
        if let Some(v) = env_var("DISPATCH_CLAIM_BATCH") {
            config.dispatch.claim_batch = parse_var("DISPATCH_CLAIM_BATCH", &v)?;
        }
        if let Some(v) = env_var("DISPATCH_MAX_ATTEMPTS") {
            config.dispatch.max_attempts = parse_var("DISPATCH_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = env_var("DISPATCH_BASE_SECONDS") {
            config.dispatch.base_seconds = parse_var("DISPATCH_BASE_SECONDS", &v)?;
        }
        if let Some(v) = env_var("DISPATCH_MAX_SECONDS") {
            config.dispatch.max_seconds = parse_var("DISPATCH_MAX_SECONDS", &v)?;
        }
        if let Some(v) = env_var("DISPATCH_JITTER_FACTOR") {
            config.dispatch.jitter_factor = parse_var("DISPATCH_JITTER_FACTOR", &v)?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn env_var(suffix: &str) -> Option<String> {
    env::var(format!("RESSYNC_{suffix}"))
        .ok()
        .filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: format!("RESSYNC_{key}"),
        message: e.to_string(),
    })
}

fn default_profile() -> String {
    "dev".to_string()
}
fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_database_url() -> String {
    "sqlite::memory:".to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_acquire_timeout_ms() -> u64 {
    5_000
}
fn default_source_api_base() -> String {
    "https://api.source.invalid".to_string()
}
fn default_sink_api_base() -> String {
    "https://api.sink.invalid/v2".to_string()
}
fn default_sink_token_url() -> String {
    "https://api.sink.invalid/oauth/token".to_string()
}
fn default_sink_table() -> String {
    "Residents".to_string()
}
fn default_sink_max_attempts() -> u32 {
    3
}
fn default_dispatch_tick_ms() -> u64 {
    2_000
}
fn default_dispatch_concurrency() -> usize {
    5
}
fn default_dispatch_claim_batch() -> usize {
    25
}
fn default_dispatch_max_attempts() -> i32 {
    5
}
fn default_dispatch_base_seconds() -> u64 {
    5
}
fn default_dispatch_max_seconds() -> u64 {
    900
}
fn default_dispatch_jitter_factor() -> f64 {
    0.1
}
