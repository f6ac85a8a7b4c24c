//! Sink-system API access
//!
//! [`token`] manages the OAuth client-credentials token lifecycle;
//! [`client`] performs the idempotent record lookups and upserts against
//! the sink's table API.

pub mod client;
pub mod token;

pub use client::{RecordPatch, SinkClient, SinkError, SinkRow};
pub use token::{TokenCache, TokenError};
