//! Source-system API access
//!
//! [`client`] is the thin HTTP layer over the source vendor's REST API;
//! [`aggregator`] fans out the per-resident fetches and assembles the
//! snapshot the mapper consumes.

pub mod aggregator;
pub mod client;

pub use aggregator::{FetchError, Fetched, ResidentSnapshot, SnapshotFetcher};
pub use client::{SourceApiError, SourceClient, SourceCredentials};
