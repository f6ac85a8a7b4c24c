//! # resident-sync
//!
//! Synchronizes resident lifecycle events from a senior-living source
//! system into a tabular sink store. Events arrive on a webhook, are
//! recorded exactly once in a durable ledger, and are processed
//! asynchronously: a dispatcher claims queued jobs, aggregates resident
//! data from the source API, maps it to sink columns, and upserts the
//! corresponding records with retry and backoff.

pub mod config;
pub mod crypto;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod handlers;
pub mod mapper;
pub mod models;
pub mod orchestrator;
pub mod repositories;
pub mod server;
pub mod sink;
pub mod source;
pub mod telemetry;
