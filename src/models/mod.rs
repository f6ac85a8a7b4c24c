//! SeaORM entity models for the resident-sync service.

pub mod dispatch_job;
pub mod event_ledger;
pub mod tenant;
pub mod tenant_credential;
