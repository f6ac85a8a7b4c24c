//! # Repository Layer
//!
//! Database access for the sync pipeline: tenant registration, the event
//! ledger, the dispatch queue and per-tenant source credentials.

pub mod credential;
pub mod dispatch;
pub mod ledger;
pub mod tenant;

pub use credential::{CredentialError, CredentialResolver};
pub use dispatch::DispatchRepository;
pub use ledger::LedgerRepository;
pub use tenant::TenantRepository;
