//! Database migrations for the resident-sync service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_01_10_000001_create_tenants;
mod m2025_01_10_000002_create_tenant_credentials;
mod m2025_01_10_000003_create_event_ledger;
mod m2025_01_10_000004_create_dispatch_jobs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_10_000001_create_tenants::Migration),
            Box::new(m2025_01_10_000002_create_tenant_credentials::Migration),
            Box::new(m2025_01_10_000003_create_event_ledger::Migration),
            Box::new(m2025_01_10_000004_create_dispatch_jobs::Migration),
        ]
    }
}
