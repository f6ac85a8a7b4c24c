//! # Tenant Repository
//!
//! Tenants are registered automatically the first time an event arrives
//! carrying their key, so intake never rejects a webhook for an unknown
//! tenant.

use crate::error::{RepositoryError, is_unique_violation};
use crate::models::tenant::{
    ActiveModel as TenantActiveModel, Column as TenantColumn, Entity as Tenant,
    Model as TenantModel,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

/// Repository for Tenant database operations
pub struct TenantRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> TenantRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Look up a tenant by its stable key.
    pub async fn find_by_key(&self, tenant_key: &str) -> Result<Option<TenantModel>, RepositoryError> {
        let tenant = Tenant::find()
            .filter(TenantColumn::TenantKey.eq(tenant_key))
            .one(self.db)
            .await?;
        Ok(tenant)
    }

    /// Look up a tenant by key, registering it if unknown.
    ///
    /// A concurrent insert of the same key loses the unique-index race and
    /// falls back to reading the winner's row.
    pub async fn find_or_create_by_key(
        &self,
        tenant_key: &str,
    ) -> Result<TenantModel, RepositoryError> {
        let trimmed = tenant_key.trim();
        if trimmed.is_empty() {
            return Err(RepositoryError::Validation(
                "tenant key cannot be empty".to_string(),
            ));
        }

        if let Some(existing) = self.find_by_key(trimmed).await? {
            return Ok(existing);
        }

        let tenant = TenantActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_key: Set(trimmed.to_string()),
            name: Set(None),
            created_at: Set(Utc::now().into()),
        };

        match tenant.insert(self.db).await {
            Ok(created) => Ok(created),
            Err(err) if is_unique_violation(&err) => self
                .find_by_key(trimmed)
                .await?
                .ok_or_else(|| RepositoryError::NotFound("tenant vanished after race".to_string())),
            Err(err) => Err(err.into()),
        }
    }

    /// Look up a tenant by id.
    pub async fn find_by_id(&self, tenant_id: Uuid) -> Result<Option<TenantModel>, RepositoryError> {
        let tenant = Tenant::find_by_id(tenant_id).one(self.db).await?;
        Ok(tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::MigratorTrait;
    use sea_orm::Database;

    async fn setup_test_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_find_or_create_registers_new_tenant() {
        let db = setup_test_db().await;
        let repo = TenantRepository::new(&db);

        let created = repo.find_or_create_by_key("acme").await.unwrap();
        assert_eq!(created.tenant_key, "acme");

        let again = repo.find_or_create_by_key("acme").await.unwrap();
        assert_eq!(again.id, created.id);
    }

    #[tokio::test]
    async fn test_find_or_create_trims_key() {
        let db = setup_test_db().await;
        let repo = TenantRepository::new(&db);

        let created = repo.find_or_create_by_key("  acme  ").await.unwrap();
        assert_eq!(created.tenant_key, "acme");
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let db = setup_test_db().await;
        let repo = TenantRepository::new(&db);
        assert!(repo.find_or_create_by_key("   ").await.is_err());
    }

    #[tokio::test]
    async fn test_find_by_key_missing_is_none() {
        let db = setup_test_db().await;
        let repo = TenantRepository::new(&db);
        assert!(repo.find_by_key("ghost").await.unwrap().is_none());
    }
}
