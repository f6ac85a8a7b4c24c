//! # Credential Resolver
//!
//! Resolves the source-system credentials to use for a tenant: the
//! tenant's own stored pair when one exists, otherwise the shared default
//! pair from configuration. A stored credential that cannot be decrypted
//! is a hard failure, never silently replaced by the default.

use crate::crypto::{self, CredentialKey, CryptoError};
use crate::error::RepositoryError;
use crate::models::tenant::Model as TenantModel;
use crate::models::tenant_credential::{
    ActiveModel as CredentialActiveModel, Column as CredentialColumn, Entity as TenantCredential,
    Model as CredentialModel,
};
use crate::source::client::SourceCredentials;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("no credentials available for tenant '{0}' and no default configured")]
    Missing(String),

    #[error("tenant '{0}' has stored credentials but no credential key is configured")]
    KeyUnavailable(String),

    #[error("stored credential for tenant '{tenant_key}' cannot be decrypted: {source}")]
    Decrypt {
        tenant_key: String,
        source: CryptoError,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Shared default credentials from configuration.
#[derive(Clone)]
pub struct DefaultCredentials {
    pub username: String,
    pub password: String,
}

/// Resolves per-tenant source credentials.
pub struct CredentialResolver<'a> {
    db: &'a DatabaseConnection,
    key: Option<&'a CredentialKey>,
    default: Option<&'a DefaultCredentials>,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(
        db: &'a DatabaseConnection,
        key: Option<&'a CredentialKey>,
        default: Option<&'a DefaultCredentials>,
    ) -> Self {
        Self { db, key, default }
    }

    /// Resolve the credentials to use for a tenant.
    pub async fn resolve(&self, tenant: &TenantModel) -> Result<SourceCredentials, CredentialError> {
        let stored = TenantCredential::find()
            .filter(CredentialColumn::TenantId.eq(tenant.id))
            .one(self.db)
            .await
            .map_err(RepositoryError::from)?;

        match stored {
            Some(row) => {
                let key = self
                    .key
                    .ok_or_else(|| CredentialError::KeyUnavailable(tenant.tenant_key.clone()))?;
                let password = crypto::decrypt_password(
                    key,
                    &tenant.tenant_key,
                    &row.username,
                    &row.password_ciphertext,
                )
                .map_err(|source| CredentialError::Decrypt {
                    tenant_key: tenant.tenant_key.clone(),
                    source,
                })?;
                debug!(tenant_key = %tenant.tenant_key, "using tenant-specific source credentials");
                Ok(SourceCredentials {
                    username: row.username,
                    password,
                })
            }
            None => {
                let default = self
                    .default
                    .ok_or_else(|| CredentialError::Missing(tenant.tenant_key.clone()))?;
                debug!(tenant_key = %tenant.tenant_key, "using shared default source credentials");
                Ok(SourceCredentials {
                    username: default.username.clone(),
                    password: default.password.clone(),
                })
            }
        }
    }

    /// Store (or rotate) a tenant's credentials, encrypting the password
    /// with AAD bound to the tenant key and username.
    pub async fn store(
        &self,
        tenant: &TenantModel,
        username: &str,
        password: &str,
    ) -> Result<CredentialModel, CredentialError> {
        let key = self
            .key
            .ok_or_else(|| CredentialError::KeyUnavailable(tenant.tenant_key.clone()))?;
        let ciphertext = crypto::encrypt_password(key, &tenant.tenant_key, username, password)
            .map_err(|source| CredentialError::Decrypt {
                tenant_key: tenant.tenant_key.clone(),
                source,
            })?;

        let now = Utc::now();
        let existing = TenantCredential::find()
            .filter(CredentialColumn::TenantId.eq(tenant.id))
            .one(self.db)
            .await
            .map_err(RepositoryError::from)?;

        let saved = match existing {
            Some(row) => {
                let mut active = row.into_active_model();
                active.username = Set(username.to_string());
                active.password_ciphertext = Set(ciphertext);
                active.updated_at = Set(now.into());
                active.update(self.db).await.map_err(RepositoryError::from)?
            }
            None => {
                let active = CredentialActiveModel {
                    id: Set(Uuid::new_v4()),
                    tenant_id: Set(tenant.id),
                    username: Set(username.to_string()),
                    password_ciphertext: Set(ciphertext),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                };
                active.insert(self.db).await.map_err(RepositoryError::from)?
            }
        };
        Ok(saved)
    }
}
