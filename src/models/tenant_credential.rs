//! TenantCredential entity model
//!
//! Per-tenant source-system credentials. The password column holds
//! AES-256-GCM ciphertext produced by [`crate::crypto`]; tenants without a
//! row use the shared default credentials from configuration.

use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "tenant_credentials")]
pub struct Model {
    /// Unique identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Tenant this credential set belongs to (unique per tenant)
    pub tenant_id: Uuid,

    /// Source-system basic-auth username
    pub username: String,

    /// AES-256-GCM ciphertext of the source-system password
    #[sea_orm(column_type = "VarBinary(StringLen::None)")]
    pub password_ciphertext: Vec<u8>,

    /// Timestamp when the credential was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the credential was last rotated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id"
    )]
    Tenant,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
