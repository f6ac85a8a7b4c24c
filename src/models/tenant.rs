//! Tenant entity model
//!
//! A tenant is a source-system customer sending lifecycle events, identified
//! on the wire by its stable `tenant_key`.

use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    /// Unique identifier for the tenant (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Stable external key presented on inbound webhooks (unique)
    pub tenant_key: String,

    /// Optional display name
    pub name: Option<String>,

    /// Timestamp when the tenant was first seen
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::event_ledger::Entity")]
    EventLedger,
    #[sea_orm(has_one = "super::tenant_credential::Entity")]
    TenantCredential,
}

impl Related<super::event_ledger::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EventLedger.def()
    }
}

impl Related<super::tenant_credential::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TenantCredential.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
