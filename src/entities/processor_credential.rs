use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Connected-processor credentials for one tenant.
///
/// Access and refresh tokens are stored only as vault ciphertext; the
/// processor account id routes inbound webhooks back to the owning tenant.
/// Token material must never appear in logs.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "processor_credentials")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub tenant_id: Uuid,

    /// The processor's identifier for the connected merchant.
    #[sea_orm(unique)]
    pub processor_account_id: String,

    pub access_token_ciphertext: String,
    pub refresh_token_ciphertext: String,
    pub token_expires_at: DateTime<Utc>,

    pub installments_enabled: bool,
    pub max_installments: i32,
    /// Comma-separated processor method ids the tenant excludes at checkout.
    pub excluded_payment_methods: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
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
