use crate::models::OrderStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// One purchase attempt, owned exclusively by its tenant.
///
/// The id is the storefront's order code (it is what the processor echoes
/// back in the external reference). Orders are created in `draft` by the
/// public storefront flow, mutated only through the status state machine,
/// and never hard-deleted once a payment has touched them.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub tenant_id: Uuid,
    pub status: String,

    pub total_amount: Decimal,
    pub currency: String,

    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,

    /// Merchant-order reference at the processor, when one exists.
    pub merchant_order_ref: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    /// Parsed status. Unknown strings surface as a database-integrity
    /// problem rather than being silently coerced.
    pub fn order_status(&self) -> Result<OrderStatus, DbErr> {
        OrderStatus::from_str(&self.status)
            .map_err(|_| DbErr::Custom(format!("order {} has unknown status {}", self.id, self.status)))
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id"
    )]
    Tenant,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
