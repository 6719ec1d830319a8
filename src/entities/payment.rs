use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One processor-side payment record tied to exactly one order.
///
/// `(tenant_id, external_payment_id)` is unique (enforced by the schema's
/// composite index): duplicate webhook delivery for the same processor
/// payment id updates this row instead of creating a second one. The raw
/// provider payload is stored opaquely for audit/replay.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,
    pub order_id: String,

    pub external_payment_id: String,

    /// Mirrors a subset of the order status vocabulary.
    pub status: String,
    pub method: Option<String>,

    pub amount: Decimal,
    pub currency: String,

    pub raw_payload: Json,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
