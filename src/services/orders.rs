use crate::{
    db::{TenantContext, TenantDb},
    entities::order,
    errors::ServiceError,
    models::OrderStatus,
    notifications::{NotificationJob, NotificationSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrder {
    #[validate(range(min = 0.01))]
    pub total_amount: f64,
    #[validate(length(min = 3, max = 3))]
    pub currency: String,
    #[validate(length(min = 1, max = 120))]
    pub customer_name: Option<String>,
    #[validate(length(min = 5, max = 32))]
    pub customer_phone: Option<String>,
    #[validate(email)]
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

const DEFAULT_PAGE_SIZE: u64 = 50;
const MAX_PAGE_SIZE: u64 = 200;

/// Storefront order codes double as the external reference sent to the
/// processor at checkout, so they are short and URL-safe.
fn new_order_code() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("order-{}", &id[..12])
}

/// Tenant-scoped order operations: creation, lookup, and the merchant/
/// storefront status transitions. Webhook-driven transitions live in the
/// reconciliation engine instead.
#[derive(Clone)]
pub struct OrderService {
    db: TenantDb,
    notifications: NotificationSender,
}

impl OrderService {
    pub fn new(db: TenantDb, notifications: NotificationSender) -> Self {
        Self { db, notifications }
    }

    #[instrument(skip(self, input))]
    pub async fn create_draft(
        &self,
        tenant_id: Uuid,
        input: CreateOrder,
    ) -> Result<order::Model, ServiceError> {
        input.validate()?;
        let amount = Decimal::try_from(input.total_amount)
            .map_err(|_| ServiceError::ValidationError("total_amount is not representable".into()))?;

        let created = self
            .db
            .transaction(TenantContext::Tenant(tenant_id), move |txn| {
                Box::pin(async move {
                    let model = order::ActiveModel {
                        id: Set(new_order_code()),
                        tenant_id: Set(tenant_id),
                        status: Set(OrderStatus::Draft.as_ref().to_string()),
                        total_amount: Set(amount),
                        currency: Set(input.currency.to_uppercase()),
                        customer_name: Set(input.customer_name),
                        customer_phone: Set(input.customer_phone),
                        customer_email: Set(input.customer_email),
                        merchant_order_ref: Set(None),
                        created_at: Set(Utc::now()),
                        updated_at: Set(None),
                    }
                    .insert(txn)
                    .await?;
                    Ok(model)
                })
            })
            .await?;

        info!(%tenant_id, order_id = %created.id, "draft order created");
        Ok(created)
    }

    pub async fn get(&self, tenant_id: Uuid, order_id: &str) -> Result<order::Model, ServiceError> {
        let order_id = order_id.to_string();
        self.db
            .transaction(TenantContext::Tenant(tenant_id), move |txn| {
                Box::pin(async move {
                    order::Entity::find_by_id(&order_id)
                        .filter(order::Column::TenantId.eq(tenant_id))
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("order {} not found", order_id))
                        })
                })
            })
            .await
    }

    pub async fn list(
        &self,
        tenant_id: Uuid,
        query: OrderListQuery,
    ) -> Result<Vec<order::Model>, ServiceError> {
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
        let offset = query.offset.unwrap_or(0);

        self.db
            .transaction(TenantContext::Tenant(tenant_id), move |txn| {
                Box::pin(async move {
                    let mut select = order::Entity::find()
                        .filter(order::Column::TenantId.eq(tenant_id))
                        .order_by_desc(order::Column::CreatedAt);
                    if let Some(status) = query.status {
                        select = select.filter(order::Column::Status.eq(status.as_ref()));
                    }
                    select
                        .limit(limit)
                        .offset(offset)
                        .all(txn)
                        .await
                        .map_err(ServiceError::DatabaseError)
                })
            })
            .await
    }

    /// Applies one edge of the status state machine.
    ///
    /// Rejects transitions the table does not allow, including anything out
    /// of a terminal status. Successful transitions enqueue a notification
    /// after the commit.
    #[instrument(skip(self))]
    pub async fn transition(
        &self,
        tenant_id: Uuid,
        order_id: &str,
        next: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let order_id = order_id.to_string();
        let (updated, job) = self
            .db
            .transaction(TenantContext::Tenant(tenant_id), move |txn| {
                Box::pin(async move {
                    let row = order::Entity::find_by_id(&order_id)
                        .filter(order::Column::TenantId.eq(tenant_id))
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("order {} not found", order_id))
                        })?;

                    let current = row.order_status()?;
                    if !current.can_transition_to(next) {
                        return Err(ServiceError::InvalidStatus(format!(
                            "cannot move order from {} to {}",
                            current, next
                        )));
                    }

                    let job = NotificationJob {
                        tenant_id,
                        order_id: row.id.clone(),
                        order_status: next,
                        customer_name: row.customer_name.clone(),
                        customer_phone: row.customer_phone.clone(),
                        customer_email: row.customer_email.clone(),
                        admin_payload: json!({ "previous_status": current }),
                    };

                    let mut active: order::ActiveModel = row.into();
                    active.status = Set(next.as_ref().to_string());
                    active.updated_at = Set(Some(Utc::now()));
                    let updated = active.update(txn).await?;
                    Ok((updated, job))
                })
            })
            .await?;

        self.notifications.enqueue(job);
        info!(%tenant_id, order_id = %updated.id, status = %next, "order transitioned");
        Ok(updated)
    }
}
