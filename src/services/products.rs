use crate::{
    db::{TenantContext, TenantDb},
    entities::product,
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder, QuerySelect,
    Set,
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProduct {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub sku: Option<String>,
    #[validate(range(min = 0.0))]
    pub price: f64,
    #[validate(length(min = 3, max = 3))]
    pub currency: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProduct {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub sku: Option<String>,
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductListQuery {
    /// When set, only active (or only inactive) items.
    pub active: Option<bool>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

const DEFAULT_PAGE_SIZE: u64 = 50;
const MAX_PAGE_SIZE: u64 = 200;

fn to_decimal(value: f64, field: &str) -> Result<Decimal, ServiceError> {
    Decimal::try_from(value)
        .map_err(|_| ServiceError::ValidationError(format!("{} is not representable", field)))
}

/// Tenant-scoped catalog CRUD.
#[derive(Clone)]
pub struct ProductService {
    db: TenantDb,
}

impl ProductService {
    pub fn new(db: TenantDb) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input))]
    pub async fn create(
        &self,
        tenant_id: Uuid,
        input: CreateProduct,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;
        let price = to_decimal(input.price, "price")?;

        let created = self
            .db
            .transaction(TenantContext::Tenant(tenant_id), move |txn| {
                Box::pin(async move {
                    let model = product::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        tenant_id: Set(tenant_id),
                        name: Set(input.name),
                        description: Set(input.description),
                        sku: Set(input.sku),
                        price: Set(price),
                        currency: Set(input.currency.to_uppercase()),
                        active: Set(true),
                        created_at: Set(Utc::now()),
                        updated_at: Set(None),
                    }
                    .insert(txn)
                    .await?;
                    Ok(model)
                })
            })
            .await?;

        info!(%tenant_id, product_id = %created.id, "product created");
        Ok(created)
    }

    pub async fn get(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
    ) -> Result<product::Model, ServiceError> {
        self.db
            .transaction(TenantContext::Tenant(tenant_id), move |txn| {
                Box::pin(async move {
                    product::Entity::find_by_id(product_id)
                        .filter(product::Column::TenantId.eq(tenant_id))
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("product {} not found", product_id))
                        })
                })
            })
            .await
    }

    pub async fn list(
        &self,
        tenant_id: Uuid,
        query: ProductListQuery,
    ) -> Result<Vec<product::Model>, ServiceError> {
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
        let offset = query.offset.unwrap_or(0);

        self.db
            .transaction(TenantContext::Tenant(tenant_id), move |txn| {
                Box::pin(async move {
                    let mut select = product::Entity::find()
                        .filter(product::Column::TenantId.eq(tenant_id))
                        .order_by_asc(product::Column::Name);
                    if let Some(active) = query.active {
                        select = select.filter(product::Column::Active.eq(active));
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

    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
        input: UpdateProduct,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;
        let price = input.price.map(|p| to_decimal(p, "price")).transpose()?;

        self.db
            .transaction(TenantContext::Tenant(tenant_id), move |txn| {
                Box::pin(async move {
                    let row = product::Entity::find_by_id(product_id)
                        .filter(product::Column::TenantId.eq(tenant_id))
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("product {} not found", product_id))
                        })?;

                    let mut active: product::ActiveModel = row.into();
                    if let Some(name) = input.name {
                        active.name = Set(name);
                    }
                    if let Some(description) = input.description {
                        active.description = Set(Some(description));
                    }
                    if let Some(sku) = input.sku {
                        active.sku = Set(Some(sku));
                    }
                    if let Some(price) = price {
                        active.price = Set(price);
                    }
                    if let Some(is_active) = input.active {
                        active.active = Set(is_active);
                    }
                    active.updated_at = Set(Some(Utc::now()));

                    active.update(txn).await.map_err(ServiceError::DatabaseError)
                })
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: Uuid, product_id: Uuid) -> Result<(), ServiceError> {
        self.db
            .transaction(TenantContext::Tenant(tenant_id), move |txn| {
                Box::pin(async move {
                    let row = product::Entity::find_by_id(product_id)
                        .filter(product::Column::TenantId.eq(tenant_id))
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("product {} not found", product_id))
                        })?;
                    row.delete(txn).await?;
                    Ok(())
                })
            })
            .await?;

        info!(%tenant_id, %product_id, "product deleted");
        Ok(())
    }
}
