use crate::{
    entities::product,
    errors::ServiceError,
    handlers::TenantId,
    services::products::{CreateProduct, ProductListQuery, UpdateProduct},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

pub async fn create(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Json(input): Json<CreateProduct>,
) -> Result<(StatusCode, Json<product::Model>), ServiceError> {
    let created = state.products.create(tenant_id, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<Vec<product::Model>>, ServiceError> {
    Ok(Json(state.products.list(tenant_id, query).await?))
}

pub async fn get(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(product_id): Path<Uuid>,
) -> Result<Json<product::Model>, ServiceError> {
    Ok(Json(state.products.get(tenant_id, product_id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(product_id): Path<Uuid>,
    Json(input): Json<UpdateProduct>,
) -> Result<Json<product::Model>, ServiceError> {
    Ok(Json(
        state.products.update(tenant_id, product_id, input).await?,
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(product_id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.products.delete(tenant_id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
