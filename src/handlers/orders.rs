use crate::{
    entities::order,
    errors::ServiceError,
    handlers::TenantId,
    models::OrderStatus,
    services::orders::{CreateOrder, OrderListQuery},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: OrderStatus,
}

pub async fn create(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Json(input): Json<CreateOrder>,
) -> Result<(StatusCode, Json<order::Model>), ServiceError> {
    let created = state.orders.create_draft(tenant_id, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<Vec<order::Model>>, ServiceError> {
    Ok(Json(state.orders.list(tenant_id, query).await?))
}

pub async fn get(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(order_id): Path<String>,
) -> Result<Json<order::Model>, ServiceError> {
    Ok(Json(state.orders.get(tenant_id, &order_id).await?))
}

/// Merchant/storefront-driven status change; rejected when the state
/// machine does not allow the edge.
pub async fn transition(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(order_id): Path<String>,
    Json(body): Json<TransitionRequest>,
) -> Result<Json<order::Model>, ServiceError> {
    let updated = state
        .orders
        .transition(tenant_id, &order_id, body.status)
        .await?;
    Ok(Json(updated))
}
