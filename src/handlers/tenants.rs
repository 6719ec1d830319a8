use crate::{
    entities::tenant, errors::ServiceError, handlers::TenantId, services::tenants::CreateTenant,
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreateTenant>,
) -> Result<(StatusCode, Json<tenant::Model>), ServiceError> {
    let created = state.tenants.create(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn me(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
) -> Result<Json<tenant::Model>, ServiceError> {
    Ok(Json(state.tenants.get(tenant_id).await?))
}

/// Storefront entry point: resolves a public slug to the tenant record.
pub async fn by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<tenant::Model>, ServiceError> {
    Ok(Json(state.tenants.find_by_slug(&slug).await?))
}
