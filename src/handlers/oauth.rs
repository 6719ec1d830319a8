use crate::{errors::ServiceError, handlers::TenantId, AppState};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub authorization_url: String,
}

/// Begins the processor connect flow for the requesting tenant. The
/// returned URL carries a single-use state token; the merchant finishes
/// the flow at the processor and lands on the callback below.
pub async fn start(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
) -> Result<Json<ConnectResponse>, ServiceError> {
    let authorization_url = state.credentials.authorization_url(tenant_id)?;
    Ok(Json(ConnectResponse { authorization_url }))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    pub state: String,
}

/// OAuth redirect target. Unauthenticated by design; trust comes from the
/// single-use state token issued at start.
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let tenant_id = state
        .credentials
        .complete_connection(&query.code, &query.state)
        .await?;
    Ok(Json(json!({ "connected": true, "tenant_id": tenant_id })))
}
