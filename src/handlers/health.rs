use crate::{db, AppState};
use axum::{extract::State, http::StatusCode, Json};
use serde_json::json;

/// Liveness plus a database ping.
pub async fn check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match db::check_connection(state.db.pool()).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "database": "up" })),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "database": "down" })),
        ),
    }
}
