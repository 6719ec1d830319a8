use crate::{
    errors::ServiceError,
    webhooks::{IgnoreReason, PaymentWebhook, WebhookOutcome},
    AppState,
};
use axum::{extract::State, http::StatusCode, Json};
use tracing::warn;

/// Inbound processor notifications.
///
/// Both processed and ignored deliveries answer 200 so the provider stops
/// redelivering; only genuine processing failures surface an error status,
/// which is the provider's cue to retry later.
pub async fn receive(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<WebhookOutcome>), ServiceError> {
    let webhook: PaymentWebhook = match serde_json::from_value(payload) {
        Ok(parsed) => parsed,
        Err(e) => {
            // Redelivering an unparseable body can never succeed.
            warn!(error = %e, "discarding malformed webhook payload");
            return Ok((
                StatusCode::OK,
                Json(WebhookOutcome::Ignored {
                    reason: IgnoreReason::NotAPayment,
                }),
            ));
        }
    };

    let outcome = state.reconciliation.process(webhook).await?;
    Ok((StatusCode::OK, Json(outcome)))
}
