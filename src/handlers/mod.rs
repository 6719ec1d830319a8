//! HTTP surface. Handlers stay thin: extract, delegate to a service, map
//! the result to a response. Status-code policy lives on `ServiceError`.

pub mod health;
pub mod oauth;
pub mod orders;
pub mod products;
pub mod tenants;
pub mod webhooks;

use crate::{errors::ServiceError, AppState};
use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

pub const TENANT_HEADER: &str = "x-tenant-id";

/// Tenant identity for tenant-scoped endpoints, taken from the
/// `X-Tenant-Id` header and checked against the tenant registry. A missing
/// header, a malformed id, and a deactivated tenant are all rejected before
/// the handler body runs.
#[derive(Debug, Clone, Copy)]
pub struct TenantId(pub Uuid);

#[async_trait::async_trait]
impl FromRequestParts<AppState> for TenantId {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ServiceError::Unauthorized(format!("missing {} header", TENANT_HEADER))
            })?;

        let tenant_id = Uuid::parse_str(raw).map_err(|_| {
            ServiceError::Unauthorized(format!("{} is not a valid tenant id", TENANT_HEADER))
        })?;

        state.tenants.require_active(tenant_id).await?;
        Ok(TenantId(tenant_id))
    }
}
