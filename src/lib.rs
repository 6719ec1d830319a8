//! Multi-tenant storefront backend.
//!
//! Every tenant-scoped unit of work runs through [`db::TenantDb`], which
//! binds the tenant id to the transaction for row-level security. Payment
//! truth comes from the processor, reconciled by [`webhooks::ReconciliationEngine`];
//! processor credentials rest encrypted behind [`vault::CredentialVault`].

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod notifications;
pub mod services;
pub mod vault;
pub mod webhooks;

use crate::{
    config::AppConfig,
    db::{DbPool, TenantDb},
    errors::ServiceError,
    notifications::NotificationSender,
    services::{
        CredentialService, OrderService, ProcessorClient, ProductService, TenantService,
    },
    vault::CredentialVault,
    webhooks::ReconciliationEngine,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: TenantDb,
    pub tenants: TenantService,
    pub orders: OrderService,
    pub products: ProductService,
    pub credentials: Arc<CredentialService>,
    pub reconciliation: Arc<ReconciliationEngine>,
}

impl AppState {
    /// Wires the service graph from its injected edges: the connection
    /// pool, the processor client, and the notification sender.
    pub fn build(
        cfg: &AppConfig,
        pool: Arc<DbPool>,
        processor: Arc<dyn ProcessorClient>,
        notifications: NotificationSender,
    ) -> Result<Self, ServiceError> {
        let db = TenantDb::new(pool);
        let key = cfg
            .vault_key_bytes()
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        let vault = CredentialVault::new(key);

        let credentials = Arc::new(CredentialService::new(
            db.clone(),
            vault,
            processor.clone(),
            cfg,
        ));
        let reconciliation = Arc::new(ReconciliationEngine::new(
            db.clone(),
            credentials.clone(),
            processor,
            notifications.clone(),
        ));

        Ok(Self {
            tenants: TenantService::new(db.clone()),
            orders: OrderService::new(db.clone(), notifications),
            products: ProductService::new(db.clone()),
            credentials,
            reconciliation,
            db,
        })
    }
}

/// Builds the full API router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::check))
        .route("/tenants", post(handlers::tenants::create))
        .route("/tenants/me", get(handlers::tenants::me))
        .route("/tenants/by-slug/:slug", get(handlers::tenants::by_slug))
        .route(
            "/products",
            post(handlers::products::create).get(handlers::products::list),
        )
        .route(
            "/products/:id",
            get(handlers::products::get)
                .put(handlers::products::update)
                .delete(handlers::products::delete),
        )
        .route(
            "/orders",
            post(handlers::orders::create).get(handlers::orders::list),
        )
        .route("/orders/:id", get(handlers::orders::get))
        .route("/orders/:id/status", post(handlers::orders::transition))
        .route("/payments/oauth/start", get(handlers::oauth::start))
        .route("/payments/oauth/callback", get(handlers::oauth::callback))
        .route("/webhooks/payments", post(handlers::webhooks::receive))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state)
}
