//! Shared fixtures: an in-memory sqlite schema built from the entities, a
//! scriptable processor client, and recording notification channels.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, Schema, Set,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use storefront_api::{
    config::AppConfig,
    entities::{order, payment, processor_credential, product, tenant},
    errors::ServiceError,
    models::{OrderStatus, ProcessorPaymentStatus},
    notifications::{
        spawn_dispatcher, EmailChannel, MessagingChannel, NotificationChannels,
        NotificationError, RealtimeChannel,
    },
    services::processor::{ProcessorClient, ProcessorPayment, TokenExchange},
    AppState,
};
use uuid::Uuid;

pub async fn test_pool() -> Arc<DatabaseConnection> {
    let pool = Database::connect("sqlite::memory:").await.unwrap();
    let schema = Schema::new(pool.get_database_backend());

    let builder = pool.get_database_backend();
    pool.execute(builder.build(&schema.create_table_from_entity(tenant::Entity)))
        .await
        .unwrap();
    pool.execute(builder.build(&schema.create_table_from_entity(order::Entity)))
        .await
        .unwrap();
    pool.execute(builder.build(&schema.create_table_from_entity(payment::Entity)))
        .await
        .unwrap();
    pool.execute(builder.build(&schema.create_table_from_entity(processor_credential::Entity)))
        .await
        .unwrap();
    pool.execute(builder.build(&schema.create_table_from_entity(product::Entity)))
        .await
        .unwrap();

    Arc::new(pool)
}

pub fn test_app_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        host: "127.0.0.1".into(),
        port: 0,
        environment: "development".into(),
        log_level: "info".into(),
        log_json: false,
        db_max_connections: 4,
        db_min_connections: 1,
        db_connect_timeout_secs: 5,
        db_idle_timeout_secs: 60,
        db_acquire_timeout_secs: 5,
        vault_key: "8f".repeat(31) + "a1",
        processor_base_url: "http://processor.invalid".into(),
        processor_authorization_url: "https://auth.processor.invalid/authorization".into(),
        processor_client_id: "client-id".into(),
        processor_client_secret: "client-secret".into(),
        processor_redirect_url: "https://api.example.com/payments/oauth/callback".into(),
        processor_timeout_secs: 5,
        oauth_state_ttl_secs: 600,
        notification_channel_capacity: 64,
    }
}

pub async fn seed_tenant(pool: &DatabaseConnection, slug: &str) -> tenant::Model {
    tenant::ActiveModel {
        id: Set(Uuid::new_v4()),
        slug: Set(slug.to_string()),
        plan_status: Set("active".to_string()),
        active: Set(true),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    }
    .insert(pool)
    .await
    .unwrap()
}

pub async fn seed_order(
    pool: &DatabaseConnection,
    tenant_id: Uuid,
    order_id: &str,
    status: OrderStatus,
) -> order::Model {
    order::ActiveModel {
        id: Set(order_id.to_string()),
        tenant_id: Set(tenant_id),
        status: Set(status.as_ref().to_string()),
        total_amount: Set(Decimal::new(12550, 2)),
        currency: Set("BRL".to_string()),
        customer_name: Set(Some("Ana".to_string())),
        customer_phone: Set(Some("+5511999990000".to_string())),
        customer_email: Set(Some("ana@example.com".to_string())),
        merchant_order_ref: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    }
    .insert(pool)
    .await
    .unwrap()
}

pub fn processor_payment(
    id: &str,
    status: ProcessorPaymentStatus,
    external_reference: Option<&str>,
) -> ProcessorPayment {
    ProcessorPayment {
        id: id.to_string(),
        status,
        external_reference: external_reference.map(str::to_string),
        amount: Decimal::new(12550, 2),
        currency: "BRL".to_string(),
        payment_method: Some("credit_card".to_string()),
        payer_email: Some("buyer@example.com".to_string()),
        raw: serde_json::json!({ "id": id, "status": status }),
    }
}

/// Scriptable processor double. Payments are served from an in-memory map;
/// token behavior is controlled by flags so credential-refresh paths can be
/// driven deterministically.
pub struct MockProcessor {
    pub account_id: String,
    pub payments: Mutex<HashMap<String, ProcessorPayment>>,
    pub accepted_token: Mutex<String>,
    pub refresh_calls: AtomicUsize,
    pub fail_fetch: AtomicBool,
    pub fail_refresh: AtomicBool,
}

impl MockProcessor {
    pub fn new(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            payments: Mutex::new(HashMap::new()),
            accepted_token: Mutex::new("valid-access".to_string()),
            refresh_calls: AtomicUsize::new(0),
            fail_fetch: AtomicBool::new(false),
            fail_refresh: AtomicBool::new(false),
        }
    }

    pub fn put_payment(&self, p: ProcessorPayment) {
        self.payments.lock().unwrap().insert(p.id.clone(), p);
    }
}

#[async_trait]
impl ProcessorClient for MockProcessor {
    async fn exchange_authorization_code(
        &self,
        _code: &str,
    ) -> Result<TokenExchange, ServiceError> {
        Ok(TokenExchange {
            access_token: "valid-access".to_string(),
            refresh_token: "valid-refresh".to_string(),
            expires_in_seconds: 21600,
            external_user_id: self.account_id.clone(),
        })
    }

    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenExchange, ServiceError> {
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(ServiceError::ProcessorAuth(
                "refresh token revoked".to_string(),
            ));
        }
        assert_eq!(refresh_token, "valid-refresh");
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.accepted_token.lock().unwrap() = "refreshed-access".to_string();
        Ok(TokenExchange {
            access_token: "refreshed-access".to_string(),
            refresh_token: "valid-refresh".to_string(),
            expires_in_seconds: 21600,
            external_user_id: self.account_id.clone(),
        })
    }

    async fn fetch_payment(
        &self,
        access_token: &str,
        payment_id: &str,
    ) -> Result<ProcessorPayment, ServiceError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(ServiceError::ProcessorUnavailable(
                "processor maintenance window".to_string(),
            ));
        }
        if access_token != self.accepted_token.lock().unwrap().as_str() {
            return Err(ServiceError::ProcessorAuth("invalid token".to_string()));
        }
        self.payments
            .lock()
            .unwrap()
            .get(payment_id)
            .cloned()
            .ok_or_else(|| {
                ServiceError::ProcessorAuth(format!("payment {} not found", payment_id))
            })
    }
}

/// Notification channels that record every delivery.
#[derive(Default)]
pub struct RecordingChannels {
    pub pushes: Mutex<Vec<(String, String, serde_json::Value)>>,
    pub messages: Mutex<Vec<(String, String)>>,
    pub emails: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl RealtimeChannel for RecordingChannels {
    async fn push(
        &self,
        room: &str,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<(), NotificationError> {
        self.pushes
            .lock()
            .unwrap()
            .push((room.to_string(), event.to_string(), payload.clone()));
        Ok(())
    }
}

#[async_trait]
impl MessagingChannel for RecordingChannels {
    async fn send_message(&self, phone: &str, body: &str) -> Result<(), NotificationError> {
        self.messages
            .lock()
            .unwrap()
            .push((phone.to_string(), body.to_string()));
        Ok(())
    }
}

#[async_trait]
impl EmailChannel for RecordingChannels {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        _body: &str,
    ) -> Result<(), NotificationError> {
        self.emails
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub pool: Arc<DatabaseConnection>,
    pub processor: Arc<MockProcessor>,
    pub recorder: Arc<RecordingChannels>,
}

pub async fn spawn_app() -> TestApp {
    let pool = test_pool().await;
    let recorder = Arc::new(RecordingChannels::default());
    let channels = NotificationChannels {
        realtime: recorder.clone(),
        messaging: recorder.clone(),
        email: recorder.clone(),
    };
    let (sender, _dispatcher) = spawn_dispatcher(64, channels);

    let processor = Arc::new(MockProcessor::new("acct-1"));
    let cfg = test_app_config();
    let state = AppState::build(&cfg, pool.clone(), processor.clone(), sender).unwrap();

    TestApp {
        state,
        pool,
        processor,
        recorder,
    }
}

/// Connects a tenant to the mock processor with a non-expired credential.
pub async fn connect_tenant(app: &TestApp, tenant_id: Uuid) {
    let exchange = TokenExchange {
        access_token: "valid-access".to_string(),
        refresh_token: "valid-refresh".to_string(),
        expires_in_seconds: 21600,
        external_user_id: app.processor.account_id.clone(),
    };
    app.state
        .credentials
        .save_credentials(tenant_id, &exchange)
        .await
        .unwrap();
}

/// Connects a tenant whose access token has already expired, forcing the
/// next authoritative fetch through the refresh path.
pub async fn connect_tenant_expired(app: &TestApp, tenant_id: Uuid) {
    let exchange = TokenExchange {
        access_token: "stale-access".to_string(),
        refresh_token: "valid-refresh".to_string(),
        expires_in_seconds: -3600,
        external_user_id: app.processor.account_id.clone(),
    };
    app.state
        .credentials
        .save_credentials(tenant_id, &exchange)
        .await
        .unwrap();
}

/// Lets the fire-and-forget notification tasks run.
pub async fn settle_notifications() {
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
}
