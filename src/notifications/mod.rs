//! Post-commit notification fan-out.
//!
//! Reconciliation enqueues a [`NotificationJob`] after its transaction
//! commits; a background dispatcher fans each job out to the configured
//! channels. Delivery is best-effort: a failing channel is logged and
//! never affects the already-committed order state or the other channels.

use crate::models::OrderStatus;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("channel delivery failed: {0}")]
    Delivery(String),
}

/// Everything a channel needs to notify about an order outcome, captured
/// before the enqueueing transaction's guards go out of scope.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationJob {
    pub tenant_id: Uuid,
    pub order_id: String,
    pub order_status: OrderStatus,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    /// Extra detail for merchant-facing surfaces (amounts, payment ids).
    pub admin_payload: serde_json::Value,
}

/// Pushes order updates to connected browsers (storefront and admin).
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    async fn push(
        &self,
        room: &str,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<(), NotificationError>;
}

/// Sends templated messages to the customer's phone.
#[async_trait]
pub trait MessagingChannel: Send + Sync {
    async fn send_message(&self, phone: &str, body: &str) -> Result<(), NotificationError>;
}

/// Sends order confirmation / rejection emails.
#[async_trait]
pub trait EmailChannel: Send + Sync {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotificationError>;
}

/// Stand-in channel that records deliveries in the log stream. Used until
/// a real websocket/messaging/email integration is wired in, and in tests.
#[derive(Debug, Default, Clone)]
pub struct LoggingChannel;

#[async_trait]
impl RealtimeChannel for LoggingChannel {
    async fn push(
        &self,
        room: &str,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<(), NotificationError> {
        info!(%room, %event, %payload, "realtime push");
        Ok(())
    }
}

#[async_trait]
impl MessagingChannel for LoggingChannel {
    async fn send_message(&self, phone: &str, body: &str) -> Result<(), NotificationError> {
        info!(%phone, %body, "customer message");
        Ok(())
    }
}

#[async_trait]
impl EmailChannel for LoggingChannel {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        _body: &str,
    ) -> Result<(), NotificationError> {
        info!(%to, %subject, "customer email");
        Ok(())
    }
}

/// Cheap handle handed to services that need to enqueue notifications.
#[derive(Clone)]
pub struct NotificationSender {
    tx: mpsc::Sender<NotificationJob>,
}

impl NotificationSender {
    /// Enqueues without waiting. A full queue drops the job with a warning;
    /// notifications are advisory and must never block reconciliation.
    pub fn enqueue(&self, job: NotificationJob) {
        if let Err(e) = self.tx.try_send(job) {
            warn!(error = %e, "notification queue full, dropping job");
            metrics::counter!("storefront_notifications.dropped", 1);
        }
    }
}

/// The set of delivery channels a dispatcher fans out to.
pub struct NotificationChannels {
    pub realtime: Arc<dyn RealtimeChannel>,
    pub messaging: Arc<dyn MessagingChannel>,
    pub email: Arc<dyn EmailChannel>,
}

impl NotificationChannels {
    pub fn logging_only() -> Self {
        let chan = Arc::new(LoggingChannel);
        Self {
            realtime: chan.clone(),
            messaging: chan.clone(),
            email: chan,
        }
    }
}

/// Spawns the background dispatcher and returns the sender half plus the
/// worker's join handle. The worker exits when every sender is dropped.
pub fn spawn_dispatcher(
    capacity: usize,
    channels: NotificationChannels,
) -> (NotificationSender, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<NotificationJob>(capacity);
    let channels = Arc::new(channels);

    let handle = tokio::spawn(async move {
        info!("notification dispatcher started");
        while let Some(job) = rx.recv().await {
            dispatch(channels.clone(), job);
        }
        info!("notification dispatcher stopped");
    });

    (NotificationSender { tx }, handle)
}

/// Fans a single job out, one task per delivery so channels cannot stall
/// or fail each other.
#[instrument(skip_all, fields(tenant_id = %job.tenant_id, order_id = %job.order_id))]
fn dispatch(channels: Arc<NotificationChannels>, job: NotificationJob) {
    debug!(status = %job.order_status, "dispatching notification job");
    metrics::counter!("storefront_notifications.dispatched", 1);

    let storefront_room = format!("storefront:{}", job.tenant_id);
    let storefront_payload = json!({
        "order_id": job.order_id,
        "status": job.order_status,
    });
    let realtime = channels.realtime.clone();
    spawn_delivery("realtime_storefront", async move {
        realtime
            .push(&storefront_room, "order_updated", &storefront_payload)
            .await
    });

    let admin_room = format!("admin:{}", job.tenant_id);
    let admin_payload = json!({
        "order_id": job.order_id,
        "status": job.order_status,
        "customer_name": job.customer_name,
        "detail": job.admin_payload,
    });
    let realtime = channels.realtime.clone();
    spawn_delivery("realtime_admin", async move {
        realtime.push(&admin_room, "order_updated", &admin_payload).await
    });

    if let Some(phone) = job.customer_phone.clone() {
        if let Some(body) = customer_message(job.order_status, &job.order_id) {
            let messaging = channels.messaging.clone();
            spawn_delivery("messaging", async move {
                messaging.send_message(&phone, &body).await
            });
        }
    }

    if let Some(email) = job.customer_email.clone() {
        if let Some((subject, body)) = customer_email(job.order_status, &job.order_id) {
            let channel = channels.email.clone();
            spawn_delivery("email", async move {
                channel.send_email(&email, &subject, &body).await
            });
        }
    }
}

fn spawn_delivery<F>(channel: &'static str, fut: F)
where
    F: std::future::Future<Output = Result<(), NotificationError>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = fut.await {
            error!(%channel, error = %e, "notification delivery failed");
            metrics::counter!("storefront_notifications.failed", 1, "channel" => channel);
        }
    });
}

/// Customer-facing message for the statuses worth interrupting them about.
fn customer_message(status: OrderStatus, order_id: &str) -> Option<String> {
    let body = match status {
        OrderStatus::Paid => format!("Your payment for order {} was approved. Thank you!", order_id),
        OrderStatus::Rejected => format!(
            "Payment for order {} was declined. Please try again with another method.",
            order_id
        ),
        OrderStatus::Refunded => format!("Your payment for order {} has been refunded.", order_id),
        OrderStatus::OutForDelivery => format!("Order {} is out for delivery.", order_id),
        OrderStatus::Ready => format!("Order {} is ready for pickup.", order_id),
        _ => return None,
    };
    Some(body)
}

fn customer_email(status: OrderStatus, order_id: &str) -> Option<(String, String)> {
    let subject = match status {
        OrderStatus::Paid => format!("Order {} confirmed", order_id),
        OrderStatus::Rejected => format!("Payment problem with order {}", order_id),
        OrderStatus::Refunded => format!("Order {} refunded", order_id),
        _ => return None,
    };
    let body = customer_message(status, order_id)?;
    Some((subject, body))
}
