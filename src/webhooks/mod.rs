//! Webhook reconciliation.
//!
//! Inbound processor notifications are hints, not facts: the payload only
//! tells us *which* payment to look at. The engine resolves the owning
//! tenant from the notification's account id, re-fetches the payment from
//! the processor with that tenant's credentials, and reconciles order and
//! payment state inside a single tenant-scoped transaction. Notifications
//! fan out only after that transaction commits.

use crate::{
    db::{TenantContext, TenantDb},
    entities::{order, payment},
    errors::ServiceError,
    models::{map_processor_status, OrderStatus},
    notifications::{NotificationJob, NotificationSender},
    services::{credentials::CredentialService, processor::ProcessorClient},
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Shape of an inbound processor notification. Providers are loose with
/// types (numeric vs string ids), so identifiers are captured as raw JSON
/// and normalized afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentWebhook {
    #[serde(rename = "type", alias = "topic")]
    pub kind: Option<String>,
    pub action: Option<String>,
    pub data: Option<WebhookData>,
    pub user_id: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub id: Option<serde_json::Value>,
}

/// Why a webhook was acknowledged without acting on it.
///
/// Ignored deliveries answer 200: redelivering them can never succeed, so
/// asking the provider to retry would only generate noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IgnoreReason {
    /// The notification is not about a payment (merchant order pings etc.).
    NotAPayment,
    /// No action string, so the event does not describe a state change.
    MissingAction,
    /// No payment id in the payload.
    MissingPaymentId,
    /// No processor account id, so no way to resolve a tenant.
    MissingAccountId,
    /// No connected tenant owns this processor account.
    UnknownAccount,
    /// The processor payment carries no external reference back to us.
    MissingExternalReference,
    /// The external reference names an order this tenant does not have.
    UnknownOrder,
}

/// Result of a webhook delivery that was handled without error.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Processed {
        order_id: String,
        order_status: OrderStatus,
        payment_id: String,
    },
    Ignored {
        reason: IgnoreReason,
    },
}

impl WebhookOutcome {
    fn ignored(reason: IgnoreReason) -> Self {
        WebhookOutcome::Ignored { reason }
    }
}

fn json_id_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// First `|`-separated segment of the external reference is the internal
/// order id; later segments are free-form checkout metadata.
pub fn order_id_from_reference(reference: &str) -> Option<&str> {
    let id = reference.split('|').next()?.trim();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Drives a webhook delivery end to end.
pub struct ReconciliationEngine {
    db: TenantDb,
    credentials: Arc<CredentialService>,
    processor: Arc<dyn ProcessorClient>,
    notifications: NotificationSender,
}

impl ReconciliationEngine {
    pub fn new(
        db: TenantDb,
        credentials: Arc<CredentialService>,
        processor: Arc<dyn ProcessorClient>,
        notifications: NotificationSender,
    ) -> Self {
        Self {
            db,
            credentials,
            processor,
            notifications,
        }
    }

    /// Processes one delivery.
    ///
    /// `Ok(Ignored { .. })` means the delivery is understood and permanently
    /// inapplicable; `Err(..)` means a transient failure the provider should
    /// redeliver (processor outage, database error, expired credentials that
    /// failed to refresh).
    #[instrument(skip_all)]
    pub async fn process(&self, webhook: PaymentWebhook) -> Result<WebhookOutcome, ServiceError> {
        let outcome = self.reconcile(webhook).await;
        match &outcome {
            Ok(WebhookOutcome::Processed { .. }) => {
                metrics::counter!("storefront_webhooks.processed", 1);
            }
            Ok(WebhookOutcome::Ignored { reason }) => {
                metrics::counter!("storefront_webhooks.ignored", 1, "reason" => reason.to_string());
            }
            Err(_) => {
                metrics::counter!("storefront_webhooks.failed", 1);
            }
        }
        outcome
    }

    async fn reconcile(&self, webhook: PaymentWebhook) -> Result<WebhookOutcome, ServiceError> {
        // 1. Schema checks. Anything that cannot name a payment and an
        //    account is permanently inapplicable.
        if webhook.kind.as_deref() != Some("payment") {
            return Ok(WebhookOutcome::ignored(IgnoreReason::NotAPayment));
        }
        if webhook
            .action
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .is_none()
        {
            return Ok(WebhookOutcome::ignored(IgnoreReason::MissingAction));
        }
        let Some(payment_id) = webhook
            .data
            .as_ref()
            .and_then(|d| d.id.as_ref())
            .map(json_id_to_string)
            .filter(|id| !id.is_empty() && id != "null")
        else {
            return Ok(WebhookOutcome::ignored(IgnoreReason::MissingPaymentId));
        };
        let Some(account_id) = webhook
            .user_id
            .as_ref()
            .map(json_id_to_string)
            .filter(|id| !id.is_empty() && id != "null")
        else {
            return Ok(WebhookOutcome::ignored(IgnoreReason::MissingAccountId));
        };

        // 2. Tenant resolution. The only cross-tenant read in the pipeline.
        let Some(credential) = self.credentials.find_by_processor_account(&account_id).await?
        else {
            warn!(%account_id, "webhook for unconnected processor account");
            return Ok(WebhookOutcome::ignored(IgnoreReason::UnknownAccount));
        };
        let tenant_id = credential.tenant_id;

        // 3. Authoritative fetch. The webhook body is never trusted for
        //    status or amount.
        let access_token = self.credentials.access_token(&credential).await?;
        let processor_payment = self
            .processor
            .fetch_payment(&access_token, &payment_id)
            .await?;

        // 4. Order resolution from the external reference.
        let Some(order_id) = processor_payment
            .external_reference
            .as_deref()
            .and_then(order_id_from_reference)
            .map(str::to_string)
        else {
            return Ok(WebhookOutcome::ignored(
                IgnoreReason::MissingExternalReference,
            ));
        };

        // 5. Status mapping.
        let next_status = map_processor_status(processor_payment.status);

        // 6. Reconcile order + payment atomically under the tenant context.
        let payment_record_id = processor_payment.id.clone();
        let reconciled = self
            .persist(tenant_id, order_id.clone(), next_status, &processor_payment)
            .await?;

        let Some((final_status, notification)) = reconciled else {
            return Ok(WebhookOutcome::ignored(IgnoreReason::UnknownOrder));
        };

        // 7. Post-commit fan-out. Failures in delivery can no longer affect
        //    the committed state.
        if let Some(job) = notification {
            self.notifications.enqueue(job);
        }

        info!(%tenant_id, %order_id, status = %final_status, "webhook reconciled");
        Ok(WebhookOutcome::Processed {
            order_id,
            order_status: final_status,
            payment_id: payment_record_id,
        })
    }

    /// Upserts the payment row and applies the status to the order, all in
    /// one tenant-scoped transaction. Returns `None` when the order does
    /// not exist for this tenant, and otherwise the order's resulting
    /// status plus a notification job when the status actually changed.
    async fn persist(
        &self,
        tenant_id: Uuid,
        order_id: String,
        next_status: OrderStatus,
        processor_payment: &crate::services::processor::ProcessorPayment,
    ) -> Result<Option<(OrderStatus, Option<NotificationJob>)>, ServiceError> {
        let external_payment_id = processor_payment.id.clone();
        let amount = processor_payment.amount;
        let currency = processor_payment.currency.clone();
        let method = processor_payment.payment_method.clone();
        let raw = processor_payment.raw.clone();

        self.db
            .transaction(TenantContext::Tenant(tenant_id), move |txn| {
                Box::pin(async move {
                    let Some(order_row) = order::Entity::find_by_id(&order_id)
                        .filter(order::Column::TenantId.eq(tenant_id))
                        .one(txn)
                        .await?
                    else {
                        return Ok(None);
                    };

                    let now = Utc::now();

                    // Duplicate deliveries update the existing payment row.
                    let existing = payment::Entity::find()
                        .filter(payment::Column::TenantId.eq(tenant_id))
                        .filter(payment::Column::ExternalPaymentId.eq(external_payment_id.clone()))
                        .one(txn)
                        .await?;

                    match existing {
                        Some(row) => {
                            let mut active: payment::ActiveModel = row.into();
                            active.status = Set(next_status.as_ref().to_string());
                            active.amount = Set(amount);
                            active.currency = Set(currency);
                            active.method = Set(method);
                            active.raw_payload = Set(raw);
                            active.updated_at = Set(Some(now));
                            active.update(txn).await?;
                        }
                        None => {
                            payment::ActiveModel {
                                id: Set(Uuid::new_v4()),
                                tenant_id: Set(tenant_id),
                                order_id: Set(order_row.id.clone()),
                                external_payment_id: Set(external_payment_id),
                                status: Set(next_status.as_ref().to_string()),
                                method: Set(method),
                                amount: Set(amount),
                                currency: Set(currency),
                                raw_payload: Set(raw),
                                created_at: Set(now),
                                updated_at: Set(None),
                            }
                            .insert(txn)
                            .await?;
                        }
                    }

                    let current = order_row.order_status()?;

                    // Terminal orders never regress, whatever the processor
                    // reports afterwards.
                    if current.is_terminal() || current == next_status {
                        return Ok(Some((current, None)));
                    }

                    let job = NotificationJob {
                        tenant_id,
                        order_id: order_row.id.clone(),
                        order_status: next_status,
                        customer_name: order_row.customer_name.clone(),
                        customer_phone: order_row.customer_phone.clone(),
                        customer_email: order_row.customer_email.clone(),
                        admin_payload: json!({
                            "previous_status": current,
                            "amount": amount,
                            "currency": order_row.currency,
                        }),
                    };

                    let mut active: order::ActiveModel = order_row.into();
                    active.status = Set(next_status.as_ref().to_string());
                    active.updated_at = Set(Some(now));
                    active.update(txn).await?;

                    Ok(Some((next_status, Some(job))))
                })
            })
            .await
    }
}
