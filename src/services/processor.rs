use crate::{config::AppConfig, errors::ServiceError, models::ProcessorPaymentStatus};
use async_trait::async_trait;
use rust_decimal::{prelude::FromPrimitive, Decimal};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{instrument, warn};

/// Result of an OAuth token exchange or refresh at the processor.
#[derive(Debug, Clone)]
pub struct TokenExchange {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in_seconds: i64,
    /// The processor's identifier for the connected merchant account.
    pub external_user_id: String,
}

/// Authoritative payment object fetched from the processor.
///
/// The webhook payload is never trusted for amount/status; only this
/// freshly-fetched object is.
#[derive(Debug, Clone)]
pub struct ProcessorPayment {
    pub id: String,
    pub status: ProcessorPaymentStatus,
    /// Echo of the reference the storefront attached at checkout; the first
    /// `|`-separated segment is the internal order id.
    pub external_reference: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: Option<String>,
    pub payer_email: Option<String>,
    /// Full provider payload, stored opaquely for audit/replay.
    pub raw: serde_json::Value,
}

/// Outbound surface of the external payment processor.
#[async_trait]
pub trait ProcessorClient: Send + Sync {
    async fn exchange_authorization_code(&self, code: &str) -> Result<TokenExchange, ServiceError>;
    async fn refresh_access_token(&self, refresh_token: &str)
        -> Result<TokenExchange, ServiceError>;
    async fn fetch_payment(
        &self,
        access_token: &str,
        payment_id: &str,
    ) -> Result<ProcessorPayment, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user_id: serde_json::Value,
}

/// HTTPS client for the processor API with a bounded per-call timeout.
#[derive(Clone)]
pub struct HttpProcessorClient {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    redirect_url: String,
}

impl HttpProcessorClient {
    pub fn new(cfg: &AppConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.processor_timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: cfg.processor_base_url.trim_end_matches('/').to_string(),
            client_id: cfg.processor_client_id.clone(),
            client_secret: cfg.processor_client_secret.clone(),
            redirect_url: cfg.processor_redirect_url.clone(),
        })
    }

    async fn token_request(
        &self,
        body: serde_json::Value,
    ) -> Result<TokenExchange, ServiceError> {
        let url = format!("{}/oauth/token", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(%status, "processor token endpoint rejected request");
            return Err(ServiceError::ProcessorAuth(format!(
                "token endpoint returned {}: {}",
                status, detail
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ProcessorAuth(format!("malformed token response: {}", e)))?;

        Ok(TokenExchange {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in_seconds: token.expires_in,
            external_user_id: json_id_to_string(&token.user_id),
        })
    }
}

#[async_trait]
impl ProcessorClient for HttpProcessorClient {
    #[instrument(skip(self, code))]
    async fn exchange_authorization_code(&self, code: &str) -> Result<TokenExchange, ServiceError> {
        self.token_request(json!({
            "grant_type": "authorization_code",
            "client_id": self.client_id,
            "client_secret": self.client_secret,
            "code": code,
            "redirect_uri": self.redirect_url,
        }))
        .await
    }

    #[instrument(skip(self, refresh_token))]
    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenExchange, ServiceError> {
        self.token_request(json!({
            "grant_type": "refresh_token",
            "client_id": self.client_id,
            "client_secret": self.client_secret,
            "refresh_token": refresh_token,
        }))
        .await
    }

    #[instrument(skip(self, access_token))]
    async fn fetch_payment(
        &self,
        access_token: &str,
        payment_id: &str,
    ) -> Result<ProcessorPayment, ServiceError> {
        let url = format!("{}/v1/payments/{}", self.base_url, payment_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            if status.is_client_error() {
                return Err(ServiceError::ProcessorAuth(format!(
                    "payment fetch returned {}: {}",
                    status, detail
                )));
            }
            return Err(ServiceError::ProcessorUnavailable(format!(
                "payment fetch returned {}: {}",
                status, detail
            )));
        }

        let raw: serde_json::Value = response.json().await.map_err(|e| {
            ServiceError::ProcessorUnavailable(format!("malformed payment response: {}", e))
        })?;

        Ok(parse_payment(raw))
    }
}

fn transport_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::ProcessorUnavailable("processor call timed out".to_string())
    } else {
        ServiceError::ProcessorUnavailable(err.to_string())
    }
}

fn json_id_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Maps the provider payload into our payment view, keeping the raw
/// payload intact. Missing or unrecognized statuses fall back to the
/// `Unknown` catch-all rather than failing the fetch.
fn parse_payment(raw: serde_json::Value) -> ProcessorPayment {
    let status = raw
        .get("status")
        .cloned()
        .and_then(|v| serde_json::from_value::<ProcessorPaymentStatus>(v).ok())
        .unwrap_or(ProcessorPaymentStatus::Unknown);

    let amount = raw
        .get("transaction_amount")
        .and_then(|v| v.as_f64())
        .and_then(Decimal::from_f64)
        .unwrap_or_default();

    ProcessorPayment {
        id: raw.get("id").map(json_id_to_string).unwrap_or_default(),
        status,
        external_reference: raw
            .get("external_reference")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        amount,
        currency: raw
            .get("currency_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        payment_method: raw
            .get("payment_method_id")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        payer_email: raw
            .pointer("/payer/email")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        raw,
    }
}
