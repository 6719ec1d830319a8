use crate::{
    db::{TenantContext, TenantDb},
    entities::processor_credential,
    errors::ServiceError,
    services::processor::{ProcessorClient, TokenExchange},
    vault::CredentialVault,
};
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use rand::RngCore;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

/// Single-use anti-forgery tokens for the OAuth connect flow.
///
/// The `state` parameter is the only place a tenant id rides through an
/// unauthenticated redirect, so the random component is treated as a
/// capability: issued server-side, consumed exactly once, expired after a
/// TTL. Unknown or reused tokens fail the callback.
#[derive(Debug, Default)]
pub struct OAuthStateStore {
    pending: DashMap<String, (Uuid, Instant)>,
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh token bound to `tenant_id` and returns the composite
    /// `state` value (`<tenant_id>.<token>`).
    pub fn issue(&self, tenant_id: Uuid) -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        self.pending
            .insert(token.clone(), (tenant_id, Instant::now()));
        format!("{}.{}", tenant_id, token)
    }

    /// Consumes a token, returning the tenant it was issued for. A token is
    /// valid at most once and only within `ttl`.
    pub fn consume(&self, token: &str, ttl: Duration) -> Option<Uuid> {
        let (_, (tenant_id, issued_at)) = self.pending.remove(token)?;
        if issued_at.elapsed() > ttl {
            return None;
        }
        Some(tenant_id)
    }

    /// Drops tokens older than `ttl`.
    pub fn sweep(&self, ttl: Duration) {
        self.pending
            .retain(|_, (_, issued_at)| issued_at.elapsed() <= ttl);
    }
}

/// Splits a `state` value back into its tenant id and anti-forgery token.
pub fn parse_state(state: &str) -> Option<(Uuid, &str)> {
    let (tenant, token) = state.split_once('.')?;
    let tenant_id = Uuid::parse_str(tenant).ok()?;
    if token.is_empty() {
        return None;
    }
    Some((tenant_id, token))
}

/// Processor credential lifecycle: OAuth connect, encrypted persistence,
/// webhook-time tenant resolution, and access-token refresh.
pub struct CredentialService {
    db: TenantDb,
    vault: CredentialVault,
    processor: Arc<dyn ProcessorClient>,
    states: OAuthStateStore,
    authorization_url: String,
    client_id: String,
    redirect_url: String,
    state_ttl: Duration,
}

impl CredentialService {
    pub fn new(
        db: TenantDb,
        vault: CredentialVault,
        processor: Arc<dyn ProcessorClient>,
        cfg: &crate::config::AppConfig,
    ) -> Self {
        Self {
            db,
            vault,
            processor,
            states: OAuthStateStore::new(),
            authorization_url: cfg.processor_authorization_url.clone(),
            client_id: cfg.processor_client_id.clone(),
            redirect_url: cfg.processor_redirect_url.clone(),
            state_ttl: Duration::from_secs(cfg.oauth_state_ttl_secs),
        }
    }

    /// Builds the merchant-facing authorization URL for the connect flow.
    pub fn authorization_url(&self, tenant_id: Uuid) -> Result<String, ServiceError> {
        self.states.sweep(self.state_ttl);
        let state = self.states.issue(tenant_id);

        let mut url = Url::parse(&self.authorization_url)
            .map_err(|e| ServiceError::InternalError(format!("authorization url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("state", &state);
        Ok(url.to_string())
    }

    /// Completes the OAuth callback: verifies the state token, exchanges the
    /// authorization code, and stores the encrypted credentials. Returns the
    /// connected tenant id.
    #[instrument(skip(self, code, state))]
    pub async fn complete_connection(
        &self,
        code: &str,
        state: &str,
    ) -> Result<Uuid, ServiceError> {
        let (tenant_id, token) = parse_state(state)
            .ok_or_else(|| ServiceError::OAuthStateRejected("malformed state".into()))?;

        let issued_for = self
            .states
            .consume(token, self.state_ttl)
            .ok_or_else(|| ServiceError::OAuthStateRejected("unknown or expired state".into()))?;
        if issued_for != tenant_id {
            warn!(%tenant_id, "state token was issued for a different tenant");
            return Err(ServiceError::OAuthStateRejected(
                "state token does not match tenant".into(),
            ));
        }

        let exchange = self.processor.exchange_authorization_code(code).await?;
        self.save_credentials(tenant_id, &exchange).await?;
        info!(%tenant_id, "processor connection established");
        Ok(tenant_id)
    }

    /// Encrypts both tokens and upserts the credential record keyed by
    /// tenant id. Token expiry is computed as now + `expires_in_seconds`.
    #[instrument(skip(self, exchange))]
    pub async fn save_credentials(
        &self,
        tenant_id: Uuid,
        exchange: &TokenExchange,
    ) -> Result<(), ServiceError> {
        let access_ciphertext = self.vault.encrypt(&exchange.access_token)?;
        let refresh_ciphertext = self.vault.encrypt(&exchange.refresh_token)?;
        let expires_at = Utc::now() + ChronoDuration::seconds(exchange.expires_in_seconds);
        let account_id = exchange.external_user_id.clone();

        self.db
            .transaction(TenantContext::Tenant(tenant_id), move |txn| {
                Box::pin(async move {
                    let existing = processor_credential::Entity::find()
                        .filter(processor_credential::Column::TenantId.eq(tenant_id))
                        .one(txn)
                        .await?;

                    let now = Utc::now();
                    match existing {
                        Some(record) => {
                            let mut active: processor_credential::ActiveModel = record.into();
                            active.processor_account_id = Set(account_id);
                            active.access_token_ciphertext = Set(access_ciphertext);
                            active.refresh_token_ciphertext = Set(refresh_ciphertext);
                            active.token_expires_at = Set(expires_at);
                            active.updated_at = Set(Some(now));
                            active.update(txn).await?;
                        }
                        None => {
                            processor_credential::ActiveModel {
                                id: Set(Uuid::new_v4()),
                                tenant_id: Set(tenant_id),
                                processor_account_id: Set(account_id),
                                access_token_ciphertext: Set(access_ciphertext),
                                refresh_token_ciphertext: Set(refresh_ciphertext),
                                token_expires_at: Set(expires_at),
                                installments_enabled: Set(true),
                                max_installments: Set(12),
                                excluded_payment_methods: Set(None),
                                created_at: Set(now),
                                updated_at: Set(None),
                            }
                            .insert(txn)
                            .await?;
                        }
                    }
                    Ok(())
                })
            })
            .await
    }

    /// Resolves the tenant owning a processor account id.
    ///
    /// This is one of the few sanctioned cross-tenant lookups: it runs
    /// under the system context with an explicit filter, because the tenant
    /// is not known until the credential row is found.
    pub async fn find_by_processor_account(
        &self,
        account_id: &str,
    ) -> Result<Option<processor_credential::Model>, ServiceError> {
        let account_id = account_id.to_string();
        self.db
            .transaction(TenantContext::System, move |txn| {
                Box::pin(async move {
                    processor_credential::Entity::find()
                        .filter(
                            processor_credential::Column::ProcessorAccountId.eq(account_id),
                        )
                        .one(txn)
                        .await
                        .map_err(ServiceError::DatabaseError)
                })
            })
            .await
    }

    /// Returns a usable access token for the credential, refreshing it at
    /// the processor first if past expiry. Refresh failure is a hard error:
    /// acting without fresh authority risks an incorrect state transition.
    #[instrument(skip(self, credential), fields(tenant_id = %credential.tenant_id))]
    pub async fn access_token(
        &self,
        credential: &processor_credential::Model,
    ) -> Result<String, ServiceError> {
        if credential.token_expires_at > Utc::now() {
            return Ok(self.vault.decrypt(&credential.access_token_ciphertext)?);
        }

        info!(tenant_id = %credential.tenant_id, "access token expired, refreshing");
        let refresh_token = self.vault.decrypt(&credential.refresh_token_ciphertext)?;
        let exchange = self.processor.refresh_access_token(&refresh_token).await?;
        let access_token = exchange.access_token.clone();
        self.save_credentials(credential.tenant_id, &exchange)
            .await?;
        Ok(access_token)
    }
}
