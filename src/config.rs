use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_PROCESSOR_TIMEOUT_SECS: u64 = 10;
const DEFAULT_OAUTH_STATE_TTL_SECS: u64 = 600;
const DEFAULT_NOTIFICATION_CHANNEL_CAPACITY: usize = 1024;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Vault key: hex-encoded 256-bit key for credential encryption.
    /// Must be provided via environment or config file, never hard-coded.
    #[validate(custom = "validate_vault_key")]
    pub vault_key: String,

    /// Payment processor API base URL
    #[serde(default = "default_processor_base_url")]
    pub processor_base_url: String,

    /// Payment processor authorization endpoint (the merchant-facing
    /// connect URL the OAuth start handler embeds state into)
    #[serde(default = "default_processor_auth_url")]
    pub processor_authorization_url: String,

    /// OAuth application client id issued by the processor
    #[serde(default)]
    pub processor_client_id: String,

    /// OAuth application client secret issued by the processor
    #[serde(default)]
    pub processor_client_secret: String,

    /// Redirect URL registered with the processor for the OAuth callback
    #[serde(default)]
    pub processor_redirect_url: String,

    /// Timeout budget for outbound processor calls (seconds)
    #[serde(default = "default_processor_timeout_secs")]
    pub processor_timeout_secs: u64,

    /// Time a pending OAuth state token stays valid (seconds)
    #[serde(default = "default_oauth_state_ttl_secs")]
    pub oauth_state_ttl_secs: u64,

    /// Capacity of the notification fan-out channel
    #[serde(default = "default_notification_channel_capacity")]
    #[validate(custom = "validate_channel_capacity")]
    pub notification_channel_capacity: usize,
}

impl AppConfig {
    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Decoded vault key bytes. Validation guarantees 32 bytes.
    pub fn vault_key_bytes(&self) -> Result<[u8; 32], AppConfigError> {
        let bytes = hex::decode(self.vault_key.trim()).map_err(|_| {
            AppConfigError::Load(ConfigError::Message(
                "vault_key is not valid hex".to_string(),
            ))
        })?;
        bytes.try_into().map_err(|_| {
            AppConfigError::Load(ConfigError::Message(
                "vault_key must decode to exactly 32 bytes".to_string(),
            ))
        })
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.is_development() {
            if self.processor_client_id.trim().is_empty()
                || self.processor_client_secret.trim().is_empty()
            {
                let mut err = ValidationError::new("processor_credentials_required");
                err.message = Some(
                    "Set APP__PROCESSOR_CLIENT_ID and APP__PROCESSOR_CLIENT_SECRET outside development"
                        .into(),
                );
                errors.add("processor_client_id", err);
            }
            if self.processor_redirect_url.trim().is_empty() {
                let mut err = ValidationError::new("processor_redirect_url_required");
                err.message =
                    Some("Set APP__PROCESSOR_REDIRECT_URL outside development".into());
                errors.add("processor_redirect_url", err);
            }
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_processor_base_url() -> String {
    "https://api.processor.example".to_string()
}

fn default_processor_auth_url() -> String {
    "https://auth.processor.example/authorization".to_string()
}

fn default_processor_timeout_secs() -> u64 {
    DEFAULT_PROCESSOR_TIMEOUT_SECS
}

fn default_oauth_state_ttl_secs() -> u64 {
    DEFAULT_OAUTH_STATE_TTL_SECS
}

fn default_notification_channel_capacity() -> usize {
    DEFAULT_NOTIFICATION_CHANNEL_CAPACITY
}

fn validate_vault_key(key: &str) -> Result<(), ValidationError> {
    let trimmed = key.trim();

    let decoded = hex::decode(trimmed).map_err(|_| {
        let mut err = ValidationError::new("vault_key");
        err.message = Some("vault_key must be hex-encoded".into());
        err
    })?;

    if decoded.len() != 32 {
        let mut err = ValidationError::new("vault_key");
        err.message = Some("vault_key must decode to exactly 32 bytes (64 hex chars)".into());
        return Err(err);
    }

    // Reject trivially weak keys (all identical bytes)
    if let Some(first) = decoded.first() {
        if decoded.iter().all(|b| b == first) {
            let mut err = ValidationError::new("vault_key");
            err.message = Some("vault_key cannot be a repeated byte sequence".into());
            return Err(err);
        }
    }

    Ok(())
}

fn validate_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("notification_channel_capacity");
        err.message = Some("notification_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // NOTE: vault_key has no default - it MUST be provided via environment
    // variable or config file. This prevents accidental use of a bundled
    // key for credential encryption.
    let builder = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("vault_key").is_err() {
        error!("Vault key is not configured. Set APP__VAULT_KEY to a hex-encoded 32-byte key.");
        error!("Generate one with: openssl rand -hex 32");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "vault_key is required but not configured. Set APP__VAULT_KEY environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

/// Fully-populated config for tests; development environment, sqlite, and a
/// non-trivial vault key.
#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        host: "127.0.0.1".into(),
        port: 8080,
        environment: "development".into(),
        log_level: default_log_level(),
        log_json: false,
        db_max_connections: default_db_max_connections(),
        db_min_connections: default_db_min_connections(),
        db_connect_timeout_secs: default_db_connect_timeout_secs(),
        db_idle_timeout_secs: default_db_idle_timeout_secs(),
        db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
        vault_key: "8f".repeat(31) + "a1",
        processor_base_url: default_processor_base_url(),
        processor_authorization_url: default_processor_auth_url(),
        processor_client_id: "client-id".into(),
        processor_client_secret: "client-secret".into(),
        processor_redirect_url: "https://api.example.com/payments/oauth/callback".into(),
        processor_timeout_secs: default_processor_timeout_secs(),
        oauth_state_ttl_secs: default_oauth_state_ttl_secs(),
        notification_channel_capacity: default_notification_channel_capacity(),
    }
}
