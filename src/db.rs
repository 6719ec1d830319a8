use crate::config::AppConfig;
use crate::errors::ServiceError;
use futures::future::BoxFuture;
use metrics::{counter, gauge, histogram};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DatabaseTransaction, DbBackend,
    Statement, TransactionTrait,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Session setting read by the row-level-security policies on every
/// tenant-scoped table.
pub const TENANT_GUC: &str = "app.current_tenant";

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Establishes a connection pool to the database
pub async fn establish_connection(database_url: &str) -> Result<DbPool, ServiceError> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };
    establish_connection_with_config(&config).await
}

/// Establishes a connection pool with custom pool tuning
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    let mut opt = ConnectOptions::new(config.url.clone());

    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(true);

    gauge!(
        "storefront_db.max_connections",
        config.max_connections as f64
    );

    info!(
        max_connections = config.max_connections,
        "Connecting to database"
    );

    let pool = Database::connect(opt)
        .await
        .map_err(ServiceError::DatabaseError)?;

    info!("Database connection pool established");
    Ok(pool)
}

/// Establish DB pool using AppConfig tuning
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection_with_config(&db_cfg).await
}

/// Checks if the database connection is active
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    pool.ping().await.map_err(ServiceError::DatabaseError)
}

/// Closes the database connection pool
pub async fn close_pool(pool: DbPool) -> Result<(), ServiceError> {
    info!("Closing database connection pool");
    pool.close().await.map_err(ServiceError::DatabaseError)
}

/// Tenant boundary a unit of work runs under.
///
/// `System` is reserved for the small set of operations that legitimately
/// read across tenants (resolving a processor account id to a tenant before
/// the tenant context is known); those queries must carry explicit filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantContext {
    System,
    Tenant(Uuid),
}

impl TenantContext {
    pub fn tenant_id(&self) -> Option<Uuid> {
        match self {
            TenantContext::System => None,
            TenantContext::Tenant(id) => Some(*id),
        }
    }
}

/// Builds the transaction-local statement that binds the tenant id for the
/// storage engine's row-level-security policies.
fn tenant_binding_statement(tenant_id: Uuid) -> Statement {
    Statement::from_sql_and_values(
        DbBackend::Postgres,
        format!("SELECT set_config('{}', $1, true)", TENANT_GUC),
        [tenant_id.to_string().into()],
    )
}

/// Tenant-scoped transaction manager.
///
/// Every unit of work in the system runs through [`TenantDb::transaction`].
/// When the context carries a tenant id, the manager binds it as a
/// transaction-local session setting before the unit of work executes, so
/// row-level security filters every subsequent query to that tenant even
/// when the query itself has no tenant predicate. Enforcement happens at
/// the storage layer, not by trusting call sites.
#[derive(Debug, Clone)]
pub struct TenantDb {
    pool: Arc<DbPool>,
}

impl TenantDb {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Runs `unit_of_work` inside a transaction bound to `ctx`.
    ///
    /// Commits on `Ok`; on `Err` rolls back and propagates the original
    /// error unchanged. Connection acquisition failures and constraint
    /// violations are not retried here — webhook redelivery already
    /// provides retry semantics for the callers that need them.
    pub async fn transaction<F, T>(&self, ctx: TenantContext, unit_of_work: F) -> Result<T, ServiceError>
    where
        F: for<'a> FnOnce(&'a DatabaseTransaction) -> BoxFuture<'a, Result<T, ServiceError>> + Send,
        T: Send,
    {
        let start = std::time::Instant::now();
        counter!("storefront_db.transaction.started", 1);

        let txn = self.pool.begin().await.map_err(ServiceError::DatabaseError)?;

        if let TenantContext::Tenant(tenant_id) = ctx {
            // The session setting is a Postgres mechanism; the sqlite
            // backend used in tests has no RLS and relies on the explicit
            // tenant filters every repository query carries anyway.
            if txn.get_database_backend() == DbBackend::Postgres {
                txn.execute(tenant_binding_statement(tenant_id))
                    .await
                    .map_err(ServiceError::DatabaseError)?;
            }
            debug!(%tenant_id, "transaction bound to tenant");
        }

        let result = unit_of_work(&txn).await;

        let elapsed = start.elapsed();
        histogram!("storefront_db.transaction.duration", elapsed);

        match result {
            Ok(value) => {
                txn.commit().await.map_err(ServiceError::DatabaseError)?;
                counter!("storefront_db.transaction.committed", 1);
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!(error = %rollback_err, "transaction rollback failed");
                }
                counter!("storefront_db.transaction.rolled_back", 1);
                warn!(elapsed = ?elapsed, "transaction rolled back");
                Err(err)
            }
        }
    }
}
