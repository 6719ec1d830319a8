use std::sync::Arc;

use storefront_api::{
    app, config,
    db::{close_pool, establish_connection_from_app_config},
    notifications::{spawn_dispatcher, NotificationChannels},
    services::{HttpProcessorClient, ProcessorClient},
    AppState,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config()?;
    config::init_tracing(&cfg.log_level, cfg.log_json);

    let pool = establish_connection_from_app_config(&cfg).await?;

    let (notifications, _dispatcher) = spawn_dispatcher(
        cfg.notification_channel_capacity,
        NotificationChannels::logging_only(),
    );

    let processor: Arc<dyn ProcessorClient> = Arc::new(HttpProcessorClient::new(&cfg)?);
    let state = AppState::build(&cfg, Arc::new(pool.clone()), processor, notifications)?;

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, environment = %cfg.environment, "storefront api listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    close_pool(pool).await?;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
