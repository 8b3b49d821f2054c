use anyhow::Context;
use core_runtime::config::ServiceConfig;
use core_runtime::events::EventBus;
use core_runtime::logging::{init_logging, LoggingConfig};
use core_service::{build_router, AppState, Bridges};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = ServiceConfig::from_env().context("loading configuration")?;

    let mut logging = LoggingConfig::default().with_format(config.log_format);
    if let Some(filter) = &config.log_filter {
        logging = logging.with_filter(filter.clone());
    }
    init_logging(logging).context("initializing logging")?;

    let bridges = Bridges::from_config(&config).await?;
    let state = AppState::build(&config, bridges, EventBus::default())?;

    let cancel = CancellationToken::new();
    let sweeper = state
        .orchestrator
        .clone()
        .spawn_sweeper(config.sweep_interval, cancel.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "CloudSync listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    sweeper.await.ok();
    info!("CloudSync stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
