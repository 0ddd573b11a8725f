use anyhow::Context;
use prepforge::api::{ApiServer, AppState};
use prepforge::config::{Config, LogFormat};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("prepforge={},tower_http=info", config.logging.level).into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
        LogFormat::Compact => registry.with(tracing_subscriber::fmt::layer().compact()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }

    info!("Starting PrepForge v{}", env!("CARGO_PKG_VERSION"));
    info!("  Listening on: {}", config.server.listen_addr);
    info!("  Database: {}", config.storage.database_url);
    info!(
        "  Free plan: {} questions per exam type per day",
        config.quota.free_daily_limit
    );

    let state = AppState::build(config)
        .await
        .context("Failed to initialise application state")?;

    ApiServer::new(state).run().await.context("HTTP server failed")?;
    Ok(())
}
