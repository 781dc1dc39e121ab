mod routes;

use std::sync::Arc;

use anyhow::Result;
use insightflow::agent::ResponsesAgentFactory;
use insightflow::config::{AppConfig, LoadOptions, LoggingConfig};
use tracing_subscriber::EnvFilter;

use crate::routes::AppState;

fn init_logging(logging: &LoggingConfig) {
    use insightflow::config::LogFormat::{Compact, Json, Pretty};

    // RUST_LOG wins over the configured level.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config.logging);

    let factory = Arc::new(ResponsesAgentFactory::new(config.agent_settings()?));
    let address = config.listen_address();
    let app = routes::router(AppState::new(config, factory));

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        "insightflow-server listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(event_name = "system.server.stopping", "insightflow-server stopping");
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            error = %error,
            "could not listen for shutdown signal"
        );
    }
}
