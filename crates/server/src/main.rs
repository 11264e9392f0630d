mod bootstrap;
mod health;

use std::time::Duration;

use anyhow::Result;
use signoff_core::config::{AppConfig, LoadOptions};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use signoff_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    app.sweeper.start();
    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        health::HealthState::new(app.db_pool.clone(), app.sweeper.clone()),
    )
    .await?;

    tracing::info!(
        event_name = "system.server.started",
        sweep_interval_secs = app.config.approvals.sweep_interval_secs,
        timeout_minutes = app.config.approvals.timeout_minutes,
        "signoff-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(event_name = "system.server.stopping", "signoff-server stopping");

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, app.sweeper.stop()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            grace_secs = grace.as_secs(),
            "timeout sweeper did not stop within the grace period"
        );
    }
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
