use std::sync::Arc;

use signoff_core::clock::SystemClock;
use signoff_core::config::{AppConfig, ConfigError};
use signoff_db::{connect_from_config, migrations, ApprovalStore, DbPool, SqlKeyValueStore};
use signoff_service::{
    notifier_from_config, ApprovalService, NotifyError, SweeperSettings, TimeoutSweeper,
    TracingAuditSink,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: Arc<ApprovalService>,
    pub sweeper: Arc<TimeoutSweeper>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("notification client setup failed: {0}")]
    Notifier(#[source] NotifyError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let kv = Arc::new(SqlKeyValueStore::new(db_pool.clone()));
    let repository =
        Arc::new(ApprovalStore::new(kv).with_page_size(config.approvals.list_page_size));
    let notifier =
        notifier_from_config(&config.notifications).map_err(BootstrapError::Notifier)?;
    info!(
        event_name = "system.bootstrap.notifier_ready",
        enabled = notifier.is_enabled(),
        "notification delivery configured"
    );

    let service = Arc::new(ApprovalService::new(
        repository,
        notifier,
        Arc::new(TracingAuditSink),
        Arc::new(SystemClock),
    ));
    let sweeper = Arc::new(TimeoutSweeper::new(
        Arc::clone(&service),
        SweeperSettings::from_config(&config.approvals),
    ));

    Ok(Application { config, db_pool, service, sweeper })
}
