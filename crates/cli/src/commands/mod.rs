pub mod config;
pub mod doctor;
pub mod list;
pub mod migrate;
pub mod purge;
pub mod show;
pub mod sweep;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use signoff_core::clock::SystemClock;
use signoff_core::config::{AppConfig, LoadOptions};
use signoff_core::errors::{ApprovalError, ErrorKind};
use signoff_db::{
    connect_from_config, migrations, ApprovalStore, DbPool, SkippedRecord, SqlKeyValueStore,
};
use signoff_service::{notifier_from_config, ApprovalService, TracingAuditSink};
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, None)
    }

    pub fn success_with(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::failure_with(command, error_class, message, exit_code, None)
    }

    pub fn failure_with(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\
             \"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// A command failure before it is rendered.
#[derive(Debug)]
pub(crate) struct Failure {
    pub error_class: &'static str,
    pub message: String,
    pub exit_code: u8,
}

impl Failure {
    pub fn new(error_class: &'static str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { error_class, message: message.into(), exit_code }
    }

    pub fn into_result(self, command: &str) -> CommandResult {
        CommandResult::failure(command, self.error_class, self.message, self.exit_code)
    }
}

impl From<ApprovalError> for Failure {
    fn from(error: ApprovalError) -> Self {
        let (error_class, exit_code) = match error.kind() {
            ErrorKind::NotFound => ("not_found", 6),
            ErrorKind::InvalidInput => ("invalid_input", 7),
            ErrorKind::Immutable => ("immutable", 8),
            ErrorKind::PermissionDenied => ("permission_denied", 9),
            ErrorKind::CodeGenerationExhausted => ("code_generation_exhausted", 10),
            ErrorKind::Persistence => ("persistence", 11),
        };
        Self::new(error_class, error.to_string(), exit_code)
    }
}

/// Loaded configuration plus a runtime to drive async work from a synchronous command.
pub(crate) struct Session {
    pub config: AppConfig,
    pub runtime: Runtime,
}

pub(crate) fn session() -> Result<Session, Failure> {
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        Failure::new("config_validation", format!("configuration issue: {error}"), 2)
    })?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| {
            Failure::new("runtime_init", format!("failed to initialize async runtime: {error}"), 3)
        })?;

    Ok(Session { config, runtime })
}

pub(crate) async fn open_pool(config: &AppConfig) -> Result<DbPool, Failure> {
    let pool = connect_from_config(&config.database)
        .await
        .map_err(|error| Failure::new("db_connectivity", error.to_string(), 4))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| Failure::new("migration", error.to_string(), 5))?;
    Ok(pool)
}

/// Wires the same service stack the server runs, against the configured database.
pub(crate) fn service_for(
    config: &AppConfig,
    pool: &DbPool,
) -> Result<Arc<ApprovalService>, Failure> {
    let notifier = notifier_from_config(&config.notifications)
        .map_err(|error| Failure::new("notifier_init", error.to_string(), 13))?;
    let kv = Arc::new(SqlKeyValueStore::new(pool.clone()));
    let repository =
        Arc::new(ApprovalStore::new(kv).with_page_size(config.approvals.list_page_size));
    Ok(Arc::new(ApprovalService::new(
        repository,
        notifier,
        Arc::new(TracingAuditSink),
        Arc::new(SystemClock),
    )))
}

pub(crate) fn skipped_json(skipped: &[SkippedRecord]) -> Value {
    Value::Array(
        skipped
            .iter()
            .map(|entry| {
                serde_json::json!({ "id": entry.id.0, "error": entry.error.to_string() })
            })
            .collect(),
    )
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<Value, Failure> {
    serde_json::to_value(value)
        .map_err(|error| Failure::new("serialization", error.to_string(), 12))
}
