use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use signoff_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let bot_token = config
        .notifications
        .bot_token
        .as_ref()
        .map(|token| redact_token(token.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let entries: Vec<(&str, String, &str)> = vec![
        ("database.url", config.database.url.clone(), "SIGNOFF_DATABASE_URL"),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            "SIGNOFF_DATABASE_MAX_CONNECTIONS",
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "SIGNOFF_DATABASE_TIMEOUT_SECS",
        ),
        (
            "approvals.sweep_interval_secs",
            config.approvals.sweep_interval_secs.to_string(),
            "SIGNOFF_APPROVALS_SWEEP_INTERVAL_SECS",
        ),
        (
            "approvals.timeout_minutes",
            config.approvals.timeout_minutes.to_string(),
            "SIGNOFF_APPROVALS_TIMEOUT_MINUTES",
        ),
        (
            "approvals.list_page_size",
            config.approvals.list_page_size.to_string(),
            "SIGNOFF_APPROVALS_LIST_PAGE_SIZE",
        ),
        (
            "approvals.cancel_max_retries",
            config.approvals.cancel_max_retries.to_string(),
            "SIGNOFF_APPROVALS_CANCEL_MAX_RETRIES",
        ),
        (
            "approvals.retry_base_delay_ms",
            config.approvals.retry_base_delay_ms.to_string(),
            "SIGNOFF_APPROVALS_RETRY_BASE_DELAY_MS",
        ),
        (
            "notifications.enabled",
            config.notifications.enabled.to_string(),
            "SIGNOFF_NOTIFICATIONS_ENABLED",
        ),
        (
            "notifications.webhook_url",
            config.notifications.webhook_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            "SIGNOFF_NOTIFICATIONS_WEBHOOK_URL",
        ),
        ("notifications.bot_token", bot_token, "SIGNOFF_NOTIFICATIONS_BOT_TOKEN"),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            "SIGNOFF_SERVER_BIND_ADDRESS",
        ),
        (
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            "SIGNOFF_SERVER_HEALTH_CHECK_PORT",
        ),
        ("logging.level", config.logging.level.clone(), "SIGNOFF_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "SIGNOFF_LOGGING_FORMAT"),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, value, env_key) in entries {
        lines.push(render_line(key_path, &value, source(key_path, env_key)));
    }

    CommandResult::success("config", lines.join("\n"))
}

fn detect_config_path() -> Option<PathBuf> {
    ["signoff.toml", "config/signoff.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
