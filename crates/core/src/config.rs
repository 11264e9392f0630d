use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub approvals: ApprovalsConfig,
    pub notifications: NotificationConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ApprovalsConfig {
    pub sweep_interval_secs: u64,
    pub timeout_minutes: u64,
    pub list_page_size: usize,
    pub cancel_max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl ApprovalsConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn timeout_millis(&self) -> i64 {
        i64::try_from(self.timeout_minutes.saturating_mul(60_000)).unwrap_or(i64::MAX)
    }
}

#[derive(Clone, Debug)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub bot_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub sweep_interval_secs: Option<u64>,
    pub timeout_minutes: Option<u64>,
    pub list_page_size: Option<usize>,
    pub cancel_max_retries: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub notifications_enabled: Option<bool>,
    pub webhook_url: Option<String>,
    pub bot_token: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://signoff.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            approvals: ApprovalsConfig {
                sweep_interval_secs: 300,
                timeout_minutes: 30,
                list_page_size: 1_000,
                cancel_max_retries: 3,
                retry_base_delay_ms: 250,
            },
            notifications: NotificationConfig {
                enabled: false,
                webhook_url: None,
                bot_token: None,
                timeout_secs: 10,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("signoff.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(approvals) = patch.approvals {
            if let Some(sweep_interval_secs) = approvals.sweep_interval_secs {
                self.approvals.sweep_interval_secs = sweep_interval_secs;
            }
            if let Some(timeout_minutes) = approvals.timeout_minutes {
                self.approvals.timeout_minutes = timeout_minutes;
            }
            if let Some(list_page_size) = approvals.list_page_size {
                self.approvals.list_page_size = list_page_size;
            }
            if let Some(cancel_max_retries) = approvals.cancel_max_retries {
                self.approvals.cancel_max_retries = cancel_max_retries;
            }
            if let Some(retry_base_delay_ms) = approvals.retry_base_delay_ms {
                self.approvals.retry_base_delay_ms = retry_base_delay_ms;
            }
        }

        if let Some(notifications) = patch.notifications {
            if let Some(enabled) = notifications.enabled {
                self.notifications.enabled = enabled;
            }
            if let Some(webhook_url) = notifications.webhook_url {
                self.notifications.webhook_url = Some(webhook_url);
            }
            if let Some(bot_token_value) = notifications.bot_token {
                self.notifications.bot_token = Some(secret_value(bot_token_value));
            }
            if let Some(timeout_secs) = notifications.timeout_secs {
                self.notifications.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SIGNOFF_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SIGNOFF_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("SIGNOFF_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SIGNOFF_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("SIGNOFF_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SIGNOFF_APPROVALS_SWEEP_INTERVAL_SECS") {
            self.approvals.sweep_interval_secs =
                parse_u64("SIGNOFF_APPROVALS_SWEEP_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("SIGNOFF_APPROVALS_TIMEOUT_MINUTES") {
            self.approvals.timeout_minutes =
                parse_u64("SIGNOFF_APPROVALS_TIMEOUT_MINUTES", &value)?;
        }
        if let Some(value) = read_env("SIGNOFF_APPROVALS_LIST_PAGE_SIZE") {
            self.approvals.list_page_size =
                parse_usize("SIGNOFF_APPROVALS_LIST_PAGE_SIZE", &value)?;
        }
        if let Some(value) = read_env("SIGNOFF_APPROVALS_CANCEL_MAX_RETRIES") {
            self.approvals.cancel_max_retries =
                parse_u32("SIGNOFF_APPROVALS_CANCEL_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("SIGNOFF_APPROVALS_RETRY_BASE_DELAY_MS") {
            self.approvals.retry_base_delay_ms =
                parse_u64("SIGNOFF_APPROVALS_RETRY_BASE_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("SIGNOFF_NOTIFICATIONS_ENABLED") {
            self.notifications.enabled = parse_bool("SIGNOFF_NOTIFICATIONS_ENABLED", &value)?;
        }
        if let Some(value) = read_env("SIGNOFF_NOTIFICATIONS_WEBHOOK_URL") {
            self.notifications.webhook_url = Some(value);
        }
        if let Some(value) = read_env("SIGNOFF_NOTIFICATIONS_BOT_TOKEN") {
            self.notifications.bot_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("SIGNOFF_NOTIFICATIONS_TIMEOUT_SECS") {
            self.notifications.timeout_secs =
                parse_u64("SIGNOFF_NOTIFICATIONS_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SIGNOFF_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SIGNOFF_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_u16("SIGNOFF_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("SIGNOFF_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("SIGNOFF_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("SIGNOFF_LOGGING_LEVEL").or_else(|| read_env("SIGNOFF_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SIGNOFF_LOGGING_FORMAT").or_else(|| read_env("SIGNOFF_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(sweep_interval_secs) = overrides.sweep_interval_secs {
            self.approvals.sweep_interval_secs = sweep_interval_secs;
        }
        if let Some(timeout_minutes) = overrides.timeout_minutes {
            self.approvals.timeout_minutes = timeout_minutes;
        }
        if let Some(list_page_size) = overrides.list_page_size {
            self.approvals.list_page_size = list_page_size;
        }
        if let Some(cancel_max_retries) = overrides.cancel_max_retries {
            self.approvals.cancel_max_retries = cancel_max_retries;
        }
        if let Some(retry_base_delay_ms) = overrides.retry_base_delay_ms {
            self.approvals.retry_base_delay_ms = retry_base_delay_ms;
        }
        if let Some(enabled) = overrides.notifications_enabled {
            self.notifications.enabled = enabled;
        }
        if let Some(webhook_url) = overrides.webhook_url {
            self.notifications.webhook_url = Some(webhook_url);
        }
        if let Some(bot_token) = overrides.bot_token {
            self.notifications.bot_token = Some(secret_value(bot_token));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_approvals(&self.approvals)?;
        validate_notifications(&self.notifications)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("signoff.toml"), PathBuf::from("config/signoff.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_approvals(approvals: &ApprovalsConfig) -> Result<(), ConfigError> {
    if approvals.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "approvals.sweep_interval_secs must be greater than zero".to_string(),
        ));
    }

    if approvals.timeout_minutes == 0 {
        return Err(ConfigError::Validation(
            "approvals.timeout_minutes must be greater than zero".to_string(),
        ));
    }

    if approvals.list_page_size == 0 {
        return Err(ConfigError::Validation(
            "approvals.list_page_size must be greater than zero".to_string(),
        ));
    }

    if approvals.cancel_max_retries > 10 {
        return Err(ConfigError::Validation(
            "approvals.cancel_max_retries must be in range 0..=10".to_string(),
        ));
    }

    Ok(())
}

fn validate_notifications(notifications: &NotificationConfig) -> Result<(), ConfigError> {
    if notifications.timeout_secs == 0 || notifications.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "notifications.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    if !notifications.enabled {
        return Ok(());
    }

    let Some(url) = notifications.webhook_url.as_deref().map(str::trim) else {
        return Err(ConfigError::Validation(
            "notifications.enabled is true but notifications.webhook_url is not set".to_string(),
        ));
    };
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "notifications.webhook_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    approvals: Option<ApprovalsPatch>,
    notifications: Option<NotificationsPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ApprovalsPatch {
    sweep_interval_secs: Option<u64>,
    timeout_minutes: Option<u64>,
    list_page_size: Option<usize>,
    cancel_max_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationsPatch {
    enabled: Option<bool>,
    webhook_url: Option<String>,
    bot_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_match_the_documented_sweep_window() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.approvals.sweep_interval_secs == 300, "sweep interval defaults to 5m")?;
        ensure(config.approvals.timeout_minutes == 30, "timeout defaults to 30m")?;
        ensure(config.approvals.timeout_millis() == 1_800_000, "timeout converts to millis")?;
        ensure(!config.notifications.enabled, "notifications default to disabled")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SIGNOFF_WEBHOOK", "https://chat.example.test/hooks/approvals");
        env::set_var("TEST_SIGNOFF_BOT_TOKEN", "bot-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("signoff.toml");
            fs::write(
                &path,
                r#"
[notifications]
enabled = true
webhook_url = "${TEST_SIGNOFF_WEBHOOK}"
bot_token = "${TEST_SIGNOFF_BOT_TOKEN}"

[approvals]
timeout_minutes = 45
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.notifications.webhook_url.as_deref()
                    == Some("https://chat.example.test/hooks/approvals"),
                "webhook url should be interpolated from environment",
            )?;
            ensure(
                config.notifications.bot_token.as_ref().map(|token| token.expose_secret())
                    == Some("bot-from-env"),
                "bot token should be interpolated from environment",
            )?;
            ensure(config.approvals.timeout_minutes == 45, "timeout should come from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_SIGNOFF_WEBHOOK", "TEST_SIGNOFF_BOT_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SIGNOFF_LOG_LEVEL", "warn");
        env::set_var("SIGNOFF_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["SIGNOFF_LOG_LEVEL", "SIGNOFF_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SIGNOFF_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("SIGNOFF_APPROVALS_SWEEP_INTERVAL_SECS", "120");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("signoff.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[approvals]
sweep_interval_secs = 60
timeout_minutes = 20

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.approvals.sweep_interval_secs == 120,
                "env sweep interval should win over file and defaults",
            )?;
            ensure(config.approvals.timeout_minutes == 20, "file timeout should beat default")?;
            Ok(())
        })();

        clear_vars(&["SIGNOFF_DATABASE_URL", "SIGNOFF_APPROVALS_SWEEP_INTERVAL_SECS"]);
        result
    }

    #[test]
    fn every_approvals_key_layers_through_env_and_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let vars = [
            "SIGNOFF_APPROVALS_LIST_PAGE_SIZE",
            "SIGNOFF_APPROVALS_CANCEL_MAX_RETRIES",
            "SIGNOFF_APPROVALS_RETRY_BASE_DELAY_MS",
        ];
        env::set_var(vars[0], "25");
        env::set_var(vars[1], "5");
        env::set_var(vars[2], "40");

        let result = (|| -> Result<(), String> {
            let from_env = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(from_env.approvals.list_page_size == 25, "env page size should apply")?;
            ensure(from_env.approvals.cancel_max_retries == 5, "env retries should apply")?;
            ensure(from_env.approvals.retry_base_delay_ms == 40, "env retry delay should apply")?;

            let overridden = AppConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    list_page_size: Some(10),
                    cancel_max_retries: Some(1),
                    retry_base_delay_ms: Some(75),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;
            ensure(overridden.approvals.list_page_size == 10, "override page size should win")?;
            ensure(overridden.approvals.cancel_max_retries == 1, "override retries should win")?;
            ensure(
                overridden.approvals.retry_base_delay_ms == 75,
                "override retry delay should win",
            )
        })();

        clear_vars(&vars);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SIGNOFF_NOTIFICATIONS_ENABLED", "true");
        env::set_var("SIGNOFF_NOTIFICATIONS_WEBHOOK_URL", "chat.example.test/hooks");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message)
                    if message.contains("notifications.webhook_url")
            );
            ensure(has_message, "validation failure should mention notifications.webhook_url")
        })();

        clear_vars(&["SIGNOFF_NOTIFICATIONS_ENABLED", "SIGNOFF_NOTIFICATIONS_WEBHOOK_URL"]);
        result
    }

    #[test]
    fn zero_timeout_window_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides { timeout_minutes: Some(0), ..ConfigOverrides::default() },
            ..LoadOptions::default()
        });

        ensure(
            matches!(
                result,
                Err(ConfigError::Validation(ref message)) if message.contains("timeout_minutes")
            ),
            "zero timeout should fail validation",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SIGNOFF_NOTIFICATIONS_BOT_TOKEN", "bot-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("bot-secret-value"), "debug output should not contain token")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["SIGNOFF_NOTIFICATIONS_BOT_TOKEN"]);
        result
    }
}
