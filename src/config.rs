use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_DATABASE_URL: &str = "sqlite://production_planner.db?mode=rwc";
const CONFIG_DIR: &str = "config";
const DEFAULT_EVENT_CHANNEL_CAPACITY: i64 = 1024;

/// Application configuration
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL (postgres:// or sqlite://)
    #[validate(custom = "validate_database_url")]
    pub database_url: String,

    /// Deployment environment name, e.g. development, test, production
    #[validate(length(min = 1))]
    pub environment: String,

    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines instead of human readable text
    pub log_json: bool,

    /// Run pending migrations at startup
    pub auto_migrate: bool,

    #[validate(range(min = 1, max = 1000))]
    pub db_max_connections: u32,

    #[validate(range(min = 1, max = 1000))]
    pub db_min_connections: u32,

    #[validate(range(min = 1, max = 3600))]
    pub db_connect_timeout_secs: u64,

    #[validate(range(min = 1, max = 3600))]
    pub db_acquire_timeout_secs: u64,

    pub db_idle_timeout_secs: u64,

    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Publish `LowStockDetected` events after a plan is confirmed
    pub low_stock_alerts: bool,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.db_connect_timeout_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.db_acquire_timeout_secs)
    }

    /// Zero disables idle reaping.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.db_idle_timeout_secs > 0).then(|| Duration::from_secs(self.db_idle_timeout_secs))
    }

    /// Checks that span more than one field.
    pub fn validate_additional_constraints(&self) -> Result<(), ValidationError> {
        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_min_connections");
            err.message = Some("db_min_connections cannot exceed db_max_connections".into());
            return Err(err);
        }
        if self.is_production() && self.database_url.starts_with("sqlite:") {
            let mut err = ValidationError::new("database_url");
            err.message = Some(
                "SQLite does not provide row locks; use PostgreSQL in production".into(),
            );
            return Err(err);
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Configuration constraint failed: {0}")]
    Constraint(ValidationError),
}

fn validate_database_url(url: &str) -> Result<(), ValidationError> {
    if url.starts_with("postgres://") || url.starts_with("postgresql://") || url.starts_with("sqlite:")
    {
        Ok(())
    } else {
        let mut err = ValidationError::new("database_url");
        err.message = Some("Must start with postgres://, postgresql:// or sqlite:".into());
        Err(err)
    }
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter.
/// `RUST_LOG` takes precedence when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("production_planner={},sea_orm=warn", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Loads configuration from an explicit directory. Environment variables
/// still override file values.
pub fn load_config_from(dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    let default_file = dir.join("default");
    let env_file = dir.join(run_env);

    let config = Config::builder()
        .set_default("database_url", DEFAULT_DATABASE_URL)?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("auto_migrate", true)?
        .set_default("db_max_connections", 10)?
        .set_default("db_min_connections", 1)?
        .set_default("db_connect_timeout_secs", 30)?
        .set_default("db_acquire_timeout_secs", 30)?
        .set_default("db_idle_timeout_secs", 600)?
        .set_default("event_channel_capacity", DEFAULT_EVENT_CHANNEL_CAPACITY)?
        .set_default("low_stock_alerts", true)?
        .add_source(File::with_name(&default_file.to_string_lossy()).required(false))
        .add_source(File::with_name(&env_file.to_string_lossy()).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration constraint failed: {:?}", e);
        AppConfigError::Constraint(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
