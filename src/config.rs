use std::env;
use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
const DEFAULT_PAYMENT_API_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PRODUCT_CATEGORY: &str = "limited-edition";
const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;
const DEFAULT_PURCHASE_HISTORY_LIMIT: usize = 3;
const DEFAULT_CONSENT_HISTORY_BUDGET: usize = 400;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Shared secret for webhook signature verification.
    ///
    /// Deliberately optional: a service booted without it still serves
    /// health checks, and every webhook request answers 500 with a
    /// critical log until the secret is deployed.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Accepted clock skew for signed webhook timestamps (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    #[validate(range(min = 1))]
    pub webhook_tolerance_secs: u64,

    /// Payment provider API base URL
    #[serde(default = "default_payment_api_base_url")]
    #[validate(length(min = 1))]
    pub payment_api_base_url: String,

    /// Payment provider API key (bearer token)
    #[serde(default)]
    pub payment_api_key: Option<String>,

    /// Payment provider request timeout (seconds)
    #[serde(default = "default_payment_api_timeout_secs")]
    pub payment_api_timeout_secs: u64,

    /// Product settled when session metadata names no product of its own
    #[serde(default)]
    pub default_product_id: Option<String>,

    /// Category tag a product must carry before its inventory is touched
    #[serde(default = "default_product_category")]
    pub expected_product_category: String,

    /// Remaining-count threshold that triggers low-stock warnings
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i64,

    /// Hard cap on purchase-history entries kept per customer
    #[serde(default = "default_purchase_history_limit")]
    #[validate(range(min = 1))]
    pub purchase_history_limit: usize,

    /// Serialized byte budget for a customer's consent history
    #[serde(default = "default_consent_history_budget")]
    #[validate(range(min = 32))]
    pub consent_history_budget: usize,
}

impl AppConfig {
    /// Creates a new configuration with defaults for everything the
    /// caller does not name. Used by tests and local tooling.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            webhook_secret: None,
            webhook_tolerance_secs: default_webhook_tolerance_secs(),
            payment_api_base_url: default_payment_api_base_url(),
            payment_api_key: None,
            payment_api_timeout_secs: default_payment_api_timeout_secs(),
            default_product_id: None,
            expected_product_category: default_product_category(),
            low_stock_threshold: default_low_stock_threshold(),
            purchase_history_limit: default_purchase_history_limit(),
            consent_history_budget: default_consent_history_budget(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration load error: {0}")]
    Load(#[from] ConfigError),
    #[error("Configuration validation error: {0}")]
    Validation(#[from] ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_db_connect_timeout_secs() -> u64 {
    10
}

fn default_db_idle_timeout_secs() -> u64 {
    300
}

fn default_db_acquire_timeout_secs() -> u64 {
    10
}

fn default_webhook_tolerance_secs() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}

fn default_payment_api_base_url() -> String {
    // Local provider mock; production deployments set APP__PAYMENT_API_BASE_URL
    "http://localhost:4242".to_string()
}

fn default_payment_api_timeout_secs() -> u64 {
    DEFAULT_PAYMENT_API_TIMEOUT_SECS
}

fn default_product_category() -> String {
    DEFAULT_PRODUCT_CATEGORY.to_string()
}

fn default_low_stock_threshold() -> i64 {
    DEFAULT_LOW_STOCK_THRESHOLD
}

fn default_purchase_history_limit() -> usize {
    DEFAULT_PURCHASE_HISTORY_LIMIT
}

fn default_consent_history_budget() -> usize {
    DEFAULT_CONSENT_HISTORY_BUDGET
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the configured level applies to
/// this crate with tower_http at debug.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("settlement_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Docker config (config/docker.toml) if DOCKER env var is set
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
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

    let mut builder = Config::builder()
        .set_default("database_url", "sqlite://settlement.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    if env::var("DOCKER").is_ok() {
        info!("Docker environment detected");
        builder =
            builder.add_source(File::with_name(&format!("{}/docker", CONFIG_DIR)).required(false));
    }

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    if app_config.webhook_secret.is_none() {
        // Boot proceeds; every webhook delivery will be answered 500
        // until the secret lands
        error!(
            "Webhook secret is not configured. Set APP__WEBHOOK_SECRET before pointing the payment provider at this service."
        );
    }

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite://settlement.db?mode=memory".into(),
            "127.0.0.1".into(),
            8080,
            "development".into(),
        )
    }

    #[test]
    fn constructor_applies_pipeline_defaults() {
        let cfg = base_config();
        assert_eq!(cfg.webhook_tolerance_secs, 300);
        assert_eq!(cfg.expected_product_category, "limited-edition");
        assert_eq!(cfg.low_stock_threshold, 10);
        assert_eq!(cfg.purchase_history_limit, 3);
        assert_eq!(cfg.consent_history_budget, 400);
        assert!(cfg.webhook_secret.is_none());
    }

    #[test]
    fn environment_helpers() {
        let mut cfg = base_config();
        assert!(cfg.is_development());
        assert!(!cfg.is_production());
        cfg.environment = "Production".into();
        assert!(cfg.is_production());
    }

    #[test]
    fn validation_rejects_zero_tolerance() {
        let mut cfg = base_config();
        cfg.webhook_tolerance_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_rejects_empty_database_url() {
        let mut cfg = base_config();
        cfg.database_url = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_accepts_defaults() {
        assert!(base_config().validate().is_ok());
    }
}
