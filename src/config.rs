use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 4000;
const CONFIG_DIR: &str = "config";
const DEFAULT_CLIENT_URL: &str = "http://localhost:3000";
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_CHECKOUT_CURRENCY: &str = "inr";
const DEFAULT_SHIPPING_COUNTRIES: &str = "IN";
const DEFAULT_PRODUCT_IMAGE: &str = "https://via.placeholder.com/300";
/// Days between order placement and the promised delivery date.
pub const DELIVERY_LEAD_DAYS: i64 = 4;
const DEFAULT_HANDOFF_BACKEND: &str = "in-memory";
const DEFAULT_HANDOFF_TTL_SECS: u64 = 120;
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Redis connection URL, used by the redis handoff store
    pub redis_url: String,

    /// Access token signing secret
    #[validate(length(min = 64), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Refresh token signing secret, must differ from `jwt_secret`
    #[validate(length(min = 64), custom = "validate_jwt_secret")]
    pub refresh_secret: String,

    /// Access token lifetime in seconds (5min - 24h)
    #[validate(range(min = 300, max = 86400))]
    pub jwt_expiration: u64,

    /// Refresh token lifetime in seconds (1d - 30d)
    #[validate(range(min = 86400, max = 2592000))]
    pub refresh_token_expiration: u64,

    /// Server host address
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[validate(length(min = 1))]
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// CORS: allow credentials (the refresh cookie needs it)
    #[serde(default = "default_true_bool")]
    pub cors_allow_credentials: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Per-request timeout applied by the HTTP stack
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Storefront base URL used to build redirect targets
    #[serde(default = "default_client_url")]
    #[validate(url)]
    pub client_url: String,

    /// Stripe secret key; checkout is rejected when unset
    #[serde(default)]
    pub stripe_secret_key: Option<String>,

    #[serde(default = "default_stripe_api_base")]
    #[validate(url)]
    pub stripe_api_base: String,

    #[serde(default = "default_stripe_timeout_secs")]
    pub stripe_timeout_secs: u64,

    /// ISO currency code for checkout line items
    #[serde(default = "default_checkout_currency")]
    #[validate(length(equal = 3))]
    pub checkout_currency: String,

    /// Comma-separated ISO country codes accepted for shipping
    #[serde(default = "default_shipping_countries")]
    #[validate(length(min = 2))]
    pub shipping_allowed_countries: String,

    /// Image used when a product is created without one
    #[serde(default = "default_product_image")]
    #[validate(url)]
    pub default_product_image: String,

    #[serde(default = "default_delivery_lead_days")]
    #[validate(range(min = 1, max = 60))]
    pub delivery_lead_days: i64,

    /// Session handoff store: "in-memory" or "redis"
    #[serde(default = "default_handoff_backend")]
    #[validate(custom = "validate_handoff_backend")]
    pub handoff_store_backend: String,

    #[serde(default = "default_handoff_ttl_secs")]
    #[validate(range(min = 10, max = 3600))]
    pub handoff_ttl_secs: u64,

    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1, max = 100000))]
    pub event_channel_capacity: usize,
}

impl AppConfig {
    /// Creates a new configuration with defaults for everything optional
    pub fn new(
        database_url: String,
        redis_url: String,
        jwt_secret: String,
        refresh_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            redis_url,
            jwt_secret,
            refresh_secret,
            jwt_expiration: 10_800,
            refresh_token_expiration: 604_800,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_credentials: true,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            client_url: default_client_url(),
            stripe_secret_key: None,
            stripe_api_base: default_stripe_api_base(),
            stripe_timeout_secs: default_stripe_timeout_secs(),
            checkout_currency: default_checkout_currency(),
            shipping_allowed_countries: default_shipping_countries(),
            default_product_image: default_product_image(),
            delivery_lead_days: default_delivery_lead_days(),
            handoff_store_backend: default_handoff_backend(),
            handoff_ttl_secs: default_handoff_ttl_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Allowed CORS origins, trimmed and without empty entries
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .map(split_csv)
            .unwrap_or_default()
    }

    /// Upper-cased shipping country allow-list
    pub fn allowed_countries(&self) -> Vec<String> {
        split_csv(&self.shipping_allowed_countries)
            .into_iter()
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }

    /// Storefront base URL without a trailing slash
    pub fn client_base(&self) -> &str {
        self.client_url.trim_end_matches('/')
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.is_development() && self.cors_origins().is_empty() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message =
                Some("Set APP__CORS_ALLOWED_ORIGINS for non-development environments".into());
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message = Some(
                "The bundled development JWT secret must not be used outside development".into(),
            );
            errors.add("jwt_secret", err);
        }

        if self.jwt_secret == self.refresh_secret {
            let mut err = ValidationError::new("refresh_secret_reused");
            err.message = Some("refresh_secret must differ from jwt_secret".into());
            errors.add("refresh_secret", err);
        }

        if self.allowed_countries().is_empty()
            || self
                .allowed_countries()
                .iter()
                .any(|c| c.len() != 2 || !c.chars().all(|ch| ch.is_ascii_alphabetic()))
        {
            let mut err = ValidationError::new("shipping_allowed_countries");
            err.message = Some("Expected comma-separated two-letter country codes".into());
            errors.add("shipping_allowed_countries", err);
        }

        if self.is_production() && self.stripe_secret_key.is_none() {
            let mut err = ValidationError::new("stripe_secret_key_required");
            err.message = Some("Set APP__STRIPE_SECRET_KEY in production".into());
            errors.add("stripe_secret_key", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true_bool() -> bool {
    true
}

fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    8
}
fn default_db_idle_timeout_secs() -> u64 {
    300
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_client_url() -> String {
    DEFAULT_CLIENT_URL.to_string()
}

fn default_stripe_api_base() -> String {
    DEFAULT_STRIPE_API_BASE.to_string()
}

fn default_stripe_timeout_secs() -> u64 {
    10
}

fn default_checkout_currency() -> String {
    DEFAULT_CHECKOUT_CURRENCY.to_string()
}

fn default_shipping_countries() -> String {
    DEFAULT_SHIPPING_COUNTRIES.to_string()
}

fn default_product_image() -> String {
    DEFAULT_PRODUCT_IMAGE.to_string()
}

fn default_delivery_lead_days() -> i64 {
    DELIVERY_LEAD_DAYS
}

fn default_handoff_backend() -> String {
    DEFAULT_HANDOFF_BACKEND.to_string()
}

fn default_handoff_ttl_secs() -> u64 {
    DEFAULT_HANDOFF_TTL_SECS
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn validate_handoff_backend(value: &str) -> Result<(), ValidationError> {
    match value {
        "in-memory" | "redis" => Ok(()),
        _ => {
            let mut err = ValidationError::new("handoff_store_backend");
            err.message = Some("handoff_store_backend must be 'in-memory' or 'redis'".into());
            Err(err)
        }
    }
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ValidationError::new("invalid_log_level")),
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    const DISALLOWED: [&str; 3] = ["your-secret-key", "default-secret-key", "changeme"];
    if DISALLOWED
        .iter()
        .any(|&bad| trimmed.eq_ignore_ascii_case(bad))
    {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be overridden with a secure random value".into());
        return Err(err);
    }

    // Reject trivially weak secrets made of a single repeated character
    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("jwt_secret");
            err.message = Some("JWT secret must not be a repeated character".into());
            return Err(err);
        }
    }

    Ok(())
}

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=debug", level);
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
    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Same as [`load_config`] with an explicit config directory and profile.
pub fn load_config_from(config_dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let default_file = config_dir.join("default");
    let env_file = config_dir.join(run_env);

    // jwt_secret and refresh_secret have no default
    let config = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("redis_url", "redis://localhost:6379")?
        .set_default("jwt_expiration", 10_800)?
        .set_default("refresh_token_expiration", 604_800)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(default_file).required(false))
        .add_source(File::from(env_file).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    for key in ["jwt_secret", "refresh_secret"] {
        if config.get_string(key).is_err() {
            error!(
                "{} is not configured. Set APP__{} to a random string of at least 64 characters.",
                key,
                key.to_ascii_uppercase()
            );
            return Err(AppConfigError::Load(ConfigError::NotFound(key.into())));
        }
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
