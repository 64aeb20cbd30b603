use std::env;
use std::str::FromStr;

const BYTES_PER_GB: f64 = (1 << 30) as f64;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(String),
    #[error("Invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// Explicit configuration object, built once by the process entry point and
/// passed into constructors. There is no global config singleton.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub payment: PaymentConfig,
    pub free_plan: FreePlanConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    /// Turso database URL, or a `file:` / `:memory:` URL for a local database.
    pub url: String,
    pub token: String,
}

impl DatabaseConfig {
    pub fn is_local(&self) -> bool {
        self.url == ":memory:" || self.url.starts_with("file:")
    }
}

#[derive(Clone, Debug)]
pub struct PaymentConfig {
    pub merchant_id: String,
    pub sandbox: bool,
    pub callback_url: String,
}

impl PaymentConfig {
    pub fn base_url(&self) -> &'static str {
        if self.sandbox {
            "https://sandbox.zarinpal.com/pg/v4/payment"
        } else {
            "https://api.zarinpal.com/pg/v4/payment"
        }
    }
}

#[derive(Clone, Debug)]
pub struct FreePlanConfig {
    pub traffic_gb: f64,
    pub duration_days: i64,
}

impl FreePlanConfig {
    pub fn traffic_bytes(&self) -> i64 {
        (self.traffic_gb * BYTES_PER_GB) as i64
    }
}

pub fn build_config() -> Result<AppConfig, ConfigError> {
    info!("Building AppConfig...");

    let config = AppConfig {
        database: DatabaseConfig {
            url: require("TURSO_URL")?,
            token: env::var("TURSO_TOKEN").unwrap_or_default(),
        },
        payment: PaymentConfig {
            merchant_id: require("ZARINPAL_MERCHANT_ID")?,
            sandbox: parse_or("ZARINPAL_SANDBOX", true)?,
            callback_url: require("ZARINPAL_CALLBACK_URL")?,
        },
        free_plan: FreePlanConfig {
            traffic_gb: parse_or("FREE_PLAN_GB", 1.0)?,
            duration_days: parse_or("FREE_PLAN_DURATION_DAYS", 30)?,
        },
    };

    info!("AppConfig built");
    Ok(config)
}

fn require(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key.to_string()))
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid(key.to_string(), raw)),
        Err(_) => Ok(default),
    }
}
