//! Configuration module for the CompliCal backend.
//!
//! All configuration is loaded from environment variables with sensible defaults,
//! once at startup, and handed to handlers through `AppState`.

use std::env;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::path::PathBuf;

/// Origins allowed by CORS when `COMPLICAL_ALLOWED_ORIGINS` is unset.
const DEFAULT_ORIGINS: &[&str] = &[
    "https://complical.com",
    "https://www.complical.com",
    "https://app.complical.com",
];

/// Origin added in the `dev` environment.
const DEV_ORIGIN: &str = "http://localhost:3000";

/// Accepted access token lifetimes, in minutes.
const JWT_TTL_MINUTES: RangeInclusive<i64> = 1..=1440;

/// Accepted refresh token lifetimes, in days.
const REFRESH_TTL_DAYS: RangeInclusive<i64> = 1..=365;

/// Secret used when running in `dev` without `COMPLICAL_JWT_SECRET`.
const DEV_JWT_SECRET: &str = "complical-dev-secret-change-me";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Usage plan new API keys are bound to. Throttling and quota enforcement
/// happen at the gateway; the service only records and reports the plan.
#[derive(Debug, Clone)]
pub struct UsagePlan {
    pub id: String,
    pub monthly_quota: u64,
}

/// Price identifiers of the payments provider, one per tier.
#[derive(Debug, Clone)]
pub struct StripePrices {
    pub developer: String,
    pub professional: String,
    pub enterprise: String,
}

/// Payments provider settings.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub stripe_secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub prices: StripePrices,
    pub app_url: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Deployment environment name (dev, staging, prod)
    pub environment: String,
    pub allowed_origins: Vec<String>,
    pub jwt_secret: String,
    pub jwt_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
    pub usage_plan: UsagePlan,
    /// Optional seed file loaded at startup
    pub seed_path: Option<PathBuf>,
    /// Interval between expired API key sweeps
    pub key_sweep_secs: u64,
    pub billing: BillingConfig,
}

/// Configuration could not be loaded.
#[derive(Debug)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String },
    Missing(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => write!(f, "invalid value for {}: {:?}", var, value),
            ConfigError::Missing(var) => write!(f, "{} must be set", var),
        }
    }
}

impl std::error::Error for ConfigError {}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = var_or(name, default);
    value
        .parse()
        .map_err(|_| ConfigError::Invalid { var: name, value })
}

/// Parse a variable that must fall within `range`.
fn parse_bounded<T>(
    name: &'static str,
    default: &str,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd,
{
    let value = var_or(name, default);
    match value.parse::<T>() {
        Ok(parsed) if range.contains(&parsed) => Ok(parsed),
        _ => Err(ConfigError::Invalid { var: name, value }),
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let db_path = var_or("COMPLICAL_DB_PATH", "./data/complical.sqlite").into();
        let bind_addr = parse_var("COMPLICAL_BIND_ADDR", "127.0.0.1:8080")?;
        let log_level = var_or("COMPLICAL_LOG_LEVEL", "info");

        let log_format = match var_or("COMPLICAL_LOG_FORMAT", "text").as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => {
                return Err(ConfigError::Invalid {
                    var: "COMPLICAL_LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        let environment = var_or("COMPLICAL_ENVIRONMENT", "dev");

        let mut allowed_origins: Vec<String> = match env::var("COMPLICAL_ALLOWED_ORIGINS") {
            Ok(list) => list
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            Err(_) => DEFAULT_ORIGINS.iter().map(|o| o.to_string()).collect(),
        };
        if environment == "dev" && !allowed_origins.iter().any(|o| o == DEV_ORIGIN) {
            allowed_origins.push(DEV_ORIGIN.to_string());
        }

        let jwt_secret = match env::var("COMPLICAL_JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ if environment == "dev" => DEV_JWT_SECRET.to_string(),
            _ => return Err(ConfigError::Missing("COMPLICAL_JWT_SECRET")),
        };

        let usage_plan = UsagePlan {
            id: var_or("COMPLICAL_USAGE_PLAN_ID", "free-tier"),
            monthly_quota: parse_var("COMPLICAL_USAGE_PLAN_QUOTA", "10000")?,
        };

        let billing = BillingConfig {
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").ok(),
            webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").ok(),
            prices: StripePrices {
                developer: var_or("STRIPE_PRICE_DEVELOPER", "price_developer"),
                professional: var_or("STRIPE_PRICE_PROFESSIONAL", "price_professional"),
                enterprise: var_or("STRIPE_PRICE_ENTERPRISE", "price_enterprise"),
            },
            app_url: var_or("COMPLICAL_APP_URL", "https://app.complical.com"),
        };

        Ok(Self {
            db_path,
            bind_addr,
            log_level,
            log_format,
            environment,
            allowed_origins,
            jwt_secret,
            jwt_ttl_minutes: parse_bounded("COMPLICAL_JWT_TTL_MINUTES", "60", JWT_TTL_MINUTES)?,
            refresh_ttl_days: parse_bounded("COMPLICAL_REFRESH_TTL_DAYS", "30", REFRESH_TTL_DAYS)?,
            usage_plan,
            seed_path: env::var("COMPLICAL_SEED_PATH").ok().map(PathBuf::from),
            key_sweep_secs: parse_var("COMPLICAL_KEY_SWEEP_SECS", "3600")?,
            billing,
        })
    }
}
