//! # Engine Configuration Module
//!
//! Tunables for cooking retries, expiry classification, notifications, the
//! database connection and logging. Every struct has a `Default`; the binary
//! overrides them from the environment (and an optional `.env` file) through
//! [`EngineConfig::from_env`].

use anyhow::{Context, Result};
use rand::Rng;
use std::fmt;
use std::str::FromStr;

use crate::expiry::EXPIRING_SOON_WINDOW_DAYS;

pub const DEFAULT_LOCALE: &str = "en";
pub const DEFAULT_LOG_FILTER: &str = "fridge_recipes=info";

/// Retry settings for cooking under concurrent stock changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookRetryConfig {
    /// Total cook attempts before giving up with a conflict
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between attempts in milliseconds
    pub max_retry_delay_ms: u64,
}

impl Default for CookRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_retry_delay_ms: 25,
            max_retry_delay_ms: 500,
        }
    }
}

/// Delay before retry number `attempt` (1-based): exponential, capped, with
/// up to 50% random jitter taken off.
pub fn calculate_retry_delay(attempt: u32, config: &CookRetryConfig) -> u64 {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = config
        .base_retry_delay_ms
        .saturating_mul(1u64 << exponent)
        .min(config.max_retry_delay_ms);
    if delay == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(delay / 2..=delay)
}

/// Notification delivery settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    /// Consecutive failures before notifications are skipped
    pub circuit_breaker_threshold: u32,
    /// Seconds to skip notifications once the breaker opens
    pub circuit_breaker_reset_secs: u64,
    /// Locale used when the actor has none
    pub default_locale: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60,
            default_locale: DEFAULT_LOCALE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow::anyhow!("Unknown log format: {other}")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => f.write_str("pretty"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Days before expiry at which a lot counts as expiring soon
    pub expiring_soon_window_days: i64,
    pub retry: CookRetryConfig,
    pub notifications: NotificationConfig,
    pub database: DatabaseConfig,
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            expiring_soon_window_days: EXPIRING_SOON_WINDOW_DAYS,
            retry: CookRetryConfig::default(),
            notifications: NotificationConfig::default(),
            database: DatabaseConfig::default(),
            log_format: LogFormat::default(),
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("{err}"))
            .with_context(|| format!("Invalid value '{raw}' for {key}")),
        None => Ok(None),
    }
}

impl EngineConfig {
    /// Load `.env` if present, then apply environment overrides
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(days) = parse_var::<i64>(&lookup, "FRIDGE_EXPIRING_WINDOW_DAYS")? {
            anyhow::ensure!(days >= 0, "FRIDGE_EXPIRING_WINDOW_DAYS must not be negative");
            config.expiring_soon_window_days = days;
        }
        if let Some(attempts) = parse_var::<u32>(&lookup, "FRIDGE_COOK_MAX_ATTEMPTS")? {
            anyhow::ensure!(attempts >= 1, "FRIDGE_COOK_MAX_ATTEMPTS must be at least 1");
            config.retry.max_attempts = attempts;
        }
        if let Some(ms) = parse_var(&lookup, "FRIDGE_COOK_BASE_DELAY_MS")? {
            config.retry.base_retry_delay_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, "FRIDGE_COOK_MAX_DELAY_MS")? {
            config.retry.max_retry_delay_ms = ms;
        }
        if let Some(threshold) = parse_var(&lookup, "FRIDGE_NOTIFY_BREAKER_THRESHOLD")? {
            config.notifications.circuit_breaker_threshold = threshold;
        }
        if let Some(secs) = parse_var(&lookup, "FRIDGE_NOTIFY_BREAKER_RESET_SECS")? {
            config.notifications.circuit_breaker_reset_secs = secs;
        }
        if let Some(locale) = lookup("FRIDGE_DEFAULT_LOCALE") {
            config.notifications.default_locale = locale;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            config.database.url = Some(url);
        }
        if let Some(max) = parse_var(&lookup, "FRIDGE_DB_MAX_CONNECTIONS")? {
            config.database.max_connections = max;
        }
        if let Some(format) = parse_var(&lookup, "FRIDGE_LOG_FORMAT")? {
            config.log_format = format;
        }

        Ok(config)
    }
}
