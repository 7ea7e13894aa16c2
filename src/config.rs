//! Application configuration management.
//!
//! This module loads configuration from environment variables using the
//! `envy` crate, which deserializes them into a type-safe struct.

use std::fmt;

use chrono::Duration;
use serde::Deserialize;
use thiserror::Error;

use crate::security::replay::DEFAULT_WINDOW_SECS;
use crate::services::rate_limiter::RateLimits;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
}

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `MASTER_KEY` (required): base64 of the 32-byte AES-256-GCM key
/// - `DATABASE_URL` (optional): PostgreSQL connection string; without it
///   the in-memory store is used
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `REPLAY_WINDOW_SECS` (optional): timestamp tolerance, defaults to 300
/// - `RATE_LIMIT_PER_MINUTE` / `_PER_HOUR` / `_PER_DAY` (optional):
///   defaults 10 / 100 / 1000
/// - `EXECUTOR_URL` (optional): downstream execution engine; without it
///   orders are paper-filled
/// - `EXECUTOR_TIMEOUT_SECS` (optional): defaults to 5
/// - `WINDOW_SWEEP_INTERVAL_SECS` (optional): defaults to 3600
/// - `DEV_ACCOUNT_KEY` / `DEV_ACCOUNT_ID` (optional): seed a dashboard
///   account key into the in-memory store
#[derive(Clone, Deserialize)]
pub struct Config {
    pub master_key: String,

    pub database_url: Option<String>,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_replay_window")]
    pub replay_window_secs: i64,

    #[serde(default = "default_per_minute")]
    pub rate_limit_per_minute: i64,

    #[serde(default = "default_per_hour")]
    pub rate_limit_per_hour: i64,

    #[serde(default = "default_per_day")]
    pub rate_limit_per_day: i64,

    pub executor_url: Option<String>,

    #[serde(default = "default_executor_timeout")]
    pub executor_timeout_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub window_sweep_interval_secs: u64,

    pub dev_account_key: Option<String>,

    pub dev_account_id: Option<uuid::Uuid>,
}

fn default_port() -> u16 {
    3000
}

fn default_replay_window() -> i64 {
    DEFAULT_WINDOW_SECS
}

fn default_per_minute() -> i64 {
    RateLimits::default().per_minute
}

fn default_per_hour() -> i64 {
    RateLimits::default().per_hour
}

fn default_per_day() -> i64 {
    RateLimits::default().per_day
}

fn default_executor_timeout() -> u64 {
    5
}

fn default_sweep_interval() -> u64 {
    3600
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Loads a `.env` file first if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if `MASTER_KEY` is missing, a value cannot be
    /// parsed into its expected type, or a limit or interval is not
    /// positive.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = envy::from_env::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// Every limit and interval must be positive.
    fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("REPLAY_WINDOW_SECS", self.replay_window_secs),
            ("RATE_LIMIT_PER_MINUTE", self.rate_limit_per_minute),
            ("RATE_LIMIT_PER_HOUR", self.rate_limit_per_hour),
            ("RATE_LIMIT_PER_DAY", self.rate_limit_per_day),
        ];
        if let Some((name, _)) = checks.into_iter().find(|(_, value)| *value <= 0) {
            return Err(ConfigError::NotPositive(name));
        }
        if self.executor_timeout_secs == 0 {
            return Err(ConfigError::NotPositive("EXECUTOR_TIMEOUT_SECS"));
        }
        if self.window_sweep_interval_secs == 0 {
            return Err(ConfigError::NotPositive("WINDOW_SWEEP_INTERVAL_SECS"));
        }
        Ok(())
    }

    pub fn replay_window(&self) -> Duration {
        Duration::seconds(self.replay_window_secs)
    }

    pub fn rate_limits(&self) -> RateLimits {
        RateLimits {
            per_minute: self.rate_limit_per_minute,
            per_hour: self.rate_limit_per_hour,
            per_day: self.rate_limit_per_day,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("master_key", &"<redacted>")
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("server_port", &self.server_port)
            .field("replay_window_secs", &self.replay_window_secs)
            .field("rate_limits", &self.rate_limits())
            .field("executor_url", &self.executor_url)
            .field("executor_timeout_secs", &self.executor_timeout_secs)
            .field("window_sweep_interval_secs", &self.window_sweep_interval_secs)
            .field("dev_account_key", &self.dev_account_key.as_ref().map(|_| "<set>"))
            .finish()
    }
}
