//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast on malformed values. The API token is
//! wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use std::time::Duration;

use crate::error::{Error, Result};
use crate::sync::{SyncConfig, SyncPolicy};
use secrecy::SecretString;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://stepsync.db";
pub const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug)]
pub struct Config {
    pub database_url: String,
    /// Base URL of the service steps are delivered to.
    pub endpoint: Option<String>,
    pub api_token: Option<SecretString>,
    /// `None` disables the per-delivery timeout.
    pub delivery_timeout: Option<Duration>,
    pub sync_policy: SyncPolicy,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let delivery_timeout = match optional_var("STEPSYNC_DELIVERY_TIMEOUT_MS") {
            Some(raw) => parse_timeout_ms(&raw)?,
            None => Some(Duration::from_millis(DEFAULT_DELIVERY_TIMEOUT_MS)),
        };

        let sync_policy = match optional_var("STEPSYNC_SYNC_POLICY") {
            Some(raw) => raw.parse()?,
            None => SyncPolicy::default(),
        };

        Ok(Self {
            database_url: optional_var("STEPSYNC_DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            endpoint: optional_var("STEPSYNC_ENDPOINT"),
            api_token: optional_var("STEPSYNC_API_TOKEN").map(SecretString::from),
            delivery_timeout,
            sync_policy,
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Coordinator settings derived from this configuration.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            policy: self.sync_policy,
            delivery_timeout: self.delivery_timeout,
        }
    }

    /// The delivery endpoint, or a configuration error naming the variable.
    pub fn require_endpoint(&self) -> Result<&str> {
        self.endpoint
            .as_deref()
            .ok_or_else(|| Error::Config("STEPSYNC_ENDPOINT is not set".to_string()))
    }
}

/// Unset and empty variables both count as absent.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_timeout_ms(raw: &str) -> Result<Option<Duration>> {
    let ms: u64 = raw.trim().parse().map_err(|_| {
        Error::Config(format!(
            "STEPSYNC_DELIVERY_TIMEOUT_MS must be a whole number of milliseconds, got '{raw}'"
        ))
    })?;
    Ok((ms > 0).then(|| Duration::from_millis(ms)))
}
