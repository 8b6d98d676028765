//! Domain types and validators for spacecopy configuration.
//!
//! Pure functions only: no I/O, no async, no filesystem access.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

// ── Constants ────────────────────────────────────────────────────────────────

pub const VALID_CONFIG_KEYS: &[&str] = &[
    "retry.attempts",
    "retry.base_delay_ms",
    "start.timeout_secs",
    "start.poll_interval_ms",
    "http.timeout_secs",
];

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.spacecopy/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct CopyConfig {
    /// Bounded backoff used for deletes and unbinds.
    pub retry: RetryConfig,
    /// Polling used while waiting for a copied application to start.
    pub start: StartConfig,
    /// Control-plane HTTP client settings.
    pub http: HttpConfig,
}

/// Bounded exponential backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub attempts: u32,
    /// Delay before the second attempt; doubled for every further attempt.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// Start polling settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StartConfig {
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for StartConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            poll_interval_ms: 2000,
        }
    }
}

impl StartConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout for control-plane calls (payload transfers excluded).
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 120 }
    }
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates a configuration key against the whitelist.
///
/// # Errors
///
/// Returns an error if the key is not in the allowed list.
pub fn validate_config_key(key: &str) -> Result<()> {
    if !VALID_CONFIG_KEYS.contains(&key) {
        return Err(ConfigError::UnknownKey {
            key: key.to_string(),
            valid: VALID_CONFIG_KEYS.join(", "),
        }
        .into());
    }
    Ok(())
}

/// Validates a configuration value for the given key.
///
/// Every key takes a positive integer.
///
/// # Errors
///
/// Returns an error if the value is not valid for the key.
pub fn validate_config_value(key: &str, value: &str) -> Result<()> {
    match value.parse::<u64>() {
        Ok(n) if n > 0 && (key != "retry.attempts" || u32::try_from(n).is_ok()) => Ok(()),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            valid: "a positive integer".to_string(),
        }
        .into()),
    }
}

/// Apply a validated `key = value` pair to `config`.
///
/// # Errors
///
/// Returns an error if the key is unknown or the value is invalid.
pub fn apply_config_value(config: &mut CopyConfig, key: &str, value: &str) -> Result<()> {
    validate_config_key(key)?;
    validate_config_value(key, value)?;
    let n: u64 = value.parse()?;
    match key {
        "retry.attempts" => config.retry.attempts = u32::try_from(n)?,
        "retry.base_delay_ms" => config.retry.base_delay_ms = n,
        "start.timeout_secs" => config.start.timeout_secs = n,
        "start.poll_interval_ms" => config.start.poll_interval_ms = n,
        "http.timeout_secs" => config.http.timeout_secs = n,
        _ => anyhow::bail!("Unknown setting: {key}"),
    }
    Ok(())
}

// ── Unit tests ───────────────────────────────────────────────────────────────
