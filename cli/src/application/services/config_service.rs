//! Application service: configuration use-cases.

use anyhow::Result;

use crate::application::ports::ConfigStore;
use crate::domain::config::{CopyConfig, apply_config_value};

/// Load configuration.
///
/// # Errors
///
/// Returns an error if the stored configuration cannot be read.
pub fn load_config(store: &impl ConfigStore) -> Result<CopyConfig> {
    store.load()
}

/// Validate and persist a single `key = value` setting. Returns the updated
/// configuration.
///
/// # Errors
///
/// Returns an error if the key or value is invalid or the file cannot be
/// written. Nothing is written on validation errors.
pub fn set_config_value(store: &impl ConfigStore, key: &str, value: &str) -> Result<CopyConfig> {
    let mut config = store.load()?;
    apply_config_value(&mut config, key, value)?;
    store.save(&config)?;
    Ok(config)
}
