//! Core configuration traits

use crate::errors::{Result, TesseraError};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Configuration loaded from a file, overridden by the environment, then validated
pub trait ConfigSource: Sized + Default + DeserializeOwned {
    /// Prefix of the environment variables that override file values
    const ENV_PREFIX: &'static str = "TESSERA_";

    /// Load configuration from a `.toml` or `.json` file
    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TesseraError::config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| TesseraError::config(format!("Invalid JSON: {e}"))),
            _ => Err(TesseraError::config("Unsupported file format")),
        }
    }

    /// Apply `TESSERA_*` environment overrides
    fn merge_with_env(&mut self) -> Result<()>;

    /// Validate the configuration
    fn validate(&self) -> Result<()>;

    /// Load, apply environment overrides and validate
    fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_file(path)?;
        config.merge_with_env()?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

/// Read an override variable, treating empty values as unset
pub(crate) fn env_override(prefix: &str, name: &str) -> Option<String> {
    std::env::var(format!("{prefix}{name}"))
        .ok()
        .filter(|value| !value.is_empty())
}

/// Parse a numeric override, naming the variable on failure
pub(crate) fn parse_env_u64(prefix: &str, name: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| TesseraError::config(format!("Invalid number in {prefix}{name}")))
}
