//! # Runtime Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! file (or no file at all) yields a working configuration.
//!
//! ```toml
//! entity_capacity = 4096
//! store_capacity = 1024
//! trace_commands = true
//! isolate_panics = true
//! log_filter = "farworlds=debug,info"
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{EcsError, EcsResult};

/// Configuration for a [`Manager`](crate::Manager) and its world.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EcsConfig {
    /// Initial capacity of the live entity table.
    pub entity_capacity: usize,
    /// Initial capacity of each component store.
    pub store_capacity: usize,
    /// Report every applied command through `tracing`.
    pub trace_commands: bool,
    /// Treat a panicking system update as a contained system failure.
    pub isolate_panics: bool,
    /// Default log filter used by binaries when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for EcsConfig {
    fn default() -> Self {
        Self {
            entity_capacity: 1024,
            store_capacity: 256,
            trace_commands: true,
            isolate_panics: true,
            log_filter: "info".to_string(),
        }
    }
}

impl EcsConfig {
    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] if the text is not valid TOML, has
    /// unknown keys, or fails [`EcsConfig::validate`].
    pub fn from_toml_str(text: &str) -> EcsResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| EcsError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> EcsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EcsError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] for zero capacities or an empty
    /// log filter.
    pub fn validate(&self) -> EcsResult<()> {
        if self.entity_capacity == 0 {
            return Err(EcsError::InvalidConfig(
                "entity_capacity must be greater than zero".into(),
            ));
        }
        if self.store_capacity == 0 {
            return Err(EcsError::InvalidConfig(
                "store_capacity must be greater than zero".into(),
            ));
        }
        if self.log_filter.trim().is_empty() {
            return Err(EcsError::InvalidConfig("log_filter must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = EcsConfig::from_toml_str("").unwrap();
        assert_eq!(config, EcsConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = EcsConfig::from_toml_str("entity_capacity = 10\ntrace_commands = false").unwrap();
        assert_eq!(config.entity_capacity, 10);
        assert!(!config.trace_commands);
        assert_eq!(config.store_capacity, 256);
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = EcsConfig::from_toml_str("store_capacity = 0").unwrap_err();
        assert!(matches!(err, EcsError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(EcsConfig::from_toml_str("tick_rate = 60").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = EcsConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(err.is_configuration());
    }
}
