//! Configuration for the binding core, loaded from TOML.
//!
//! ```toml
//! [binding]
//! max_arity = 10
//! accessor_strategy = "trampoline"
//! warn_on_dropped = true
//!
//! [logging]
//! level = "info"
//! json_format = false
//! ```
//!
//! Every key is optional; missing keys take the defaults shown above.

use crate::delegate::{AccessorStrategy, MAX_ARITY};
use crate::error::EventError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

fn default_max_arity() -> usize {
    MAX_ARITY
}

fn default_warn_on_dropped() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventsPlusConfig {
    /// Delegate factory and matching behaviour
    #[serde(default)]
    pub binding: BindingSettings,
    /// Logging output
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Delegate factory and matching behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingSettings {
    /// Highest parameter count the factory binds; values above 10 are clamped
    #[serde(default = "default_max_arity")]
    pub max_arity: usize,
    /// How accessors and delegates reach their member
    #[serde(default)]
    pub accessor_strategy: AccessorStrategy,
    /// Log dropped requests and calls at `warn` rather than `debug`
    #[serde(default = "default_warn_on_dropped")]
    pub warn_on_dropped: bool,
}

impl BindingSettings {
    /// `max_arity` clamped to the supported maximum.
    pub fn effective_max_arity(&self) -> usize {
        self.max_arity.min(MAX_ARITY)
    }
}

impl Default for BindingSettings {
    fn default() -> Self {
        Self {
            max_arity: default_max_arity(),
            accessor_strategy: AccessorStrategy::default(),
            warn_on_dropped: default_warn_on_dropped(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl EventsPlusConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, EventError> {
        let config: EventsPlusConfig = toml::from_str(content)?;
        if config.binding.max_arity > MAX_ARITY {
            warn!(
                "⚠️ max_arity {} exceeds the supported maximum, clamping to {}",
                config.binding.max_arity, MAX_ARITY
            );
        }
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration to `path`
    /// and returns it.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, EventError> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml_str(&content)
        } else {
            let config = EventsPlusConfig::default();
            std::fs::write(path, config.to_toml_string()?)?;
            info!("📝 Created default configuration file: {}", path.display());
            Ok(config)
        }
    }

    pub fn to_toml_string(&self) -> Result<String, EventError> {
        toml::to_string_pretty(self).map_err(|e| EventError::Config(e.to_string()))
    }
}
