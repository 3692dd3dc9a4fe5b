//! Configuration file structures for the polyglot-runtime.
//!
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`ProviderConfig`]: Where to find the provider module

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::RuntimeConfig;

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [runtime.engine]
/// cache_dir = "/var/cache/polyglot"
///
/// [runtime.execution]
/// max_fuel = 10_000_000
/// timeout_ms = 20
/// max_memory_bytes = 104_857_600
///
/// [provider]
/// path = "./javy_provider_1.4.0.wasm"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Runtime configuration (engine + execution settings).
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Provider module location.
    #[serde(default)]
    pub provider: ProviderConfig,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        let config = Self::from_toml(&content)?;
        debug!(path = %path.as_ref().display(), "Configuration file loaded");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// Provider module settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Path to the provider WebAssembly module.
    ///
    /// Only read when the compiled artifact is not cached yet.
    pub path: Option<String>,
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}
