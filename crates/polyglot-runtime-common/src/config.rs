//! Configuration structures for the polyglot-runtime.
//!
//! This module defines configuration options for various components:
//! - [`RuntimeConfig`]: Top-level configuration containing all settings
//! - [`EngineConfig`]: Wasmtime engine settings and the provider cache location
//! - [`ExecutionConfig`]: Default per-call limits (fuel, memory, timeout)

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::RuntimeError;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Default execution limits.
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// Wasmtime engine configuration.
///
/// Every call builds its own engine from these settings, and the provider
/// artifact is compiled with them too. Changing them invalidates an existing
/// on-disk artifact, which then has to be deleted.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Compile with Cranelift's speed optimizations.
    #[serde(default = "defaults::optimize")]
    pub optimize: bool,

    /// Directory holding the compiled provider artifact.
    ///
    /// `None` selects the per-user cache directory.
    #[serde(default)]
    pub cache_dir: Option<String>,

    /// File name of the compiled provider artifact inside `cache_dir`.
    #[serde(default = "defaults::provider_cache_file")]
    pub provider_cache_file: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            optimize: defaults::optimize(),
            cache_dir: None,
            provider_cache_file: defaults::provider_cache_file(),
        }
    }
}

impl EngineConfig {
    /// Resolve the full path of the provider artifact.
    ///
    /// # Errors
    ///
    /// Returns a cache error if no cache directory is configured and the
    /// per-user cache directory cannot be determined.
    pub fn provider_cache_path(&self) -> Result<PathBuf, RuntimeError> {
        let dir = match &self.cache_dir {
            Some(dir) => PathBuf::from(dir),
            None => user_cache_dir().ok_or_else(|| {
                RuntimeError::cache("unable to determine the user cache directory")
            })?,
        };
        Ok(dir.join(&self.provider_cache_file))
    }
}

/// Default limits for a single execution.
///
/// Callers that do not carry their own limits build requests from these.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Compute budget per call.
    #[serde(default = "defaults::max_fuel")]
    pub max_fuel: u64,

    /// Wall-clock deadline in milliseconds.
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// Ceiling on the total linear memory of a call, in bytes.
    #[serde(default = "defaults::max_memory_bytes")]
    pub max_memory_bytes: u64,

    /// Capacity of the captured standard output stream, in bytes.
    #[serde(default = "defaults::stdout_capacity")]
    pub stdout_capacity: usize,

    /// Capacity of the captured standard error stream, in bytes.
    #[serde(default = "defaults::stderr_capacity")]
    pub stderr_capacity: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_fuel: defaults::max_fuel(),
            timeout_ms: defaults::timeout_ms(),
            max_memory_bytes: defaults::max_memory_bytes(),
            stdout_capacity: defaults::stdout_capacity(),
            stderr_capacity: defaults::stderr_capacity(),
        }
    }
}

impl ExecutionConfig {
    /// Get the timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// The per-user cache directory of the current platform.
pub fn user_cache_dir() -> Option<PathBuf> {
    let non_empty = |key: &str| std::env::var_os(key).filter(|v| !v.is_empty()).map(PathBuf::from);

    if cfg!(target_os = "windows") {
        non_empty("LOCALAPPDATA")
    } else if cfg!(target_os = "macos") {
        non_empty("HOME").map(|home| home.join("Library").join("Caches"))
    } else {
        non_empty("XDG_CACHE_HOME").or_else(|| non_empty("HOME").map(|home| home.join(".cache")))
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn optimize() -> bool {
        true
    }

    pub fn provider_cache_file() -> String {
        "javy_provider.cwasm".to_string()
    }

    pub const fn max_fuel() -> u64 {
        10_000_000
    }

    pub const fn timeout_ms() -> u64 {
        100
    }

    pub const fn max_memory_bytes() -> u64 {
        100 * 1024 * 1024
    }

    pub const fn stdout_capacity() -> usize {
        1024 * 1024
    }

    pub const fn stderr_capacity() -> usize {
        256 * 1024
    }
}
