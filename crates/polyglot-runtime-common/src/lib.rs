//! Common types, errors, and configuration for polyglot-runtime.
//!
//! This crate provides shared functionality used across the workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures for engine settings and execution limits
//! - TOML configuration file loading

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{EngineConfig, ExecutionConfig, RuntimeConfig, user_cache_dir};
pub use config_file::{ConfigFile, ConfigFileError, ProviderConfig};
pub use error::RuntimeError;
