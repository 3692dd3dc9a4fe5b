//! Error types for the polyglot-runtime.
//!
//! [`RuntimeError`] is the single error type returned by an execution. Every
//! variant is an expected outcome of running untrusted code, so none of them
//! is fatal to the process: callers decide whether to retry.
//!
//! Variants produced after the guest has run carry the bytes the guest wrote
//! to its standard error stream, so diagnostics survive failed calls.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level runtime errors.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The guest could not be compiled, linked, or instantiated.
    #[error("Preparation failed: {reason}")]
    Preparation {
        /// Description of the preparation failure.
        reason: String,
    },

    /// The guest consumed its whole fuel budget.
    #[error("Fuel exhausted: consumed {consumed} units")]
    FuelExhausted {
        /// Fuel consumed before the guest was stopped.
        consumed: u64,
        /// Guest standard error output.
        stderr: Vec<u8>,
    },

    /// The wall-clock deadline elapsed before the guest returned.
    #[error("Execution timeout after {duration_ms}ms")]
    Timeout {
        /// The deadline in milliseconds.
        duration_ms: u64,
        /// Guest standard error output.
        stderr: Vec<u8>,
    },

    /// Linear memory grew past the configured ceiling.
    #[error("Memory limit exceeded: {limit_bytes} bytes")]
    MemoryLimitExceeded {
        /// The ceiling in bytes.
        limit_bytes: u64,
        /// Guest standard error output.
        stderr: Vec<u8>,
    },

    /// The guest output envelope was missing or malformed.
    #[error("Protocol error: {reason}")]
    Protocol {
        /// Why the envelope was rejected.
        reason: String,
        /// Raw standard output, for diagnostics.
        stdout: Vec<u8>,
        /// Guest standard error output.
        stderr: Vec<u8>,
    },

    /// The guest explicitly reported failure.
    #[error("Guest reported failure: {message}")]
    GuestReported {
        /// The `error` field of the output envelope.
        message: String,
        /// Raw standard output, for diagnostics.
        stdout: Vec<u8>,
        /// Guest standard error output.
        stderr: Vec<u8>,
    },

    /// The compiled provider artifact is unavailable or corrupted.
    ///
    /// When the artifact file is known, it is named in `path` and in the
    /// message; deleting it forces regeneration on the next call.
    #[error("Provider cache error: {reason}")]
    Cache {
        /// Description of the cache failure.
        reason: String,
        /// The cache file involved, if resolved.
        path: Option<PathBuf>,
    },

    /// The guest trapped for a reason other than a resource limit.
    #[error("Wasm trap: {message}")]
    Trap {
        /// Description of the trap.
        message: String,
        /// Guest standard error output.
        stderr: Vec<u8>,
    },

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RuntimeError {
    /// Create a new `Preparation` error.
    pub fn preparation(reason: impl Into<String>) -> Self {
        Self::Preparation {
            reason: reason.into(),
        }
    }

    /// Create a `Cache` error that is not tied to a file.
    pub fn cache(reason: impl Into<String>) -> Self {
        Self::Cache {
            reason: reason.into(),
            path: None,
        }
    }

    /// Create a `Cache` error naming the artifact file as remediation target.
    pub fn cache_at(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        let path = path.into();
        Self::Cache {
            reason: format!("{} (consider deleting {})", reason.into(), path.display()),
            path: Some(path),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error indicates a resource limit was exceeded.
    pub fn is_resource_limit(&self) -> bool {
        matches!(
            self,
            Self::FuelExhausted { .. } | Self::MemoryLimitExceeded { .. } | Self::Timeout { .. }
        )
    }

    /// Guest standard error output attached to this error, if any.
    pub fn stderr(&self) -> Option<&[u8]> {
        match self {
            Self::FuelExhausted { stderr, .. }
            | Self::Timeout { stderr, .. }
            | Self::MemoryLimitExceeded { stderr, .. }
            | Self::Protocol { stderr, .. }
            | Self::GuestReported { stderr, .. }
            | Self::Trap { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}
