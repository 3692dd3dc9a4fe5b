//! Wasmtime engine configuration and creation.
//!
//! Unlike a long-lived server engine, a [`WasmEngine`] here belongs to exactly
//! one call. Epoch interruption is therefore private to that call: the
//! watchdog can bump the epoch without disturbing any other execution.

use std::sync::Arc;

use tracing::debug;
use wasmtime::{Config, Engine, OptLevel};

use polyglot_runtime_common::{EngineConfig, RuntimeError};

/// WebAssembly engine wrapper.
///
/// The engine is configured with:
/// - **Fuel Metering**: deterministic CPU limiting
/// - **Epoch Interruption**: wall-clock interruption driven by the watchdog
///
/// The provider artifact must be compiled by an engine with the same
/// settings, otherwise deserialization rejects it.
#[derive(Clone)]
pub struct WasmEngine {
    engine: Arc<Engine>,
    config: EngineConfig,
}

impl WasmEngine {
    /// Create a new WebAssembly engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wasmtime configuration is invalid.
    pub fn new(config: &EngineConfig) -> Result<Self, RuntimeError> {
        let engine = Engine::new(&Self::wasmtime_config(config)).map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to create Wasmtime engine: {e}"))
        })?;

        debug!(optimize = config.optimize, "Wasmtime engine created");

        Ok(Self {
            engine: Arc::new(engine),
            config: config.clone(),
        })
    }

    fn wasmtime_config(config: &EngineConfig) -> Config {
        let mut wasmtime_config = Config::new();

        wasmtime_config.consume_fuel(true);
        wasmtime_config.epoch_interruption(true);

        let opt_level = if config.optimize {
            OptLevel::Speed
        } else {
            OptLevel::None
        };
        wasmtime_config.cranelift_opt_level(opt_level);

        wasmtime_config
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Increment the epoch counter.
    ///
    /// Stores created by this engine use a deadline of one tick, so a single
    /// increment interrupts any guest code currently running on it.
    pub fn increment_epoch(&self) {
        self.engine.increment_epoch();
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("optimize", &self.config.optimize)
            .finish_non_exhaustive()
    }
}
