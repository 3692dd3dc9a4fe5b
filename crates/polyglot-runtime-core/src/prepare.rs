//! Per-call runtime construction.
//!
//! [`Preparer::prepare`] turns guest bytecode into a [`RuntimeInstance`]:
//!
//! 1. Create a fresh engine
//! 2. Compile the guest module (every call, there is no module cache)
//! 3. Load the provider artifact into the same engine
//! 4. Create a store
//! 5. Instantiate the provider and register it under [`PROVIDER_NAMESPACE`]
//! 6. Instantiate the guest, allowing it to shadow namespace entries
//! 7. Resolve the guest's [`ENTRY_POINT`]
//!
//! Any failure drops everything built so far.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument};
use wasmtime::{Linker, Store, TypedFunc};

use polyglot_runtime_common::{EngineConfig, RuntimeError};

use crate::provider::{PROVIDER_NAMESPACE, ProviderCache};
use crate::store::{GuestContext, create_store};
use crate::{CompiledModule, WasmEngine};

/// Conventional entry point exported by guest modules.
pub const ENTRY_POINT: &str = "_start";

/// An isolated engine, store, and linked guest, used for exactly one call.
///
/// Dropping the instance releases the engine, the store, and every module
/// instantiated in it.
pub struct RuntimeInstance {
    engine: WasmEngine,
    store: Store<GuestContext>,
    entry_point: TypedFunc<(), ()>,
}

impl RuntimeInstance {
    /// The engine private to this instance.
    pub fn engine(&self) -> &WasmEngine {
        &self.engine
    }

    /// The store holding the linked provider and guest.
    pub fn store(&self) -> &Store<GuestContext> {
        &self.store
    }

    /// Mutable access to the store.
    pub fn store_mut(&mut self) -> &mut Store<GuestContext> {
        &mut self.store
    }

    /// Invoke the guest's entry point.
    pub fn call_entry_point(&mut self) -> wasmtime::Result<()> {
        self.entry_point.call(&mut self.store, ())
    }
}

impl std::fmt::Debug for RuntimeInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeInstance")
            .field("engine", &self.engine)
            .field("call_id", &self.store.data().call_id)
            .finish_non_exhaustive()
    }
}

/// Builds a [`RuntimeInstance`] for each call.
#[derive(Debug, Clone)]
pub struct Preparer {
    provider: Arc<ProviderCache>,
}

impl Preparer {
    /// Create a preparer linking guests against `provider`.
    pub fn new(provider: Arc<ProviderCache>) -> Self {
        Self { provider }
    }

    /// The provider cache this preparer reads from.
    pub fn provider(&self) -> &Arc<ProviderCache> {
        &self.provider
    }

    fn engine_config(&self) -> &EngineConfig {
        self.provider.engine_config()
    }

    /// Build an isolated runtime for `bytecode`.
    ///
    /// # Errors
    ///
    /// Returns a cache error if the provider artifact is unavailable or
    /// rejected, and a preparation error for every other failure.
    #[instrument(skip(self, bytecode), fields(bytecode_len = bytecode.len()))]
    pub fn prepare(&self, bytecode: &[u8], call_id: &str) -> Result<RuntimeInstance, RuntimeError> {
        let start = Instant::now();

        let engine = WasmEngine::new(self.engine_config())?;

        let guest = CompiledModule::from_bytes(engine.inner(), bytecode)?;

        let artifact = self.provider.get()?;
        let provider = CompiledModule::from_serialized(
            engine.inner(),
            artifact.as_bytes(),
            self.provider.path(),
        )?;

        let mut store = create_store(&engine, call_id.to_string());

        let mut linker: Linker<GuestContext> = Linker::new(engine.inner());
        wasmtime_wasi::preview1::add_to_linker_sync(&mut linker, GuestContext::wasi_mut)
            .map_err(|e| RuntimeError::preparation(format!("Failed to link WASI: {e}")))?;

        let provider_instance = linker
            .instantiate(&mut store, provider.inner())
            .map_err(|e| {
                RuntimeError::preparation(format!("Provider instantiation failed: {e}"))
            })?;

        linker.allow_shadowing(true);
        linker
            .instance(&mut store, PROVIDER_NAMESPACE, provider_instance)
            .map_err(|e| {
                RuntimeError::preparation(format!(
                    "Failed to register provider under '{PROVIDER_NAMESPACE}': {e}"
                ))
            })?;

        let guest_instance = linker
            .instantiate(&mut store, guest.inner())
            .map_err(|e| RuntimeError::preparation(format!("Guest instantiation failed: {e}")))?;

        let entry_point = guest_instance
            .get_typed_func::<(), ()>(&mut store, ENTRY_POINT)
            .map_err(|_| {
                RuntimeError::preparation(format!("Entry point '{ENTRY_POINT}' not found"))
            })?;

        debug!(
            guest_hash = %guest.content_hash(),
            memory_bytes = store.data().limits.allocated(),
            duration_ms = start.elapsed().as_millis(),
            "Runtime instance prepared"
        );

        Ok(RuntimeInstance {
            engine,
            store,
            entry_point,
        })
    }
}
