//! WebAssembly module compilation and deserialization.
//!
//! [`CompiledModule`] wraps a Wasmtime [`Module`] produced one of two ways:
//!
//! - **JIT**: guest bytecode, compiled from Wasm bytes on every call
//! - **AOT**: the provider, loaded from its serialized artifact

use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::Path;
use std::time::Instant;

use tracing::{debug, instrument};
use wasmtime::{Engine, Module};

use polyglot_runtime_common::RuntimeError;

/// A compiled WebAssembly core module.
#[derive(Clone)]
pub struct CompiledModule {
    inner: Module,

    /// Hash of the bytes the module was built from.
    content_hash: String,
}

impl CompiledModule {
    /// Compile a core module from WebAssembly bytes.
    ///
    /// # Errors
    ///
    /// Returns a preparation error if the bytes are not a valid module.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, RuntimeError> {
        let start = Instant::now();

        Self::validate_wasm_header(bytes)?;

        let module = Module::new(engine, bytes).map_err(|e| {
            RuntimeError::preparation(format!("Core module compilation failed: {e}"))
        })?;

        let content_hash = compute_hash(bytes);

        debug!(
            content_hash = %content_hash,
            duration_ms = start.elapsed().as_millis(),
            "Core module compiled"
        );

        Ok(Self {
            inner: module,
            content_hash,
        })
    }

    /// Load a module from its serialized artifact.
    ///
    /// `origin` is the file the artifact was read from; a rejected artifact
    /// yields a cache error naming it.
    ///
    /// # Safety
    ///
    /// This deserializes pre-compiled machine code. Only artifacts written by
    /// [`CompiledModule::serialize`] under the same engine settings are
    /// accepted; Wasmtime rejects version or configuration mismatches.
    #[allow(unsafe_code)]
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_serialized(
        engine: &Engine,
        bytes: &[u8],
        origin: &Path,
    ) -> Result<Self, RuntimeError> {
        let start = Instant::now();

        // SAFETY: the artifact was produced by `serialize` for this engine configuration.
        let module = unsafe { Module::deserialize(engine, bytes) }.map_err(|e| {
            RuntimeError::cache_at(
                origin,
                format!(
                    "Failed to load precompiled provider ({} bytes): {e}",
                    bytes.len()
                ),
            )
        })?;

        debug!(
            path = %origin.display(),
            duration_us = start.elapsed().as_micros(),
            "Precompiled module loaded"
        );

        Ok(Self {
            inner: module,
            content_hash: compute_hash(bytes),
        })
    }

    /// Serialize the compiled module for AOT caching.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>, RuntimeError> {
        self.inner
            .serialize()
            .map_err(|e| RuntimeError::cache(format!("Module serialization failed: {e}")))
    }

    /// Get the content hash of the source bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Get the inner Wasmtime module.
    pub fn inner(&self) -> &Module {
        &self.inner
    }

    /// Validate WebAssembly header (magic number).
    fn validate_wasm_header(bytes: &[u8]) -> Result<(), RuntimeError> {
        if bytes.len() < 8 {
            return Err(RuntimeError::preparation("Invalid Wasm: file too small"));
        }

        // Check magic number: \0asm
        if &bytes[0..4] != b"\0asm" {
            return Err(RuntimeError::preparation("Invalid Wasm: bad magic number"));
        }

        Ok(())
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("content_hash", &self.content_hash)
            .finish_non_exhaustive()
    }
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
