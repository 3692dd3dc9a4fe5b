//! Compile-once cache for the provider module.
//!
//! The provider (the JavaScript engine every guest links against) is large
//! and slow to compile, so it is compiled once into Wasmtime's native
//! artifact format and written to a file in the per-user cache directory.
//! Later processes read the file; within a process the bytes are served from
//! memory.
//!
//! The cache is never invalidated automatically. If the artifact goes stale
//! (e.g. after a Wasmtime upgrade) loading it fails with an error naming the
//! file, and deleting the file makes the next call regenerate it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use polyglot_runtime_common::{EngineConfig, RuntimeError};

use crate::{CompiledModule, WasmEngine};

/// Import namespace under which guests see the provider's exports.
pub const PROVIDER_NAMESPACE: &str = "javy_quickjs_provider_v1";

/// Serialized, compiled form of the provider module.
///
/// Immutable once created; clones share the same bytes.
#[derive(Clone)]
pub struct ProviderArtifact {
    bytes: Arc<[u8]>,
}

impl ProviderArtifact {
    /// The serialized artifact.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size of the artifact in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the artifact is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for ProviderArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderArtifact")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Get-or-create cache for the [`ProviderArtifact`].
///
/// # Thread Safety
///
/// Once warm, [`ProviderCache::get`] is a lock-free read. Cold callers
/// serialize on a mutex, so concurrent first use compiles exactly once.
pub struct ProviderCache {
    engine_config: EngineConfig,
    source: Option<Arc<[u8]>>,
    path: PathBuf,
    artifact: OnceLock<ProviderArtifact>,
    cold_start: Mutex<()>,
    compilations: AtomicU64,
}

impl ProviderCache {
    /// Create a cache at the location configured by `engine_config`.
    ///
    /// # Errors
    ///
    /// Returns a cache error if the cache directory cannot be resolved.
    pub fn new(engine_config: &EngineConfig) -> Result<Self, RuntimeError> {
        let path = engine_config.provider_cache_path()?;
        Ok(Self::with_path(engine_config, path))
    }

    /// Create a cache backed by an explicit artifact file.
    pub fn with_path(engine_config: &EngineConfig, path: impl Into<PathBuf>) -> Self {
        Self {
            engine_config: engine_config.clone(),
            source: None,
            path: path.into(),
            artifact: OnceLock::new(),
            cold_start: Mutex::new(()),
            compilations: AtomicU64::new(0),
        }
    }

    /// Attach the provider's WebAssembly bytes, used when the artifact file
    /// is missing.
    #[must_use]
    pub fn with_source(mut self, provider_wasm: impl Into<Arc<[u8]>>) -> Self {
        self.source = Some(provider_wasm.into());
        self
    }

    /// The artifact file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The engine settings the artifact is compiled with.
    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine_config
    }

    /// Number of times this cache compiled the provider.
    pub fn compilations(&self) -> u64 {
        self.compilations.load(Ordering::SeqCst)
    }

    /// Get the artifact, compiling and persisting it on a cold cache.
    ///
    /// # Errors
    ///
    /// Returns a cache error if the provider cannot be compiled, or the
    /// artifact file cannot be written, read, or loaded by this engine.
    pub fn get(&self) -> Result<ProviderArtifact, RuntimeError> {
        if let Some(artifact) = self.artifact.get() {
            return Ok(artifact.clone());
        }

        let _guard = self.cold_start.lock();

        // Another cold caller may have finished while we waited.
        if let Some(artifact) = self.artifact.get() {
            return Ok(artifact.clone());
        }

        match fs::metadata(&self.path) {
            Ok(_) => debug!(path = %self.path.display(), "Provider artifact found on disk"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.compile_to_disk()?,
            Err(e) => {
                return Err(RuntimeError::cache_at(
                    &self.path,
                    format!("Failed to check provider artifact: {e}"),
                ));
            }
        }

        let bytes = fs::read(&self.path).map_err(|e| {
            RuntimeError::cache_at(&self.path, format!("Failed to read provider artifact: {e}"))
        })?;

        // A rejected artifact must not stick in memory, so that deleting the
        // file is enough to recover.
        let engine = WasmEngine::new(&self.engine_config)?;
        CompiledModule::from_serialized(engine.inner(), &bytes, &self.path)?;

        let artifact = ProviderArtifact {
            bytes: Arc::from(bytes),
        };

        // Only ever set while holding `cold_start`.
        let _ = self.artifact.set(artifact.clone());

        Ok(artifact)
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn compile_to_disk(&self) -> Result<(), RuntimeError> {
        let source = self.source.as_deref().ok_or_else(|| {
            RuntimeError::cache_at(
                &self.path,
                "Provider artifact missing and no provider module configured",
            )
        })?;

        let start = Instant::now();
        let engine = WasmEngine::new(&self.engine_config)?;
        let module = CompiledModule::from_bytes(engine.inner(), source).map_err(|e| {
            RuntimeError::cache(format!("Failed to compile provider module: {e}"))
        })?;
        let serialized = module.serialize()?;
        self.compilations.fetch_add(1, Ordering::SeqCst);

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| {
                RuntimeError::cache_at(&self.path, format!("Failed to create cache directory: {e}"))
            })?;
        }

        // Write then rename, so other processes never read a partial file.
        let partial = self.path.with_extension("cwasm.partial");
        fs::write(&partial, &serialized)
            .and_then(|()| fs::rename(&partial, &self.path))
            .map_err(|e| {
                RuntimeError::cache_at(&self.path, format!("Failed to write provider artifact: {e}"))
            })?;

        info!(
            artifact_bytes = serialized.len(),
            duration_ms = start.elapsed().as_millis(),
            "Provider module compiled and cached"
        );

        Ok(())
    }
}

impl std::fmt::Debug for ProviderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCache")
            .field("path", &self.path)
            .field("warm", &self.artifact.get().is_some())
            .field("compilations", &self.compilations())
            .finish_non_exhaustive()
    }
}
