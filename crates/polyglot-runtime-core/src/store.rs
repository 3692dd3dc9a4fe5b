//! Per-call store state.
//!
//! This module provides:
//! - [`GuestContext`]: store data seen by WASI host functions
//! - [`MemoryCeiling`]: the store's resource limiter
//! - [`StdioChannels`]: in-memory stdin/stdout/stderr for one call

use wasmtime::{ResourceLimiter, Store};
use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::pipe::{MemoryInputPipe, MemoryOutputPipe};
use wasmtime_wasi::preview1::WasiP1Ctx;

use crate::WasmEngine;

/// Per-call execution context.
///
/// Created fresh for each call and dropped with its store.
pub struct GuestContext {
    /// WASI preview1 context; its stdio is rebound per call.
    wasi: WasiP1Ctx,

    /// Memory accounting and ceiling.
    pub limits: MemoryCeiling,

    /// Unique call identifier for tracing.
    pub call_id: String,
}

impl GuestContext {
    /// Create a context with no stdio attached.
    pub fn new(call_id: String) -> Self {
        Self {
            wasi: WasiCtxBuilder::new().build_p1(),
            limits: MemoryCeiling::default(),
            call_id,
        }
    }

    /// WASI context accessor used by the linker.
    pub fn wasi_mut(&mut self) -> &mut WasiP1Ctx {
        &mut self.wasi
    }

    /// Bind the guest's standard streams to `channels`.
    pub fn bind_stdio(&mut self, channels: &StdioChannels) {
        self.wasi = channels.wasi_ctx();
    }
}

/// Resource limiter enforcing a ceiling on the total linear memory of a store.
///
/// Every memory in the store counts, the provider's included. Until
/// [`MemoryCeiling::apply`] is called only accounting happens. Growth past
/// the ceiling traps instead of failing softly, and sets
/// [`MemoryCeiling::exceeded`] so the trap can be told apart from fuel
/// exhaustion.
#[derive(Debug, Default)]
pub struct MemoryCeiling {
    limit: Option<usize>,
    allocated: usize,
    exceeded: bool,
    // Total before the last approved growth; restored if the growth fails.
    pending_rollback: Option<usize>,
}

impl MemoryCeiling {
    /// Set the ceiling. Returns `false` if memory already allocated exceeds it.
    pub fn apply(&mut self, limit: usize) -> bool {
        self.limit = Some(limit);
        if self.allocated > limit {
            self.exceeded = true;
        }
        !self.exceeded
    }

    /// The configured ceiling, if any.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Total bytes of linear memory currently allocated.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Whether a growth request was refused.
    pub fn exceeded(&self) -> bool {
        self.exceeded
    }
}

impl ResourceLimiter for MemoryCeiling {
    fn memory_growing(
        &mut self,
        current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> wasmtime::Result<bool> {
        self.pending_rollback = None;
        let total = self
            .allocated
            .saturating_sub(current)
            .saturating_add(desired);

        if let Some(limit) = self.limit {
            if total > limit {
                self.exceeded = true;
                return Err(wasmtime::Error::msg(format!(
                    "memory ceiling of {limit} bytes exceeded: {total} bytes requested"
                )));
            }
        }

        self.pending_rollback = Some(self.allocated);
        self.allocated = total;
        Ok(true)
    }

    fn memory_grow_failed(&mut self, _error: wasmtime::Error) -> wasmtime::Result<()> {
        // The memory's own maximum refused a growth we approved.
        if let Some(previous) = self.pending_rollback.take() {
            self.allocated = previous;
        }
        Ok(())
    }

    fn table_growing(
        &mut self,
        _current: usize,
        _desired: usize,
        _maximum: Option<usize>,
    ) -> wasmtime::Result<bool> {
        Ok(true)
    }
}

/// The three byte channels standing in for the guest's standard streams.
///
/// Output channels are bounded by their capacity and are read back only
/// after the guest call has returned.
#[derive(Clone)]
pub struct StdioChannels {
    stdin: MemoryInputPipe,
    stdout: MemoryOutputPipe,
    stderr: MemoryOutputPipe,
}

impl StdioChannels {
    /// Create channels with `input` queued on stdin.
    pub fn new(input: Vec<u8>, stdout_capacity: usize, stderr_capacity: usize) -> Self {
        Self {
            stdin: MemoryInputPipe::new(input),
            stdout: MemoryOutputPipe::new(stdout_capacity),
            stderr: MemoryOutputPipe::new(stderr_capacity),
        }
    }

    fn wasi_ctx(&self) -> WasiP1Ctx {
        let mut builder = WasiCtxBuilder::new();
        builder
            .stdin(self.stdin.clone())
            .stdout(self.stdout.clone())
            .stderr(self.stderr.clone());
        builder.build_p1()
    }

    /// Everything the guest wrote to stdout.
    pub fn stdout_bytes(&self) -> Vec<u8> {
        self.stdout.contents().to_vec()
    }

    /// Everything the guest wrote to stderr.
    pub fn stderr_bytes(&self) -> Vec<u8> {
        self.stderr.contents().to_vec()
    }
}

impl std::fmt::Debug for StdioChannels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioChannels").finish_non_exhaustive()
    }
}

/// Create a store for one call.
///
/// The limiter is installed before anything is instantiated so every memory
/// is accounted for. The epoch deadline is one tick: the first increment of
/// the engine's epoch interrupts the guest.
pub fn create_store(engine: &WasmEngine, call_id: String) -> Store<GuestContext> {
    let mut store = Store::new(engine.inner(), GuestContext::new(call_id));
    store.limiter(|ctx| &mut ctx.limits);
    store.set_epoch_deadline(1);
    store
}

/// Get remaining fuel from a store.
pub fn get_remaining_fuel(store: &Store<GuestContext>) -> Option<u64> {
    store.get_fuel().ok()
}
