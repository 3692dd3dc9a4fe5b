//! End-to-end execution of one guest call.
//!
//! [`Executor::execute`] prepares a fresh [`RuntimeInstance`], applies the
//! request's limits, feeds the call envelope through the guest's standard
//! input, and races the guest against a [`Watchdog`]. The instance, the
//! channels, and the watchdog are owned by the call and dropped on every
//! exit path.
//!
//! [`RuntimeInstance`]: crate::RuntimeInstance

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{Span, debug, info, info_span, warn};
use uuid::Uuid;
use wasmtime::Trap;
use wasmtime_wasi::I32Exit;

use polyglot_runtime_common::{ExecutionConfig, RuntimeConfig, RuntimeError};

use crate::envelope::{CallEnvelope, ResultEnvelope};
use crate::prepare::Preparer;
use crate::provider::ProviderCache;
use crate::store::{StdioChannels, get_remaining_fuel};
use crate::watchdog::Watchdog;

/// Inputs to one call.
///
/// The request is read-only input; the executor never modifies it.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Compute budget.
    pub max_fuel: u64,
    /// Wall-clock deadline.
    pub max_time: Duration,
    /// Ceiling on total linear memory, in bytes.
    pub max_memory: u64,
    /// Guest WebAssembly module.
    pub bytecode: Arc<[u8]>,
    /// Guest state before the call.
    pub current_state: Vec<u8>,
    /// Guest-interpreted call arguments.
    pub payload: Vec<u8>,
    /// Caller identity.
    pub actor: Vec<u8>,
}

impl ExecutionRequest {
    /// Create a request with the default limits and empty inputs.
    pub fn new(bytecode: impl Into<Arc<[u8]>>) -> Self {
        Self::from_config(&ExecutionConfig::default(), bytecode)
    }

    /// Create a request with the limits from `config` and empty inputs.
    pub fn from_config(config: &ExecutionConfig, bytecode: impl Into<Arc<[u8]>>) -> Self {
        Self {
            max_fuel: config.max_fuel,
            max_time: config.timeout(),
            max_memory: config.max_memory_bytes,
            bytecode: bytecode.into(),
            current_state: Vec::new(),
            payload: Vec::new(),
            actor: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_max_fuel(mut self, max_fuel: u64) -> Self {
        self.max_fuel = max_fuel;
        self
    }

    #[must_use]
    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = max_time;
        self
    }

    #[must_use]
    pub fn with_max_memory(mut self, max_memory: u64) -> Self {
        self.max_memory = max_memory;
        self
    }

    #[must_use]
    pub fn with_current_state(mut self, state: impl Into<Vec<u8>>) -> Self {
        self.current_state = state.into();
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<Vec<u8>>) -> Self {
        self.actor = actor.into();
        self
    }
}

/// Outputs of a successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Fuel spent, never more than the request's budget.
    pub fuel_consumed: u64,
    /// Wall-clock time spent in the guest.
    pub time_taken: Duration,
    /// New guest state; `None` when the guest left the state unchanged.
    pub updated_state: Option<Vec<u8>>,
    /// Guest standard error output.
    pub stderr: Vec<u8>,
    /// Guest-defined return value.
    pub result: Vec<u8>,
}

/// Runs guest calls.
///
/// # Thread Safety
///
/// `Executor` is `Send + Sync`. Calls share only the [`ProviderCache`]; each
/// builds its own engine and store.
#[derive(Debug, Clone)]
pub struct Executor {
    preparer: Preparer,
    execution: ExecutionConfig,
}

impl Executor {
    /// Create an executor linking guests against `provider`.
    ///
    /// `execution` supplies the stdio capacities; per-call limits come from
    /// each request.
    pub fn new(provider: Arc<ProviderCache>, execution: ExecutionConfig) -> Self {
        Self {
            preparer: Preparer::new(provider),
            execution,
        }
    }

    /// Create an executor whose provider cache lives where `config` says.
    ///
    /// `provider_wasm` is compiled if the artifact file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns a cache error if the cache directory cannot be resolved.
    pub fn from_config(
        config: &RuntimeConfig,
        provider_wasm: Option<Vec<u8>>,
    ) -> Result<Self, RuntimeError> {
        let mut cache = ProviderCache::new(&config.engine)?;
        if let Some(wasm) = provider_wasm {
            cache = cache.with_source(wasm);
        }
        Ok(Self::new(Arc::new(cache), config.execution.clone()))
    }

    /// The shared provider cache.
    pub fn provider(&self) -> &Arc<ProviderCache> {
        self.preparer.provider()
    }

    /// Run one call to completion.
    ///
    /// Blocks the current thread for up to the request's `max_time`.
    ///
    /// # Errors
    ///
    /// Every failure is returned as a [`RuntimeError`]; variants produced
    /// after the guest ran carry its standard error output.
    pub fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, RuntimeError> {
        let call_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "execute",
            call_id = %call_id,
            max_fuel = request.max_fuel,
            max_time_ms = request.max_time.as_millis(),
            fuel_consumed = tracing::field::Empty,
        );
        let _entered = span.enter();

        let result = self.run(request, &call_id);
        match &result {
            Ok(outcome) => info!(
                fuel_consumed = outcome.fuel_consumed,
                duration_ms = outcome.time_taken.as_millis(),
                state_changed = outcome.updated_state.is_some(),
                "Execution completed"
            ),
            Err(e) if e.is_resource_limit() => info!(error = %e, "Execution stopped at limit"),
            Err(e) => warn!(error = %e, "Execution failed"),
        }
        result
    }

    /// Run one call on Tokio's blocking pool.
    ///
    /// # Errors
    ///
    /// As [`Executor::execute`]; a panicked call is reported as a trap.
    pub async fn execute_async(
        self: &Arc<Self>,
        request: ExecutionRequest,
    ) -> Result<ExecutionResult, RuntimeError> {
        let executor = Arc::clone(self);
        tokio::task::spawn_blocking(move || executor.execute(&request))
            .await
            .map_err(|e| RuntimeError::Trap {
                message: format!("Execution task failed: {e}"),
                stderr: Vec::new(),
            })?
    }

    fn run(&self, request: &ExecutionRequest, call_id: &str) -> Result<ExecutionResult, RuntimeError> {
        let mut instance = self.preparer.prepare(&request.bytecode, call_id)?;

        let limit = usize::try_from(request.max_memory).unwrap_or(usize::MAX);
        if !instance.store_mut().data_mut().limits.apply(limit) {
            return Err(RuntimeError::MemoryLimitExceeded {
                limit_bytes: request.max_memory,
                stderr: Vec::new(),
            });
        }

        let input = CallEnvelope {
            current_state: &request.current_state,
            payload: &request.payload,
            actor: &request.actor,
        }
        .to_bytes()?;

        let channels = StdioChannels::new(
            input,
            self.execution.stdout_capacity,
            self.execution.stderr_capacity,
        );

        instance
            .store_mut()
            .set_fuel(request.max_fuel)
            .map_err(|e| RuntimeError::preparation(format!("Failed to set fuel: {e}")))?;
        instance.store_mut().data_mut().bind_stdio(&channels);

        debug!("Invoking entry point");

        let start = Instant::now();
        let mut watchdog = Watchdog::arm(instance.engine(), request.max_time);
        let outcome = instance.call_entry_point();
        let time_taken = start.elapsed();
        let timed_out = watchdog.disarm();

        let remaining = get_remaining_fuel(instance.store()).unwrap_or(0);
        let fuel_consumed = request.max_fuel.saturating_sub(remaining);
        Span::current().record("fuel_consumed", fuel_consumed);

        let memory_exceeded = instance.store().data().limits.exceeded();
        drop(instance);

        let stderr = channels.stderr_bytes();

        if timed_out {
            return Err(RuntimeError::Timeout {
                duration_ms: u64::try_from(request.max_time.as_millis()).unwrap_or(u64::MAX),
                stderr,
            });
        }

        if let Err(error) = outcome {
            match error.downcast_ref::<I32Exit>() {
                Some(I32Exit(0)) => debug!("Guest exited with status 0"),
                Some(I32Exit(status)) => {
                    return Err(RuntimeError::Trap {
                        message: format!("Guest exited with status {status}"),
                        stderr,
                    });
                }
                None if memory_exceeded => {
                    return Err(RuntimeError::MemoryLimitExceeded {
                        limit_bytes: request.max_memory,
                        stderr,
                    });
                }
                None if matches!(error.downcast_ref::<Trap>(), Some(Trap::OutOfFuel)) => {
                    return Err(RuntimeError::FuelExhausted {
                        consumed: fuel_consumed,
                        stderr,
                    });
                }
                None => {
                    return Err(RuntimeError::Trap {
                        message: format!("{error:#}"),
                        stderr,
                    });
                }
            }
        }

        let stdout = channels.stdout_bytes();
        let envelope = ResultEnvelope::parse(&stdout, &stderr)?;

        if !envelope.success {
            return Err(RuntimeError::GuestReported {
                message: envelope.error,
                stdout,
                stderr,
            });
        }

        let updated_state = (envelope.end_state != request.current_state).then_some(envelope.end_state);

        Ok(ExecutionResult {
            fuel_consumed,
            time_taken,
            updated_state,
            stderr,
            result: envelope.result,
        })
    }
}
