//! Sandboxed execution core for polyglot-runtime.
//!
//! Guests are WebAssembly modules compiled from JavaScript that import a
//! shared provider module supplying the JavaScript engine. This crate links
//! the two per call and runs the result under three limits: fuel, a
//! wall-clock deadline, and a memory ceiling.
//!
//! - [`ProviderCache`]: compile-once, disk-backed provider artifact
//! - [`Preparer`]: builds an isolated [`RuntimeInstance`] per call
//! - [`Executor`]: runs one call end to end
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     ProviderCache                       │
//! │  (Shared across all calls, compiled once)               │
//! │  - In-memory artifact, lock-free once warm              │
//! │  - On-disk artifact in the user cache directory         │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │          RuntimeInstance (engine + store + guest)       │
//! │  (Per call, never reused)                               │
//! │  - Fuel metering                                        │
//! │  - Memory ceiling                                       │
//! │  - In-memory stdin/stdout/stderr                        │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                       Watchdog                          │
//! │  (Per call, bumps the private engine epoch on deadline) │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod envelope;
pub mod executor;
pub mod module;
pub mod prepare;
pub mod provider;
pub mod store;
pub mod watchdog;

pub use engine::WasmEngine;
pub use envelope::{CallEnvelope, ResultEnvelope};
pub use executor::{ExecutionRequest, ExecutionResult, Executor};
pub use module::CompiledModule;
pub use prepare::{ENTRY_POINT, Preparer, RuntimeInstance};
pub use provider::{PROVIDER_NAMESPACE, ProviderArtifact, ProviderCache};
pub use store::{GuestContext, MemoryCeiling, StdioChannels};
pub use watchdog::Watchdog;
