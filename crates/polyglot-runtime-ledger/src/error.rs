//! Error type for contract operations.

use thiserror::Error;

use polyglot_runtime_common::RuntimeError;

use crate::Address;

/// Errors from contract creation, execution, and queries.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The derived address already holds bytecode or state.
    #[error("Contract already exists at {0}")]
    ContractExists(Address),

    /// No bytecode is stored at the address.
    #[error("Contract not found at {0}")]
    ContractNotFound(Address),

    /// The state store failed.
    #[error("State store error: {0}")]
    Store(String),

    /// The contract call failed.
    #[error(transparent)]
    Execution(#[from] RuntimeError),
}
