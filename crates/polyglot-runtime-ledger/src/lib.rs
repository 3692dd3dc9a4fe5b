//! Contract operations for polyglot-runtime.
//!
//! Contracts are guest modules stored in a key-value [`StateStore`] next to
//! their state:
//! - [`create_contract`]: deploy at a deterministic [`Address`]
//! - [`execute_contract`]: run a call and persist the state it produces
//! - [`contract_bytecode`] / [`contract_state`]: query helpers

pub mod address;
pub mod contract;
pub mod error;
pub mod storage;

pub use address::{ADDRESS_LEN, Address, SMART_CONTRACT_ID};
pub use contract::{contract_bytecode, contract_state, create_contract, execute_contract};
pub use error::LedgerError;
pub use storage::{MemoryStateStore, StateStore};
