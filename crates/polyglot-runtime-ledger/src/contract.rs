//! Contract creation, execution, and queries.

use tracing::{debug, info, instrument};

use polyglot_runtime_common::ExecutionConfig;
use polyglot_runtime_core::{ExecutionRequest, ExecutionResult, Executor};

use crate::storage::{StateStore, contract_bytecode_key, contract_state_key};
use crate::{Address, LedgerError};

/// Deploy `bytecode` with `initial_state` at the address derived from
/// `creator` and `discriminator`.
///
/// # Errors
///
/// Returns [`LedgerError::ContractExists`] if the address already holds
/// bytecode or state; nothing is written in that case.
#[instrument(skip(store, creator, bytecode, initial_state), fields(creator = %creator, bytecode_len = bytecode.len()))]
pub fn create_contract(
    store: &dyn StateStore,
    creator: &Address,
    discriminator: u16,
    bytecode: Vec<u8>,
    initial_state: Vec<u8>,
) -> Result<Address, LedgerError> {
    let address = Address::contract(creator, discriminator);
    let bytecode_key = contract_bytecode_key(&address);
    let state_key = contract_state_key(&address);

    if store.get(&bytecode_key)?.is_some() || store.get(&state_key)?.is_some() {
        return Err(LedgerError::ContractExists(address));
    }

    store.insert(&bytecode_key, bytecode)?;
    store.insert(&state_key, initial_state)?;

    info!(address = %address, "Contract created");
    Ok(address)
}

/// Call the contract at `address` as `actor`.
///
/// The stored state is passed to the guest; when the call changes it, the
/// new state is written back. A failed call leaves the store untouched.
///
/// # Errors
///
/// Returns [`LedgerError::ContractNotFound`] if no bytecode is stored at
/// `address`, and [`LedgerError::Execution`] if the call fails.
#[instrument(skip(store, executor, address, actor, payload, limits), fields(address = %address))]
pub fn execute_contract(
    store: &dyn StateStore,
    executor: &Executor,
    address: &Address,
    actor: &[u8],
    payload: &[u8],
    limits: &ExecutionConfig,
) -> Result<ExecutionResult, LedgerError> {
    let bytecode = store
        .get(&contract_bytecode_key(address))?
        .ok_or(LedgerError::ContractNotFound(*address))?;
    let state_key = contract_state_key(address);
    let current_state = store.get(&state_key)?.unwrap_or_default();

    let request = ExecutionRequest::from_config(limits, bytecode)
        .with_current_state(current_state)
        .with_payload(payload)
        .with_actor(actor);

    let outcome = executor.execute(&request)?;

    match &outcome.updated_state {
        Some(state) => {
            store.insert(&state_key, state.clone())?;
            debug!(state_len = state.len(), "Contract state updated");
        }
        None => debug!("Contract state unchanged"),
    }

    Ok(outcome)
}

/// Bytecode of the contract at `address`; empty if there is none.
pub fn contract_bytecode(store: &dyn StateStore, address: &Address) -> Result<Vec<u8>, LedgerError> {
    Ok(store
        .get(&contract_bytecode_key(address))?
        .unwrap_or_default())
}

/// State of the contract at `address`; empty if there is none.
pub fn contract_state(store: &dyn StateStore, address: &Address) -> Result<Vec<u8>, LedgerError> {
    Ok(store.get(&contract_state_key(address))?.unwrap_or_default())
}
