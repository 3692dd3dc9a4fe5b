//! Contract key space and the state store abstraction.
//!
//! Keys are `[prefix] ++ address ++ max_chunks`, with `max_chunks` a
//! big-endian `u16` bounding the value size in 64-byte chunks.

use dashmap::DashMap;

use crate::{ADDRESS_LEN, Address, LedgerError};

/// Key prefix of contract bytecode.
pub const CONTRACT_BYTECODE_PREFIX: u8 = 0x06;

/// Key prefix of contract state.
pub const CONTRACT_STATE_PREFIX: u8 = 0x07;

/// Size bound of contract bytecode, in chunks.
pub const CONTRACT_BYTECODE_CHUNKS: u16 = 1024;

/// Size bound of contract state, in chunks.
pub const CONTRACT_STATE_CHUNKS: u16 = 64;

const KEY_LEN: usize = 1 + ADDRESS_LEN + 2;

fn contract_key(prefix: u8, address: &Address, chunks: u16) -> Vec<u8> {
    let mut key = Vec::with_capacity(KEY_LEN);
    key.push(prefix);
    key.extend_from_slice(address.as_bytes());
    key.extend_from_slice(&chunks.to_be_bytes());
    key
}

/// Key holding the bytecode of the contract at `address`.
pub fn contract_bytecode_key(address: &Address) -> Vec<u8> {
    contract_key(CONTRACT_BYTECODE_PREFIX, address, CONTRACT_BYTECODE_CHUNKS)
}

/// Key holding the state of the contract at `address`.
pub fn contract_state_key(address: &Address) -> Vec<u8> {
    contract_key(CONTRACT_STATE_PREFIX, address, CONTRACT_STATE_CHUNKS)
}

/// Mutable key-value view of ledger state.
///
/// Implementations decide durability and atomicity; callers treat each
/// method as a single read or write.
pub trait StateStore: Send + Sync {
    /// Read a value. `Ok(None)` means the key is absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, LedgerError>;

    /// Insert or overwrite a value.
    fn insert(&self, key: &[u8], value: Vec<u8>) -> Result<(), LedgerError>;

    /// Remove a value, if present.
    fn remove(&self, key: &[u8]) -> Result<(), LedgerError>;
}

/// In-memory [`StateStore`].
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: DashMap<Vec<u8>, Vec<u8>>,
}

impl MemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    fn insert(&self, key: &[u8], value: Vec<u8>) -> Result<(), LedgerError> {
        self.entries.insert(key.to_vec(), value);
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<(), LedgerError> {
        self.entries.remove(key);
        Ok(())
    }
}
