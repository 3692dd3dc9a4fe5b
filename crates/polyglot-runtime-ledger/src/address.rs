//! Ledger addresses and contract address derivation.

use std::fmt;

use sha2::{Digest, Sha256};

/// Length of an address: one type byte and a 32-byte identifier.
pub const ADDRESS_LEN: usize = 33;

/// Type byte of smart contract addresses.
pub const SMART_CONTRACT_ID: u8 = 0x01;

/// A typed 33-byte ledger address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// Build an address from a type byte and an identifier.
    pub fn new(type_id: u8, id: [u8; 32]) -> Self {
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes[0] = type_id;
        bytes[1..].copy_from_slice(&id);
        Self(bytes)
    }

    /// Derive the address of a contract deployed by `creator`.
    ///
    /// The identifier is `sha256(creator || discriminator)` with the
    /// discriminator big-endian, so one creator can deploy many contracts
    /// at distinct, predictable addresses.
    pub fn contract(creator: &Address, discriminator: u16) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(creator.0);
        hasher.update(discriminator.to_be_bytes());
        Self::new(SMART_CONTRACT_ID, hasher.finalize().into())
    }

    /// The type byte.
    pub fn type_id(&self) -> u8 {
        self.0[0]
    }

    /// The raw address bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl From<[u8; ADDRESS_LEN]> for Address {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}
