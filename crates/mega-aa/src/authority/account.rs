use alloy_primitives::{Address, B256};

use super::Authority;
use crate::{constants::storage::OWNER_SLOT, WorldState};

/// A programmable account: an EIP-1167 proxy to a registered implementation. The owner is read
/// from storage slot 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgrammableAccount {
    address: Address,
    implementation: Address,
}

impl ProgrammableAccount {
    /// Creates a handle to the account at `address`.
    pub const fn new(address: Address, implementation: Address) -> Self {
        Self { address, implementation }
    }
}

impl Authority for ProgrammableAccount {
    fn address(&self) -> Address {
        self.address
    }

    fn implementation(&self) -> Address {
        self.implementation
    }

    fn owner(&self, state: &WorldState) -> Address {
        let word = state.storage(self.address, OWNER_SLOT);
        Address::from_word(B256::from(word.to_be_bytes::<32>()))
    }
}

/// A key-pair account delegated to a registered implementation through an EIP-7702 designator.
/// The account is its own owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelegatedAccount {
    address: Address,
    implementation: Address,
}

impl DelegatedAccount {
    /// Creates a handle to the account at `address`.
    pub const fn new(address: Address, implementation: Address) -> Self {
        Self { address, implementation }
    }
}

impl Authority for DelegatedAccount {
    fn address(&self) -> Address {
        self.address
    }

    fn implementation(&self) -> Address {
        self.implementation
    }

    fn owner(&self, _state: &WorldState) -> Address {
        self.address
    }
}
