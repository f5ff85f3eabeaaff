//! The world state shared by the ledger and the entry point.

use alloy_primitives::{Address, Bytes, B256, U256};
use revm::{
    database::{AccountState, CacheDB, DbAccount, EmptyDB},
    primitives::{StorageKey, StorageValue, KECCAK_EMPTY},
    state::{AccountInfo, Bytecode},
    DatabaseRef,
};

/// An in-memory world state of balances, nonces, code and storage.
///
/// The state is cheap to checkpoint: the entry point clones it before each operation and
/// restores the clone when the operation is skipped or its execution reverts.
#[derive(Debug, Default, Clone, derive_more::Deref, derive_more::DerefMut)]
pub struct WorldState {
    #[deref]
    #[deref_mut]
    db: CacheDB<EmptyDB>,
}

/// A balance movement could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("insufficient balance of {account}: available {available}, required {required}")]
pub struct BalanceError {
    /// The account being debited.
    pub account: Address,
    /// Its balance at the time of the debit.
    pub available: U256,
    /// The amount requested.
    pub required: U256,
}

impl WorldState {
    /// Returns the account info, or `None` if the account does not exist.
    pub fn account(&self, address: Address) -> Option<AccountInfo> {
        self.db.basic_ref(address).unwrap_or_else(|never| match never {})
    }

    /// Returns the balance of an account.
    pub fn balance(&self, address: Address) -> U256 {
        self.account(address).map(|info| info.balance).unwrap_or_default()
    }

    /// Returns the transaction nonce of an account.
    pub fn nonce(&self, address: Address) -> u64 {
        self.account(address).map(|info| info.nonce).unwrap_or_default()
    }

    /// Returns the code of an account; empty if the account has none.
    pub fn code(&self, address: Address) -> Bytes {
        let Some(info) = self.account(address) else { return Bytes::new() };
        if info.code_hash == KECCAK_EMPTY {
            return Bytes::new();
        }
        match info.code {
            Some(code) => code.original_bytes(),
            None => self
                .db
                .code_by_hash_ref(info.code_hash)
                .unwrap_or_else(|never| match never {})
                .original_bytes(),
        }
    }

    /// Returns the code hash of an account.
    pub fn code_hash(&self, address: Address) -> B256 {
        self.account(address).map(|info| info.code_hash).unwrap_or(KECCAK_EMPTY)
    }

    /// Returns whether an account has non-empty code.
    pub fn has_code(&self, address: Address) -> bool {
        self.code_hash(address) != KECCAK_EMPTY
    }

    /// Reads a storage slot of an account.
    pub fn storage(&self, address: Address, key: StorageKey) -> StorageValue {
        self.db.storage_ref(address, key).unwrap_or_else(|never| match never {})
    }

    /// Sets the code of an account. Empty code clears it.
    pub fn set_code(&mut self, address: Address, code: Bytecode) {
        let account = self.load_account(address);
        if code.is_empty() {
            account.info.code_hash = KECCAK_EMPTY;
            account.info.code = None;
        } else {
            account.info.code_hash = code.hash_slow();
            account.info.code = Some(code);
        }
    }

    /// Sets the balance of an account.
    pub fn set_balance(&mut self, address: Address, balance: U256) {
        self.load_account(address).info.balance = balance;
    }

    /// Sets the transaction nonce of an account.
    pub fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.load_account(address).info.nonce = nonce;
    }

    /// Increments the transaction nonce of an account and returns the new value.
    pub fn increment_nonce(&mut self, address: Address) -> u64 {
        let account = self.load_account(address);
        account.info.nonce += 1;
        account.info.nonce
    }

    /// Writes a storage slot of an account.
    pub fn set_storage(&mut self, address: Address, key: StorageKey, value: StorageValue) {
        self.load_account(address).storage.insert(key, value);
    }

    /// Adds `amount` to the balance of an account.
    pub fn credit(&mut self, address: Address, amount: U256) {
        let account = self.load_account(address);
        account.info.balance = account.info.balance.saturating_add(amount);
    }

    /// Removes `amount` from the balance of an account.
    pub fn debit(&mut self, address: Address, amount: U256) -> Result<(), BalanceError> {
        let available = self.balance(address);
        let remaining = available.checked_sub(amount).ok_or(BalanceError {
            account: address,
            available,
            required: amount,
        })?;
        self.load_account(address).info.balance = remaining;
        Ok(())
    }

    /// Moves `amount` from one account to another.
    pub fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), BalanceError> {
        if amount.is_zero() {
            return Ok(());
        }
        self.debit(from, amount)?;
        self.credit(to, amount);
        Ok(())
    }

    /// Sets the balance of an account.
    pub fn with_balance(mut self, address: Address, balance: U256) -> Self {
        self.set_balance(address, balance);
        self
    }

    /// Loads an account for mutation, creating it if it does not exist.
    fn load_account(&mut self, address: Address) -> &mut DbAccount {
        let account = self.db.load_account(address).unwrap_or_else(|never| match never {});
        account.account_state = AccountState::None;
        account
    }
}
