//! The ledger that carries signed transactions.
//!
//! The engine only needs a narrow view of the chain: account code, balances and transaction
//! counts, plus submitting a transaction and waiting for its receipt. [`MemoryLedger`] implements
//! that view over an in-memory [`WorldState`] that the [`EntryPoint`](crate::EntryPoint) can
//! operate on directly.

use alloy_consensus::{transaction::SignerRecoverable, Transaction, TxEnvelope, TxType};
use alloy_primitives::{map::HashMap, Address, Bytes, TxHash, U256};
use auto_impl::auto_impl;
use tracing::{debug, info};

use crate::{
    apply_authorization,
    constants::{chain, transaction},
    BalanceError, BlockContext, LedgerError, WorldState,
};

/// The receipt of an applied transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    /// The transaction hash.
    pub tx_hash: TxHash,
    /// The block the transaction was included in.
    pub block_number: u64,
    /// The recovered sender.
    pub from: Address,
    /// The recipient.
    pub to: Address,
    /// Gas charged to the sender.
    pub gas_used: u64,
    /// The price paid per unit of gas.
    pub effective_gas_price: u128,
    /// The number of authorizations applied.
    pub authorizations: usize,
}

/// The chain operations the engine depends on.
#[auto_impl(&mut, Box)]
pub trait Ledger {
    /// The chain id transactions must be signed for.
    fn chain_id(&self) -> u64;

    /// Returns the code of an account.
    fn get_code(&self, address: Address) -> Bytes;

    /// Returns the balance of an account.
    fn get_balance(&self, address: Address) -> U256;

    /// Returns the transaction nonce of an account.
    fn transaction_count(&self, address: Address) -> u64;

    /// Validates and applies a signed transaction. A rejected transaction changes nothing.
    fn submit(&mut self, tx: TxEnvelope) -> Result<TxHash, LedgerError>;

    /// Returns the receipt of a submitted transaction.
    fn await_receipt(&self, hash: TxHash) -> Result<Receipt, LedgerError>;
}

/// An instant-sealing in-memory ledger. Each accepted transaction is sealed in its own block.
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    state: WorldState,
    chain_id: u64,
    block: BlockContext,
    receipts: HashMap<TxHash, Receipt>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new(chain::DEFAULT_CHAIN_ID)
    }
}

impl MemoryLedger {
    /// Creates an empty ledger for `chain_id`.
    pub fn new(chain_id: u64) -> Self {
        Self::with_state(chain_id, WorldState::default())
    }

    /// Creates a ledger over an existing state.
    pub fn with_state(chain_id: u64, state: WorldState) -> Self {
        Self { state, chain_id, block: BlockContext::default(), receipts: HashMap::default() }
    }

    /// The world state.
    pub const fn state(&self) -> &WorldState {
        &self.state
    }

    /// The world state, for the entry point to operate on.
    pub const fn state_mut(&mut self) -> &mut WorldState {
        &mut self.state
    }

    /// The current block.
    pub const fn block(&self) -> BlockContext {
        self.block
    }

    /// Credits `amount` to `address`.
    pub fn fund(&mut self, address: Address, amount: U256) {
        self.state.credit(address, amount);
    }

    /// Sets the timestamp of the current block.
    pub const fn set_timestamp(&mut self, timestamp: u64) {
        self.block.timestamp = timestamp;
    }

    /// Moves the clock forward by `seconds`.
    pub const fn advance_time(&mut self, seconds: u64) {
        self.block.timestamp += seconds;
    }

    /// Sets the base fee of subsequent blocks.
    pub const fn set_base_fee(&mut self, base_fee: u128) {
        self.block.base_fee = base_fee;
    }

    fn check_fields(&self, tx: &TxEnvelope, sender: Address) -> Result<(), LedgerError> {
        if tx.chain_id() != Some(self.chain_id) {
            return Err(LedgerError::WrongChain { expected: self.chain_id, actual: tx.chain_id() });
        }
        let expected = self.state.nonce(sender);
        if tx.nonce() != expected {
            return Err(LedgerError::NonceMismatch { sender, expected, actual: tx.nonce() });
        }
        if tx.max_fee_per_gas() < self.block.base_fee {
            return Err(LedgerError::FeeCapTooLow {
                max_fee: tx.max_fee_per_gas(),
                base_fee: self.block.base_fee,
            });
        }
        Ok(())
    }
}

/// Intrinsic gas of a transaction carrying `authorizations` authorizations.
pub const fn intrinsic_gas(authorizations: usize) -> u64 {
    transaction::TX_BASE_GAS + transaction::PER_EMPTY_ACCOUNT_COST * authorizations as u64
}

impl Ledger for MemoryLedger {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn get_code(&self, address: Address) -> Bytes {
        self.state.code(address)
    }

    fn get_balance(&self, address: Address) -> U256 {
        self.state.balance(address)
    }

    fn transaction_count(&self, address: Address) -> u64 {
        self.state.nonce(address)
    }

    fn submit(&mut self, tx: TxEnvelope) -> Result<TxHash, LedgerError> {
        let tx_type = tx.tx_type();
        if !matches!(tx_type, TxType::Eip1559 | TxType::Eip7702) {
            return Err(LedgerError::UnsupportedTransaction(tx_type.into()));
        }
        let Some(to) = tx.to() else {
            return Err(LedgerError::UnsupportedTransaction(tx_type.into()));
        };
        let sender = tx.recover_signer().map_err(|_| LedgerError::InvalidSignature)?;
        let tx_hash = *tx.tx_hash();
        self.check_fields(&tx, sender)?;

        let authorizations = tx.authorization_list().unwrap_or_default();
        if tx_type == TxType::Eip7702 && authorizations.is_empty() {
            return Err(LedgerError::EmptyAuthorizationList);
        }
        let intrinsic = intrinsic_gas(authorizations.len());
        if tx.gas_limit() < intrinsic {
            return Err(LedgerError::IntrinsicGasTooLow { gas_limit: tx.gas_limit(), intrinsic });
        }

        let max_cost = U256::from(tx.gas_limit()) * U256::from(tx.max_fee_per_gas()) + tx.value();
        let available = self.state.balance(sender);
        if available < max_cost {
            return Err(BalanceError { account: sender, available, required: max_cost }.into());
        }

        // Work on a copy so a rejected authorization leaves no trace, not even the sender nonce.
        let mut next = self.state.clone();
        next.increment_nonce(sender);
        let mut refund = 0;
        for authorization in authorizations {
            let applied = apply_authorization(&mut next, self.chain_id, authorization)?;
            if applied.existed {
                refund += transaction::PER_EMPTY_ACCOUNT_COST - transaction::PER_AUTH_BASE_COST;
            }
        }

        let gas_used = intrinsic - refund;
        let base_fee = u64::try_from(self.block.base_fee).unwrap_or(u64::MAX);
        let effective_gas_price = tx.effective_gas_price(Some(base_fee));
        next.debit(sender, U256::from(gas_used) * U256::from(effective_gas_price))?;
        next.transfer(sender, to, tx.value())?;
        self.state = next;

        self.block.number += 1;
        let receipt = Receipt {
            tx_hash,
            block_number: self.block.number,
            from: sender,
            to,
            gas_used,
            effective_gas_price,
            authorizations: authorizations.len(),
        };
        self.receipts.insert(tx_hash, receipt);
        info!(
            tx_hash = %tx_hash,
            from = %sender,
            to = %to,
            gas_used,
            authorizations = authorizations.len(),
            block = self.block.number,
            "Transaction applied"
        );
        Ok(tx_hash)
    }

    fn await_receipt(&self, hash: TxHash) -> Result<Receipt, LedgerError> {
        let receipt = self.receipts.get(&hash).copied().ok_or(LedgerError::ReceiptNotFound(hash))?;
        debug!(tx_hash = %hash, block = receipt.block_number, "Receipt found");
        Ok(receipt)
    }
}
