use alloy_primitives::{Address, Log, B256, U256};

use crate::{constants::chain::DEFAULT_BASE_FEE, ExecutionError, ValidationError};

/// The block a batch is processed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
    /// The block number.
    pub number: u64,
    /// The block timestamp, checked against validity windows.
    pub timestamp: u64,
    /// The base fee per gas.
    pub base_fee: u128,
}

impl Default for BlockContext {
    fn default() -> Self {
        Self { number: 0, timestamp: 0, base_fee: DEFAULT_BASE_FEE }
    }
}

/// What happened to one operation of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpStatus {
    /// Validated and executed.
    Applied,
    /// Failed validation. No state was changed and nothing was charged.
    Skipped(ValidationError),
    /// Validated but execution failed. Execution effects were rolled back and gas was charged.
    Reverted(ExecutionError),
}

impl OpStatus {
    /// Returns `true` for [`OpStatus::Applied`].
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    /// Returns `true` for [`OpStatus::Skipped`].
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    /// Returns `true` for [`OpStatus::Reverted`].
    pub const fn is_reverted(&self) -> bool {
        matches!(self, Self::Reverted(_))
    }
}

/// The outcome of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpOutcome {
    /// Position of the operation in the batch.
    pub index: usize,
    /// The operation hash.
    pub op_hash: B256,
    /// The sender.
    pub sender: Address,
    /// The status.
    pub status: OpStatus,
    /// Gas charged, including the pre-verification gas. Zero for skipped operations.
    pub actual_gas_used: U256,
    /// Funds charged to the payer's deposit. Zero for skipped operations.
    pub actual_cost: U256,
}

impl OpOutcome {
    pub(crate) const fn skipped(
        index: usize,
        op_hash: B256,
        sender: Address,
        reason: ValidationError,
    ) -> Self {
        Self {
            index,
            op_hash,
            sender,
            status: OpStatus::Skipped(reason),
            actual_gas_used: U256::ZERO,
            actual_cost: U256::ZERO,
        }
    }
}

/// The outcome of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// One outcome per operation, in batch order.
    pub ops: Vec<OpOutcome>,
    /// The fees collected from deposits for the beneficiary.
    pub collected: U256,
    /// The part of `collected` that could not be paid to the beneficiary and stayed with the
    /// entry point.
    pub unpaid: U256,
    /// Events emitted while processing the batch.
    pub logs: Vec<Log>,
}

impl BatchOutcome {
    /// The statuses of all operations, in batch order.
    pub fn statuses(&self) -> impl Iterator<Item = &OpStatus> {
        self.ops.iter().map(|op| &op.status)
    }

    /// The number of operations that were validated, whether or not their execution succeeded.
    pub fn validated(&self) -> usize {
        self.statuses().filter(|status| !status.is_skipped()).count()
    }
}
