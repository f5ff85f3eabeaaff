//! Constants for the account-abstraction engine.
//!
//! Gas figures are grouped by the phase that charges them. They are built from the standard EVM
//! costs in `revm` so that the metered amounts stay comparable to an on-chain entry point.

/// Chain and deployment defaults.
pub mod chain {
    use alloy_primitives::{address, Address};

    /// The chain id of a local hardhat/anvil node.
    pub const DEFAULT_CHAIN_ID: u64 = 31337;

    /// The canonical ERC-4337 v0.7 entry-point address.
    pub const DEFAULT_ENTRY_POINT: Address = address!("0000000071727De22E5E9d8BAf0edAc6f37da032");

    /// The default base fee used when a block context does not specify one (1 gwei).
    pub const DEFAULT_BASE_FEE: u128 = 1_000_000_000;
}

/// Storage layout of the account implementation.
pub mod storage {
    use alloy_primitives::U256;

    /// Slot holding the owner of a programmable account.
    pub const OWNER_SLOT: U256 = U256::ZERO;

    /// Slot of the `mapping(uint192 => uint256)` holding the nonce sequence per key.
    pub const NONCE_SEQUENCE_SLOT: U256 = U256::from_limbs([1, 0, 0, 0]);
}

/// Gas charged while validating an operation.
pub mod validation {
    pub use revm::interpreter::gas::{
        CALLVALUE, CODEDEPOSIT, COLD_ACCOUNT_ACCESS_COST, COLD_SLOAD_COST, CREATE, SSTORE_SET,
        WARM_SSTORE_RESET, WARM_STORAGE_READ_COST,
    };

    /// The fixed cost of the `ecrecover` precompile.
    pub const ECRECOVER_GAS: u64 = 3_000;

    /// Overhead of the entry point calling into `validateUserOp`.
    pub const ACCOUNT_CALL_GAS: u64 = COLD_ACCOUNT_ACCESS_COST;

}

/// Gas charged while executing an operation's call data.
pub mod execution {
    pub use revm::interpreter::gas::{
        CALLVALUE, COLD_ACCOUNT_ACCESS_COST, NEWACCOUNT, VERYLOW, WARM_STORAGE_READ_COST,
    };

    /// Maximum nesting of account executions within one operation.
    ///
    /// Lower than the EVM's 1024-frame call stack: every nested execution is a native stack frame
    /// and must fit a default 2 MiB thread stack.
    pub const MAX_CALL_DEPTH: usize = 128;
}

/// Gas charged by the sponsor's post-operation hook.
pub mod post_op {
    pub use revm::interpreter::gas::WARM_SSTORE_RESET;
}

/// Gas charged by the ledger for carrying transactions.
pub mod transaction {
    /// Intrinsic gas of every transaction.
    pub const TX_BASE_GAS: u64 = 21_000;

    /// Intrinsic gas per EIP-7702 authorization, assuming the authority account is empty.
    pub const PER_EMPTY_ACCOUNT_COST: u64 = 25_000;

    /// Gas per EIP-7702 authorization when the authority already exists. The difference to
    /// [`PER_EMPTY_ACCOUNT_COST`] is refunded.
    pub const PER_AUTH_BASE_COST: u64 = 12_500;
}
