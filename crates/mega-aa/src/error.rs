//! Error types of the account-abstraction engine.
//!
//! Failures are split by the phase that raises them, because the phase decides what happens to an
//! operation: a [`ValidationError`] skips it, an [`ExecutionError`] reverts its effects but still
//! charges for gas, and a [`DelegationError`] rejects the whole carrying transaction.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{Revert, SolError};
use mega_aa_contracts::{account::ISimpleAccount, entry_point::IEntryPoint};

use crate::{BalanceError, DepositError, OutOfGas};

/// An operation failed validation and is skipped.
///
/// The messages carry the `AAxx` codes used by ERC-4337 bundlers, so that a
/// [`FailedOp`](IEntryPoint::FailedOp) produced by [`revert_data`](Self::revert_data) reads the
/// same as one from an on-chain entry point.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// `initCode` was supplied for a sender that already has code.
    #[error("AA10 sender already constructed")]
    SenderAlreadyConstructed,
    /// The factory named by `initCode` could not create the account.
    #[error("AA13 initCode failed or OOG: {0}")]
    InitCodeFailed(String),
    /// The factory created an account at a different address than the sender.
    #[error("AA14 initCode must return sender: created {created}")]
    InitCodeSenderMismatch {
        /// The address the factory produced.
        created: Address,
    },
    /// The sender is neither a known authority nor constructible from `initCode`.
    #[error("AA20 account not deployed")]
    AuthorityNotFound,
    /// The sender's deposit does not cover the required prefund after validation.
    #[error("AA21 didn't pay prefund: deposit {deposit}, required {required}")]
    PrefundNotPaid {
        /// The deposit after validation.
        deposit: U256,
        /// The required prefund.
        required: U256,
    },
    /// The account's validity window does not contain the current time.
    #[error("AA22 expired or not due")]
    Expired,
    /// The signature does not recover to the authority's owner.
    #[error("AA24 signature error")]
    SignatureInvalid,
    /// The operation's nonce is not the next expected one.
    #[error("AA25 invalid account nonce: expected {expected}, got {actual}")]
    NonceMismatch {
        /// The next valid nonce for the key.
        expected: U256,
        /// The nonce carried by the operation.
        actual: U256,
    },
    /// Account validation ran out of verification gas.
    #[error("AA26 over verificationGasLimit: {0}")]
    OutOfVerificationGas(#[from] OutOfGas),
    /// The sponsor refused to pay for the operation.
    #[error("AA3x sponsor rejected: {0}")]
    SponsorRejected(#[from] SponsorError),
}

impl ValidationError {
    /// Encodes the error as `FailedOp(opIndex, reason)` revert data.
    pub fn revert_data(&self, op_index: usize) -> Bytes {
        IEntryPoint::FailedOp { opIndex: U256::from(op_index), reason: self.to_string() }
            .abi_encode()
            .into()
    }
}

/// Reasons for a sponsor to refuse an operation, or for a sponsor administration call to fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SponsorError {
    /// No sponsor policy is registered at the address.
    #[error("unknown sponsor {0}")]
    UnknownSponsor(Address),
    /// The sender is not on the sponsor's whitelist.
    #[error("sender {0} is not whitelisted")]
    NotWhitelisted(Address),
    /// The current time is outside the sponsorship window.
    #[error("sponsorship window [{valid_after}, {valid_until}] does not contain {now}")]
    SponsorshipExpired {
        /// Start of the window.
        valid_after: u64,
        /// End of the window; zero means unbounded.
        valid_until: u64,
        /// The block timestamp.
        now: u64,
    },
    /// The sponsor's deposit is below the maximum cost of the operation.
    #[error("insufficient sponsor deposit: deposit {deposit}, max cost {max_cost}")]
    InsufficientSponsorFunds {
        /// The sponsor's deposit.
        deposit: U256,
        /// The maximum cost of the operation.
        max_cost: U256,
    },
    /// The sponsor payload of the operation cannot be decoded.
    #[error("malformed sponsor data")]
    MalformedSponsorData,
    /// The settlement context handed to the post-op hook cannot be decoded.
    #[error("malformed sponsorship context")]
    MalformedContext,
    /// Sponsor validation ran out of its verification gas.
    #[error("over paymasterVerificationGasLimit: {0}")]
    OutOfGas(OutOfGas),
    /// An administrative call was made by someone other than the owner.
    #[error("caller {0} is not the sponsor owner")]
    NotOwner(Address),
}

/// The execution of an operation's call data failed.
///
/// Execution failures are values: the entry point records them, rolls back the effects of the
/// call and charges the operation for the gas it used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// The account cannot fund the value of a sub-call.
    #[error("insufficient balance for call value: {0}")]
    CallValue(#[from] BalanceError),
    /// The account was called by neither the entry point nor its owner.
    #[error("not from entry point or owner: {caller}")]
    Unauthorized {
        /// The rejected caller.
        caller: Address,
    },
    /// The arrays of a batch call have different lengths.
    #[error("wrong array lengths")]
    WrongArrayLengths,
    /// The call data is not an `execute` or `executeBatch` call.
    #[error("malformed call data")]
    MalformedCallData,
    /// The callee has code that this engine does not execute.
    #[error("callee {0} has unsupported code")]
    UnsupportedCallee(Address),
    /// The call exhausted its gas limit.
    #[error("out of gas: {0}")]
    OutOfGas(#[from] OutOfGas),
    /// Sub-calls are nested deeper than the call stack allows.
    #[error("call depth exceeds {0}")]
    CallDepthExceeded(usize),
    /// The sponsor's post-operation hook failed.
    #[error("post-op reverted: {0}")]
    PostOpReverted(SponsorError),
}

impl ExecutionError {
    /// Encodes the error as revert data, as carried by `UserOperationRevertReason`.
    pub fn revert_data(&self) -> Bytes {
        match self {
            Self::Unauthorized { caller } => {
                ISimpleAccount::NotFromEntryPointOrOwner { caller: *caller }.abi_encode().into()
            }
            Self::WrongArrayLengths => ISimpleAccount::WrongArrayLengths {}.abi_encode().into(),
            other => Revert { reason: other.to_string() }.abi_encode().into(),
        }
    }
}

/// An EIP-7702 authorization cannot be applied. Fatal to the transaction carrying it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DelegationError {
    /// The authorization names another chain.
    #[error("authorization for chain {actual} on chain {expected}")]
    WrongChain {
        /// The ledger's chain id.
        expected: u64,
        /// The authorization's chain id.
        actual: U256,
    },
    /// The authority cannot be recovered from the signature.
    #[error("invalid authorization signature")]
    BadSignature,
    /// The authorization nonce is not the authority's current nonce.
    #[error("authorization nonce mismatch for {authority}: expected {expected}, got {actual}")]
    NonceMismatch {
        /// The recovered authority.
        authority: Address,
        /// The authority's nonce when the authorization is processed.
        expected: u64,
        /// The nonce signed into the authorization.
        actual: u64,
    },
    /// The authority has code that is not a delegation designator.
    #[error("authority {0} has non-delegation code")]
    AuthorityHasCode(Address),
}

/// Errors of the [`Ledger`](crate::Ledger) collaborator.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// An authorization in the transaction is invalid; nothing was applied.
    #[error("delegation invalid: {0}")]
    DelegationInvalid(#[from] DelegationError),
    /// The sender cannot pay for the transaction.
    #[error(transparent)]
    InsufficientBalance(#[from] BalanceError),
    /// The transaction nonce is not the sender's current nonce.
    #[error("nonce mismatch for {sender}: expected {expected}, got {actual}")]
    NonceMismatch {
        /// The transaction sender.
        sender: Address,
        /// The sender's current nonce.
        expected: u64,
        /// The transaction nonce.
        actual: u64,
    },
    /// The transaction signature cannot be recovered.
    #[error("invalid transaction signature")]
    InvalidSignature,
    /// The transaction is for another chain.
    #[error("transaction for chain {actual:?} on chain {expected}")]
    WrongChain {
        /// The ledger's chain id.
        expected: u64,
        /// The transaction's chain id.
        actual: Option<u64>,
    },
    /// The gas limit does not cover the intrinsic gas.
    #[error("intrinsic gas too low: gas limit {gas_limit}, intrinsic {intrinsic}")]
    IntrinsicGasTooLow {
        /// The transaction gas limit.
        gas_limit: u64,
        /// The intrinsic gas of the transaction.
        intrinsic: u64,
    },
    /// The max fee per gas is below the base fee.
    #[error("max fee per gas {max_fee} below base fee {base_fee}")]
    FeeCapTooLow {
        /// The transaction's max fee per gas.
        max_fee: u128,
        /// The ledger's base fee.
        base_fee: u128,
    },
    /// An EIP-7702 transaction without authorizations.
    #[error("empty authorization list")]
    EmptyAuthorizationList,
    /// The transaction type is not supported by the ledger.
    #[error("unsupported transaction type {0}")]
    UnsupportedTransaction(u8),
    /// No receipt exists for the hash.
    #[error("receipt not found for {0}")]
    ReceiptNotFound(alloy_primitives::TxHash),
    /// The key holder failed to sign.
    #[error(transparent)]
    Signer(#[from] KeyHolderError),
}

/// The key holder failed to produce a signature.
#[derive(Debug, thiserror::Error)]
#[error("key holder failed to sign: {0}")]
pub struct KeyHolderError(#[from] pub alloy_signer::Error);

/// Errors of the entry point's deposit and administration calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntryPointError {
    /// A withdrawal exceeds the deposit.
    #[error(transparent)]
    Deposit(#[from] DepositError),
    /// The payer of a deposit cannot fund it.
    #[error(transparent)]
    Balance(#[from] BalanceError),
    /// A sponsor administration call failed.
    #[error(transparent)]
    Sponsor(#[from] SponsorError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_failed_op_revert_data() {
        let data = ValidationError::SignatureInvalid.revert_data(2);
        let decoded = IEntryPoint::FailedOp::abi_decode(&data).unwrap();
        assert_eq!(decoded.opIndex, U256::from(2));
        assert_eq!(decoded.reason, "AA24 signature error");
    }

    #[test]
    fn test_sponsor_rejection_keeps_reason() {
        let err = ValidationError::from(SponsorError::NotWhitelisted(Address::ZERO));
        assert!(err.to_string().starts_with("AA3x"));
        assert!(err.to_string().ends_with("is not whitelisted"));
    }

    #[test]
    fn test_unauthorized_revert_data_uses_account_error() {
        let caller = address!("1000000000000000000000000000000000000001");
        let data = ExecutionError::Unauthorized { caller }.revert_data();
        let decoded = ISimpleAccount::NotFromEntryPointOrOwner::abi_decode(&data).unwrap();
        assert_eq!(decoded.caller, caller);
    }

    #[test]
    fn test_other_execution_errors_use_error_string() {
        let data = ExecutionError::MalformedCallData.revert_data();
        let decoded = Revert::abi_decode(&data).unwrap();
        assert_eq!(decoded.reason, "malformed call data");
    }
}
