use alloy_consensus::{SignableTransaction, TxEip1559, TxEip7702, TxEnvelope};
use alloy_eips::eip7702::SignedAuthorization;
use alloy_primitives::{Address, Bytes, TxKind, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;
use mega_aa_contracts::account::ISimpleAccount;

use crate::{
    constants::chain, GasFees, GasLimits, KeyHolder, SponsorData, UserOperation, ValidityWindow,
};

/// Gas limits that cover validation and a few sub-calls.
pub const TEST_GAS_LIMITS: GasLimits =
    GasLimits { verification_gas_limit: 150_000, call_gas_limit: 100_000 };

/// Fees of 2 gwei max and 1 gwei priority.
pub const TEST_FEES: GasFees =
    GasFees { max_priority_fee_per_gas: 1_000_000_000, max_fee_per_gas: 2_000_000_000 };

/// Pre-verification gas of test operations.
pub const TEST_PRE_VERIFICATION_GAS: u64 = 21_000;

/// An unsigned operation with the test gas limits and fees.
pub fn operation(sender: Address, nonce: U256, call_data: Bytes) -> UserOperation {
    UserOperation {
        sender,
        nonce,
        call_data,
        gas_limits: TEST_GAS_LIMITS,
        pre_verification_gas: U256::from(TEST_PRE_VERIFICATION_GAS),
        fees: TEST_FEES,
        ..Default::default()
    }
}

/// Signs `op` for the entry point and chain.
pub fn sign_operation(
    op: &mut UserOperation,
    key: &PrivateKeySigner,
    entry_point: Address,
    chain_id: u64,
) {
    op.signature = key.sign_operation(&op.hash(entry_point, chain_id)).expect("signing works");
}

/// `execute(dest, value, func)` call data.
pub fn execute_call(dest: Address, value: U256, func: Bytes) -> Bytes {
    ISimpleAccount::executeCall { dest, value, func }.abi_encode().into()
}

/// `executeBatch(dest, value, func)` call data.
pub fn execute_batch_call(dest: Vec<Address>, value: Vec<U256>, func: Vec<Bytes>) -> Bytes {
    ISimpleAccount::executeBatchCall { dest, value, func }.abi_encode().into()
}

/// A sponsor section for `paymaster` valid in `window`.
pub fn sponsor_data(paymaster: Address, window: ValidityWindow) -> SponsorData {
    SponsorData {
        sponsor: paymaster,
        verification_gas_limit: 60_000,
        post_op_gas_limit: 60_000,
        data: window.encode(),
    }
}

/// A signed EIP-1559 value transfer on the default chain.
pub fn eip1559_transfer(
    key: &PrivateKeySigner,
    nonce: u64,
    to: Address,
    value: U256,
) -> TxEnvelope {
    let tx = TxEip1559 {
        chain_id: chain::DEFAULT_CHAIN_ID,
        nonce,
        gas_limit: 21_000,
        max_fee_per_gas: TEST_FEES.max_fee_per_gas,
        max_priority_fee_per_gas: TEST_FEES.max_priority_fee_per_gas,
        to: TxKind::Call(to),
        value,
        access_list: Default::default(),
        input: Bytes::new(),
    };
    let signature = key.sign_hash_sync(&tx.signature_hash()).expect("signing works");
    tx.into_signed(signature).into()
}

/// A signed EIP-7702 transaction from `key` to `to` carrying `authorizations`.
pub fn eip7702_carrier(
    key: &PrivateKeySigner,
    nonce: u64,
    to: Address,
    authorizations: Vec<SignedAuthorization>,
) -> TxEnvelope {
    let tx = TxEip7702 {
        chain_id: chain::DEFAULT_CHAIN_ID,
        nonce,
        gas_limit: 100_000,
        max_fee_per_gas: TEST_FEES.max_fee_per_gas,
        max_priority_fee_per_gas: TEST_FEES.max_priority_fee_per_gas,
        to,
        value: U256::ZERO,
        access_list: Default::default(),
        authorization_list: authorizations,
        input: Bytes::new(),
    };
    key.sign_transaction(tx).expect("signing works")
}
