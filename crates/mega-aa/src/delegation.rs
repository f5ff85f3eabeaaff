//! EIP-7702 delegation of key-pair accounts.
//!
//! A key-pair account is either [`Plain`](DelegationState::Plain) or
//! [`Delegated`](DelegationState::Delegated) to an account implementation. Transitions happen
//! only through a carrying EIP-7702 transaction whose authorization list holds an authorization
//! signed by the account's key. Authorizations are single-use: applying one increments the
//! authority's nonce, so replaying it later fails the nonce check.

use alloy_consensus::TxEip7702;
use alloy_eips::eip7702::SignedAuthorization;
use alloy_primitives::{Address, Bytes, U256};
use mega_aa_contracts::designator;
use revm::state::Bytecode;
use tracing::{debug, info};

use crate::{
    DelegationConfig, DelegationError, KeyHolder, Ledger, LedgerError, Receipt, WorldState,
};

/// The delegation state of a key-pair account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelegationState {
    /// No code.
    Plain,
    /// The code is a designator to the given implementation.
    Delegated(Address),
}

impl DelegationState {
    /// Reads the state from account code. `None` if the code is neither empty nor a designator,
    /// i.e. the account is a contract.
    pub fn from_code(code: &[u8]) -> Option<Self> {
        if code.is_empty() {
            return Some(Self::Plain);
        }
        designator::delegate_of(code).map(Self::Delegated)
    }

    /// The implementation the account delegates to, if any.
    pub const fn delegate(&self) -> Option<Address> {
        match self {
            Self::Plain => None,
            Self::Delegated(delegate) => Some(*delegate),
        }
    }
}

/// An authorization applied to the world state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedAuthorization {
    /// The account whose code changed.
    pub authority: Address,
    /// The state after the authorization.
    pub state: DelegationState,
    /// Whether the authority account existed before.
    pub existed: bool,
}

/// Checks an authorization against the world state and returns the recovered authority.
///
/// A chain id of zero is valid on every chain.
pub fn verify_authorization(
    state: &WorldState,
    chain_id: u64,
    authorization: &SignedAuthorization,
) -> Result<Address, DelegationError> {
    let auth_chain_id = authorization.chain_id;
    if !auth_chain_id.is_zero() && auth_chain_id != U256::from(chain_id) {
        return Err(DelegationError::WrongChain { expected: chain_id, actual: auth_chain_id });
    }
    let authority =
        authorization.recover_authority().map_err(|_| DelegationError::BadSignature)?;
    if DelegationState::from_code(&state.code(authority)).is_none() {
        return Err(DelegationError::AuthorityHasCode(authority));
    }
    let expected = state.nonce(authority);
    if authorization.nonce != expected {
        return Err(DelegationError::NonceMismatch {
            authority,
            expected,
            actual: authorization.nonce,
        });
    }
    Ok(authority)
}

/// Verifies and applies an authorization: installs the designator (or clears the code for the
/// zero address) and increments the authority's nonce.
pub fn apply_authorization(
    state: &mut WorldState,
    chain_id: u64,
    authorization: &SignedAuthorization,
) -> Result<AppliedAuthorization, DelegationError> {
    let authority = verify_authorization(state, chain_id, authorization)?;
    let existed = state.account(authority).is_some();
    let delegate = authorization.address;
    let (code, delegation) = if delegate.is_zero() {
        (Bytecode::new(), DelegationState::Plain)
    } else {
        (Bytecode::new_eip7702(delegate), DelegationState::Delegated(delegate))
    };
    state.set_code(authority, code);
    state.increment_nonce(authority);
    debug!(authority = %authority, delegate = %delegate, "Authorization applied");
    Ok(AppliedAuthorization { authority, state: delegation, existed })
}

/// Drives the delegation lifecycle of one key-pair account.
///
/// Every transition is a synchronous pipeline: read the account's transaction nonce, build and
/// sign the authorization, build and sign the carrying transaction, submit it and wait for the
/// receipt.
#[derive(Debug, Clone)]
pub struct Delegator<K> {
    key: K,
    config: DelegationConfig,
}

impl<K: KeyHolder> Delegator<K> {
    /// Creates a delegator for the account of `key`.
    pub const fn new(key: K, config: DelegationConfig) -> Self {
        Self { key, config }
    }

    /// The account address.
    pub fn address(&self) -> Address {
        self.key.address()
    }

    /// The configuration.
    pub const fn config(&self) -> &DelegationConfig {
        &self.config
    }

    /// Reads the delegation state of the account from the ledger.
    pub fn state<L: Ledger>(&self, ledger: &L) -> Option<DelegationState> {
        DelegationState::from_code(&ledger.get_code(self.address()))
    }

    /// Signs an authorization to `delegate`, with the nonce chosen by the configured policy.
    pub fn authorize<L: Ledger>(
        &self,
        ledger: &L,
        delegate: Address,
    ) -> Result<SignedAuthorization, LedgerError> {
        let tx_nonce = ledger.transaction_count(self.address());
        let authorization = alloy_eips::eip7702::Authorization {
            chain_id: U256::from(self.config.chain_id),
            address: delegate,
            nonce: self.config.nonce_policy.authorization_nonce(tx_nonce),
        };
        Ok(self.key.sign_authorization(authorization)?)
    }

    /// Delegates the account to `implementation`.
    pub fn delegate<L: Ledger>(
        &self,
        ledger: &mut L,
        implementation: Address,
    ) -> Result<Receipt, LedgerError> {
        let receipt = self.transition(ledger, implementation, self.address())?;
        info!(account = %self.address(), implementation = %implementation, "Account delegated");
        Ok(receipt)
    }

    /// Clears the delegation, returning the account to plain.
    pub fn undelegate<L: Ledger>(&self, ledger: &mut L) -> Result<Receipt, LedgerError> {
        let receipt = self.transition(ledger, Address::ZERO, Address::ZERO)?;
        info!(account = %self.address(), "Account undelegated");
        Ok(receipt)
    }

    fn transition<L: Ledger>(
        &self,
        ledger: &mut L,
        delegate: Address,
        to: Address,
    ) -> Result<Receipt, LedgerError> {
        let nonce = ledger.transaction_count(self.address());
        let authorization = self.authorize(&*ledger, delegate)?;
        debug!(
            account = %self.address(),
            delegate = %delegate,
            nonce,
            authorization_nonce = authorization.nonce,
            policy = %self.config.nonce_policy,
            "Signed authorization"
        );

        let tx = TxEip7702 {
            chain_id: self.config.chain_id,
            nonce,
            gas_limit: self.config.gas_limit,
            max_fee_per_gas: self.config.max_fee_per_gas,
            max_priority_fee_per_gas: self.config.max_priority_fee_per_gas,
            to,
            value: U256::ZERO,
            access_list: Default::default(),
            authorization_list: vec![authorization],
            input: Bytes::new(),
        };
        let envelope = self.key.sign_transaction(tx)?;
        let hash = ledger.submit(envelope)?;
        ledger.await_receipt(hash)
    }
}
