//! Authorities: the accounts that validate and execute user operations.
//!
//! Both variants run the same account logic and differ only in where the owner comes from:
//!
//! - [`ProgrammableAccount`]: an EIP-1167 minimal proxy to a registered implementation, with the
//!   owner in storage slot 0.
//! - [`DelegatedAccount`]: a key-pair account whose code is an EIP-7702 designator to a registered
//!   implementation; the account owns itself.
//!
//! Authority state (owner and nonce sequences) lives in the account's own storage in the
//! [`WorldState`], so a delegated account keeps its nonces across delegations.

mod account;
mod factory;

pub use account::*;
pub use factory::*;

use alloy_primitives::{
    aliases::U192,
    keccak256,
    map::{HashMap, HashSet},
    Address, Log, B256, U256,
};
use alloy_sol_types::{SolCall, SolValue};
use auto_impl::auto_impl;
use core::fmt::Debug;
use mega_aa_contracts::{designator, entry_point::IEntryPoint, proxy};

use crate::{
    compose_nonce, constants, entry_point::event_log, split_nonce, DepositLedger, ExecutionError,
    GasMeter, UserOperation, ValidationError, ValidityWindow, WorldState,
};

/// An account that validates operations sent on its behalf and executes their call data.
#[auto_impl(&, Box)]
pub trait Authority: Debug {
    /// The account address.
    fn address(&self) -> Address;

    /// The account implementation the code points at.
    fn implementation(&self) -> Address;

    /// The key allowed to sign operations and call the account directly.
    fn owner(&self, state: &WorldState) -> Address;

    /// The next valid nonce for `key`.
    fn get_nonce(&self, state: &WorldState, key: U192) -> U256 {
        compose_nonce(key, nonce_sequence(state, self.address(), key))
    }

    /// Validates an operation: checks the owner's signature over `op_hash`, consumes the nonce and
    /// pays `missing_funds` into the entry point deposit.
    ///
    /// A failed prefund payment is not an error here; the entry point detects the missing funds.
    fn validate_operation(
        &self,
        env: &mut AccountEnv<'_>,
        op: &UserOperation,
        op_hash: B256,
        missing_funds: U256,
    ) -> Result<ValidityWindow, ValidationError> {
        env.gas.charge(constants::validation::ACCOUNT_CALL_GAS)?;
        env.gas.charge(constants::validation::COLD_SLOAD_COST)?;
        let owner = self.owner(env.state);

        env.gas.charge(constants::validation::ECRECOVER_GAS)?;
        let signer = alloy_primitives::Signature::try_from(op.signature.as_ref())
            .ok()
            .and_then(|signature| signature.recover_address_from_prehash(&op_hash).ok());
        if signer != Some(owner) {
            return Err(ValidationError::SignatureInvalid);
        }

        let (key, sequence) = split_nonce(op.nonce);
        let slot = nonce_slot(key);
        env.gas.charge(constants::validation::COLD_SLOAD_COST)?;
        let current = env.state.storage(self.address(), slot);
        if current != U256::from(sequence) {
            return Err(ValidationError::NonceMismatch {
                expected: compose_nonce(key, current.saturating_to()),
                actual: op.nonce,
            });
        }
        env.gas.charge(if current.is_zero() {
            constants::validation::SSTORE_SET
        } else {
            constants::validation::WARM_SSTORE_RESET
        })?;
        env.state.set_storage(self.address(), slot, current + U256::from(1));

        if !missing_funds.is_zero() {
            env.gas.charge(constants::validation::CALLVALUE)?;
            if env.state.transfer(self.address(), env.entry_point, missing_funds).is_ok() {
                env.deposits.deposit(self.address(), missing_funds);
            }
        }
        Ok(ValidityWindow::UNBOUNDED)
    }

    /// Executes `execute` or `executeBatch` call data on behalf of `caller`, which must be the
    /// entry point or the owner. Empty call data is a no-op.
    ///
    /// A batch is applied completely or fails as a whole.
    fn execute(
        &self,
        env: &mut AccountEnv<'_>,
        caller: Address,
        call_data: &[u8],
    ) -> Result<(), ExecutionError> {
        if caller != env.entry_point && caller != self.owner(env.state) {
            return Err(ExecutionError::Unauthorized { caller });
        }
        if call_data.is_empty() {
            return Ok(());
        }
        execute_account_call(self.address(), env, call_data)
    }
}

/// The storage slot of the nonce sequence for `key`: `keccak256(abi.encode(key, 1))`.
pub fn nonce_slot(key: U192) -> U256 {
    let hash = keccak256((U256::from(key), constants::storage::NONCE_SEQUENCE_SLOT).abi_encode());
    U256::from_be_bytes(hash.0)
}

/// Reads the next nonce sequence of `account` for `key`. Zero for accounts that do not exist.
pub fn nonce_sequence(state: &WorldState, account: Address, key: U192) -> u64 {
    state.storage(account, nonce_slot(key)).saturating_to()
}

/// Known account implementations and factories, used to recognise authorities by their code.
#[derive(Debug, Default, Clone)]
pub struct AccountRegistry {
    implementations: HashSet<Address>,
    factories: HashMap<Address, AccountFactory>,
}

impl AccountRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account implementation.
    pub fn register_implementation(&mut self, implementation: Address) {
        self.implementations.insert(implementation);
    }

    /// Registers a factory and its implementation.
    pub fn register_factory(&mut self, factory: AccountFactory) {
        self.register_implementation(factory.implementation());
        self.factories.insert(factory.address(), factory);
    }

    /// Returns whether `implementation` is registered.
    pub fn is_implementation(&self, implementation: Address) -> bool {
        self.implementations.contains(&implementation)
    }

    /// Returns the factory registered at `address`.
    pub fn factory(&self, address: Address) -> Option<&AccountFactory> {
        self.factories.get(&address)
    }

    /// Resolves the authority at `address` from its code, or `None` if the code is neither a proxy
    /// nor a delegation designator pointing at a registered implementation.
    pub fn resolve(&self, state: &WorldState, address: Address) -> Option<Box<dyn Authority>> {
        let code = state.code(address);
        if let Some(implementation) = proxy::implementation_of(&code) {
            return self.is_implementation(implementation).then(|| {
                Box::new(ProgrammableAccount::new(address, implementation)) as Box<dyn Authority>
            });
        }
        if let Some(implementation) = designator::delegate_of(&code) {
            return self.is_implementation(implementation).then(|| {
                Box::new(DelegatedAccount::new(address, implementation)) as Box<dyn Authority>
            });
        }
        None
    }

    /// Runs `init_code` (`factory ‖ createAccount(owner, salt)`) and returns the factory and the
    /// created account.
    pub fn deploy(
        &self,
        state: &mut WorldState,
        gas: &mut GasMeter,
        init_code: &[u8],
    ) -> Result<(Address, Address), ValidationError> {
        if init_code.len() < 20 {
            return Err(ValidationError::InitCodeFailed("initCode too short".to_string()));
        }
        let (factory_address, call_data) = init_code.split_at(20);
        let factory_address = Address::from_slice(factory_address);
        let factory = self.factory(factory_address).ok_or_else(|| {
            ValidationError::InitCodeFailed(format!("unknown factory {factory_address}"))
        })?;
        let created = factory
            .create_account_from_call(state, gas, call_data)
            .map_err(|err| ValidationError::InitCodeFailed(err.to_string()))?;
        Ok((factory_address, created))
    }
}

/// The environment an authority runs in during one phase of an operation.
#[derive(Debug)]
pub struct AccountEnv<'a> {
    /// The world state.
    pub state: &'a mut WorldState,
    /// The entry point deposits.
    pub deposits: &'a mut DepositLedger,
    /// The registry used to resolve callees.
    pub registry: &'a AccountRegistry,
    /// The entry point address.
    pub entry_point: Address,
    /// Gas of the current phase.
    pub gas: GasMeter,
    /// Events emitted during the phase.
    pub logs: Vec<Log>,
    depth: usize,
}

impl<'a> AccountEnv<'a> {
    /// Creates an environment with a fresh gas meter.
    pub fn new(
        state: &'a mut WorldState,
        deposits: &'a mut DepositLedger,
        registry: &'a AccountRegistry,
        entry_point: Address,
        gas_limit: u128,
    ) -> Self {
        Self {
            state,
            deposits,
            registry,
            entry_point,
            gas: GasMeter::new(gas_limit),
            logs: Vec::new(),
            depth: 0,
        }
    }

    /// Performs a sub-call from `from` to `to`.
    ///
    /// The value is transferred first. Call data sent to the entry point is a `depositTo` call;
    /// call data sent to a known authority is executed by it. Call data sent to an account without
    /// code is ignored, and sent to any other code is unsupported.
    ///
    /// Nesting is bounded by [`MAX_CALL_DEPTH`](constants::execution::MAX_CALL_DEPTH).
    pub fn call(
        &mut self,
        from: Address,
        to: Address,
        value: U256,
        data: &[u8],
    ) -> Result<(), ExecutionError> {
        if self.depth >= constants::execution::MAX_CALL_DEPTH {
            return Err(ExecutionError::CallDepthExceeded(constants::execution::MAX_CALL_DEPTH));
        }
        self.gas.charge(constants::execution::COLD_ACCOUNT_ACCESS_COST)?;
        self.gas.charge(constants::execution::VERYLOW * data.len().div_ceil(32) as u64)?;
        if !value.is_zero() {
            self.gas.charge(constants::execution::CALLVALUE)?;
            if self.state.account(to).is_none() {
                self.gas.charge(constants::execution::NEWACCOUNT)?;
            }
            self.state.transfer(from, to, value)?;
        }

        if to == self.entry_point {
            return self.deposit_to_entry_point(from, value, data);
        }
        if data.is_empty() {
            return Ok(());
        }
        if let Some(authority) = self.registry.resolve(self.state, to) {
            self.depth += 1;
            let result = authority.execute(self, from, data);
            self.depth -= 1;
            return result;
        }
        if self.state.has_code(to) {
            return Err(ExecutionError::UnsupportedCallee(to));
        }
        Ok(())
    }

    fn deposit_to_entry_point(
        &mut self,
        from: Address,
        value: U256,
        data: &[u8],
    ) -> Result<(), ExecutionError> {
        let account = if data.is_empty() {
            from
        } else {
            IEntryPoint::depositToCall::abi_decode(data)
                .map_err(|_| ExecutionError::MalformedCallData)?
                .account
        };
        self.gas.charge(constants::execution::WARM_STORAGE_READ_COST)?;
        let total = self.deposits.deposit(account, value);
        self.logs.push(event_log(
            self.entry_point,
            &IEntryPoint::Deposited { account, totalDeposit: total },
        ));
        Ok(())
    }
}

fn execute_account_call(
    account: Address,
    env: &mut AccountEnv<'_>,
    call_data: &[u8],
) -> Result<(), ExecutionError> {
    use alloy_sol_types::SolInterface;
    use mega_aa_contracts::account::ISimpleAccount::ISimpleAccountCalls;

    match ISimpleAccountCalls::abi_decode(call_data)
        .map_err(|_| ExecutionError::MalformedCallData)?
    {
        ISimpleAccountCalls::execute(call) => env.call(account, call.dest, call.value, &call.func),
        ISimpleAccountCalls::executeBatch(call) => {
            if call.dest.len() != call.func.len() ||
                (!call.value.is_empty() && call.value.len() != call.dest.len())
            {
                return Err(ExecutionError::WrongArrayLengths);
            }
            for (index, (dest, func)) in call.dest.iter().zip(&call.func).enumerate() {
                let value = call.value.get(index).copied().unwrap_or_default();
                env.call(account, *dest, value, func)?;
            }
            Ok(())
        }
    }
}
