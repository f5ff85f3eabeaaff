use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolValue};
use mega_aa_contracts::{account::ISimpleAccountFactory, proxy};
use revm::state::Bytecode;

use crate::{
    constants::{storage::OWNER_SLOT, validation},
    GasMeter, OutOfGas, WorldState,
};

/// Deploys programmable accounts as EIP-1167 proxies at deterministic CREATE2 addresses.
///
/// The salt is `keccak256(abi.encode(owner, salt))` and the init code is the proxy creation code
/// for the implementation, so an account address depends on the factory, the implementation, the
/// owner and the salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountFactory {
    address: Address,
    implementation: Address,
}

/// `initCode` could not be executed by a factory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FactoryError {
    /// The factory call data is not `createAccount(address,uint256)`.
    #[error("malformed factory call data")]
    MalformedCallData,
    /// Deployment exhausted the verification gas.
    #[error(transparent)]
    OutOfGas(#[from] OutOfGas),
}

impl AccountFactory {
    /// Creates a factory deployed at `address` for accounts of `implementation`.
    pub const fn new(address: Address, implementation: Address) -> Self {
        Self { address, implementation }
    }

    /// The factory address.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// The implementation of the accounts it creates.
    pub const fn implementation(&self) -> Address {
        self.implementation
    }

    /// The counterfactual address of the account for `owner` and `salt`.
    pub fn get_address(&self, owner: Address, salt: U256) -> Address {
        let init_code_hash = keccak256(proxy::creation_code(self.implementation));
        self.address.create2(Self::create2_salt(owner, salt), init_code_hash)
    }

    /// The `initCode` of an operation that deploys the account for `owner` and `salt`.
    pub fn init_code(&self, owner: Address, salt: U256) -> Bytes {
        let call = ISimpleAccountFactory::createAccountCall { owner, salt };
        [self.address.as_slice(), &call.abi_encode()[..]].concat().into()
    }

    /// Deploys the account for `owner` and `salt` and returns its address. An existing account is
    /// returned as is.
    pub fn create_account(
        &self,
        state: &mut WorldState,
        gas: &mut GasMeter,
        owner: Address,
        salt: U256,
    ) -> Result<Address, OutOfGas> {
        let account = self.get_address(owner, salt);
        gas.charge(validation::COLD_ACCOUNT_ACCESS_COST)?;
        if state.has_code(account) {
            return Ok(account);
        }

        let code = proxy::runtime_code(self.implementation);
        gas.charge(validation::CREATE)?;
        gas.charge(validation::CODEDEPOSIT * code.len() as u64)?;
        gas.charge(validation::SSTORE_SET)?;

        state.set_code(account, Bytecode::new_legacy(code));
        state.set_nonce(account, 1);
        state.set_storage(account, OWNER_SLOT, U256::from_be_bytes(owner.into_word().0));
        Ok(account)
    }

    /// Decodes `createAccount(owner, salt)` call data and deploys the account.
    pub fn create_account_from_call(
        &self,
        state: &mut WorldState,
        gas: &mut GasMeter,
        call_data: &[u8],
    ) -> Result<Address, FactoryError> {
        let call = ISimpleAccountFactory::createAccountCall::abi_decode(call_data)
            .map_err(|_| FactoryError::MalformedCallData)?;
        Ok(self.create_account(state, gas, call.owner, call.salt)?)
    }

    fn create2_salt(owner: Address, salt: U256) -> B256 {
        keccak256((owner, salt).abi_encode_params())
    }
}
