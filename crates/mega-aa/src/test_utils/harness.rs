use alloy_primitives::{Address, Bytes, U256};
use alloy_signer_local::PrivateKeySigner;

use crate::{
    AccountFactory, BatchOutcome, EntryPoint, EntryPointConfig, GasMeter, MemoryLedger,
    SponsorPaymaster, UserOperation,
};

use super::{operation, sign_operation, BENEFICIARY, FACTORY, IMPLEMENTATION, PAYMASTER};

/// An entry point over a [`MemoryLedger`], with the test factory and implementation registered.
#[derive(Debug)]
pub struct Harness {
    /// The ledger holding the world state.
    pub ledger: MemoryLedger,
    /// The entry point under test.
    pub entry_point: EntryPoint,
    /// The registered factory.
    pub factory: AccountFactory,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(EntryPointConfig::default())
    }
}

impl Harness {
    /// Creates a harness with the given entry point configuration.
    pub fn new(config: EntryPointConfig) -> Self {
        let factory = AccountFactory::new(FACTORY, IMPLEMENTATION);
        let mut entry_point = EntryPoint::new(config);
        entry_point.register_factory(factory);
        Self { ledger: MemoryLedger::new(config.chain_id), entry_point, factory }
    }

    /// Deploys the programmable account of `owner` with salt zero.
    pub fn create_account(&mut self, owner: Address) -> Address {
        let mut gas = GasMeter::new(u128::MAX);
        self.factory
            .create_account(self.ledger.state_mut(), &mut gas, owner, U256::ZERO)
            .expect("deployment fits in gas")
    }

    /// Registers the test paymaster owned by `owner` and funds its deposit.
    pub fn create_paymaster(&mut self, owner: Address, deposit: U256) -> Address {
        let paymaster = self.entry_point.register_sponsor(SponsorPaymaster::new(PAYMASTER, owner));
        self.deposit(owner, paymaster, deposit);
        paymaster
    }

    /// Funds `payer` and moves `amount` from it into the deposit of `account`.
    pub fn deposit(&mut self, payer: Address, account: Address, amount: U256) {
        self.ledger.fund(payer, amount);
        self.entry_point
            .deposit_to(self.ledger.state_mut(), payer, account, amount)
            .expect("payer was funded");
    }

    /// Builds and signs an operation.
    pub fn signed_operation(
        &self,
        key: &PrivateKeySigner,
        sender: Address,
        nonce: U256,
        call_data: Bytes,
    ) -> UserOperation {
        let mut op = operation(sender, nonce, call_data);
        self.sign(&mut op, key);
        op
    }

    /// Signs `op` for the harness entry point.
    pub fn sign(&self, op: &mut UserOperation, key: &PrivateKeySigner) {
        sign_operation(op, key, self.entry_point.address(), self.entry_point.chain_id());
    }

    /// Handles a batch in the current block, paying [`BENEFICIARY`].
    pub fn handle(&mut self, ops: &[UserOperation]) -> BatchOutcome {
        let block = self.ledger.block();
        self.entry_point.handle_batch(self.ledger.state_mut(), &block, ops, BENEFICIARY)
    }

    /// The balance of `address`.
    pub fn balance(&self, address: Address) -> U256 {
        self.ledger.state().balance(address)
    }
}
