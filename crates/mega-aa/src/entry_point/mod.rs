//! The entry point: the dispatcher that validates, executes and settles batches of operations.
//!
//! Operations in a batch are processed strictly in order, and each one is a single atomic
//! transition over the world state and the deposit ledger:
//!
//! 1. The sender is resolved to an [`Authority`], constructing it from `initCode` if needed.
//! 2. The authority validates the operation and pays any missing prefund into its deposit.
//! 3. If the operation names a sponsor, the [`SponsorPolicy`] validates the sponsorship.
//! 4. The call data is executed, bounded by `callGasLimit`.
//! 5. The actual cost is debited from the payer's deposit and the sponsor's post-op hook runs.
//!
//! A failure in steps 1-3 skips the operation and restores the state it started from. A failure
//! in steps 4-5 restores the state after validation and still charges the operation. Fees are
//! accumulated and paid to the beneficiary once, after the whole batch.

mod outcome;
pub use outcome::*;

use alloy_primitives::{aliases::U192, map::HashMap, Address, Bytes, Log, B256, U256};
use alloy_sol_types::SolEvent;
use mega_aa_contracts::entry_point::IEntryPoint;
use tracing::{debug, info, trace, warn};

use crate::{
    compose_nonce,
    constants::{post_op, validation},
    nonce_sequence, AccountEnv, AccountFactory, AccountRegistry, Authority, DepositLedger,
    EntryPointConfig, EntryPointError, ExecutionError, GasMeter, SponsorData, SponsorError,
    SponsorPolicy, UserOperation, ValidationError, WorldState,
};

/// Wraps an event emitted by `address` into a log.
pub(crate) fn event_log<E: SolEvent>(address: Address, event: &E) -> Log {
    Log { address, data: event.encode_log_data() }
}

/// The account-abstraction dispatcher.
///
/// The entry point owns the deposit ledger and the registries of account implementations,
/// factories and sponsor policies. Authority state lives in the [`WorldState`] passed to each
/// call; the deposits are backed by the balance of the entry point's own account in that state.
#[derive(Debug, Default)]
pub struct EntryPoint {
    config: EntryPointConfig,
    deposits: DepositLedger,
    registry: AccountRegistry,
    sponsors: HashMap<Address, Box<dyn SponsorPolicy>>,
}

/// The result of validating an operation, carried into execution and settlement.
#[derive(Debug)]
struct ValidatedOp {
    authority: Box<dyn Authority>,
    factory: Option<Address>,
    verification_gas_used: u64,
    sponsorship: Option<Sponsorship>,
    logs: Vec<Log>,
}

#[derive(Debug)]
struct Sponsorship {
    sponsor: Address,
    context: Bytes,
    verification_gas_used: u64,
    post_op_gas_limit: u128,
}

impl EntryPoint {
    /// Creates an entry point with empty registries and deposits.
    pub fn new(config: EntryPointConfig) -> Self {
        Self { config, ..Default::default() }
    }

    /// The configuration.
    pub const fn config(&self) -> &EntryPointConfig {
        &self.config
    }

    /// The entry point address.
    pub const fn address(&self) -> Address {
        self.config.address
    }

    /// The chain id bound into operation hashes.
    pub const fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    /// The deposit ledger.
    pub const fn deposits(&self) -> &DepositLedger {
        &self.deposits
    }

    /// The account registry.
    pub const fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    /// Registers an account implementation that delegated accounts may point at.
    pub fn register_implementation(&mut self, implementation: Address) {
        self.registry.register_implementation(implementation);
    }

    /// Registers an account factory usable in `initCode`.
    pub fn register_factory(&mut self, factory: AccountFactory) {
        self.registry.register_factory(factory);
    }

    /// Registers a sponsor policy under its address, replacing any previous one.
    pub fn register_sponsor(&mut self, policy: impl SponsorPolicy + 'static) -> Address {
        let address = policy.address();
        self.sponsors.insert(address, Box::new(policy));
        address
    }

    /// Returns the sponsor policy registered at `address`.
    pub fn sponsor(&self, address: Address) -> Option<&dyn SponsorPolicy> {
        self.sponsors.get(&address).map(|policy| policy.as_ref())
    }

    /// Returns the deposit of `account`.
    pub fn balance_of(&self, account: Address) -> U256 {
        self.deposits.balance_of(account)
    }

    /// Returns the next valid nonce of `sender` for `key`. A sender that does not exist yet
    /// starts at sequence zero.
    pub fn get_nonce(&self, state: &WorldState, sender: Address, key: U192) -> U256 {
        compose_nonce(key, nonce_sequence(state, sender, key))
    }

    /// Returns the hash an authority signs for `op`, bound to this entry point and chain.
    pub fn hash_operation(&self, op: &UserOperation) -> B256 {
        op.hash(self.address(), self.chain_id())
    }

    /// Moves `amount` from `payer`'s balance into the deposit of `account`.
    pub fn deposit_to(
        &mut self,
        state: &mut WorldState,
        payer: Address,
        account: Address,
        amount: U256,
    ) -> Result<Log, EntryPointError> {
        state.transfer(payer, self.address(), amount)?;
        let total = self.deposits.deposit(account, amount);
        info!(payer = %payer, account = %account, amount = %amount, total = %total, "Deposited");
        Ok(event_log(self.address(), &IEntryPoint::Deposited { account, totalDeposit: total }))
    }

    /// Withdraws `amount` from the deposit of `account` and sends it to `to`.
    pub fn withdraw(
        &mut self,
        state: &mut WorldState,
        account: Address,
        amount: U256,
        to: Address,
    ) -> Result<Log, EntryPointError> {
        self.deposits.withdraw(account, amount)?;
        if let Err(err) = state.transfer(self.address(), to, amount) {
            self.deposits.credit(account, amount);
            return Err(err.into());
        }
        info!(account = %account, to = %to, amount = %amount, "Withdrawn");
        Ok(event_log(
            self.address(),
            &IEntryPoint::Withdrawn { account, withdrawAddress: to, amount },
        ))
    }

    /// Withdraws from a sponsor's deposit on behalf of the sponsor's owner.
    pub fn withdraw_sponsor_deposit(
        &mut self,
        state: &mut WorldState,
        caller: Address,
        sponsor: Address,
        amount: U256,
        to: Address,
    ) -> Result<Log, EntryPointError> {
        let policy = self.sponsor(sponsor).ok_or(SponsorError::UnknownSponsor(sponsor))?;
        if policy.owner() != caller {
            return Err(SponsorError::NotOwner(caller).into());
        }
        self.withdraw(state, sponsor, amount, to)
    }

    /// Adds `account` to the whitelist of `sponsor`. Only the sponsor's owner may call this.
    pub fn add_to_whitelist(
        &mut self,
        caller: Address,
        sponsor: Address,
        account: Address,
    ) -> Result<Option<Log>, EntryPointError> {
        let policy = self.sponsors.get_mut(&sponsor).ok_or(SponsorError::UnknownSponsor(sponsor))?;
        Ok(policy.add_to_whitelist(caller, account)?)
    }

    /// Removes `account` from the whitelist of `sponsor`. Only the sponsor's owner may call this.
    pub fn remove_from_whitelist(
        &mut self,
        caller: Address,
        sponsor: Address,
        account: Address,
    ) -> Result<Option<Log>, EntryPointError> {
        let policy = self.sponsors.get_mut(&sponsor).ok_or(SponsorError::UnknownSponsor(sponsor))?;
        Ok(policy.remove_from_whitelist(caller, account)?)
    }

    /// Processes a batch of operations and pays the collected fees to `beneficiary`.
    ///
    /// Never fails as a whole: every operation gets its own [`OpOutcome`].
    pub fn handle_batch(
        &mut self,
        state: &mut WorldState,
        block: &BlockContext,
        ops: &[UserOperation],
        beneficiary: Address,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        if ops.is_empty() {
            return outcome;
        }
        debug!(ops = ops.len(), block = block.number, "Handling batch");
        outcome.logs.push(event_log(self.address(), &IEntryPoint::BeforeExecution {}));

        for (index, op) in ops.iter().enumerate() {
            let op_outcome = self.handle_op(state, block, index, op, &mut outcome.logs);
            outcome.collected += op_outcome.actual_cost;
            outcome.ops.push(op_outcome);
        }

        if let Err(err) = state.transfer(self.address(), beneficiary, outcome.collected) {
            warn!(%err, beneficiary = %beneficiary, "Failed to pay beneficiary");
            outcome.unpaid = outcome.collected;
        }
        info!(
            ops = ops.len(),
            validated = outcome.validated(),
            collected = %outcome.collected,
            unpaid = %outcome.unpaid,
            beneficiary = %beneficiary,
            deposits = %self.deposits.total(),
            "Batch handled"
        );
        outcome
    }

    fn handle_op(
        &mut self,
        state: &mut WorldState,
        block: &BlockContext,
        index: usize,
        op: &UserOperation,
        logs: &mut Vec<Log>,
    ) -> OpOutcome {
        let op_hash = self.hash_operation(op);
        let checkpoint = (state.clone(), self.deposits.clone());

        let validated = match self.validate(state, block, op, op_hash) {
            Ok(validated) => validated,
            Err(reason) => {
                (*state, self.deposits) = checkpoint;
                debug!(index, sender = %op.sender, %reason, "Operation skipped");
                return OpOutcome::skipped(index, op_hash, op.sender, reason);
            }
        };
        drop(checkpoint);
        trace!(index, sender = %op.sender, "Operation validated");

        logs.extend(validated.logs);
        if let Some(factory) = validated.factory {
            logs.push(event_log(
                self.address(),
                &IEntryPoint::AccountDeployed {
                    userOpHash: op_hash,
                    sender: op.sender,
                    factory,
                    paymaster: op.sponsor_address().unwrap_or_default(),
                },
            ));
        }

        // Execution
        let post_validation = (state.clone(), self.deposits.clone());
        let mut env = AccountEnv::new(
            state,
            &mut self.deposits,
            &self.registry,
            self.config.address,
            op.gas_limits.call_gas_limit,
        );
        let result = match env.gas.charge(self.config.call_overhead_gas) {
            Ok(()) => validated.authority.execute(&mut env, self.config.address, &op.call_data),
            Err(err) => Err(err.into()),
        };
        let call_gas_used = env.gas.used();
        let execution_logs = env.logs;
        let mut failure = result.err();
        let mut post_op_failed = false;

        // Settlement
        let mut sponsor_verification_gas_used = 0;
        let mut post_op_gas_used = 0;
        if let Some(sponsorship) = &validated.sponsorship {
            sponsor_verification_gas_used = sponsorship.verification_gas_used;
            let mut gas = GasMeter::new(sponsorship.post_op_gas_limit);
            let charged = gas
                .charge(self.config.call_overhead_gas)
                .and_then(|()| gas.charge(post_op::WARM_SSTORE_RESET));
            post_op_gas_used = gas.used();
            if let Err(err) = charged {
                failure = Some(ExecutionError::PostOpReverted(SponsorError::OutOfGas(err)));
                post_op_failed = true;
            }
        }

        let actual_gas_used = [
            validated.verification_gas_used,
            call_gas_used,
            sponsor_verification_gas_used,
            post_op_gas_used,
        ]
        .into_iter()
        .fold(op.pre_verification_gas, |acc, gas| acc.saturating_add(U256::from(gas)));
        let actual_cost =
            actual_gas_used.saturating_mul(U256::from(op.fees.gas_price(block.base_fee)));

        if let Some(sponsorship) = &validated.sponsorship {
            if !post_op_failed {
                match self.settle_sponsorship(sponsorship, actual_cost) {
                    Ok(sponsor_logs) => logs.extend(sponsor_logs),
                    Err(err) => {
                        failure = Some(ExecutionError::PostOpReverted(err));
                        post_op_failed = true;
                    }
                }
            }
        }

        let status = match failure {
            None => {
                logs.extend(execution_logs);
                OpStatus::Applied
            }
            Some(err) => {
                (*state, self.deposits) = post_validation;
                debug!(index, sender = %op.sender, %err, "Operation reverted");
                let revert_reason = err.revert_data();
                let nonce = op.nonce;
                logs.push(if post_op_failed {
                    event_log(
                        self.address(),
                        &IEntryPoint::PostOpRevertReason {
                            userOpHash: op_hash,
                            sender: op.sender,
                            nonce,
                            revertReason: revert_reason,
                        },
                    )
                } else {
                    event_log(
                        self.address(),
                        &IEntryPoint::UserOperationRevertReason {
                            userOpHash: op_hash,
                            sender: op.sender,
                            nonce,
                            revertReason: revert_reason,
                        },
                    )
                });
                OpStatus::Reverted(err)
            }
        };

        let payer =
            validated.sponsorship.as_ref().map_or(op.sender, |sponsorship| sponsorship.sponsor);
        let charged = self.deposits.debit_up_to(payer, actual_cost);
        if charged < actual_cost {
            warn!(index, payer = %payer, %actual_cost, %charged, "Deposit did not cover the cost");
        }

        logs.push(event_log(
            self.address(),
            &IEntryPoint::UserOperationEvent {
                userOpHash: op_hash,
                sender: op.sender,
                paymaster: op.sponsor_address().unwrap_or_default(),
                nonce: op.nonce,
                success: status.is_applied(),
                actualGasCost: charged,
                actualGasUsed: actual_gas_used,
            },
        ));
        debug!(
            index,
            sender = %op.sender,
            payer = %payer,
            gas_used = %actual_gas_used,
            cost = %charged,
            "Operation settled"
        );

        OpOutcome {
            index,
            op_hash,
            sender: op.sender,
            status,
            actual_gas_used,
            actual_cost: charged,
        }
    }

    fn validate(
        &mut self,
        state: &mut WorldState,
        block: &BlockContext,
        op: &UserOperation,
        op_hash: B256,
    ) -> Result<ValidatedOp, ValidationError> {
        let entry_point = self.config.address;
        let mut env = AccountEnv::new(
            state,
            &mut self.deposits,
            &self.registry,
            entry_point,
            op.gas_limits.verification_gas_limit,
        );

        let factory = if env.state.has_code(op.sender) {
            if !op.init_code.is_empty() {
                return Err(ValidationError::SenderAlreadyConstructed);
            }
            None
        } else {
            if op.init_code.is_empty() || op.nonce_sequence() != 0 {
                return Err(ValidationError::AuthorityNotFound);
            }
            env.gas.charge(self.config.call_overhead_gas)?;
            let (factory, created) = self.registry.deploy(env.state, &mut env.gas, &op.init_code)?;
            if created != op.sender {
                return Err(ValidationError::InitCodeSenderMismatch { created });
            }
            debug!(sender = %op.sender, factory = %factory, "Account deployed");
            Some(factory)
        };

        let authority =
            self.registry.resolve(env.state, op.sender).ok_or(ValidationError::AuthorityNotFound)?;
        if let Some(sponsor) = op.sponsor_address() {
            if !self.sponsors.contains_key(&sponsor) {
                return Err(SponsorError::UnknownSponsor(sponsor).into());
            }
        }

        let required_prefund = op.required_prefund();
        let missing_funds = if op.sponsor.is_some() {
            U256::ZERO
        } else {
            required_prefund.saturating_sub(env.deposits.balance_of(op.sender))
        };
        let window = authority.validate_operation(&mut env, op, op_hash, missing_funds)?;
        if op.sponsor.is_none() {
            let deposit = env.deposits.balance_of(op.sender);
            if deposit < required_prefund {
                return Err(ValidationError::PrefundNotPaid { deposit, required: required_prefund });
            }
        }
        if !window.contains(block.timestamp) {
            return Err(ValidationError::Expired);
        }
        let verification_gas_used = env.gas.used();
        let logs = env.logs;

        let sponsorship = match &op.sponsor {
            Some(data) => Some(self.validate_sponsorship(op, op_hash, data, block)?),
            None => None,
        };

        Ok(ValidatedOp { authority, factory, verification_gas_used, sponsorship, logs })
    }

    fn validate_sponsorship(
        &self,
        op: &UserOperation,
        op_hash: B256,
        data: &SponsorData,
        block: &BlockContext,
    ) -> Result<Sponsorship, SponsorError> {
        let policy = self.sponsor(data.sponsor).ok_or(SponsorError::UnknownSponsor(data.sponsor))?;
        let mut gas = GasMeter::new(data.verification_gas_limit);
        gas.charge(self.config.call_overhead_gas).map_err(SponsorError::OutOfGas)?;
        gas.charge(validation::COLD_SLOAD_COST).map_err(SponsorError::OutOfGas)?;

        let deposit = self.deposits.balance_of(data.sponsor);
        let (context, window) =
            policy.validate_sponsorship(op, op_hash, op.required_prefund(), deposit)?;
        if !window.contains(block.timestamp) {
            return Err(SponsorError::SponsorshipExpired {
                valid_after: window.valid_after,
                valid_until: window.valid_until,
                now: block.timestamp,
            });
        }
        Ok(Sponsorship {
            sponsor: data.sponsor,
            context,
            verification_gas_used: gas.used(),
            post_op_gas_limit: data.post_op_gas_limit,
        })
    }

    fn settle_sponsorship(
        &mut self,
        sponsorship: &Sponsorship,
        actual_cost: U256,
    ) -> Result<Vec<Log>, SponsorError> {
        let policy = self
            .sponsors
            .get_mut(&sponsorship.sponsor)
            .ok_or(SponsorError::UnknownSponsor(sponsorship.sponsor))?;
        policy.settle(&sponsorship.context, actual_cost)
    }
}
