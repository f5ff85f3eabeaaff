//! Tests for sponsored operations: a whitelisting paymaster pays gas out of its deposit.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolEvent;
use mega_aa::{
    contracts::paymaster::ISponsorPaymaster,
    test_utils::{
        execute_call, init_tracing, operation, sponsor_data, Harness, ALICE, BENEFICIARY, BOB,
        CAROL, DAVE,
    },
    EntryPointError, OpStatus, SponsorError, SponsorPaymaster, SponsorPolicy, UserOperation,
    ValidationError, ValidityWindow,
};

const ONE_ETHER: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);
const TENTH_ETHER: U256 = U256::from_limbs([100_000_000_000_000_000, 0, 0, 0]);

struct Sponsored {
    harness: Harness,
    account: Address,
    paymaster: Address,
}

impl Sponsored {
    /// Alice's account holding one ether, and a paymaster owned by Bob with one ether deposited
    /// that whitelists the account.
    fn new() -> Self {
        init_tracing();
        let mut harness = Harness::default();
        let account = harness.create_account(ALICE.address());
        harness.ledger.fund(account, ONE_ETHER);
        let paymaster = harness.create_paymaster(BOB.address(), ONE_ETHER);
        harness.entry_point.add_to_whitelist(BOB.address(), paymaster, account).unwrap();
        Self { harness, account, paymaster }
    }

    fn operation(&self, nonce: u64, call_data: Bytes, window: ValidityWindow) -> UserOperation {
        let mut op = operation(self.account, U256::from(nonce), call_data);
        op.sponsor = Some(sponsor_data(self.paymaster, window));
        self.harness.sign(&mut op, &ALICE);
        op
    }

    fn policy(&self) -> &dyn SponsorPolicy {
        self.harness.entry_point.sponsor(self.paymaster).unwrap()
    }
}

#[test]
fn test_sponsored_transfer() {
    let mut sponsored = Sponsored::new();
    let recipient = CAROL.address();
    let call = execute_call(recipient, TENTH_ETHER, Bytes::new());
    let op = sponsored.operation(0, call, ValidityWindow::UNBOUNDED);

    let outcome = sponsored.harness.handle(&[op]);
    let result = &outcome.ops[0];
    assert_eq!(result.status, OpStatus::Applied);

    let harness = &sponsored.harness;
    assert_eq!(harness.balance(recipient), TENTH_ETHER);
    assert_eq!(harness.balance(sponsored.account), ONE_ETHER - TENTH_ETHER);
    assert_eq!(harness.entry_point.balance_of(sponsored.account), U256::ZERO);
    assert_eq!(
        harness.entry_point.balance_of(sponsored.paymaster),
        ONE_ETHER - result.actual_cost
    );
    assert_eq!(harness.balance(BENEFICIARY), result.actual_cost);
}

#[test]
fn test_expired_sponsorship_moves_no_funds() {
    let mut sponsored = Sponsored::new();
    sponsored.harness.ledger.set_timestamp(2_000);
    let call = execute_call(CAROL.address(), TENTH_ETHER, Bytes::new());
    let op = sponsored.operation(0, call, ValidityWindow::new(0, 1_000));

    let outcome = sponsored.harness.handle(&[op]);
    assert_eq!(
        outcome.ops[0].status,
        OpStatus::Skipped(ValidationError::SponsorRejected(SponsorError::SponsorshipExpired {
            valid_after: 0,
            valid_until: 1_000,
            now: 2_000,
        }))
    );

    let harness = &sponsored.harness;
    assert_eq!(harness.balance(CAROL.address()), U256::ZERO);
    assert_eq!(harness.balance(sponsored.account), ONE_ETHER);
    assert_eq!(harness.entry_point.balance_of(sponsored.paymaster), ONE_ETHER);
    assert_eq!(harness.balance(BENEFICIARY), U256::ZERO);
}

#[test]
fn test_sponsorship_not_yet_valid() {
    let mut sponsored = Sponsored::new();
    sponsored.harness.ledger.set_timestamp(10);
    let op = sponsored.operation(0, Bytes::new(), ValidityWindow::new(100, 0));
    assert!(sponsored.harness.handle(&[op.clone()]).ops[0].status.is_skipped());

    sponsored.harness.ledger.advance_time(90);
    assert!(sponsored.harness.handle(&[op]).ops[0].status.is_applied());
}

#[test]
fn test_unlisted_sender_is_rejected() {
    let mut sponsored = Sponsored::new();
    let paymaster = sponsored.paymaster;
    sponsored
        .harness
        .entry_point
        .remove_from_whitelist(BOB.address(), paymaster, sponsored.account)
        .unwrap();

    let op = sponsored.operation(0, Bytes::new(), ValidityWindow::UNBOUNDED);
    let outcome = sponsored.harness.handle(&[op]);
    assert_eq!(
        outcome.ops[0].status,
        OpStatus::Skipped(ValidationError::SponsorRejected(SponsorError::NotWhitelisted(
            sponsored.account
        )))
    );
}

#[test]
fn test_insufficient_sponsor_deposit() {
    init_tracing();
    let mut harness = Harness::default();
    let account = harness.create_account(ALICE.address());
    let paymaster = harness.create_paymaster(BOB.address(), U256::from(1_000));
    harness.entry_point.add_to_whitelist(BOB.address(), paymaster, account).unwrap();

    let mut op = operation(account, U256::ZERO, Bytes::new());
    op.sponsor = Some(sponsor_data(paymaster, ValidityWindow::UNBOUNDED));
    harness.sign(&mut op, &ALICE);
    let max_cost = op.required_prefund();

    let outcome = harness.handle(&[op]);
    assert_eq!(
        outcome.ops[0].status,
        OpStatus::Skipped(ValidationError::SponsorRejected(
            SponsorError::InsufficientSponsorFunds { deposit: U256::from(1_000), max_cost }
        ))
    );
}

#[test]
fn test_shared_deposit_is_debited_incrementally() {
    let mut sponsored = Sponsored::new();
    let ops: Vec<_> = (0..3)
        .map(|nonce| {
            let call = execute_call(CAROL.address(), U256::from(1), Bytes::new());
            sponsored.operation(nonce, call, ValidityWindow::UNBOUNDED)
        })
        .collect();

    let outcome = sponsored.harness.handle(&ops);
    assert!(outcome.statuses().all(OpStatus::is_applied));
    let total: U256 = outcome.ops.iter().map(|op| op.actual_cost).sum();
    assert_eq!(outcome.collected, total);
    assert_eq!(
        sponsored.harness.entry_point.balance_of(sponsored.paymaster),
        ONE_ETHER - total
    );

    let paymaster = sponsored.harness.entry_point.sponsor(sponsored.paymaster).unwrap();
    assert!(paymaster.is_whitelisted(sponsored.account));
}

#[test]
fn test_sponsor_at_custom_address_emits_settlement() {
    init_tracing();
    let mut harness = Harness::default();
    let account = harness.create_account(ALICE.address());
    let mut paymaster = SponsorPaymaster::new(DAVE.address(), BOB.address());
    paymaster.add_to_whitelist(BOB.address(), account).unwrap();
    let address = harness.entry_point.register_sponsor(paymaster);
    harness.deposit(BOB.address(), address, ONE_ETHER);

    let mut op = operation(account, U256::ZERO, Bytes::new());
    op.sponsor = Some(sponsor_data(address, ValidityWindow::UNBOUNDED));
    harness.sign(&mut op, &ALICE);
    let outcome = harness.handle(&[op]);
    let cost = outcome.ops[0].actual_cost;
    assert!(outcome.ops[0].status.is_applied());
    assert_eq!(harness.entry_point.balance_of(address), ONE_ETHER - cost);

    let settled: Vec<_> = outcome
        .logs
        .iter()
        .filter(|log| log.address == address)
        .map(|log| ISponsorPaymaster::Sponsored::decode_log_data(&log.data).unwrap())
        .collect();
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].sender, account);
    assert_eq!(settled[0].actualGasCost, cost);
}

#[test]
fn test_whitelist_administration() {
    let mut sponsored = Sponsored::new();
    let (paymaster, owner, carol) = (sponsored.paymaster, BOB.address(), CAROL.address());
    let entry_point = &mut sponsored.harness.entry_point;

    assert_eq!(
        entry_point.add_to_whitelist(ALICE.address(), paymaster, carol),
        Err(EntryPointError::Sponsor(SponsorError::NotOwner(ALICE.address())))
    );
    assert!(entry_point.add_to_whitelist(owner, paymaster, carol).unwrap().is_some());
    assert!(entry_point.add_to_whitelist(owner, paymaster, carol).unwrap().is_none());
    assert_eq!(
        entry_point.add_to_whitelist(owner, carol, ALICE.address()),
        Err(EntryPointError::Sponsor(SponsorError::UnknownSponsor(carol)))
    );
    assert!(sponsored.policy().is_whitelisted(carol));
    assert_eq!(sponsored.policy().owner(), owner);
}
