//! Tests for the entry point deposit ledger.

use alloy_primitives::{Bytes, U256};
use alloy_sol_types::{SolCall, SolEvent};
use mega_aa::{
    contracts::entry_point::IEntryPoint,
    test_utils::{execute_call, init_tracing, Harness, ALICE, BOB, CAROL},
    DepositError, EntryPointError,
};
use rstest::rstest;

#[rstest]
#[case(1)]
#[case(1_000_000)]
fn test_deposit_round_trip(#[case] amount: u64) {
    init_tracing();
    let mut harness = Harness::default();
    let amount = U256::from(amount);
    let (alice, bob) = (ALICE.address(), BOB.address());
    harness.deposit(alice, alice, amount);
    let entry_point = harness.entry_point.address();
    assert_eq!(harness.entry_point.balance_of(alice), amount);
    assert_eq!(harness.balance(entry_point), amount);

    let log = harness.entry_point.withdraw(harness.ledger.state_mut(), alice, amount, bob).unwrap();
    let withdrawn = IEntryPoint::Withdrawn::decode_log_data(&log.data).unwrap();
    assert_eq!(withdrawn.amount, amount);
    assert_eq!(withdrawn.withdrawAddress, bob);

    assert_eq!(harness.entry_point.balance_of(alice), U256::ZERO);
    assert_eq!(harness.balance(bob), amount);
    assert_eq!(harness.balance(entry_point), U256::ZERO);
}

#[test]
fn test_overdraft_is_rejected() {
    let mut harness = Harness::default();
    let alice = ALICE.address();
    harness.deposit(alice, alice, U256::from(10));

    let result = harness.entry_point.withdraw(
        harness.ledger.state_mut(),
        alice,
        U256::from(11),
        alice,
    );
    assert_eq!(
        result,
        Err(EntryPointError::Deposit(DepositError::InsufficientBalance {
            account: alice,
            available: U256::from(10),
            requested: U256::from(11),
        }))
    );
    assert_eq!(harness.entry_point.balance_of(alice), U256::from(10));
}

#[test]
fn test_deposit_needs_payer_balance() {
    let mut harness = Harness::default();
    let result = harness.entry_point.deposit_to(
        harness.ledger.state_mut(),
        ALICE.address(),
        BOB.address(),
        U256::from(1),
    );
    assert!(matches!(result, Err(EntryPointError::Balance(_))));
    assert_eq!(harness.entry_point.balance_of(BOB.address()), U256::ZERO);
}

#[test]
fn test_deposit_event() {
    let mut harness = Harness::default();
    harness.ledger.fund(ALICE.address(), U256::from(50));
    let log = harness
        .entry_point
        .deposit_to(harness.ledger.state_mut(), ALICE.address(), BOB.address(), U256::from(20))
        .unwrap();
    let deposited = IEntryPoint::Deposited::decode_log_data(&log.data).unwrap();
    assert_eq!(deposited.account, BOB.address());
    assert_eq!(deposited.totalDeposit, U256::from(20));
}

#[test]
fn test_account_deposits_through_execution() {
    init_tracing();
    let mut harness = Harness::default();
    let account = harness.create_account(ALICE.address());
    harness.ledger.fund(account, U256::from(1_000_000_000_000_000_000u64));

    // A call to the entry point with `depositTo` call data credits the named account.
    let deposit = IEntryPoint::depositToCall { account: CAROL.address() }.abi_encode();
    let entry_point = harness.entry_point.address();
    let call = execute_call(entry_point, U256::from(500), deposit.into());
    let op = harness.signed_operation(&ALICE, account, U256::ZERO, call);

    let outcome = harness.handle(&[op]);
    assert!(outcome.ops[0].status.is_applied());
    assert_eq!(harness.entry_point.balance_of(CAROL.address()), U256::from(500));
    assert!(outcome
        .logs
        .iter()
        .filter_map(|log| IEntryPoint::Deposited::decode_log_data(&log.data).ok())
        .any(|event| event.account == CAROL.address() && event.totalDeposit == U256::from(500)));

    // Plain value sent to the entry point deposits for the sender.
    let call = execute_call(entry_point, U256::from(7), Bytes::new());
    let op = harness.signed_operation(&ALICE, account, U256::from(1), call);
    // The deposit left over from the first operation is topped up to the prefund.
    let prefund = op.required_prefund();
    assert!(harness.entry_point.balance_of(account) < prefund);
    let outcome = harness.handle(&[op]);
    assert!(outcome.ops[0].status.is_applied());
    assert_eq!(
        harness.entry_point.balance_of(account),
        prefund + U256::from(7) - outcome.ops[0].actual_cost
    );
    // Every deposit is backed by the entry point's balance.
    assert_eq!(harness.balance(entry_point), harness.entry_point.deposits().total());
}
