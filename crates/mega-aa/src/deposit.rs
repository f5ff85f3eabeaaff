//! Per-address deposit accounting held by the entry point.

use alloy_primitives::{map::HashMap, Address, U256};

/// Errors raised by the [`DepositLedger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DepositError {
    /// A withdrawal or debit exceeds the deposit.
    #[error("insufficient deposit of {account}: available {available}, requested {requested}")]
    InsufficientBalance {
        /// The account whose deposit was debited.
        account: Address,
        /// The deposit at the time of the request.
        available: U256,
        /// The amount requested.
        requested: U256,
    },
}

/// Deposits that pay for operations, keyed by the paying address (a sender or a sponsor).
///
/// Balances are only changed through [`deposit`](Self::deposit), [`withdraw`](Self::withdraw),
/// [`debit`](Self::debit) and [`credit`](Self::credit); none of them can drive a balance below
/// zero.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DepositLedger {
    balances: HashMap<Address, U256>,
}

impl DepositLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the deposit of an account.
    pub fn balance_of(&self, account: Address) -> U256 {
        self.balances.get(&account).copied().unwrap_or_default()
    }

    /// Adds funds to the deposit of an account and returns the new total.
    pub fn deposit(&mut self, account: Address, amount: U256) -> U256 {
        self.credit(account, amount)
    }

    /// Removes funds that are leaving the entry point and returns the remaining deposit.
    pub fn withdraw(&mut self, account: Address, amount: U256) -> Result<U256, DepositError> {
        self.debit(account, amount)
    }

    /// Charges a cost against the deposit of an account and returns the remaining deposit.
    pub fn debit(&mut self, account: Address, amount: U256) -> Result<U256, DepositError> {
        let available = self.balance_of(account);
        let remaining = available.checked_sub(amount).ok_or(DepositError::InsufficientBalance {
            account,
            available,
            requested: amount,
        })?;
        self.set(account, remaining);
        Ok(remaining)
    }

    /// Charges at most `amount`, stopping at zero, and returns the amount actually charged.
    pub fn debit_up_to(&mut self, account: Address, amount: U256) -> U256 {
        let available = self.balance_of(account);
        let charged = amount.min(available);
        self.set(account, available - charged);
        charged
    }

    /// Returns funds to the deposit of an account and returns the new total.
    pub fn credit(&mut self, account: Address, amount: U256) -> U256 {
        let total = self.balance_of(account).saturating_add(amount);
        self.set(account, total);
        total
    }

    /// Returns the sum of all deposits.
    pub fn total(&self) -> U256 {
        self.balances.values().fold(U256::ZERO, |acc, balance| acc.saturating_add(*balance))
    }

    fn set(&mut self, account: Address, balance: U256) {
        if balance.is_zero() {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, balance);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const SPONSOR: Address = address!("3000000000000000000000000000000000000003");

    #[test]
    fn test_deposit_then_withdraw_all() {
        let mut ledger = DepositLedger::new();
        assert_eq!(ledger.deposit(SPONSOR, U256::from(10)), U256::from(10));
        assert_eq!(ledger.deposit(SPONSOR, U256::from(5)), U256::from(15));
        assert_eq!(ledger.withdraw(SPONSOR, U256::from(15)), Ok(U256::ZERO));
        assert_eq!(ledger.balance_of(SPONSOR), U256::ZERO);
        assert_eq!(ledger, DepositLedger::new());
    }

    #[test]
    fn test_overdraft_is_rejected() {
        let mut ledger = DepositLedger::new();
        ledger.deposit(SPONSOR, U256::from(3));
        assert_eq!(
            ledger.debit(SPONSOR, U256::from(4)),
            Err(DepositError::InsufficientBalance {
                account: SPONSOR,
                available: U256::from(3),
                requested: U256::from(4),
            })
        );
        assert_eq!(ledger.balance_of(SPONSOR), U256::from(3));
    }

    #[test]
    fn test_debit_up_to_stops_at_zero() {
        let mut ledger = DepositLedger::new();
        ledger.deposit(SPONSOR, U256::from(3));
        assert_eq!(ledger.debit_up_to(SPONSOR, U256::from(2)), U256::from(2));
        assert_eq!(ledger.debit_up_to(SPONSOR, U256::from(2)), U256::from(1));
        assert_eq!(ledger.balance_of(SPONSOR), U256::ZERO);
    }

    #[test]
    fn test_total_tracks_all_accounts() {
        let mut ledger = DepositLedger::new();
        ledger.deposit(SPONSOR, U256::from(3));
        ledger.deposit(Address::ZERO, U256::from(4));
        ledger.debit(SPONSOR, U256::from(1)).unwrap();
        assert_eq!(ledger.total(), U256::from(6));
    }
}
