//! Sponsor policies decide whether a third party pays for an operation.

use alloy_primitives::{
    map::{HashMap, HashSet},
    Address, Bytes, Log, B256, U256,
};
use alloy_sol_types::SolValue;
use core::fmt::Debug;
use mega_aa_contracts::paymaster::{ISponsorPaymaster, SponsorshipContext};
use tracing::debug;

use crate::{entry_point::event_log, SponsorError, UserOperation, ValidityWindow};

/// A fee-sponsor policy registered with the entry point.
///
/// The sponsor's funds are held in the entry point's deposit ledger; the policy only decides and
/// records. [`validate_sponsorship`](Self::validate_sponsorship) runs during validation and
/// returns an opaque context, which is handed back to [`settle`](Self::settle) after execution
/// together with the actual cost the entry point debited from the sponsor's deposit.
pub trait SponsorPolicy: Debug {
    /// The policy address, as named in an operation's sponsor section.
    fn address(&self) -> Address;

    /// The administrator of the policy.
    fn owner(&self) -> Address;

    /// Adds `account` to the whitelist. Only the owner may call this; adding a listed account is a
    /// no-op. Returns the emitted event, if the whitelist changed.
    fn add_to_whitelist(
        &mut self,
        caller: Address,
        account: Address,
    ) -> Result<Option<Log>, SponsorError>;

    /// Removes `account` from the whitelist. Only the owner may call this.
    fn remove_from_whitelist(
        &mut self,
        caller: Address,
        account: Address,
    ) -> Result<Option<Log>, SponsorError>;

    /// Returns whether `account` may be sponsored.
    fn is_whitelisted(&self, account: Address) -> bool;

    /// Decides whether to pay for `op`, given its maximum cost and the sponsor's deposit.
    ///
    /// Returns the settlement context and the window in which the sponsorship is valid; the entry
    /// point checks the window against the block timestamp.
    fn validate_sponsorship(
        &self,
        op: &UserOperation,
        op_hash: B256,
        max_cost: U256,
        deposit: U256,
    ) -> Result<(Bytes, ValidityWindow), SponsorError>;

    /// Post-operation hook, called with the context from validation and the cost actually
    /// charged to the sponsor.
    fn settle(&mut self, context: &[u8], actual_cost: U256) -> Result<Vec<Log>, SponsorError>;
}

/// Sponsors whitelisted senders inside the time window carried in the operation's sponsor
/// payload (`uint48 validAfter ‖ uint48 validUntil`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SponsorPaymaster {
    address: Address,
    owner: Address,
    whitelist: HashSet<Address>,
    sponsored: HashMap<Address, U256>,
}

impl SponsorPaymaster {
    /// Creates a paymaster with an empty whitelist.
    pub fn new(address: Address, owner: Address) -> Self {
        Self { address, owner, whitelist: HashSet::default(), sponsored: HashMap::default() }
    }

    /// The total cost sponsored for `sender` so far.
    pub fn sponsored_total(&self, sender: Address) -> U256 {
        self.sponsored.get(&sender).copied().unwrap_or_default()
    }

    fn ensure_owner(&self, caller: Address) -> Result<(), SponsorError> {
        if caller == self.owner {
            Ok(())
        } else {
            Err(SponsorError::NotOwner(caller))
        }
    }

    fn whitelist_event(&self, account: Address, allowed: bool) -> Log {
        event_log(self.address, &ISponsorPaymaster::WhitelistUpdated { account, allowed })
    }
}

impl SponsorPolicy for SponsorPaymaster {
    fn address(&self) -> Address {
        self.address
    }

    fn owner(&self) -> Address {
        self.owner
    }

    fn add_to_whitelist(
        &mut self,
        caller: Address,
        account: Address,
    ) -> Result<Option<Log>, SponsorError> {
        self.ensure_owner(caller)?;
        if !self.whitelist.insert(account) {
            return Ok(None);
        }
        debug!(sponsor = %self.address, account = %account, "Account whitelisted");
        Ok(Some(self.whitelist_event(account, true)))
    }

    fn remove_from_whitelist(
        &mut self,
        caller: Address,
        account: Address,
    ) -> Result<Option<Log>, SponsorError> {
        self.ensure_owner(caller)?;
        if !self.whitelist.remove(&account) {
            return Ok(None);
        }
        debug!(sponsor = %self.address, account = %account, "Account removed from whitelist");
        Ok(Some(self.whitelist_event(account, false)))
    }

    fn is_whitelisted(&self, account: Address) -> bool {
        self.whitelist.contains(&account)
    }

    fn validate_sponsorship(
        &self,
        op: &UserOperation,
        _op_hash: B256,
        max_cost: U256,
        deposit: U256,
    ) -> Result<(Bytes, ValidityWindow), SponsorError> {
        let window = op
            .sponsor
            .as_ref()
            .filter(|sponsor| sponsor.sponsor == self.address)
            .and_then(|sponsor| ValidityWindow::decode(&sponsor.data))
            .ok_or(SponsorError::MalformedSponsorData)?;
        if !self.is_whitelisted(op.sender) {
            return Err(SponsorError::NotWhitelisted(op.sender));
        }
        if deposit < max_cost {
            return Err(SponsorError::InsufficientSponsorFunds { deposit, max_cost });
        }
        let context = SponsorshipContext { sender: op.sender, maxCost: max_cost };
        Ok((context.abi_encode().into(), window))
    }

    fn settle(&mut self, context: &[u8], actual_cost: U256) -> Result<Vec<Log>, SponsorError> {
        let context = <SponsorshipContext as SolValue>::abi_decode(context)
            .map_err(|_| SponsorError::MalformedContext)?;
        let total = self.sponsored.entry(context.sender).or_default();
        *total = total.saturating_add(actual_cost);
        Ok(vec![event_log(
            self.address,
            &ISponsorPaymaster::Sponsored { sender: context.sender, actualGasCost: actual_cost },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SponsorData;
    use alloy_primitives::address;

    const PAYMASTER: Address = address!("3000000000000000000000000000000000000003");
    const OWNER: Address = address!("4000000000000000000000000000000000000004");
    const SENDER: Address = address!("1000000000000000000000000000000000000001");

    fn sponsored_op(window: ValidityWindow) -> UserOperation {
        UserOperation {
            sender: SENDER,
            sponsor: Some(SponsorData {
                sponsor: PAYMASTER,
                verification_gas_limit: 100_000,
                post_op_gas_limit: 50_000,
                data: window.encode(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_whitelist_is_owner_only_and_idempotent() {
        let mut paymaster = SponsorPaymaster::new(PAYMASTER, OWNER);
        assert_eq!(
            paymaster.add_to_whitelist(SENDER, SENDER),
            Err(SponsorError::NotOwner(SENDER))
        );
        assert!(paymaster.add_to_whitelist(OWNER, SENDER).unwrap().is_some());
        assert!(paymaster.add_to_whitelist(OWNER, SENDER).unwrap().is_none());
        assert!(paymaster.is_whitelisted(SENDER));

        assert!(paymaster.remove_from_whitelist(OWNER, SENDER).unwrap().is_some());
        assert!(paymaster.remove_from_whitelist(OWNER, SENDER).unwrap().is_none());
        assert!(!paymaster.is_whitelisted(SENDER));
    }

    #[test]
    fn test_rejects_unlisted_sender() {
        let paymaster = SponsorPaymaster::new(PAYMASTER, OWNER);
        let op = sponsored_op(ValidityWindow::UNBOUNDED);
        assert_eq!(
            paymaster.validate_sponsorship(&op, B256::ZERO, U256::from(1), U256::from(1)),
            Err(SponsorError::NotWhitelisted(SENDER))
        );
    }

    #[test]
    fn test_rejects_insufficient_deposit() {
        let mut paymaster = SponsorPaymaster::new(PAYMASTER, OWNER);
        paymaster.add_to_whitelist(OWNER, SENDER).unwrap();
        let op = sponsored_op(ValidityWindow::UNBOUNDED);
        assert_eq!(
            paymaster.validate_sponsorship(&op, B256::ZERO, U256::from(2), U256::from(1)),
            Err(SponsorError::InsufficientSponsorFunds {
                deposit: U256::from(1),
                max_cost: U256::from(2)
            })
        );
    }

    #[test]
    fn test_rejects_malformed_window() {
        let mut paymaster = SponsorPaymaster::new(PAYMASTER, OWNER);
        paymaster.add_to_whitelist(OWNER, SENDER).unwrap();
        let mut op = sponsored_op(ValidityWindow::UNBOUNDED);
        if let Some(sponsor) = op.sponsor.as_mut() {
            sponsor.data = Bytes::from_static(&[0u8; 3]);
        }
        assert_eq!(
            paymaster.validate_sponsorship(&op, B256::ZERO, U256::ZERO, U256::ZERO),
            Err(SponsorError::MalformedSponsorData)
        );
    }

    #[test]
    fn test_returns_window_and_settles() {
        let mut paymaster = SponsorPaymaster::new(PAYMASTER, OWNER);
        paymaster.add_to_whitelist(OWNER, SENDER).unwrap();
        let window = ValidityWindow::new(100, 200);
        let op = sponsored_op(window);

        let (context, returned) = paymaster
            .validate_sponsorship(&op, B256::ZERO, U256::from(10), U256::from(10))
            .unwrap();
        assert_eq!(returned, window);

        let logs = paymaster.settle(&context, U256::from(4)).unwrap();
        assert_eq!(logs.len(), 1);
        paymaster.settle(&context, U256::from(3)).unwrap();
        assert_eq!(paymaster.sponsored_total(SENDER), U256::from(7));
        assert_eq!(paymaster.settle(&[1, 2, 3], U256::ZERO), Err(SponsorError::MalformedContext));
    }
}
