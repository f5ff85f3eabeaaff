//! Account-abstraction dispatcher and EIP-7702 delegation engine for the `MegaETH`.
//!
//! The crate is organised leaf-first:
//!
//! - [`WorldState`] and [`DepositLedger`] hold balances, code, storage and entry-point deposits.
//! - [`Authority`] is the account interface, implemented by [`ProgrammableAccount`] (a minimal
//!   proxy created through an [`AccountFactory`]) and [`DelegatedAccount`] (a key-pair account
//!   whose code is an EIP-7702 designator).
//! - [`SponsorPolicy`] decides whether a sponsor pays for an operation; [`SponsorPaymaster`] is
//!   the whitelist + time-window policy.
//! - [`EntryPoint`] validates, executes and settles batches of [`UserOperation`]s.
//! - [`Delegator`] drives the delegation lifecycle against a [`Ledger`] with a [`KeyHolder`].
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub use alloy_consensus;
pub use alloy_eips;
pub use alloy_primitives;
pub use mega_aa_contracts as contracts;
pub use revm;

pub mod constants;

mod authority;
pub use authority::*;

mod config;
pub use config::*;

mod delegation;
pub use delegation::*;

mod deposit;
pub use deposit::*;

mod entry_point;
pub use entry_point::*;

mod error;
pub use error::*;

mod gas;
pub use gas::*;

mod ledger;
pub use ledger::*;

mod operation;
pub use operation::*;

mod signer;
pub use signer::*;

mod sponsor;
pub use sponsor::*;

mod state;
pub use state::*;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
