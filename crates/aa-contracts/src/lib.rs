//! Solidity interfaces and code templates for the `MegaETH` account-abstraction contracts.
//!
//! The engine in `mega-aa` speaks the ERC-4337 v0.7 ABI at its boundaries. The `sol!` bindings
//! and the raw code layouts it recognises (EIP-1167 minimal proxies and EIP-7702 delegation
//! designators) live here so that the engine, its tests and any off-chain tooling agree on a
//! single definition.

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]
#![deny(unused_must_use)]

#[allow(unused_extern_crates)]
extern crate alloc;

pub use alloy_primitives;

pub mod account;
pub mod designator;
pub mod entry_point;
pub mod paymaster;
pub mod proxy;
