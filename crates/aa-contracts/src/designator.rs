//! EIP-7702 delegation designator.
//!
//! An externally owned account that has delegated its behaviour carries the 23-byte code
//! `0xef0100 ‖ delegate`. Clearing the delegation resets the code to empty.

use alloy_primitives::{hex, Address, Bytes};

/// Magic prefix of a delegation designator.
pub const DELEGATION_DESIGNATOR: [u8; 3] = hex!("ef0100");

/// Length of a delegation designator.
pub const DESIGNATED_CODE_LEN: usize = DELEGATION_DESIGNATOR.len() + 20;

/// Returns the code installed on an account that delegates to `delegate`.
pub fn designated_code(delegate: Address) -> Bytes {
    [&DELEGATION_DESIGNATOR[..], delegate.as_slice()].concat().into()
}

/// Returns the delegate if `code` is a delegation designator.
pub fn delegate_of(code: &[u8]) -> Option<Address> {
    (code.len() == DESIGNATED_CODE_LEN && code.starts_with(&DELEGATION_DESIGNATOR))
        .then(|| Address::from_slice(&code[DELEGATION_DESIGNATOR.len()..]))
}
