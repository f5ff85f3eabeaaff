//! EIP-1167 minimal proxy code.
//!
//! Accounts created by the account factory are minimal proxies that forward every call to a
//! shared account implementation. The engine recognises a programmable account by parsing
//! this layout out of the account's code.

use alloy_primitives::{hex, Address, Bytes};

/// Code preceding the implementation address in the proxy runtime code.
const RUNTIME_PREFIX: [u8; 10] = hex!("363d3d373d3d3d363d73");
/// Code following the implementation address in the proxy runtime code.
const RUNTIME_SUFFIX: [u8; 15] = hex!("5af43d82803e903d91602b57fd5bf3");
/// Creation code that returns the 45-byte runtime code.
const CREATION_PREFIX: [u8; 10] = hex!("3d602d80600a3d3981f3");

/// Length of the proxy runtime code.
pub const RUNTIME_CODE_LEN: usize = RUNTIME_PREFIX.len() + 20 + RUNTIME_SUFFIX.len();

/// Returns the runtime code of a minimal proxy pointing at `implementation`.
pub fn runtime_code(implementation: Address) -> Bytes {
    [&RUNTIME_PREFIX[..], implementation.as_slice(), &RUNTIME_SUFFIX[..]].concat().into()
}

/// Returns the creation code that deploys [`runtime_code`] for `implementation`.
pub fn creation_code(implementation: Address) -> Bytes {
    [&CREATION_PREFIX[..], &runtime_code(implementation)[..]].concat().into()
}

/// Returns the implementation address if `code` is a minimal proxy.
pub fn implementation_of(code: &[u8]) -> Option<Address> {
    if code.len() != RUNTIME_CODE_LEN ||
        !code.starts_with(&RUNTIME_PREFIX) ||
        !code.ends_with(&RUNTIME_SUFFIX)
    {
        return None;
    }
    Some(Address::from_slice(&code[RUNTIME_PREFIX.len()..RUNTIME_PREFIX.len() + 20]))
}
