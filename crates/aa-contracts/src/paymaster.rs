//! Sponsor paymaster ABI and the byte layout of `paymasterAndData`.
#![allow(missing_docs)]

use alloy_sol_types::sol;

/// Offset of the paymaster verification gas limit (`uint128`) in `paymasterAndData`.
pub const PAYMASTER_VALIDATION_GAS_OFFSET: usize = 20;
/// Offset of the paymaster post-op gas limit (`uint128`) in `paymasterAndData`.
pub const PAYMASTER_POSTOP_GAS_OFFSET: usize = 36;
/// Offset of the paymaster-defined payload in `paymasterAndData`.
pub const PAYMASTER_DATA_OFFSET: usize = 52;

/// Length of the `uint48 validAfter ‖ uint48 validUntil` payload used by the sponsor paymaster.
pub const SPONSOR_WINDOW_LEN: usize = 12;

sol! {
    /// Settlement context handed from sponsor validation to the post-op hook.
    #[derive(Default, Debug, PartialEq, Eq)]
    struct SponsorshipContext {
        address sender;
        uint256 maxCost;
    }

    interface ISponsorPaymaster {
        event WhitelistUpdated(address indexed account, bool allowed);
        event Sponsored(address indexed sender, uint256 actualGasCost);
    }
}
