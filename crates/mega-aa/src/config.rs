//! Configuration of the entry point and the delegation pipeline.

use alloy_primitives::Address;
use core::{
    fmt::{self, Display},
    str::FromStr,
};
use serde::{Deserialize, Serialize};

use crate::constants::{chain, validation};

/// Configuration of an [`EntryPoint`](crate::EntryPoint).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntryPointConfig {
    /// The chain id bound into operation hashes.
    pub chain_id: u64,
    /// The entry point address bound into operation hashes; it also holds the deposits.
    pub address: Address,
    /// Gas charged for each call from the entry point into an account or a sponsor.
    pub call_overhead_gas: u64,
}

impl Default for EntryPointConfig {
    fn default() -> Self {
        Self {
            chain_id: chain::DEFAULT_CHAIN_ID,
            address: chain::DEFAULT_ENTRY_POINT,
            call_overhead_gas: validation::ACCOUNT_CALL_GAS,
        }
    }
}

/// Configuration of a [`Delegator`](crate::Delegator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DelegationConfig {
    /// The chain id signed into authorizations and carrying transactions.
    pub chain_id: u64,
    /// How the authorization nonce is derived from the sender's transaction nonce.
    pub nonce_policy: AuthorizationNoncePolicy,
    /// Gas limit of the carrying transaction.
    pub gas_limit: u64,
    /// Max fee per gas of the carrying transaction.
    pub max_fee_per_gas: u128,
    /// Max priority fee per gas of the carrying transaction.
    pub max_priority_fee_per_gas: u128,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            chain_id: chain::DEFAULT_CHAIN_ID,
            nonce_policy: AuthorizationNoncePolicy::default(),
            gas_limit: 100_000,
            max_fee_per_gas: 2 * chain::DEFAULT_BASE_FEE,
            max_priority_fee_per_gas: chain::DEFAULT_BASE_FEE,
        }
    }
}

/// How the nonce of an EIP-7702 authorization is chosen.
///
/// The ledger bumps the sender's nonce before it processes the authorization list, so an
/// authorization carried by the authority's own transaction must sign the nonce after the bump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthorizationNoncePolicy {
    /// Transaction nonce + 1, for carriers sent by the authority itself.
    #[default]
    AfterCarrier,
    /// The current transaction nonce, for carriers sent by another account.
    Current,
}

/// String identifiers for [`AuthorizationNoncePolicy`].
#[allow(missing_docs)]
pub mod policy_name {
    pub const AFTER_CARRIER: &str = "afterCarrier";
    pub const CURRENT: &str = "current";
}

impl AuthorizationNoncePolicy {
    /// The authorization nonce for an account whose transaction nonce is `tx_nonce`.
    pub const fn authorization_nonce(self, tx_nonce: u64) -> u64 {
        match self {
            Self::AfterCarrier => tx_nonce + 1,
            Self::Current => tx_nonce,
        }
    }

    /// Returns the string identifier.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AfterCarrier => policy_name::AFTER_CARRIER,
            Self::Current => policy_name::CURRENT,
        }
    }
}

impl Display for AuthorizationNoncePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unknown [`AuthorizationNoncePolicy`] identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown authorization nonce policy: {0}")]
pub struct UnknownNoncePolicy(pub String);

impl FromStr for AuthorizationNoncePolicy {
    type Err = UnknownNoncePolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            policy_name::AFTER_CARRIER => Ok(Self::AfterCarrier),
            policy_name::CURRENT => Ok(Self::Current),
            _ => Err(UnknownNoncePolicy(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AuthorizationNoncePolicy::AfterCarrier, 4, 5)]
    #[case(AuthorizationNoncePolicy::Current, 4, 4)]
    fn test_authorization_nonce(
        #[case] policy: AuthorizationNoncePolicy,
        #[case] tx_nonce: u64,
        #[case] expected: u64,
    ) {
        assert_eq!(policy.authorization_nonce(tx_nonce), expected);
        assert_eq!(policy.to_string().parse::<AuthorizationNoncePolicy>(), Ok(policy));
    }

    #[test]
    fn test_unknown_policy() {
        assert_eq!(
            "next".parse::<AuthorizationNoncePolicy>(),
            Err(UnknownNoncePolicy("next".to_string()))
        );
    }

    #[test]
    fn test_entry_point_config_defaults_missing_fields() {
        let config: EntryPointConfig = serde_json::from_str(r#"{"chainId": 6342}"#).unwrap();
        assert_eq!(config.chain_id, 6342);
        assert_eq!(config.address, chain::DEFAULT_ENTRY_POINT);
        assert_eq!(config.call_overhead_gas, validation::ACCOUNT_CALL_GAS);
    }

    #[test]
    fn test_delegation_config_serde() {
        let config: DelegationConfig =
            serde_json::from_str(r#"{"noncePolicy": "current", "gasLimit": 60000}"#).unwrap();
        assert_eq!(config.nonce_policy, AuthorizationNoncePolicy::Current);
        assert_eq!(config.gas_limit, 60_000);
        assert_eq!(config.chain_id, chain::DEFAULT_CHAIN_ID);

        let json = serde_json::to_value(DelegationConfig::default()).unwrap();
        assert_eq!(json["noncePolicy"], "afterCarrier");
        assert_eq!(json["maxPriorityFeePerGas"], 1_000_000_000u64);
    }
}
