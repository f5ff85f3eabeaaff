use alloy_primitives::{address, Address};
use alloy_signer_local::PrivateKeySigner;
use std::sync::LazyLock;

/// Hardhat/anvil development account #0.
pub static ALICE: LazyLock<PrivateKeySigner> =
    LazyLock::new(|| signer("ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"));

/// Hardhat/anvil development account #1.
pub static BOB: LazyLock<PrivateKeySigner> =
    LazyLock::new(|| signer("59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"));

/// Hardhat/anvil development account #2.
pub static CAROL: LazyLock<PrivateKeySigner> =
    LazyLock::new(|| signer("5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a"));

/// Hardhat/anvil development account #3.
pub static DAVE: LazyLock<PrivateKeySigner> =
    LazyLock::new(|| signer("7c852118294e51e653712a81e05800f419141751be58f605c371e15141b007a6"));

/// The account implementation used by test factories and delegations.
pub const IMPLEMENTATION: Address = address!("8000000000000000000000000000000000000008");

/// The account factory used by tests.
pub const FACTORY: Address = address!("9000000000000000000000000000000000000009");

/// The sponsor paymaster used by tests.
pub const PAYMASTER: Address = address!("3000000000000000000000000000000000000003");

/// The beneficiary of test batches.
pub const BENEFICIARY: Address = address!("b000000000000000000000000000000000000000");

fn signer(key: &str) -> PrivateKeySigner {
    key.parse().expect("valid development key")
}
