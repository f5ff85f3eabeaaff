//! Key holders sign operations, authorizations and carrying transactions.

use alloy_consensus::{SignableTransaction, TxEip7702, TxEnvelope};
use alloy_eips::eip7702::{Authorization, SignedAuthorization};
use alloy_primitives::{Address, Bytes, Signature, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use auto_impl::auto_impl;
use core::fmt::Debug;

use crate::KeyHolderError;

/// A holder of a secp256k1 key.
///
/// Only [`sign_digest`](Self::sign_digest) is required; every other signature in the system is a
/// signature over a digest.
#[auto_impl(&, Box, Arc)]
pub trait KeyHolder: Debug {
    /// The address of the key.
    fn address(&self) -> Address;

    /// Signs a 32-byte digest.
    fn sign_digest(&self, digest: &B256) -> Result<Signature, KeyHolderError>;

    /// Signs an EIP-7702 authorization.
    fn sign_authorization(
        &self,
        authorization: Authorization,
    ) -> Result<SignedAuthorization, KeyHolderError> {
        let signature = self.sign_digest(&authorization.signature_hash())?;
        Ok(authorization.into_signed(signature))
    }

    /// Signs a user operation hash, returning the 65-byte `r ‖ s ‖ v` signature.
    fn sign_operation(&self, op_hash: &B256) -> Result<Bytes, KeyHolderError> {
        Ok(Bytes::copy_from_slice(&self.sign_digest(op_hash)?.as_bytes()))
    }

    /// Signs an EIP-7702 transaction.
    fn sign_transaction(&self, tx: TxEip7702) -> Result<TxEnvelope, KeyHolderError> {
        let signature = self.sign_digest(&tx.signature_hash())?;
        Ok(tx.into_signed(signature).into())
    }
}

impl KeyHolder for PrivateKeySigner {
    fn address(&self) -> Address {
        alloy_signer::Signer::address(self)
    }

    fn sign_digest(&self, digest: &B256) -> Result<Signature, KeyHolderError> {
        Ok(self.sign_hash_sync(digest)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ALICE;
    use alloy_primitives::{keccak256, U256};

    #[test]
    fn test_operation_signature_recovers_to_key() {
        let hash = keccak256("operation");
        let signature = ALICE.sign_operation(&hash).unwrap();
        assert_eq!(signature.len(), 65);

        let recovered = Signature::try_from(signature.as_ref())
            .unwrap()
            .recover_address_from_prehash(&hash)
            .unwrap();
        assert_eq!(recovered, KeyHolder::address(&*ALICE));
    }

    #[test]
    fn test_authorization_recovers_to_key() {
        let authorization =
            Authorization { chain_id: U256::from(31337), address: Address::ZERO, nonce: 3 };
        let signed = ALICE.sign_authorization(authorization.clone()).unwrap();
        assert_eq!(signed.recover_authority().unwrap(), KeyHolder::address(&*ALICE));
        assert_eq!(*signed.inner(), authorization);
    }
}
