//! The user operation and its packed ERC-4337 v0.7 representation.

use alloy_primitives::{aliases::U192, keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use mega_aa_contracts::{
    entry_point::{PackedUserOperation, UserOperationHashEnvelope, UserOperationHashFields},
    paymaster::{
        PAYMASTER_DATA_OFFSET, PAYMASTER_POSTOP_GAS_OFFSET, PAYMASTER_VALIDATION_GAS_OFFSET,
        SPONSOR_WINDOW_LEN,
    },
};
use serde::{Deserialize, Serialize};

use crate::SponsorError;

const FACTORY_LEN: usize = 20;

/// A self-describing request, signed by the sender's authority, to execute `call_data` on its
/// behalf.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    /// The authority that validates and executes the operation.
    pub sender: Address,
    /// The nonce key (upper 192 bits) and sequence (lower 64 bits).
    pub nonce: U256,
    /// `factory ‖ factoryCallData`, used to construct the sender when it does not exist yet.
    pub init_code: Bytes,
    /// The call to execute on the sender.
    pub call_data: Bytes,
    /// Gas limits of the validation and execution phases.
    pub gas_limits: GasLimits,
    /// Gas charged on top of the metered phases.
    pub pre_verification_gas: U256,
    /// Fee caps.
    pub fees: GasFees,
    /// The sponsor paying for the operation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sponsor: Option<SponsorData>,
    /// The authority's signature over the operation hash.
    pub signature: Bytes,
}

/// Gas limits of an operation. Packed into `accountGasLimits` with the verification limit in the
/// high 16 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasLimits {
    /// Limit for constructing and validating the sender.
    pub verification_gas_limit: u128,
    /// Limit for executing the call data.
    pub call_gas_limit: u128,
}

impl GasLimits {
    /// Packs the limits into `accountGasLimits`.
    pub fn pack(&self) -> B256 {
        pack_u128_pair(self.verification_gas_limit, self.call_gas_limit)
    }

    /// Unpacks `accountGasLimits`.
    pub fn unpack(packed: B256) -> Self {
        let (verification_gas_limit, call_gas_limit) = unpack_u128_pair(packed);
        Self { verification_gas_limit, call_gas_limit }
    }
}

/// Fee caps of an operation. Packed into `gasFees` with the priority fee in the high 16 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasFees {
    /// Maximum tip per gas on top of the base fee.
    pub max_priority_fee_per_gas: u128,
    /// Maximum total fee per gas.
    pub max_fee_per_gas: u128,
}

impl GasFees {
    /// Packs the fees into `gasFees`.
    pub fn pack(&self) -> B256 {
        pack_u128_pair(self.max_priority_fee_per_gas, self.max_fee_per_gas)
    }

    /// Unpacks `gasFees`.
    pub fn unpack(packed: B256) -> Self {
        let (max_priority_fee_per_gas, max_fee_per_gas) = unpack_u128_pair(packed);
        Self { max_priority_fee_per_gas, max_fee_per_gas }
    }

    /// The price per gas paid under `base_fee`: `min(maxFee, baseFee + maxPriorityFee)`.
    pub fn gas_price(&self, base_fee: u128) -> u128 {
        self.max_fee_per_gas.min(base_fee.saturating_add(self.max_priority_fee_per_gas))
    }
}

/// The sponsor section of an operation, encoded as `paymasterAndData`:
/// `sponsor(20) ‖ uint128 verificationGasLimit ‖ uint128 postOpGasLimit ‖ data`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorData {
    /// The sponsor policy address.
    pub sponsor: Address,
    /// Gas limit of sponsor validation.
    pub verification_gas_limit: u128,
    /// Gas limit of the sponsor's post-op hook.
    pub post_op_gas_limit: u128,
    /// Policy-specific payload.
    pub data: Bytes,
}

impl SponsorData {
    /// Encodes the section as `paymasterAndData`.
    pub fn encode(&self) -> Bytes {
        let mut out = Vec::with_capacity(PAYMASTER_DATA_OFFSET + self.data.len());
        out.extend_from_slice(self.sponsor.as_slice());
        out.extend_from_slice(&self.verification_gas_limit.to_be_bytes());
        out.extend_from_slice(&self.post_op_gas_limit.to_be_bytes());
        out.extend_from_slice(&self.data);
        out.into()
    }

    /// Decodes `paymasterAndData`. Empty input means the operation is not sponsored.
    pub fn decode(paymaster_and_data: &[u8]) -> Result<Option<Self>, SponsorError> {
        if paymaster_and_data.is_empty() {
            return Ok(None);
        }
        if paymaster_and_data.len() < PAYMASTER_DATA_OFFSET {
            return Err(SponsorError::MalformedSponsorData);
        }
        Ok(Some(Self {
            sponsor: Address::from_slice(&paymaster_and_data[..PAYMASTER_VALIDATION_GAS_OFFSET]),
            verification_gas_limit: read_u128(
                &paymaster_and_data[PAYMASTER_VALIDATION_GAS_OFFSET..PAYMASTER_POSTOP_GAS_OFFSET],
            ),
            post_op_gas_limit: read_u128(
                &paymaster_and_data[PAYMASTER_POSTOP_GAS_OFFSET..PAYMASTER_DATA_OFFSET],
            ),
            data: Bytes::copy_from_slice(&paymaster_and_data[PAYMASTER_DATA_OFFSET..]),
        }))
    }
}

/// A validity window `[valid_after, valid_until]` in block timestamps. `valid_until == 0` means
/// no upper bound.
///
/// Encoded as `uint48 validAfter ‖ uint48 validUntil` in the sponsor payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityWindow {
    /// First valid timestamp.
    pub valid_after: u64,
    /// Last valid timestamp, or zero.
    pub valid_until: u64,
}

impl ValidityWindow {
    /// The window that is always valid.
    pub const UNBOUNDED: Self = Self { valid_after: 0, valid_until: 0 };

    const U48_MAX: u64 = (1 << 48) - 1;

    /// Creates a window.
    pub const fn new(valid_after: u64, valid_until: u64) -> Self {
        Self { valid_after, valid_until }
    }

    /// Returns whether `now` lies inside the window.
    pub const fn contains(&self, now: u64) -> bool {
        now >= self.valid_after && (self.valid_until == 0 || now <= self.valid_until)
    }

    /// Encodes the window as two big-endian `uint48`s. Values above `2^48 - 1` are clamped.
    pub fn encode(&self) -> Bytes {
        let mut out = [0u8; SPONSOR_WINDOW_LEN];
        out[..6].copy_from_slice(&self.valid_after.min(Self::U48_MAX).to_be_bytes()[2..]);
        out[6..].copy_from_slice(&self.valid_until.min(Self::U48_MAX).to_be_bytes()[2..]);
        Bytes::copy_from_slice(&out)
    }

    /// Decodes a window from exactly twelve bytes.
    pub fn decode(data: &[u8]) -> Option<Self> {
        (data.len() == SPONSOR_WINDOW_LEN)
            .then(|| Self { valid_after: read_u48(&data[..6]), valid_until: read_u48(&data[6..]) })
    }
}

/// Composes a nonce from its key and sequence.
pub fn compose_nonce(key: U192, sequence: u64) -> U256 {
    (U256::from(key) << 64) | U256::from(sequence)
}

/// Splits a nonce into its key and sequence.
pub fn split_nonce(nonce: U256) -> (U192, u64) {
    (U192::from(nonce >> 64), nonce.as_limbs()[0])
}

impl UserOperation {
    /// The nonce key.
    pub fn nonce_key(&self) -> U192 {
        split_nonce(self.nonce).0
    }

    /// The nonce sequence within its key.
    pub fn nonce_sequence(&self) -> u64 {
        split_nonce(self.nonce).1
    }

    /// The factory named by `init_code`, if it is long enough to name one.
    pub fn factory(&self) -> Option<Address> {
        (self.init_code.len() >= FACTORY_LEN)
            .then(|| Address::from_slice(&self.init_code[..FACTORY_LEN]))
    }

    /// The sponsor policy address, if the operation is sponsored.
    pub fn sponsor_address(&self) -> Option<Address> {
        self.sponsor.as_ref().map(|sponsor| sponsor.sponsor)
    }

    /// The encoded `paymasterAndData`; empty for self-funded operations.
    pub fn paymaster_and_data(&self) -> Bytes {
        self.sponsor.as_ref().map(SponsorData::encode).unwrap_or_default()
    }

    /// The sum of all gas limits and the pre-verification gas.
    pub fn max_gas(&self) -> U256 {
        let (sponsor_verification, sponsor_post_op) = self
            .sponsor
            .as_ref()
            .map(|sponsor| (sponsor.verification_gas_limit, sponsor.post_op_gas_limit))
            .unwrap_or_default();
        [
            self.gas_limits.verification_gas_limit,
            self.gas_limits.call_gas_limit,
            sponsor_verification,
            sponsor_post_op,
        ]
        .into_iter()
        .fold(self.pre_verification_gas, |acc, gas| acc.saturating_add(U256::from(gas)))
    }

    /// The funds reserved for the operation: [`max_gas`](Self::max_gas) at `maxFeePerGas`.
    pub fn required_prefund(&self) -> U256 {
        self.max_gas().saturating_mul(U256::from(self.fees.max_fee_per_gas))
    }

    /// The ERC-4337 v0.7 operation hash, bound to an entry point and chain.
    ///
    /// The signature is not covered.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> B256 {
        let fields = UserOperationHashFields {
            sender: self.sender,
            nonce: self.nonce,
            hashInitCode: keccak256(&self.init_code),
            hashCallData: keccak256(&self.call_data),
            accountGasLimits: self.gas_limits.pack(),
            preVerificationGas: self.pre_verification_gas,
            gasFees: self.fees.pack(),
            hashPaymasterAndData: keccak256(self.paymaster_and_data()),
        };
        let envelope = UserOperationHashEnvelope {
            encodedHash: keccak256(fields.abi_encode()),
            entryPoint: entry_point,
            chainId: U256::from(chain_id),
        };
        keccak256(envelope.abi_encode())
    }
}

impl From<&UserOperation> for PackedUserOperation {
    fn from(op: &UserOperation) -> Self {
        Self {
            sender: op.sender,
            nonce: op.nonce,
            initCode: op.init_code.clone(),
            callData: op.call_data.clone(),
            accountGasLimits: op.gas_limits.pack(),
            preVerificationGas: op.pre_verification_gas,
            gasFees: op.fees.pack(),
            paymasterAndData: op.paymaster_and_data(),
            signature: op.signature.clone(),
        }
    }
}

impl TryFrom<PackedUserOperation> for UserOperation {
    type Error = SponsorError;

    fn try_from(packed: PackedUserOperation) -> Result<Self, Self::Error> {
        Ok(Self {
            sender: packed.sender,
            nonce: packed.nonce,
            init_code: packed.initCode,
            call_data: packed.callData,
            gas_limits: GasLimits::unpack(packed.accountGasLimits),
            pre_verification_gas: packed.preVerificationGas,
            fees: GasFees::unpack(packed.gasFees),
            sponsor: SponsorData::decode(&packed.paymasterAndData)?,
            signature: packed.signature,
        })
    }
}

fn pack_u128_pair(high: u128, low: u128) -> B256 {
    let mut out = [0u8; 32];
    out[..16].copy_from_slice(&high.to_be_bytes());
    out[16..].copy_from_slice(&low.to_be_bytes());
    B256::from(out)
}

fn unpack_u128_pair(packed: B256) -> (u128, u128) {
    (read_u128(&packed[..16]), read_u128(&packed[16..]))
}

fn read_u128(bytes: &[u8]) -> u128 {
    let mut buf = [0u8; 16];
    buf.copy_from_slice(bytes);
    u128::from_be_bytes(buf)
}

fn read_u48(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[2..].copy_from_slice(bytes);
    u64::from_be_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, bytes, hex};

    const ENTRY_POINT: Address = address!("0000000071727De22E5E9d8BAf0edAc6f37da032");

    fn sample_op() -> UserOperation {
        UserOperation {
            sender: address!("1000000000000000000000000000000000000001"),
            nonce: compose_nonce(U192::from(7), 3),
            init_code: Bytes::new(),
            call_data: bytes!("b61d27f6"),
            gas_limits: GasLimits { verification_gas_limit: 150_000, call_gas_limit: 80_000 },
            pre_verification_gas: U256::from(50_000),
            fees: GasFees {
                max_priority_fee_per_gas: 1_000_000_000,
                max_fee_per_gas: 3_000_000_000,
            },
            sponsor: None,
            signature: Bytes::new(),
        }
    }

    #[test]
    fn test_nonce_key_and_sequence() {
        let op = sample_op();
        assert_eq!(op.nonce_key(), U192::from(7));
        assert_eq!(op.nonce_sequence(), 3);
        assert_eq!(op.nonce, (U256::from(7) << 64) + U256::from(3));
        assert_eq!(split_nonce(U256::MAX), (U192::MAX, u64::MAX));
    }

    #[test]
    fn test_gas_limits_pack_verification_high() {
        let limits = GasLimits { verification_gas_limit: 1, call_gas_limit: 2 };
        let packed = limits.pack();
        assert_eq!(packed[15], 1);
        assert_eq!(packed[31], 2);
        assert_eq!(GasLimits::unpack(packed), limits);
    }

    #[test]
    fn test_gas_price_is_capped() {
        let fees = GasFees { max_priority_fee_per_gas: 2, max_fee_per_gas: 10 };
        assert_eq!(fees.gas_price(5), 7);
        assert_eq!(fees.gas_price(9), 10);
    }

    #[test]
    fn test_sponsor_data_layout() {
        let window = ValidityWindow::new(0x0102, 0x0a0b0c);
        let sponsor = SponsorData {
            sponsor: address!("3000000000000000000000000000000000000003"),
            verification_gas_limit: 100_000,
            post_op_gas_limit: 50_000,
            data: window.encode(),
        };
        let encoded = sponsor.encode();
        assert_eq!(encoded.len(), PAYMASTER_DATA_OFFSET + SPONSOR_WINDOW_LEN);
        assert_eq!(&encoded[..20], sponsor.sponsor.as_slice());
        assert_eq!(&encoded[PAYMASTER_DATA_OFFSET..], hex!("0000000001020000000a0b0c"));
        assert_eq!(SponsorData::decode(&encoded), Ok(Some(sponsor)));
        assert_eq!(ValidityWindow::decode(&encoded[PAYMASTER_DATA_OFFSET..]), Some(window));
    }

    #[test]
    fn test_short_paymaster_and_data_is_rejected() {
        assert_eq!(SponsorData::decode(&[]), Ok(None));
        assert_eq!(SponsorData::decode(&[0u8; 51]), Err(SponsorError::MalformedSponsorData));
    }

    #[test]
    fn test_validity_window_bounds() {
        let window = ValidityWindow::new(10, 20);
        assert!(!window.contains(9));
        assert!(window.contains(10));
        assert!(window.contains(20));
        assert!(!window.contains(21));
        assert!(ValidityWindow::new(10, 0).contains(u64::MAX));
        assert!(ValidityWindow::UNBOUNDED.contains(0));
    }

    #[test]
    fn test_required_prefund_covers_all_limits() {
        let mut op = sample_op();
        assert_eq!(op.required_prefund(), U256::from(280_000u64 * 3_000_000_000));
        op.sponsor = Some(SponsorData {
            sponsor: Address::ZERO,
            verification_gas_limit: 10_000,
            post_op_gas_limit: 10_000,
            data: Bytes::new(),
        });
        assert_eq!(op.max_gas(), U256::from(300_000));
    }

    #[test]
    fn test_hash_is_pure_and_ignores_signature() {
        let op = sample_op();
        let hash = op.hash(ENTRY_POINT, 31337);
        assert_eq!(hash, op.clone().hash(ENTRY_POINT, 31337));

        let signed = UserOperation { signature: bytes!("deadbeef"), ..op.clone() };
        assert_eq!(signed.hash(ENTRY_POINT, 31337), hash);
    }

    #[test]
    fn test_hash_binds_every_field() {
        let op = sample_op();
        let hash = op.hash(ENTRY_POINT, 31337);
        let variants = [
            UserOperation { sender: Address::ZERO, ..op.clone() },
            UserOperation { nonce: op.nonce + U256::from(1), ..op.clone() },
            UserOperation { init_code: bytes!("00"), ..op.clone() },
            UserOperation { call_data: Bytes::new(), ..op.clone() },
            UserOperation {
                gas_limits: GasLimits { call_gas_limit: 1, ..op.gas_limits },
                ..op.clone()
            },
            UserOperation { pre_verification_gas: U256::ZERO, ..op.clone() },
            UserOperation { fees: GasFees { max_fee_per_gas: 1, ..op.fees }, ..op.clone() },
            UserOperation { sponsor: Some(SponsorData::default()), ..op.clone() },
        ];
        for variant in variants {
            assert_ne!(variant.hash(ENTRY_POINT, 31337), hash);
        }
        assert_ne!(op.hash(Address::ZERO, 31337), hash);
        assert_ne!(op.hash(ENTRY_POINT, 1), hash);
    }

    #[test]
    fn test_packed_conversion() {
        let op = UserOperation {
            sponsor: Some(SponsorData {
                sponsor: address!("3000000000000000000000000000000000000003"),
                verification_gas_limit: 1,
                post_op_gas_limit: 2,
                data: bytes!("abcd"),
            }),
            ..sample_op()
        };
        let packed = PackedUserOperation::from(&op);
        assert_eq!(packed.paymasterAndData.len(), PAYMASTER_DATA_OFFSET + 2);
        assert_eq!(UserOperation::try_from(packed), Ok(op));
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let json = serde_json::to_value(sample_op()).unwrap();
        assert!(json.get("callData").is_some());
        assert!(json["gasLimits"].get("verificationGasLimit").is_some());
        assert!(json.get("sponsor").is_none());
    }
}
