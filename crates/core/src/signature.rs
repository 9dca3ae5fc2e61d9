//! Aggregated signature content of a block
//!
//! The BN254 pairing check itself lives behind [`AggregationVerifier`]; this
//! module owns the commitment, the hash posted on chain and the format rules.

use std::fmt::Debug;

use rollup_merkle::utils::{bytes32_to_u32_limbs, u32_slice_to_bytes};
use rollup_merkle::{Bytes32, Keccak256Hasher, PoseidonHashOut, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Bytes16, DUMMY_PUBLIC_KEY, NUM_SENDERS_IN_BLOCK, NUM_SENDER_FLAG_BYTES};

/// BN254 G1 point as (x, y)
pub type G1Point = [Bytes32; 2];

/// BN254 G2 point as (x.c0, x.c1, y.c0, y.c1)
pub type G2Point = [Bytes32; 4];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureContent {
    pub is_registration_block: bool,
    pub tx_tree_root: Bytes32,
    /// Bit `i` is set when sender `i` signed
    pub sender_flag: Bytes16,
    pub pubkey_hash: Bytes32,
    /// Zero for registration blocks
    pub account_id_hash: Bytes32,
    pub agg_pubkey: G1Point,
    pub agg_signature: G2Point,
    pub message_point: G2Point,
}

/// Reasons a signature content is malformed
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    #[error("expected {NUM_SENDERS_IN_BLOCK} public keys, got {0}")]
    PublicKeyCount(usize),

    #[error("sender flag is empty")]
    EmptySenderFlag,

    #[error("public key {0} is zero")]
    ZeroPublicKey(usize),

    #[error("public keys are not strictly descending at {0}")]
    NotDescending(usize),
}

impl SignatureContent {
    fn to_u32_vec(&self) -> Vec<u32> {
        let mut words = Vec::with_capacity(1 + 8 + 4 + 8 + 8 + 16 + 32 + 32);
        words.push(u32::from(self.is_registration_block));
        words.extend(bytes32_to_u32_limbs(&self.tx_tree_root));
        words.extend(
            self.sender_flag
                .chunks_exact(4)
                .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]])),
        );
        words.extend(bytes32_to_u32_limbs(&self.pubkey_hash));
        words.extend(bytes32_to_u32_limbs(&self.account_id_hash));
        for coordinate in self.agg_pubkey.iter().chain(&self.agg_signature).chain(&self.message_point) {
            words.extend(bytes32_to_u32_limbs(coordinate));
        }
        words
    }

    /// Poseidon commitment used inside the circuit
    pub fn commitment(&self) -> PoseidonHashOut {
        PoseidonHashOut::hash_inputs_u32(&self.to_u32_vec())
    }

    /// Hash posted on chain as `signatureHash`
    pub fn hash(&self) -> Bytes32 {
        Keccak256Hasher::hash(&u32_slice_to_bytes(&self.to_u32_vec()))
    }

    /// Check sender count, flag and ordering. Real keys must be strictly
    /// descending; dummy keys may only repeat at the tail.
    pub fn is_valid_format(&self, public_keys: &[U256]) -> Result<(), FormatError> {
        if public_keys.len() != NUM_SENDERS_IN_BLOCK {
            return Err(FormatError::PublicKeyCount(public_keys.len()));
        }
        if self.sender_flag.is_zero() {
            return Err(FormatError::EmptySenderFlag);
        }
        if let Some(i) = public_keys.iter().position(|k| k.is_zero()) {
            return Err(FormatError::ZeroPublicKey(i));
        }
        for (i, pair) in public_keys.windows(2).enumerate() {
            let descending = pair[0] > pair[1] || (pair[0] == DUMMY_PUBLIC_KEY && pair[1] == DUMMY_PUBLIC_KEY);
            if !descending {
                return Err(FormatError::NotDescending(i + 1));
            }
        }
        Ok(())
    }
}

/// BN254 aggregated signature check
pub trait AggregationVerifier: Debug + Send + Sync {
    /// Whether `signature` verifies against the weighted aggregate of the
    /// signed subset of `public_keys`
    fn verify_aggregation(&self, signature: &SignatureContent, public_keys: &[U256]) -> bool;
}

/// Accepts every aggregate. For nodes that rely on the contract having
/// checked the signature at post time.
#[derive(Clone, Copy, Debug, Default)]
pub struct PermissiveVerifier;

impl AggregationVerifier for PermissiveVerifier {
    fn verify_aggregation(&self, _signature: &SignatureContent, _public_keys: &[U256]) -> bool {
        true
    }
}

/// keccak of the 128 public keys, padded with the dummy key
pub fn pubkey_hash(public_keys: &[U256]) -> Bytes32 {
    let mut bytes = Vec::with_capacity(NUM_SENDERS_IN_BLOCK * 32);
    for i in 0..NUM_SENDERS_IN_BLOCK {
        let key = public_keys.get(i).unwrap_or(&DUMMY_PUBLIC_KEY);
        bytes.extend_from_slice(&key.to_be_bytes::<32>());
    }
    Keccak256Hasher::hash(&bytes)
}

/// Bit `index` of the sender flag, most significant bit of byte 0 first
pub fn sender_flag_bit(flag: &Bytes16, index: usize) -> bool {
    index < NUM_SENDER_FLAG_BYTES * 8 && flag[index / 8] & (1 << (7 - index % 8)) != 0
}

/// Inverse of [`sender_flag_bit`]. Bits past 128 are ignored.
pub fn sender_flag_from_bits(bits: &[bool]) -> Bytes16 {
    let mut flag = [0u8; NUM_SENDER_FLAG_BYTES];
    for (i, bit) in bits.iter().take(NUM_SENDER_FLAG_BYTES * 8).enumerate() {
        if *bit {
            flag[i / 8] |= 1 << (7 - i % 8);
        }
    }
    Bytes16::from(flag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(head: &[u64]) -> Vec<U256> {
        let mut keys: Vec<U256> = head.iter().map(|k| U256::from(*k)).collect();
        keys.resize(NUM_SENDERS_IN_BLOCK, DUMMY_PUBLIC_KEY);
        keys
    }

    fn signed_first() -> SignatureContent {
        SignatureContent { sender_flag: sender_flag_from_bits(&[true]), ..Default::default() }
    }

    #[test]
    fn test_flag_bits() {
        let flag = sender_flag_from_bits(&[true, false, true, false, false, false, false, false, true]);
        assert_eq!(flag[0], 0b1010_0000);
        assert_eq!(flag[1], 0b1000_0000);
        assert!(sender_flag_bit(&flag, 8));
        assert!(!sender_flag_bit(&flag, 9));
        assert!(!sender_flag_bit(&flag, 500));
    }

    #[test]
    fn test_format_rules() {
        let signature = signed_first();
        signature.is_valid_format(&keys(&[90, 50, 7])).unwrap();

        assert_eq!(signature.is_valid_format(&keys(&[50, 90])), Err(FormatError::NotDescending(1)));
        assert_eq!(signature.is_valid_format(&keys(&[50, 50])), Err(FormatError::NotDescending(1)));
        assert_eq!(signature.is_valid_format(&keys(&[50, 0])), Err(FormatError::ZeroPublicKey(1)));
        assert_eq!(signature.is_valid_format(&keys(&[50])[..5]), Err(FormatError::PublicKeyCount(5)));

        let unsigned = SignatureContent::default();
        assert_eq!(unsigned.is_valid_format(&keys(&[50])), Err(FormatError::EmptySenderFlag));
    }

    #[test]
    fn test_hash_and_commitment_cover_every_field() {
        let a = signed_first();
        let b = SignatureContent { message_point: [Bytes32::repeat_byte(1); 4], ..a.clone() };
        assert_ne!(a.hash(), b.hash());
        assert_ne!(a.commitment(), b.commitment());
        assert_eq!(a.to_u32_vec().len(), 109);
    }

    #[test]
    fn test_pubkey_hash_pads_with_dummy() {
        assert_eq!(pubkey_hash(&[U256::from(5u64)]), pubkey_hash(&keys(&[5])));
    }
}
