//! Limb conversions and serde helpers

use alloy_primitives::{B256, U256};

/// 8 big-endian `u32` limbs of a 256-bit integer
pub fn u256_to_u32_limbs(value: &U256) -> [u32; 8] {
    bytes_to_u32_limbs(&value.to_be_bytes::<32>())
}

/// 8 big-endian `u32` limbs of 32 bytes
pub fn bytes32_to_u32_limbs(value: &B256) -> [u32; 8] {
    bytes_to_u32_limbs(&value.0)
}

/// Inverse of [`bytes32_to_u32_limbs`]
pub fn u32_limbs_to_bytes32(limbs: &[u32; 8]) -> B256 {
    let mut bytes = [0u8; 32];
    for (chunk, limb) in bytes.chunks_exact_mut(4).zip(limbs.iter()) {
        chunk.copy_from_slice(&limb.to_be_bytes());
    }
    B256::from(bytes)
}

/// Flatten `u32` words to big-endian bytes
pub fn u32_slice_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

fn bytes_to_u32_limbs(bytes: &[u8; 32]) -> [u32; 8] {
    let mut limbs = [0u32; 8];
    for (limb, chunk) in limbs.iter_mut().zip(bytes.chunks_exact(4)) {
        *limb = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    limbs
}

/// Serialize a `U256` as a decimal string
pub mod u256_decimal {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize
    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    /// Deserialize, accepting decimal or `0x` hex
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<U256>().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_limbs_are_big_endian() {
        let value = U256::from(0x1_0000_0002u64);
        assert_eq!(u256_to_u32_limbs(&value), [0, 0, 0, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_bytes32_limb_roundtrip() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        bytes[31] = 0x01;
        let b = B256::from(bytes);
        let limbs = bytes32_to_u32_limbs(&b);
        assert_eq!(limbs[0], 0xab00_0000);
        assert_eq!(limbs[7], 1);
        assert_eq!(u32_limbs_to_bytes32(&limbs), b);
        assert_eq!(u32_slice_to_bytes(&limbs), bytes.to_vec());
    }
}
