//! Account ids packed 5 bytes each, as posted in non-registration calldata

use std::fmt;

use rollup_merkle::{Bytes32, Keccak256Hasher};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::WitnessError;
use crate::types::{AccountId, ACCOUNT_ID_BITS, DUMMY_ACCOUNT_ID, NUM_SENDERS_IN_BLOCK};

const ACCOUNT_ID_BYTES: usize = ACCOUNT_ID_BITS / 8;

/// Total packed length
pub const ACCOUNT_ID_PACKED_BYTES: usize = NUM_SENDERS_IN_BLOCK * ACCOUNT_ID_BYTES;

/// 128 big-endian 40-bit account ids
#[derive(Clone, PartialEq, Eq)]
pub struct AccountIdPacked {
    bytes: Vec<u8>,
}

impl AccountIdPacked {
    /// Pack up to 128 ids, padding with the dummy account id
    pub fn pack(account_ids: &[AccountId]) -> Result<Self, WitnessError> {
        if account_ids.len() > NUM_SENDERS_IN_BLOCK {
            return Err(WitnessError::TooManySenders(account_ids.len()));
        }

        let mut bytes = Vec::with_capacity(ACCOUNT_ID_PACKED_BYTES);
        let padding = std::iter::repeat(&DUMMY_ACCOUNT_ID).take(NUM_SENDERS_IN_BLOCK - account_ids.len());
        for id in account_ids.iter().chain(padding) {
            if *id >> ACCOUNT_ID_BITS != 0 {
                return Err(WitnessError::AccountIdOutOfRange(*id));
            }
            bytes.extend_from_slice(&id.to_be_bytes()[8 - ACCOUNT_ID_BYTES..]);
        }

        Ok(Self { bytes })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WitnessError> {
        if bytes.len() != ACCOUNT_ID_PACKED_BYTES {
            return Err(WitnessError::LengthMismatch {
                what: "packed account id bytes",
                expected: ACCOUNT_ID_PACKED_BYTES,
                actual: bytes.len(),
            });
        }
        Ok(Self { bytes: bytes.to_vec() })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn unpack(&self) -> Vec<AccountId> {
        self.bytes
            .chunks_exact(ACCOUNT_ID_BYTES)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf[8 - ACCOUNT_ID_BYTES..].copy_from_slice(chunk);
                u64::from_be_bytes(buf)
            })
            .collect()
    }

    /// keccak of the packed bytes, committed as `accountIdHash`
    pub fn hash(&self) -> Bytes32 {
        Keccak256Hasher::hash(&self.bytes)
    }
}

impl fmt::Debug for AccountIdPacked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccountIdPacked").field(&self.unpack()).finish()
    }
}

impl Serialize for AccountIdPacked {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(&self.bytes)))
    }
}

impl<'de> Deserialize<'de> for AccountIdPacked {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let stripped = s
            .strip_prefix("0x")
            .ok_or_else(|| serde::de::Error::custom("packed account ids must start with 0x"))?;
        let bytes = hex::decode(stripped).map_err(serde::de::Error::custom)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}
