//! Common types and protocol constants

use std::fmt;

use alloy_primitives::{Address, B128};
use rollup_merkle::utils::u256_to_u32_limbs;
use rollup_merkle::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Rollup block number
pub type BlockNumber = u32;

/// Index of a leaf in the account tree
pub type AccountId = u64;

/// 16-byte sender flag, one bit per sender slot
pub type Bytes16 = B128;

pub const ACCOUNT_TREE_HEIGHT: usize = 40;
pub const NULLIFIER_TREE_HEIGHT: usize = 32;
pub const ASSET_TREE_HEIGHT: usize = 32;
pub const BLOCK_HASH_TREE_HEIGHT: usize = 32;
pub const DEPOSIT_TREE_HEIGHT: usize = 32;
pub const TX_TREE_HEIGHT: usize = 7;
pub const TRANSFER_TREE_HEIGHT: usize = 6;

/// Sender slots in every block
pub const NUM_SENDERS_IN_BLOCK: usize = 128;

/// Bytes of the sender flag, one bit per slot
pub const NUM_SENDER_FLAG_BYTES: usize = NUM_SENDERS_IN_BLOCK / 8;

/// Sender tree has exactly one leaf per slot
pub const SENDER_TREE_HEIGHT: usize = 7;

/// Width of an account id inside packed account ids
pub const ACCOUNT_ID_BITS: usize = 40;

/// Public key used to pad sender slots
pub const DUMMY_PUBLIC_KEY: U256 = U256::from_limbs([1, 0, 0, 0]);

/// Account id of [`DUMMY_PUBLIC_KEY`], inserted when the account tree is created
pub const DUMMY_ACCOUNT_ID: AccountId = 1;

/// Sender slot of a block
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sender {
    /// A registered or registering public key
    Real(U256),
    /// Padding slot
    Dummy,
}

impl Sender {
    /// Classify a raw public key
    pub fn from_public_key(public_key: U256) -> Self {
        if public_key == DUMMY_PUBLIC_KEY {
            Self::Dummy
        } else {
            Self::Real(public_key)
        }
    }

    /// Public key committed for this slot
    pub const fn public_key(&self) -> U256 {
        match self {
            Self::Real(key) => *key,
            Self::Dummy => DUMMY_PUBLIC_KEY,
        }
    }

    pub const fn is_dummy(&self) -> bool {
        matches!(self, Self::Dummy)
    }
}

impl From<U256> for Sender {
    fn from(public_key: U256) -> Self {
        Self::from_public_key(public_key)
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.public_key())
    }
}

impl Serialize for Sender {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.public_key())
    }
}

impl<'de> Deserialize<'de> for Sender {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let key = s.parse::<U256>().map_err(serde::de::Error::custom)?;
        Ok(Self::from_public_key(key))
    }
}

/// Recipient of a transfer: an L1 address or a rollup public key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "typeOfAddress", content = "address", rename_all = "camelCase")]
pub enum GenericAddress {
    Ethereum(Address),
    Intmax(U256),
}

impl Default for GenericAddress {
    fn default() -> Self {
        Self::Ethereum(Address::ZERO)
    }
}

impl GenericAddress {
    pub const fn is_pubkey(&self) -> bool {
        matches!(self, Self::Intmax(_))
    }

    /// Address left-padded to 32 bytes, as 8 big-endian limbs
    pub fn to_u32_limbs(&self) -> [u32; 8] {
        match self {
            Self::Ethereum(address) => u256_to_u32_limbs(&U256::from_be_slice(address.as_slice())),
            Self::Intmax(key) => u256_to_u32_limbs(key),
        }
    }
}
