//! Poseidon hash output over the Goldilocks field
//!
//! Every internal node of a Poseidon tree is a `PoseidonHashOut`. Leaves are
//! hashed with the no-padding sponge, internal nodes with the two-to-one
//! permutation compression.

use std::fmt;
use std::str::FromStr;

use plonky2::field::types::{Field, PrimeField64};
use plonky2::hash::hash_types::HashOut;
use plonky2::hash::poseidon::PoseidonHash;
use plonky2::plonk::config::Hasher as PlonkyHasher;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use plonky2::field::goldilocks_field::GoldilocksField;

use crate::error::MerkleError;
use crate::hasher::{Hasher, Leafable};

type F = GoldilocksField;

/// Number of field elements in a hash output
pub const NUM_HASH_OUT_ELTS: usize = 4;

/// Goldilocks prime 2^64 - 2^32 + 1
const GOLDILOCKS_ORDER: u64 = 0xFFFF_FFFF_0000_0001;

/// 4 canonical Goldilocks elements
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoseidonHashOut {
    pub elements: [u64; NUM_HASH_OUT_ELTS],
}

impl PoseidonHashOut {
    /// Build from elements that are already reduced
    pub fn from_elements(elements: [u64; NUM_HASH_OUT_ELTS]) -> Result<Self, MerkleError> {
        if let Some(e) = elements.iter().find(|e| **e >= GOLDILOCKS_ORDER) {
            return Err(MerkleError::NonCanonicalElement(*e));
        }
        Ok(Self { elements })
    }

    /// Sponge hash without padding
    pub fn hash_no_pad(inputs: &[F]) -> Self {
        Self::from(PoseidonHash::hash_no_pad(inputs))
    }

    /// Hash a sequence of `u64`, each reduced into the field
    pub fn hash_inputs_u64(inputs: &[u64]) -> Self {
        let inputs: Vec<F> = inputs.iter().map(|x| F::from_noncanonical_u64(*x)).collect();
        Self::hash_no_pad(&inputs)
    }

    /// Hash a sequence of `u32` limbs
    pub fn hash_inputs_u32(inputs: &[u32]) -> Self {
        let inputs: Vec<F> = inputs.iter().map(|x| F::from_canonical_u32(*x)).collect();
        Self::hash_no_pad(&inputs)
    }

    /// Compress two hash outputs into one
    pub fn two_to_one(left: &Self, right: &Self) -> Self {
        Self::from(PoseidonHash::two_to_one((*left).into(), (*right).into()))
    }

    /// 32 bytes, 4 big-endian 8-byte elements
    pub fn to_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (chunk, e) in bytes.chunks_exact_mut(8).zip(self.elements.iter()) {
            chunk.copy_from_slice(&e.to_be_bytes());
        }
        bytes
    }

    /// Inverse of [`Self::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MerkleError> {
        if bytes.len() != 32 {
            return Err(MerkleError::InvalidLength(bytes.len()));
        }
        let mut elements = [0u64; NUM_HASH_OUT_ELTS];
        for (e, chunk) in elements.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            *e = u64::from_be_bytes(buf);
        }
        Self::from_elements(elements)
    }

    /// Each element split into its high and low 32 bits
    pub fn to_u32_limbs(&self) -> [u32; 8] {
        let mut limbs = [0u32; 8];
        for (i, e) in self.elements.iter().enumerate() {
            limbs[2 * i] = (e >> 32) as u32;
            limbs[2 * i + 1] = *e as u32;
        }
        limbs
    }

    /// Field element view
    pub fn to_field_elements(&self) -> [F; NUM_HASH_OUT_ELTS] {
        self.elements.map(F::from_canonical_u64)
    }
}

impl From<HashOut<F>> for PoseidonHashOut {
    fn from(value: HashOut<F>) -> Self {
        Self { elements: value.elements.map(|e| e.to_canonical_u64()) }
    }
}

impl From<PoseidonHashOut> for HashOut<F> {
    fn from(value: PoseidonHashOut) -> Self {
        Self { elements: value.to_field_elements() }
    }
}

impl fmt::Display for PoseidonHashOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.to_bytes()))
    }
}

impl FromStr for PoseidonHashOut {
    type Err = MerkleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").ok_or(MerkleError::MissingHexPrefix)?;
        Self::from_bytes(&hex::decode(s)?)
    }
}

impl Serialize for PoseidonHashOut {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PoseidonHashOut {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A hash output stored directly as a leaf
impl Leafable for PoseidonHashOut {
    type LeafHasher = PoseidonHasher;

    fn empty_leaf() -> Self {
        Self::default()
    }

    fn hash(&self) -> Self {
        *self
    }
}

/// Poseidon two-to-one node hasher
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoseidonHasher;

impl Hasher for PoseidonHasher {
    type Digest = PoseidonHashOut;

    fn two_to_one(left: &PoseidonHashOut, right: &PoseidonHashOut) -> PoseidonHashOut {
        PoseidonHashOut::two_to_one(left, right)
    }
}
