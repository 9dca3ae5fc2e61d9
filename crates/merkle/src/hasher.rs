//! Node hashers and the leaf encoding seam shared by every tree

use std::fmt::Debug;

use alloy_primitives::B256;
use serde::{de::DeserializeOwned, Serialize};
use tiny_keccak::{Hasher as _, Keccak};

/// Two-to-one compression used to build internal Merkle nodes
pub trait Hasher: Clone + Debug + PartialEq + Send + Sync + 'static {
    /// Node digest type
    type Digest: Copy + Default + Eq + Debug + Serialize + DeserializeOwned + Send + Sync;

    /// Combine a left and a right child into their parent
    fn two_to_one(left: &Self::Digest, right: &Self::Digest) -> Self::Digest;
}

/// A value that can be stored in a Merkle tree leaf
pub trait Leafable: Clone + Debug {
    /// Hasher of the tree this leaf lives in
    type LeafHasher: Hasher;

    /// The leaf occupying every slot that has not been written
    fn empty_leaf() -> Self;

    /// Leaf hash committed at the bottom level
    fn hash(&self) -> LeafDigest<Self>;
}

/// Digest type of the tree a leaf belongs to
pub type LeafDigest<V> = <<V as Leafable>::LeafHasher as Hasher>::Digest;

/// Keccak256 hasher
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Keccak256Hasher;

impl Keccak256Hasher {
    /// Hash two 32-byte values together
    pub fn hash_pair(left: &B256, right: &B256) -> B256 {
        let mut hasher = Keccak::v256();
        hasher.update(left.as_slice());
        hasher.update(right.as_slice());
        let mut output = [0u8; 32];
        hasher.finalize(&mut output);
        B256::from(output)
    }

    /// Hash a single value
    pub fn hash(data: &[u8]) -> B256 {
        let mut hasher = Keccak::v256();
        hasher.update(data);
        let mut output = [0u8; 32];
        hasher.finalize(&mut output);
        B256::from(output)
    }
}

impl Hasher for Keccak256Hasher {
    type Digest = B256;

    fn two_to_one(left: &B256, right: &B256) -> B256 {
        Self::hash_pair(left, right)
    }
}
