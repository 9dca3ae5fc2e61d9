//! Merkle proof generation and verification

use serde::{Deserialize, Serialize};

use crate::error::MerkleError;
use crate::hasher::{Hasher, Leafable};

/// Sibling path from a leaf to the root
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct MerkleProof<H: Hasher> {
    /// Sibling hashes, leaf level first
    pub siblings: Vec<H::Digest>,
}

impl<H: Hasher> MerkleProof<H> {
    /// Proof whose siblings are all the default digest
    pub fn dummy(height: usize) -> Self {
        Self { siblings: vec![H::Digest::default(); height] }
    }

    /// Whether this is a [`Self::dummy`] proof
    pub fn is_dummy(&self) -> bool {
        self.siblings.iter().all(|s| *s == H::Digest::default())
    }

    /// Height of the tree this proof belongs to
    pub fn height(&self) -> usize {
        self.siblings.len()
    }

    /// Compute root from a leaf hash at `index`
    pub fn get_root_from_hash(&self, leaf_hash: &H::Digest, index: u64) -> H::Digest {
        let mut current = *leaf_hash;
        for (level, sibling) in self.siblings.iter().enumerate() {
            current = if (index >> level) & 1 == 1 {
                H::two_to_one(sibling, &current)
            } else {
                H::two_to_one(&current, sibling)
            };
        }
        current
    }

    /// Verify a leaf hash at `index` against `root`
    pub fn verify_hash(&self, leaf_hash: &H::Digest, index: u64, root: &H::Digest) -> Result<(), MerkleError> {
        if self.get_root_from_hash(leaf_hash, index) != *root {
            return Err(MerkleError::InvalidRoot);
        }
        Ok(())
    }

    /// Compute root from a leaf
    pub fn get_root<V>(&self, leaf: &V, index: u64) -> H::Digest
    where
        V: Leafable<LeafHasher = H>,
    {
        self.get_root_from_hash(&leaf.hash(), index)
    }

    /// Verify a leaf at `index` against `root`
    pub fn verify<V>(&self, leaf: &V, index: u64, root: &H::Digest) -> Result<(), MerkleError>
    where
        V: Leafable<LeafHasher = H>,
    {
        self.verify_hash(&leaf.hash(), index, root)
    }
}
