//! Sparse Merkle tree of fixed height
//!
//! Nodes are addressed by their heap index: the root is node 1 and the leaf at
//! `index` is node `2^height + index`. Only written nodes are stored; every
//! other node falls back to the zero hash of its level.

use std::collections::HashMap;

use crate::error::MerkleError;
use crate::hasher::Hasher;
use crate::proof::MerkleProof;
use crate::MAX_TREE_HEIGHT;

/// Sparse Merkle tree over node digests
#[derive(Clone, Debug)]
pub struct MerkleTree<H: Hasher> {
    height: usize,
    /// Written nodes: heap index -> hash
    node_hashes: HashMap<u64, H::Digest>,
    /// `zero_hashes[h]` is the root of an empty subtree of height `h`
    zero_hashes: Vec<H::Digest>,
}

impl<H: Hasher> MerkleTree<H> {
    /// Create an empty tree whose unwritten leaves hash to `empty_leaf_hash`
    pub fn new(height: usize, empty_leaf_hash: H::Digest) -> Self {
        assert!(height <= MAX_TREE_HEIGHT, "tree height {height} exceeds {MAX_TREE_HEIGHT}");

        Self {
            height,
            node_hashes: HashMap::new(),
            zero_hashes: zero_hashes::<H>(height, empty_leaf_hash),
        }
    }

    /// Tree height (number of sibling levels)
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of leaf slots
    pub fn capacity(&self) -> u64 {
        1u64 << self.height
    }

    /// Zero hash for every level, leaf level first
    pub fn zero_hashes(&self) -> &[H::Digest] {
        &self.zero_hashes
    }

    /// Get the root hash
    pub fn root(&self) -> H::Digest {
        self.node_hash(1)
    }

    /// Hash of the node at `level` (0 = leaves) and position `index` in that level
    pub fn node_hash_at(&self, level: usize, index: u64) -> H::Digest {
        self.node_hash((1u64 << (self.height - level)) + index)
    }

    /// Hash of the leaf at `index`
    pub fn leaf_hash(&self, index: u64) -> Result<H::Digest, MerkleError> {
        self.check_index(index)?;
        Ok(self.node_hash_at(0, index))
    }

    /// Write a leaf hash and propagate it to the root
    pub fn update_leaf(&mut self, index: u64, leaf_hash: H::Digest) -> Result<H::Digest, MerkleError> {
        self.check_index(index)?;

        let mut node = self.capacity() + index;
        let mut current = leaf_hash;
        self.node_hashes.insert(node, current);

        while node > 1 {
            let sibling = self.node_hash(node ^ 1);
            current = if node & 1 == 1 {
                H::two_to_one(&sibling, &current)
            } else {
                H::two_to_one(&current, &sibling)
            };
            node >>= 1;
            self.node_hashes.insert(node, current);
        }

        Ok(current)
    }

    /// Sibling path of the leaf at `index`, leaf level first
    pub fn prove(&self, index: u64) -> Result<MerkleProof<H>, MerkleError> {
        self.check_index(index)?;

        let mut node = self.capacity() + index;
        let mut siblings = Vec::with_capacity(self.height);
        while node > 1 {
            siblings.push(self.node_hash(node ^ 1));
            node >>= 1;
        }

        Ok(MerkleProof { siblings })
    }

    fn node_hash(&self, node: u64) -> H::Digest {
        debug_assert!(node > 0);
        match self.node_hashes.get(&node) {
            Some(hash) => *hash,
            None => {
                // depth of node below the root
                let depth = (u64::BITS - 1 - node.leading_zeros()) as usize;
                self.zero_hashes[self.height - depth]
            }
        }
    }

    fn check_index(&self, index: u64) -> Result<(), MerkleError> {
        if index >= self.capacity() {
            return Err(MerkleError::IndexOutOfRange { index, capacity: self.capacity() });
        }
        Ok(())
    }
}

/// Roots of empty subtrees of height `0..=height`
pub(crate) fn zero_hashes<H: Hasher>(height: usize, empty_leaf_hash: H::Digest) -> Vec<H::Digest> {
    let mut hashes = Vec::with_capacity(height + 1);
    hashes.push(empty_leaf_hash);
    for h in 0..height {
        let child = hashes[h];
        hashes.push(H::two_to_one(&child, &child));
    }
    hashes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Keccak256Hasher;
    use crate::poseidon::{PoseidonHashOut, PoseidonHasher};
    use alloy_primitives::B256;

    fn leaf(i: u64) -> PoseidonHashOut {
        PoseidonHashOut::hash_inputs_u64(&[i])
    }

    #[test]
    fn test_empty_root_is_top_zero_hash() {
        let tree = MerkleTree::<PoseidonHasher>::new(10, PoseidonHashOut::default());
        assert_eq!(tree.root(), tree.zero_hashes()[10]);
        assert_eq!(tree.zero_hashes().len(), 11);
    }

    #[test]
    fn test_update_and_prove() {
        let mut tree = MerkleTree::<PoseidonHasher>::new(5, PoseidonHashOut::default());
        for i in [0u64, 3, 17, 31] {
            tree.update_leaf(i, leaf(i)).unwrap();
        }
        let root = tree.root();

        for i in [0u64, 3, 17, 31] {
            let proof = tree.prove(i).unwrap();
            assert_eq!(proof.siblings.len(), 5);
            proof.verify_hash(&leaf(i), i, &root).unwrap();
        }

        // unwritten slot proves the empty leaf
        let proof = tree.prove(4).unwrap();
        proof.verify_hash(&PoseidonHashOut::default(), 4, &root).unwrap();
    }

    #[test]
    fn test_overwrite_changes_root() {
        let mut tree = MerkleTree::<Keccak256Hasher>::new(4, B256::ZERO);
        let first = tree.update_leaf(2, B256::repeat_byte(1)).unwrap();
        let second = tree.update_leaf(2, B256::repeat_byte(2)).unwrap();
        assert_ne!(first, second);
        assert_eq!(tree.leaf_hash(2).unwrap(), B256::repeat_byte(2));
    }

    #[test]
    fn test_out_of_range() {
        let mut tree = MerkleTree::<PoseidonHasher>::new(3, PoseidonHashOut::default());
        assert_eq!(
            tree.update_leaf(8, leaf(8)),
            Err(MerkleError::IndexOutOfRange { index: 8, capacity: 8 })
        );
        assert!(tree.prove(8).is_err());
    }

    #[test]
    fn test_height_zero_tree() {
        let mut tree = MerkleTree::<PoseidonHasher>::new(0, PoseidonHashOut::default());
        let root = tree.update_leaf(0, leaf(1)).unwrap();
        assert_eq!(root, leaf(1));
        assert!(tree.prove(0).unwrap().siblings.is_empty());
    }
}
