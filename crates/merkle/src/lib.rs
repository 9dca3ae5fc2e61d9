//! Merkle tree engine for the rollup state commitments
//!
//! This crate provides the hash primitives and the generic trees every
//! specialized rollup tree is built on:
//! - `PoseidonHashOut`: 4 Goldilocks elements, the node type of Poseidon trees
//! - `MerkleTree`: sparse node-map tree of fixed height
//! - `IncrementalMerkleTree`: append-only tree with an O(height) sibling cache
//! - `IndexedMerkleTree`: sorted linked-list leaves with non-membership proofs

mod error;
mod hasher;
mod incremental;
mod indexed;
mod poseidon;
mod proof;
mod tree;
pub mod utils;

pub use error::MerkleError;
pub use hasher::{Hasher, Keccak256Hasher, LeafDigest, Leafable};
pub use incremental::IncrementalMerkleTree;
pub use indexed::{
    IndexedInsertionProof, IndexedMembershipProof, IndexedMerkleLeaf, IndexedMerkleProof,
    IndexedMerkleTree, IndexedUpdateProof,
};
pub use poseidon::{GoldilocksField, PoseidonHashOut, PoseidonHasher, NUM_HASH_OUT_ELTS};
pub use proof::MerkleProof;
pub use tree::MerkleTree;

pub use alloy_primitives::{B256 as Bytes32, U256};

/// Maximum supported tree height. Node indices are `u64` with the root at 1.
pub const MAX_TREE_HEIGHT: usize = 63;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_poseidon_tree_roots_agree() {
        let sparse = MerkleTree::<PoseidonHasher>::new(8, PoseidonHashOut::default());
        let incremental = IncrementalMerkleTree::<PoseidonHashOut>::new(8);
        assert_eq!(sparse.root(), incremental.root());
    }

    #[test]
    fn test_insert_and_prove_membership() {
        let mut tree = IndexedMerkleTree::new(16);

        let key = U256::from(42u64);
        tree.insert(key, 7).unwrap();

        let root = tree.root();
        let proof = tree.prove_membership(key).unwrap();
        assert!(proof.is_included);
        proof.verify(key, &root).unwrap();
    }
}
