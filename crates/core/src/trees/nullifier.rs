//! Nullifier tree
//!
//! A nullifier is spent once it is a key of this tree. Insertion takes
//! `&mut self`, so a wallet that owns its tree serializes spends by
//! construction.

use rollup_merkle::{
    Bytes32, IndexedInsertionProof, IndexedMembershipProof, IndexedMerkleTree, MerkleError, PoseidonHashOut, U256,
};

use crate::types::NULLIFIER_TREE_HEIGHT;

/// Indexed tree of spent nullifiers
#[derive(Clone, Debug)]
pub struct NullifierTree {
    inner: IndexedMerkleTree,
}

impl Default for NullifierTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NullifierTree {
    pub fn new() -> Self {
        Self { inner: IndexedMerkleTree::new(NULLIFIER_TREE_HEIGHT) }
    }

    pub fn root(&self) -> PoseidonHashOut {
        self.inner.root()
    }

    /// Number of leaves, including the reserved leaf
    pub fn len(&self) -> u64 {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains(&self, nullifier: &Bytes32) -> bool {
        self.inner.get_index(Self::key(nullifier)).is_some()
    }

    /// Spend `nullifier`, failing with `KeyAlreadyExists` on a double spend
    pub fn prove_and_insert(&mut self, nullifier: &Bytes32) -> Result<IndexedInsertionProof, MerkleError> {
        self.inner.insert(Self::key(nullifier), 0)
    }

    pub fn prove_membership(&self, nullifier: &Bytes32) -> Result<IndexedMembershipProof, MerkleError> {
        self.inner.prove_membership(Self::key(nullifier))
    }

    fn key(nullifier: &Bytes32) -> U256 {
        U256::from_be_bytes(nullifier.0)
    }
}
