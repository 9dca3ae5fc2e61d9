//! Indexed Merkle tree
//!
//! Leaves form a linked list sorted by key. Leaf 0 is the reserved empty leaf
//! with key 0, and the list ends at the leaf whose `next_key` is 0. Every key
//! that is not in the tree falls strictly between the key and `next_key` of
//! exactly one leaf (its low leaf), which is what makes non-membership
//! provable.

use std::collections::BTreeMap;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::MerkleError;
use crate::hasher::Leafable;
use crate::incremental::IncrementalMerkleTree;
use crate::poseidon::{PoseidonHashOut, PoseidonHasher};
use crate::proof::MerkleProof;
use crate::utils::{u256_decimal, u256_to_u32_limbs};

/// Merkle proof of an indexed tree leaf
pub type IndexedMerkleProof = MerkleProof<PoseidonHasher>;

/// One node of the sorted linked list
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedMerkleLeaf {
    pub next_index: u64,
    #[serde(with = "u256_decimal")]
    pub key: U256,
    #[serde(with = "u256_decimal")]
    pub next_key: U256,
    pub value: u64,
}

impl IndexedMerkleLeaf {
    /// Whether `key` is strictly above this leaf's key and below its successor
    fn strictly_bounds(&self, key: U256) -> bool {
        self.key < key && (self.next_key.is_zero() || key < self.next_key)
    }
}

impl Leafable for IndexedMerkleLeaf {
    type LeafHasher = PoseidonHasher;

    fn empty_leaf() -> Self {
        Self::default()
    }

    fn hash(&self) -> PoseidonHashOut {
        let mut inputs = Vec::with_capacity(18);
        inputs.push(self.next_index);
        inputs.extend(u256_to_u32_limbs(&self.key).map(u64::from));
        inputs.extend(u256_to_u32_limbs(&self.next_key).map(u64::from));
        inputs.push(self.value);
        PoseidonHashOut::hash_inputs_u64(&inputs)
    }
}

/// Proof that a new key was linked in after its low leaf
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedInsertionProof {
    /// Index the new leaf was written to
    pub index: u64,
    pub low_leaf_proof: IndexedMerkleProof,
    pub leaf_proof: IndexedMerkleProof,
    pub low_leaf_index: u64,
    /// Low leaf before its pointer was rewritten
    pub prev_low_leaf: IndexedMerkleLeaf,
}

impl IndexedInsertionProof {
    /// Structurally valid proof that never changes a root when used
    /// conditionally
    pub fn dummy(height: usize) -> Self {
        Self {
            index: 0,
            low_leaf_proof: IndexedMerkleProof::dummy(height),
            leaf_proof: IndexedMerkleProof::dummy(height),
            low_leaf_index: 0,
            prev_low_leaf: IndexedMerkleLeaf::default(),
        }
    }

    /// Whether this is a [`Self::dummy`] proof
    pub fn is_dummy(&self) -> bool {
        self.low_leaf_proof.is_dummy() && self.leaf_proof.is_dummy()
    }

    /// Root after inserting `key` with `value` into the tree at `prev_root`
    pub fn get_new_root(
        &self,
        key: U256,
        value: u64,
        prev_root: &PoseidonHashOut,
    ) -> Result<PoseidonHashOut, MerkleError> {
        if self.prev_low_leaf.key >= key {
            return Err(MerkleError::KeyNotLowerBounded);
        }
        if !self.prev_low_leaf.next_key.is_zero() && key >= self.prev_low_leaf.next_key {
            return Err(MerkleError::KeyNotUpperBounded);
        }

        self.low_leaf_proof
            .verify(&self.prev_low_leaf, self.low_leaf_index, prev_root)
            .map_err(|_| MerkleError::InvalidPrevRoot)?;

        let new_low_leaf = IndexedMerkleLeaf {
            next_index: self.index,
            next_key: key,
            ..self.prev_low_leaf.clone()
        };
        let root_after_low_leaf = self.low_leaf_proof.get_root(&new_low_leaf, self.low_leaf_index);

        self.leaf_proof
            .verify(&IndexedMerkleLeaf::empty_leaf(), self.index, &root_after_low_leaf)
            .map_err(|_| MerkleError::InvalidRootAfterLowLeafUpdate)?;

        let leaf = IndexedMerkleLeaf {
            next_index: self.prev_low_leaf.next_index,
            key,
            next_key: self.prev_low_leaf.next_key,
            value,
        };
        Ok(self.leaf_proof.get_root(&leaf, self.index))
    }

    /// [`Self::get_new_root`] when `condition` holds, `prev_root` otherwise
    pub fn conditional_get_new_root(
        &self,
        condition: bool,
        key: U256,
        value: u64,
        prev_root: &PoseidonHashOut,
    ) -> Result<PoseidonHashOut, MerkleError> {
        if !condition {
            return Ok(*prev_root);
        }
        self.get_new_root(key, value, prev_root)
    }

    /// Check that the insertion moves `prev_root` to `new_root`
    pub fn verify(
        &self,
        key: U256,
        value: u64,
        prev_root: &PoseidonHashOut,
        new_root: &PoseidonHashOut,
    ) -> Result<(), MerkleError> {
        if self.get_new_root(key, value, prev_root)? != *new_root {
            return Err(MerkleError::NewRootMismatch);
        }
        Ok(())
    }
}

/// Proof that an existing leaf's value was replaced
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedUpdateProof {
    pub leaf_proof: IndexedMerkleProof,
    pub leaf_index: u64,
    /// Leaf before the update
    pub prev_leaf: IndexedMerkleLeaf,
}

impl IndexedUpdateProof {
    /// Root after changing `key` from `prev_value` to `new_value`
    pub fn get_new_root(
        &self,
        key: U256,
        prev_value: u64,
        new_value: u64,
        prev_root: &PoseidonHashOut,
    ) -> Result<PoseidonHashOut, MerkleError> {
        if self.prev_leaf.value != prev_value {
            return Err(MerkleError::ValueMismatch);
        }
        if self.prev_leaf.key != key {
            return Err(MerkleError::KeyMismatch);
        }

        self.leaf_proof.verify(&self.prev_leaf, self.leaf_index, prev_root)?;

        let new_leaf = IndexedMerkleLeaf { value: new_value, ..self.prev_leaf.clone() };
        Ok(self.leaf_proof.get_root(&new_leaf, self.leaf_index))
    }

    /// Check that the update moves `prev_root` to `new_root`
    pub fn verify(
        &self,
        key: U256,
        prev_value: u64,
        new_value: u64,
        prev_root: &PoseidonHashOut,
        new_root: &PoseidonHashOut,
    ) -> Result<(), MerkleError> {
        if self.get_new_root(key, prev_value, new_value, prev_root)? != *new_root {
            return Err(MerkleError::NewRootMismatch);
        }
        Ok(())
    }
}

/// Membership or non-membership of a key, proven through its low leaf
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedMembershipProof {
    pub is_included: bool,
    pub leaf_proof: IndexedMerkleProof,
    pub leaf_index: u64,
    pub leaf: IndexedMerkleLeaf,
}

impl IndexedMembershipProof {
    /// Verify against `root`
    pub fn verify(&self, key: U256, root: &PoseidonHashOut) -> Result<(), MerkleError> {
        self.leaf_proof.verify(&self.leaf, self.leaf_index, root)?;

        if self.is_included {
            if self.leaf.key != key {
                return Err(MerkleError::KeyMismatch);
            }
        } else {
            if self.leaf.key >= key {
                return Err(MerkleError::KeyNotLowerBounded);
            }
            if !self.leaf.next_key.is_zero() && self.leaf.next_key <= key {
                return Err(MerkleError::KeyNotUpperBounded);
            }
        }

        Ok(())
    }

    /// Value of the key if it is included
    pub fn value(&self) -> Option<u64> {
        self.is_included.then_some(self.leaf.value)
    }
}

/// Indexed Merkle tree
#[derive(Clone, Debug)]
pub struct IndexedMerkleTree {
    tree: IncrementalMerkleTree<IndexedMerkleLeaf>,
    /// key -> leaf index
    key_index: BTreeMap<U256, u64>,
}

impl IndexedMerkleTree {
    /// Create a tree holding only the reserved empty leaf at index 0
    pub fn new(height: usize) -> Self {
        let mut tree = IncrementalMerkleTree::new(height);
        tree.push(IndexedMerkleLeaf::empty_leaf())
            .unwrap_or_else(|e| panic!("empty leaf does not fit a tree of height {height}: {e}"));

        let mut key_index = BTreeMap::new();
        key_index.insert(U256::ZERO, 0);

        Self { tree, key_index }
    }

    /// Get the root hash
    pub fn root(&self) -> PoseidonHashOut {
        self.tree.root()
    }

    /// Tree height
    pub fn height(&self) -> usize {
        self.tree.height()
    }

    /// Number of leaves, including the reserved leaf
    pub fn len(&self) -> u64 {
        self.tree.len()
    }

    /// Always false: the reserved leaf is present from construction
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// All leaves in index order
    pub fn leaves(&self) -> &[IndexedMerkleLeaf] {
        self.tree.leaves()
    }

    /// Leaf at `index`, or the empty leaf
    pub fn get_leaf(&self, index: u64) -> IndexedMerkleLeaf {
        self.tree.get_leaf(index)
    }

    /// Index of the leaf holding exactly `key`
    pub fn get_index(&self, key: U256) -> Option<u64> {
        self.key_index.get(&key).copied()
    }

    /// Index of the leaf with the greatest key `<= key`.
    ///
    /// Panics if the linked list is inconsistent, which can only happen
    /// through a bug in this module.
    pub fn get_low_index(&self, key: U256) -> u64 {
        let (_, &index) = self
            .key_index
            .range(..=key)
            .next_back()
            .unwrap_or_else(|| panic!("no low leaf candidate for key {key}"));

        let leaf = self.get_leaf(index);
        assert!(
            leaf.key == key || leaf.strictly_bounds(key),
            "low leaf {index} does not bound key {key}"
        );
        index
    }

    /// Proof for the leaf at `index`
    pub fn prove(&self, index: u64) -> Result<IndexedMerkleProof, MerkleError> {
        self.tree.prove(index)
    }

    /// Insert a new key
    pub fn insert(&mut self, key: U256, value: u64) -> Result<IndexedInsertionProof, MerkleError> {
        let index = self.tree.len();
        let capacity = 1u64 << self.height();
        if index >= capacity {
            return Err(MerkleError::IndexOutOfRange { index, capacity });
        }

        let low_leaf_index = self.get_low_index(key);
        let prev_low_leaf = self.get_leaf(low_leaf_index);
        if prev_low_leaf.key == key {
            return Err(MerkleError::KeyAlreadyExists);
        }

        let prev_root = self.root();
        let new_low_leaf = IndexedMerkleLeaf {
            next_index: index,
            next_key: key,
            ..prev_low_leaf.clone()
        };
        let root_after_low_leaf = self.tree.update_leaf(low_leaf_index, new_low_leaf.clone())?;
        let low_leaf_proof = self.tree.prove(low_leaf_index)?;
        assert!(
            low_leaf_proof.verify(&prev_low_leaf, low_leaf_index, &prev_root).is_ok()
                && low_leaf_proof.verify(&new_low_leaf, low_leaf_index, &root_after_low_leaf).is_ok(),
            "low leaf proof does not verify after insertion of key {key}"
        );

        let leaf = IndexedMerkleLeaf {
            next_index: prev_low_leaf.next_index,
            key,
            next_key: prev_low_leaf.next_key,
            value,
        };
        let new_root = self.tree.add_leaf(index, leaf.clone())?;
        let leaf_proof = self.tree.prove(index)?;
        assert!(
            leaf_proof.verify(&leaf, index, &new_root).is_ok(),
            "new leaf proof does not verify after insertion of key {key}"
        );
        self.key_index.insert(key, index);

        Ok(IndexedInsertionProof { index, low_leaf_proof, leaf_proof, low_leaf_index, prev_low_leaf })
    }

    /// Replace the value of an existing key
    pub fn update(&mut self, key: U256, value: u64) -> Result<IndexedUpdateProof, MerkleError> {
        let leaf_index = self.get_index(key).ok_or(MerkleError::KeyNotFound)?;
        let prev_leaf = self.get_leaf(leaf_index);

        let new_leaf = IndexedMerkleLeaf { value, ..prev_leaf.clone() };
        self.tree.update_leaf(leaf_index, new_leaf)?;
        let leaf_proof = self.tree.prove(leaf_index)?;

        Ok(IndexedUpdateProof { leaf_proof, leaf_index, prev_leaf })
    }

    /// Prove whether `key` is in the tree
    pub fn prove_membership(&self, key: U256) -> Result<IndexedMembershipProof, MerkleError> {
        let leaf_index = self.get_low_index(key);
        let leaf = self.get_leaf(leaf_index);
        let leaf_proof = self.tree.prove(leaf_index)?;

        Ok(IndexedMembershipProof { is_included: leaf.key == key, leaf_proof, leaf_index, leaf })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn u(x: u64) -> U256 {
        U256::from(x)
    }

    /// Walk the linked list from leaf 0 and collect keys
    fn walk(tree: &IndexedMerkleTree) -> Vec<U256> {
        let mut keys = Vec::new();
        let mut leaf = tree.get_leaf(0);
        while !leaf.next_key.is_zero() {
            leaf = tree.get_leaf(leaf.next_index);
            keys.push(leaf.key);
        }
        keys
    }

    #[test]
    fn test_insertion_keeps_list_sorted() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut keys: Vec<u64> = (1..=40).map(|i| i * 10).collect();
        keys.shuffle(&mut rng);

        let mut tree = IndexedMerkleTree::new(10);
        for (i, key) in keys.iter().enumerate() {
            let prev_root = tree.root();
            let proof = tree.insert(u(*key), i as u64).unwrap();
            proof.verify(u(*key), i as u64, &prev_root, &tree.root()).unwrap();
        }

        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(walk(&tree), sorted.into_iter().map(u).collect::<Vec<_>>());
    }

    #[test]
    fn test_non_membership_between_keys() {
        let mut tree = IndexedMerkleTree::new(8);
        tree.insert(u(200), 1).unwrap();
        tree.insert(u(100), 2).unwrap();
        let root = tree.root();

        for k in [101u64, 150, 199] {
            let proof = tree.prove_membership(u(k)).unwrap();
            assert!(!proof.is_included);
            assert_eq!(proof.leaf.key, u(100));
            assert_eq!(proof.leaf.next_key, u(200));
            proof.verify(u(k), &root).unwrap();
            assert_eq!(proof.value(), None);
        }

        // above the greatest key
        let proof = tree.prove_membership(u(500)).unwrap();
        assert!(!proof.is_included);
        assert_eq!(proof.leaf.key, u(200));
        proof.verify(u(500), &root).unwrap();

        let proof = tree.prove_membership(u(100)).unwrap();
        assert_eq!(proof.value(), Some(2));
        proof.verify(u(100), &root).unwrap();
    }

    #[test]
    fn test_forged_membership_is_rejected() {
        let mut tree = IndexedMerkleTree::new(8);
        tree.insert(u(5), 1).unwrap();
        tree.insert(u(9), 1).unwrap();
        let root = tree.root();

        let mut proof = tree.prove_membership(u(7)).unwrap();
        proof.is_included = true;
        assert_eq!(proof.verify(u(7), &root), Err(MerkleError::KeyMismatch));

        // a low leaf that does not bound the key
        let proof = tree.prove_membership(u(5)).unwrap();
        let forged = IndexedMembershipProof { is_included: false, ..proof };
        assert_eq!(forged.verify(u(10), &root), Err(MerkleError::KeyNotUpperBounded));
    }

    #[test]
    fn test_duplicate_and_missing_keys() {
        let mut tree = IndexedMerkleTree::new(8);
        tree.insert(u(3), 0).unwrap();
        let root = tree.root();
        assert_eq!(tree.insert(u(3), 1), Err(MerkleError::KeyAlreadyExists));
        assert_eq!(tree.insert(U256::ZERO, 1), Err(MerkleError::KeyAlreadyExists));
        assert_eq!(tree.update(u(4), 1), Err(MerkleError::KeyNotFound));
        assert_eq!(tree.root(), root);
    }

    #[test]
    fn test_update_proof() {
        let mut tree = IndexedMerkleTree::new(8);
        tree.insert(u(3), 0).unwrap();
        tree.insert(u(8), 5).unwrap();
        let prev_root = tree.root();

        let proof = tree.update(u(8), 6).unwrap();
        proof.verify(u(8), 5, 6, &prev_root, &tree.root()).unwrap();

        assert_eq!(proof.get_new_root(u(8), 4, 6, &prev_root), Err(MerkleError::ValueMismatch));
        // same value, different key
        assert_eq!(proof.get_new_root(u(3), 5, 6, &prev_root), Err(MerkleError::KeyMismatch));
        assert_eq!(
            proof.verify(u(8), 5, 7, &prev_root, &tree.root()),
            Err(MerkleError::NewRootMismatch)
        );
    }

    #[test]
    fn test_insertion_proof_rejects_bad_bounds() {
        let mut tree = IndexedMerkleTree::new(8);
        tree.insert(u(10), 0).unwrap();
        let prev_root = tree.root();
        let proof = tree.insert(u(20), 0).unwrap();

        assert_eq!(proof.get_new_root(u(5), 0, &prev_root), Err(MerkleError::KeyNotLowerBounded));
        assert_eq!(proof.get_new_root(u(20), 0, &tree.root()), Err(MerkleError::InvalidPrevRoot));

        let mut bounded = proof.clone();
        bounded.prev_low_leaf.next_key = u(15);
        assert_eq!(bounded.get_new_root(u(20), 0, &prev_root), Err(MerkleError::KeyNotUpperBounded));
    }

    #[test]
    fn test_dummy_insertion_proof() {
        let proof = IndexedInsertionProof::dummy(8);
        assert!(proof.is_dummy());
        let root = IndexedMerkleTree::new(8).root();
        assert_eq!(proof.conditional_get_new_root(false, u(1), 0, &root), Ok(root));
    }

    #[test]
    fn test_leaf_json() {
        let leaf = IndexedMerkleLeaf { next_index: 2, key: u(5), next_key: U256::ZERO, value: 9 };
        let json = serde_json::to_string(&leaf).unwrap();
        assert_eq!(json, r#"{"nextIndex":2,"key":"5","nextKey":"0","value":9}"#);
        assert_eq!(serde_json::from_str::<IndexedMerkleLeaf>(&json).unwrap(), leaf);
    }

    #[test]
    fn test_full_tree_insert_fails_cleanly() {
        let mut tree = IndexedMerkleTree::new(1);
        tree.insert(u(1), 0).unwrap();
        let root = tree.root();
        assert!(matches!(tree.insert(u(2), 0), Err(MerkleError::IndexOutOfRange { .. })));
        assert_eq!(tree.root(), root);
    }
}
