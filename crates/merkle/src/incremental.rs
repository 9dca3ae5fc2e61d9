//! Append-only Merkle tree with a cached frontier
//!
//! `siblings[h]` holds the hash of the last filled left subtree at level `h`
//! on the path of the next free leaf, so an append touches `height` nodes
//! without reading the node map. The node map is still kept so that any
//! appended leaf can be updated or proven later.

use crate::error::MerkleError;
use crate::hasher::{Hasher, LeafDigest, Leafable};
use crate::proof::MerkleProof;
use crate::tree::{zero_hashes, MerkleTree};

/// Incremental Merkle tree over typed leaves
#[derive(Clone, Debug)]
pub struct IncrementalMerkleTree<V: Leafable> {
    height: usize,
    /// Number of appended leaves, also the next free index
    count: u64,
    siblings: Vec<LeafDigest<V>>,
    current_root: LeafDigest<V>,
    leaves: Vec<V>,
    inner: MerkleTree<V::LeafHasher>,
}

impl<V: Leafable> IncrementalMerkleTree<V> {
    /// Create an empty tree
    pub fn new(height: usize) -> Self {
        let inner = MerkleTree::new(height, V::empty_leaf().hash());
        let zero = inner.zero_hashes();

        Self {
            height,
            count: 0,
            siblings: zero[..height].to_vec(),
            current_root: zero[height],
            leaves: Vec::new(),
            inner,
        }
    }

    /// Create a tree holding `leaves` at indices `0..leaves.len()`
    pub fn from_leaves(height: usize, leaves: Vec<V>) -> Result<Self, MerkleError> {
        let mut tree = Self::new(height);
        for leaf in leaves {
            tree.push(leaf)?;
        }
        Ok(tree)
    }

    /// Tree height
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of appended leaves
    pub fn len(&self) -> u64 {
        self.count
    }

    /// Whether no leaf has been appended
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Get the root hash
    pub fn root(&self) -> LeafDigest<V> {
        self.current_root
    }

    /// Appended leaves in index order
    pub fn leaves(&self) -> &[V] {
        &self.leaves
    }

    /// Leaf at `index`, or the empty leaf for a slot not yet appended
    pub fn get_leaf(&self, index: u64) -> V {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.leaves.get(i))
            .cloned()
            .unwrap_or_else(V::empty_leaf)
    }

    /// Zero hash for every level, leaf level first
    pub fn zero_hashes(&self) -> &[LeafDigest<V>] {
        self.inner.zero_hashes()
    }

    /// Root, count and frontier siblings
    pub fn current_root_count_and_siblings(&self) -> (LeafDigest<V>, u64, &[LeafDigest<V>]) {
        (self.current_root, self.count, &self.siblings)
    }

    /// Append at the next free index
    pub fn push(&mut self, leaf: V) -> Result<LeafDigest<V>, MerkleError> {
        self.add_leaf(self.count, leaf)
    }

    /// Append `leaf` at `index`, which must equal the current count
    pub fn add_leaf(&mut self, index: u64, leaf: V) -> Result<LeafDigest<V>, MerkleError> {
        if index != self.count {
            return Err(MerkleError::UnexpectedLeafIndex { expected: self.count, actual: index });
        }
        if index >= self.inner.capacity() {
            return Err(MerkleError::IndexOutOfRange { index, capacity: self.inner.capacity() });
        }

        let leaf_hash = leaf.hash();
        let mut current = leaf_hash;
        for level in 0..self.height {
            if (index >> level) & 1 == 1 {
                current = V::LeafHasher::two_to_one(&self.siblings[level], &current);
            } else {
                self.siblings[level] = current;
                current = V::LeafHasher::two_to_one(&current, &self.zero_hashes()[level]);
            }
        }

        let inner_root = self.inner.update_leaf(index, leaf_hash)?;
        debug_assert_eq!(inner_root, current, "frontier root diverged from node map");

        self.current_root = current;
        self.count += 1;
        self.leaves.push(leaf);

        Ok(current)
    }

    /// Replace an already appended leaf
    pub fn update_leaf(&mut self, index: u64, leaf: V) -> Result<LeafDigest<V>, MerkleError> {
        if index >= self.count {
            return Err(MerkleError::LeafNotAppended { index, count: self.count });
        }

        let root = self.inner.update_leaf(index, leaf.hash())?;
        self.leaves[index as usize] = leaf;
        self.refresh_siblings();
        self.current_root = root;

        Ok(root)
    }

    /// Proof for `index` against the current root. Slots not yet appended
    /// prove the empty leaf.
    pub fn prove(&self, index: u64) -> Result<MerkleProof<V::LeafHasher>, MerkleError> {
        self.inner.prove(index)
    }

    /// Recompute the proof for `index` from this tree's own leaves
    pub fn compute_merkle_proof_at(
        &self,
        index: u64,
    ) -> Result<(MerkleProof<V::LeafHasher>, LeafDigest<V>), MerkleError> {
        Self::compute_merkle_proof(self.height, index, &self.leaves)
    }

    /// Proof and root for `index` over a full leaf set, without any cached
    /// state. Missing slots past `leaves.len()` are empty leaves.
    pub fn compute_merkle_proof(
        height: usize,
        index: u64,
        leaves: &[V],
    ) -> Result<(MerkleProof<V::LeafHasher>, LeafDigest<V>), MerkleError> {
        let capacity = 1u64 << height;
        if leaves.len() as u64 > capacity {
            return Err(MerkleError::TooManyLeaves { len: leaves.len(), capacity });
        }
        if index >= capacity {
            return Err(MerkleError::IndexOutOfRange { index, capacity });
        }

        let zero = zero_hashes::<V::LeafHasher>(height, V::empty_leaf().hash());
        let mut nodes: Vec<LeafDigest<V>> = leaves.iter().map(Leafable::hash).collect();
        let mut position = index as usize;
        let mut siblings = Vec::with_capacity(height);

        for level in 0..height {
            if nodes.len() % 2 == 1 {
                nodes.push(zero[level]);
            }
            siblings.push(nodes.get(position ^ 1).copied().unwrap_or(zero[level]));

            nodes = nodes
                .chunks_exact(2)
                .map(|pair| V::LeafHasher::two_to_one(&pair[0], &pair[1]))
                .collect();
            position >>= 1;
        }

        let root = nodes.first().copied().unwrap_or(zero[height]);
        Ok((MerkleProof { siblings }, root))
    }

    /// Root over a full leaf set
    pub fn build_merkle_root(height: usize, leaves: &[V]) -> Result<LeafDigest<V>, MerkleError> {
        Self::compute_merkle_proof(height, 0, leaves).map(|(_, root)| root)
    }

    fn refresh_siblings(&mut self) {
        for level in 0..self.height {
            let position = self.count >> level;
            if position & 1 == 1 {
                self.siblings[level] = self.inner.node_hash_at(level, position - 1);
            }
        }
    }
}
