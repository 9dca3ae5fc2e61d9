//! Deposit tree, hashed with Keccak256 to match the L1 deposit contract

use rollup_merkle::utils::u256_decimal;
use rollup_merkle::{Bytes32, IncrementalMerkleTree, Keccak256Hasher, Leafable, MerkleError, MerkleProof, U256};
use serde::{Deserialize, Serialize};

use crate::types::DEPOSIT_TREE_HEIGHT;

pub type DepositMerkleProof = MerkleProof<Keccak256Hasher>;

/// One L1 deposit
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositLeaf {
    pub recipient_salt_hash: Bytes32,
    pub token_index: u32,
    #[serde(with = "u256_decimal")]
    pub amount: U256,
}

impl Leafable for DepositLeaf {
    type LeafHasher = Keccak256Hasher;

    fn empty_leaf() -> Self {
        Self::default()
    }

    fn hash(&self) -> Bytes32 {
        let mut bytes = Vec::with_capacity(68);
        bytes.extend_from_slice(self.recipient_salt_hash.as_slice());
        bytes.extend_from_slice(&self.token_index.to_be_bytes());
        bytes.extend_from_slice(&self.amount.to_be_bytes::<32>());
        Keccak256Hasher::hash(&bytes)
    }
}

/// Append-only tree of deposits
#[derive(Clone, Debug)]
pub struct DepositTree {
    inner: IncrementalMerkleTree<DepositLeaf>,
}

impl Default for DepositTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DepositTree {
    pub fn new() -> Self {
        Self { inner: IncrementalMerkleTree::new(DEPOSIT_TREE_HEIGHT) }
    }

    pub fn root(&self) -> Bytes32 {
        self.inner.root()
    }

    pub fn len(&self) -> u64 {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn leaves(&self) -> &[DepositLeaf] {
        self.inner.leaves()
    }

    /// Append a deposit, returning its index and the new root
    pub fn push(&mut self, leaf: DepositLeaf) -> Result<(u64, Bytes32), MerkleError> {
        let index = self.inner.len();
        let root = self.inner.push(leaf)?;
        Ok((index, root))
    }

    pub fn prove(&self, index: u64) -> Result<DepositMerkleProof, MerkleError> {
        self.inner.prove(index)
    }

    /// Number of leading deposits, at least `from`, whose tree has `root`
    pub fn prefix_len_with_root(&self, from: u64, root: Bytes32) -> Result<Option<u64>, MerkleError> {
        if self.root() == root {
            return Ok(Some(self.len()));
        }
        let leaves = self.leaves();
        let from = from.min(self.len());
        let mut prefix = IncrementalMerkleTree::from_leaves(DEPOSIT_TREE_HEIGHT, leaves[..from as usize].to_vec())?;
        if prefix.root() == root {
            return Ok(Some(from));
        }
        for leaf in &leaves[from as usize..] {
            if prefix.push(*leaf)? == root {
                return Ok(Some(prefix.len()));
            }
        }
        Ok(None)
    }

    /// Proof and root of `index` over an explicit leaf set
    pub fn compute_merkle_proof(index: u64, leaves: &[DepositLeaf]) -> Result<(DepositMerkleProof, Bytes32), MerkleError> {
        IncrementalMerkleTree::compute_merkle_proof(DEPOSIT_TREE_HEIGHT, index, leaves)
    }
}
