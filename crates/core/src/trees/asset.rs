//! Per-user asset tree keyed by token index

use std::collections::BTreeMap;

use rollup_merkle::utils::{u256_decimal, u256_to_u32_limbs};
use rollup_merkle::{Leafable, MerkleError, MerkleProof, MerkleTree, PoseidonHashOut, PoseidonHasher, U256};
use serde::{Deserialize, Serialize};

use crate::types::ASSET_TREE_HEIGHT;

pub type AssetMerkleProof = MerkleProof<PoseidonHasher>;

/// Balance of one token
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetLeaf {
    /// Set once a debit exceeded the balance; never cleared
    pub is_insufficient: bool,
    #[serde(with = "u256_decimal")]
    pub amount: U256,
}

impl AssetLeaf {
    /// Credit `amount`
    pub fn add(&self, amount: U256) -> Self {
        Self { is_insufficient: self.is_insufficient, amount: self.amount.saturating_add(amount) }
    }

    /// Debit `amount`. Over-debiting zeroes the balance and marks the leaf
    /// insufficient.
    pub fn sub(&self, amount: U256) -> Self {
        Self {
            is_insufficient: self.is_insufficient || self.amount < amount,
            amount: self.amount.saturating_sub(amount),
        }
    }
}

impl Leafable for AssetLeaf {
    type LeafHasher = PoseidonHasher;

    fn empty_leaf() -> Self {
        Self::default()
    }

    fn hash(&self) -> PoseidonHashOut {
        let mut inputs = Vec::with_capacity(9);
        inputs.push(u32::from(self.is_insufficient));
        inputs.extend(u256_to_u32_limbs(&self.amount));
        PoseidonHashOut::hash_inputs_u32(&inputs)
    }
}

/// Sparse tree of [`AssetLeaf`] indexed by token index
#[derive(Clone, Debug)]
pub struct AssetTree {
    tree: MerkleTree<PoseidonHasher>,
    leaves: BTreeMap<u32, AssetLeaf>,
}

impl Default for AssetTree {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetTree {
    pub fn new() -> Self {
        Self {
            tree: MerkleTree::new(ASSET_TREE_HEIGHT, AssetLeaf::empty_leaf().hash()),
            leaves: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> PoseidonHashOut {
        self.tree.root()
    }

    /// Leaf of `token_index`, or the empty leaf
    pub fn get_leaf(&self, token_index: u32) -> AssetLeaf {
        self.leaves.get(&token_index).copied().unwrap_or_default()
    }

    /// Non-empty leaves in token order
    pub fn leaves(&self) -> impl Iterator<Item = (u32, &AssetLeaf)> {
        self.leaves.iter().map(|(index, leaf)| (*index, leaf))
    }

    pub fn update(&mut self, token_index: u32, leaf: AssetLeaf) -> Result<PoseidonHashOut, MerkleError> {
        let root = self.tree.update_leaf(u64::from(token_index), leaf.hash())?;
        self.leaves.insert(token_index, leaf);
        Ok(root)
    }

    pub fn prove(&self, token_index: u32) -> Result<AssetMerkleProof, MerkleError> {
        self.tree.prove(u64::from(token_index))
    }
}
