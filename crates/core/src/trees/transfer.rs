//! Transfers and the per-tx transfer tree

use rollup_merkle::utils::{u256_decimal, u256_to_u32_limbs};
use rollup_merkle::{IncrementalMerkleTree, Leafable, MerkleError, MerkleProof, PoseidonHashOut, PoseidonHasher, U256};
use serde::{Deserialize, Serialize};

use crate::types::{GenericAddress, TRANSFER_TREE_HEIGHT};

pub type TransferMerkleProof = MerkleProof<PoseidonHasher>;

/// One transfer inside a tx
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub recipient: GenericAddress,
    pub token_index: u32,
    #[serde(with = "u256_decimal")]
    pub amount: U256,
    pub salt: PoseidonHashOut,
}

impl Leafable for Transfer {
    type LeafHasher = PoseidonHasher;

    fn empty_leaf() -> Self {
        Self::default()
    }

    fn hash(&self) -> PoseidonHashOut {
        let mut inputs = Vec::with_capacity(22);
        inputs.push(u64::from(self.recipient.is_pubkey()));
        inputs.extend(self.recipient.to_u32_limbs().map(u64::from));
        inputs.push(u64::from(self.token_index));
        inputs.extend(u256_to_u32_limbs(&self.amount).map(u64::from));
        inputs.extend(self.salt.elements);
        PoseidonHashOut::hash_inputs_u64(&inputs)
    }
}

/// Transfers of one tx, at most 64
#[derive(Clone, Debug)]
pub struct TransferTree {
    inner: IncrementalMerkleTree<Transfer>,
}

impl Default for TransferTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferTree {
    pub fn new() -> Self {
        Self { inner: IncrementalMerkleTree::new(TRANSFER_TREE_HEIGHT) }
    }

    pub fn from_transfers(transfers: Vec<Transfer>) -> Result<Self, MerkleError> {
        Ok(Self { inner: IncrementalMerkleTree::from_leaves(TRANSFER_TREE_HEIGHT, transfers)? })
    }

    pub fn root(&self) -> PoseidonHashOut {
        self.inner.root()
    }

    pub fn len(&self) -> u64 {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn transfers(&self) -> &[Transfer] {
        self.inner.leaves()
    }

    pub fn push(&mut self, transfer: Transfer) -> Result<PoseidonHashOut, MerkleError> {
        self.inner.push(transfer)
    }

    pub fn prove(&self, index: u64) -> Result<TransferMerkleProof, MerkleError> {
        self.inner.prove(index)
    }
}
