//! Txs and the per-block tx tree

use rollup_merkle::{IncrementalMerkleTree, Leafable, MerkleError, MerkleProof, PoseidonHashOut, PoseidonHasher};
use serde::{Deserialize, Serialize};

use crate::types::TX_TREE_HEIGHT;

pub type TxMerkleProof = MerkleProof<PoseidonHasher>;

/// Commitment of one sender's transfers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tx {
    pub transfer_tree_root: PoseidonHashOut,
    pub nonce: u32,
}

impl Leafable for Tx {
    type LeafHasher = PoseidonHasher;

    fn empty_leaf() -> Self {
        Self::default()
    }

    fn hash(&self) -> PoseidonHashOut {
        let mut inputs = self.transfer_tree_root.elements.to_vec();
        inputs.push(u64::from(self.nonce));
        PoseidonHashOut::hash_inputs_u64(&inputs)
    }
}

/// Txs of one block, one slot per sender
#[derive(Clone, Debug)]
pub struct TxTree {
    inner: IncrementalMerkleTree<Tx>,
}

impl Default for TxTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TxTree {
    pub fn new() -> Self {
        Self { inner: IncrementalMerkleTree::new(TX_TREE_HEIGHT) }
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

    pub fn push(&mut self, tx: Tx) -> Result<PoseidonHashOut, MerkleError> {
        self.inner.push(tx)
    }

    pub fn prove(&self, index: u64) -> Result<TxMerkleProof, MerkleError> {
        self.inner.prove(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trees::TransferTree;

    #[test]
    fn test_tx_commits_transfer_root_and_nonce() {
        let transfers = TransferTree::new();
        let tx = Tx { transfer_tree_root: transfers.root(), nonce: 0 };
        let next = Tx { nonce: 1, ..tx };
        assert_ne!(tx.hash(), next.hash());

        let mut tree = TxTree::new();
        tree.push(tx).unwrap();
        let root = tree.push(next).unwrap();
        tree.prove(1).unwrap().verify(&next, 1, &root).unwrap();
    }
}
