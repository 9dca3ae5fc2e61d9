//! Block hash tree: leaf `n` is the hash of block `n`

use rollup_merkle::utils::bytes32_to_u32_limbs;
use rollup_merkle::{Bytes32, IncrementalMerkleTree, Leafable, MerkleError, MerkleProof, PoseidonHashOut, PoseidonHasher};
use serde::{Deserialize, Serialize};

use crate::block::PostedBlock;
use crate::types::{BlockNumber, BLOCK_HASH_TREE_HEIGHT};

pub type BlockHashMerkleProof = MerkleProof<PoseidonHasher>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHashLeaf(pub Bytes32);

impl Leafable for BlockHashLeaf {
    type LeafHasher = PoseidonHasher;

    fn empty_leaf() -> Self {
        Self::default()
    }

    fn hash(&self) -> PoseidonHashOut {
        PoseidonHashOut::hash_inputs_u32(&bytes32_to_u32_limbs(&self.0))
    }
}

/// Append-only tree of block hashes
#[derive(Clone, Debug)]
pub struct BlockHashTree {
    inner: IncrementalMerkleTree<BlockHashLeaf>,
}

impl Default for BlockHashTree {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockHashTree {
    /// Genesis tree holding the genesis block hash at index 0
    pub fn new() -> Self {
        let mut inner = IncrementalMerkleTree::new(BLOCK_HASH_TREE_HEIGHT);
        inner
            .push(BlockHashLeaf(PostedBlock::genesis().hash()))
            .unwrap_or_else(|e| panic!("genesis block hash cannot be appended: {e}"));
        Self { inner }
    }

    pub fn root(&self) -> PoseidonHashOut {
        self.inner.root()
    }

    /// Number of blocks, genesis included
    pub fn len(&self) -> u64 {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Hash of block `block_number`, or the zero hash past the tip
    pub fn get_block_hash(&self, block_number: BlockNumber) -> Bytes32 {
        self.inner.get_leaf(u64::from(block_number)).0
    }

    /// Append the hash of the next block
    pub fn push(&mut self, block_number: BlockNumber, block_hash: Bytes32) -> Result<PoseidonHashOut, MerkleError> {
        self.inner.add_leaf(u64::from(block_number), BlockHashLeaf(block_hash))
    }

    pub fn prove(&self, block_number: BlockNumber) -> Result<BlockHashMerkleProof, MerkleError> {
        self.inner.prove(u64::from(block_number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_leaf() {
        let tree = BlockHashTree::new();
        assert_eq!(tree.len(), 1);
        let genesis = PostedBlock::genesis().hash();
        assert_eq!(tree.get_block_hash(0), genesis);
        tree.prove(0).unwrap().verify(&BlockHashLeaf(genesis), 0, &tree.root()).unwrap();
    }

    #[test]
    fn test_blocks_append_in_order() {
        let mut tree = BlockHashTree::new();
        let hash = Bytes32::repeat_byte(7);

        let empty_slot = tree.prove(1).unwrap();
        let prev_root = tree.root();
        empty_slot.verify(&BlockHashLeaf::default(), 1, &prev_root).unwrap();

        let root = tree.push(1, hash).unwrap();
        assert_eq!(empty_slot.get_root(&BlockHashLeaf(hash), 1), root);
        assert!(matches!(tree.push(3, hash), Err(MerkleError::UnexpectedLeafIndex { expected: 2, actual: 3 })));
    }
}
