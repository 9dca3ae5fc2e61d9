//! Sender tree: one leaf per sender slot of a block

use rollup_merkle::utils::u256_to_u32_limbs;
use rollup_merkle::{IncrementalMerkleTree, Leafable, MerkleError, PoseidonHashOut, PoseidonHasher, U256};
use serde::{Deserialize, Serialize};

use crate::signature::sender_flag_bit;
use crate::types::{Bytes16, Sender, SENDER_TREE_HEIGHT};

/// Sender public key and whether it signed the block
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderLeaf {
    pub sender: Sender,
    pub is_valid: bool,
}

impl Leafable for SenderLeaf {
    type LeafHasher = PoseidonHasher;

    fn empty_leaf() -> Self {
        Self { sender: Sender::Real(U256::ZERO), is_valid: false }
    }

    fn hash(&self) -> PoseidonHashOut {
        let mut inputs = Vec::with_capacity(9);
        inputs.extend(u256_to_u32_limbs(&self.sender.public_key()));
        inputs.push(u32::from(self.is_valid));
        PoseidonHashOut::hash_inputs_u32(&inputs)
    }
}

pub type SenderTree = IncrementalMerkleTree<SenderLeaf>;

/// Pair each sender slot with its bit of `sender_flag`
pub fn sender_leaves(public_keys: &[Sender], sender_flag: &Bytes16) -> Vec<SenderLeaf> {
    public_keys
        .iter()
        .enumerate()
        .map(|(i, sender)| SenderLeaf { sender: *sender, is_valid: sender_flag_bit(sender_flag, i) })
        .collect()
}

/// Root of the sender tree over `leaves`
pub fn sender_tree_root(leaves: &[SenderLeaf]) -> Result<PoseidonHashOut, MerkleError> {
    SenderTree::build_merkle_root(SENDER_TREE_HEIGHT, leaves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::sender_flag_from_bits;

    #[test]
    fn test_sender_leaves_follow_flag_bits() {
        let keys = vec![Sender::Real(U256::from(30u64)), Sender::Real(U256::from(20u64)), Sender::Dummy];
        let flag = sender_flag_from_bits(&[true, false, false]);

        let leaves = sender_leaves(&keys, &flag);
        assert_eq!(leaves.len(), 3);
        assert!(leaves[0].is_valid);
        assert!(!leaves[1].is_valid);
        assert!(leaves[2].sender.is_dummy());

        let full: Vec<SenderLeaf> = (0..128).map(|_| leaves[2]).collect();
        let root = sender_tree_root(&full).unwrap();
        let mut tree = SenderTree::new(SENDER_TREE_HEIGHT);
        for leaf in full {
            tree.push(leaf).unwrap();
        }
        assert_eq!(tree.root(), root);
    }
}
