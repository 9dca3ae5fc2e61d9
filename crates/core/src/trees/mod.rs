//! Specialized trees
//!
//! Each tree fixes a height and a leaf encoding on top of the generic trees
//! in `rollup-merkle`.

mod account;
mod asset;
mod block_hash;
mod deposit;
mod nullifier;
mod sender;
mod transfer;
mod tx;

pub use account::AccountTree;
pub use asset::{AssetLeaf, AssetMerkleProof, AssetTree};
pub use block_hash::{BlockHashLeaf, BlockHashMerkleProof, BlockHashTree};
pub use deposit::{DepositLeaf, DepositMerkleProof, DepositTree};
pub use nullifier::NullifierTree;
pub use sender::{sender_leaves, sender_tree_root, SenderLeaf, SenderTree};
pub use transfer::{Transfer, TransferMerkleProof, TransferTree};
pub use tx::{Tx, TxMerkleProof, TxTree};
