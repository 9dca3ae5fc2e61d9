//! Witness and history errors

use rollup_merkle::{Bytes32, MerkleError, U256};
use thiserror::Error;

use crate::types::{AccountId, BlockNumber};

/// Failures while building, applying or decoding a block transition.
///
/// Every variant aborts the current block. An invalid block is not an
/// error: it is reported through `is_valid_block` in the public inputs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WitnessError {
    #[error(transparent)]
    Merkle(#[from] MerkleError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("block {actual} does not follow the latest block {latest}")]
    NonSequentialBlock { latest: BlockNumber, actual: BlockNumber },

    #[error("previous account tree root does not match block {0}")]
    PrevAccountTreeRootMismatch(BlockNumber),

    #[error("previous block tree root does not match block {0}")]
    PrevBlockTreeRootMismatch(BlockNumber),

    #[error("block merkle proof does not verify against the block tree root")]
    InvalidBlockMerkleProof,

    #[error("account membership proof is invalid: {0}")]
    InvalidMembershipProof(MerkleError),

    #[error("too many senders: {0}")]
    TooManySenders(usize),

    #[error("expected {expected} {what}, got {actual}")]
    LengthMismatch { what: &'static str, expected: usize, actual: usize },

    #[error("account id {0} does not fit in 40 bits")]
    AccountIdOutOfRange(AccountId),

    #[error("{0} proofs are required for this block")]
    MissingProofs(&'static str),

    #[error("registering sender {0} failed: {1}")]
    Registration(U256, MerkleError),

    #[error("updating sender {0} failed: {1}")]
    Update(U256, MerkleError),

    #[error("account tree root after the transition does not match the witness")]
    TransitionRootMismatch,

    #[error("public input {index} is out of range: {value}")]
    PublicInputOutOfRange { index: usize, value: u64 },

    #[error("proof siblings above the significant height differ between senders")]
    CommonSiblingsMismatch,
}

/// Historical lookups that fall outside recorded history
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    #[error("block {0} not found")]
    BlockNotFound(BlockNumber),

    #[error("root block {root} precedes leaf block {leaf}")]
    RootBeforeLeaf { root: BlockNumber, leaf: BlockNumber },

    #[error("deposit index {index} out of range: {count} deposits known at block {block_number}")]
    DepositIndexOutOfRange { index: u64, count: u64, block_number: BlockNumber },

    #[error("deposit {0} is not included in any block yet")]
    DepositNotIncluded(u64),

    #[error("no prefix of the known deposits has the root {deposit_root} of block {block_number}")]
    DepositRootNotFound { block_number: BlockNumber, deposit_root: Bytes32 },

    #[error(transparent)]
    Merkle(#[from] MerkleError),
}
