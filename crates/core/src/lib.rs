//! Rollup state-commitment core
//!
//! This crate contains the logic shared by everything that needs to reason
//! about rollup state:
//! - The specialized trees (account, nullifier, asset, block hash, deposit,
//!   transfer, tx, sender)
//! - Posted blocks, block content and signature content
//! - The validity witness state machine and its public inputs
//! - `BlockBuilderStorage`, the per-block history of every tree

pub mod account_id;
pub mod block;
pub mod compress;
pub mod error;
pub mod public_state;
pub mod signature;
pub mod storage;
pub mod trees;
pub mod types;
pub mod witness;

#[cfg(test)]
pub(crate) mod test_utils;

pub use account_id::AccountIdPacked;
pub use block::{BlockContent, BlockSender, PostedBlock, SenderType};
pub use compress::{CompressedBlockWitness, CompressedValidityTransitionWitness, CompressedValidityWitness};
pub use error::{StorageError, WitnessError};
pub use public_state::{PublicState, ValidityPublicInputs};
pub use signature::{AggregationVerifier, PermissiveVerifier, SignatureContent};
pub use storage::{BlockBuilderStorage, TreeHistory};
pub use types::*;
pub use witness::{
    AccountMerkleProof, BlockWitness, MainValidationPublicInputs, SenderProofs, ValidityTransitionWitness,
    ValidityWitness,
};

pub use rollup_merkle::{Bytes32, PoseidonHashOut, U256};
