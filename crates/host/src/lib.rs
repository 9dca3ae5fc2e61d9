//! Host-side services of the validity node
//!
//! The synchronizer drives [`rollup_core::BlockBuilderStorage`] from posted
//! blocks and hands each compressed witness to the validity prover.

pub mod config;
pub mod prover;
pub mod source;
pub mod synchronizer;

pub use config::{Config, ProverMode};
pub use prover::{ValidityProof, ValidityProver};
pub use source::{
    BlockContentSource, DepositSource, EventCursor, MemoryBlockSource, MemoryCursor, MemoryDepositSource,
    MemoryProofStore, PostedBlockEvent, ProofStore,
};
pub use synchronizer::{Collaborators, ValiditySynchronizer};
