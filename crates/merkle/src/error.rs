//! Merkle tree errors

use thiserror::Error;

/// Errors returned by tree mutations and proof verification
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MerkleError {
    #[error("leaf index {index} out of range for tree of capacity {capacity}")]
    IndexOutOfRange { index: u64, capacity: u64 },

    #[error("leaf index {index} has not been appended yet (count {count})")]
    LeafNotAppended { index: u64, count: u64 },

    #[error("leaves must be appended in order: expected index {expected}, got {actual}")]
    UnexpectedLeafIndex { expected: u64, actual: u64 },

    #[error("{len} leaves do not fit a tree of capacity {capacity}")]
    TooManyLeaves { len: usize, capacity: u64 },

    #[error("invalid root")]
    InvalidRoot,

    #[error("key already exists")]
    KeyAlreadyExists,

    #[error("key doesn't exist")]
    KeyNotFound,

    #[error("key is not lower-bounded")]
    KeyNotLowerBounded,

    #[error("key is not upper-bounded")]
    KeyNotUpperBounded,

    #[error("key mismatch")]
    KeyMismatch,

    #[error("value mismatch")]
    ValueMismatch,

    #[error("new root mismatch")]
    NewRootMismatch,

    #[error("low leaf proof does not match the previous root")]
    InvalidPrevRoot,

    #[error("new leaf slot is not empty after updating the low leaf")]
    InvalidRootAfterLowLeafUpdate,

    #[error("invalid hash length: expected 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("non-canonical field element {0:#x}")]
    NonCanonicalElement(u64),

    #[error("hex string must start with 0x")]
    MissingHexPrefix,

    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}
