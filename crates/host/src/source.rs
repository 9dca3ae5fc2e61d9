//! Persistence collaborators of the synchronizer
//!
//! Each trait is the seam to an external store (the L1 event indexer, the
//! proof database). The in-memory implementations back the node binary and
//! the tests.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use rollup_core::trees::DepositLeaf;
use rollup_core::{BlockContent, BlockNumber, PostedBlock};
use tokio::sync::RwLock;

use crate::prover::ValidityProof;

/// A block as posted to the rollup contract together with its calldata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostedBlockEvent {
    pub block: PostedBlock,
    pub content: BlockContent,
}

/// Deposits observed on L1, in deposit index order
#[async_trait]
pub trait DepositSource: Send + Sync {
    /// Every known deposit with index `>= from_index`
    async fn deposits_since(&self, from_index: u64) -> Result<Vec<DepositLeaf>>;
}

/// Posted blocks observed on L1
#[async_trait]
pub trait BlockContentSource: Send + Sync {
    /// Block `block_number`, or `None` if it has not been posted yet
    async fn posted_block(&self, block_number: BlockNumber) -> Result<Option<PostedBlockEvent>>;
}

/// Last block whose proof has been stored
#[async_trait]
pub trait EventCursor: Send + Sync {
    async fn last_processed(&self) -> Result<BlockNumber>;

    async fn advance(&self, block_number: BlockNumber) -> Result<()>;
}

/// Validity proofs by block number
#[async_trait]
pub trait ProofStore: Send + Sync {
    async fn save(&self, block_number: BlockNumber, proof: ValidityProof) -> Result<()>;

    async fn get(&self, block_number: BlockNumber) -> Result<Option<ValidityProof>>;
}

#[derive(Debug, Default)]
pub struct MemoryDepositSource {
    deposits: RwLock<Vec<DepositLeaf>>,
}

impl MemoryDepositSource {
    pub fn new(deposits: Vec<DepositLeaf>) -> Self {
        Self { deposits: RwLock::new(deposits) }
    }

    pub async fn push(&self, deposit: DepositLeaf) {
        self.deposits.write().await.push(deposit);
    }
}

#[async_trait]
impl DepositSource for MemoryDepositSource {
    async fn deposits_since(&self, from_index: u64) -> Result<Vec<DepositLeaf>> {
        let deposits = self.deposits.read().await;
        let start = usize::try_from(from_index).unwrap_or(usize::MAX).min(deposits.len());
        Ok(deposits[start..].to_vec())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlockSource {
    blocks: RwLock<BTreeMap<BlockNumber, PostedBlockEvent>>,
}

impl MemoryBlockSource {
    pub fn new(events: impl IntoIterator<Item = PostedBlockEvent>) -> Self {
        let blocks = events.into_iter().map(|e| (e.block.block_number, e)).collect();
        Self { blocks: RwLock::new(blocks) }
    }

    pub async fn post(&self, event: PostedBlockEvent) {
        self.blocks.write().await.insert(event.block.block_number, event);
    }
}

#[async_trait]
impl BlockContentSource for MemoryBlockSource {
    async fn posted_block(&self, block_number: BlockNumber) -> Result<Option<PostedBlockEvent>> {
        Ok(self.blocks.read().await.get(&block_number).cloned())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCursor {
    last: RwLock<BlockNumber>,
}

#[async_trait]
impl EventCursor for MemoryCursor {
    async fn last_processed(&self) -> Result<BlockNumber> {
        Ok(*self.last.read().await)
    }

    async fn advance(&self, block_number: BlockNumber) -> Result<()> {
        *self.last.write().await = block_number;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryProofStore {
    proofs: RwLock<BTreeMap<BlockNumber, ValidityProof>>,
}

#[async_trait]
impl ProofStore for MemoryProofStore {
    async fn save(&self, block_number: BlockNumber, proof: ValidityProof) -> Result<()> {
        self.proofs.write().await.insert(block_number, proof);
        Ok(())
    }

    async fn get(&self, block_number: BlockNumber) -> Result<Option<ValidityProof>> {
        Ok(self.proofs.read().await.get(&block_number).cloned())
    }
}
