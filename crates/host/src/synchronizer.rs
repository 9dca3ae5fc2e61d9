//! Sequential validity synchronizer
//!
//! Blocks are processed strictly in order. For each posted block the
//! synchronizer catches the deposit tree up to the block's deposit root,
//! applies the transition to its [`BlockBuilderStorage`], gets a proof for
//! the compressed witness, cross-checks the proof's public inputs and only
//! then records the proof and advances the cursor.

use std::sync::Arc;

use anyhow::{bail, ensure, Context, Result};
use rollup_core::{
    AggregationVerifier, BlockBuilderStorage, BlockNumber, Bytes32, CompressedValidityWitness, PostedBlock, TreeHistory,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::prover::ValidityProver;
use crate::source::{BlockContentSource, DepositSource, EventCursor, ProofStore};

/// External collaborators of the synchronizer
#[derive(Clone)]
pub struct Collaborators {
    pub blocks: Arc<dyn BlockContentSource>,
    pub deposits: Arc<dyn DepositSource>,
    pub cursor: Arc<dyn EventCursor>,
    pub proofs: Arc<dyn ProofStore>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ValiditySynchronizer {
    config: Config,
    storage: BlockBuilderStorage,
    sources: Collaborators,
    verifier: Arc<dyn AggregationVerifier>,
    prover: ValidityProver,
    /// Applied block still waiting for its proof
    pending: Option<PendingProof>,
}

#[derive(Debug)]
struct PendingProof {
    block_number: BlockNumber,
    block_hash: Bytes32,
    witness: CompressedValidityWitness,
}

impl ValiditySynchronizer {
    pub fn new(config: Config, sources: Collaborators, verifier: Arc<dyn AggregationVerifier>) -> Self {
        let prover = ValidityProver::new(config.clone());
        Self { config, storage: BlockBuilderStorage::new(), sources, verifier, prover, pending: None }
    }

    pub const fn storage(&self) -> &BlockBuilderStorage {
        &self.storage
    }

    /// Process blocks until `shutdown` flips to true. Shutdown is observed
    /// between blocks only.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("validity synchronizer starting...");
        info!("  prover mode: {:?}", self.config.prover_mode);
        info!("  fetch interval: {}s", self.config.fetch_interval);

        loop {
            if *shutdown.borrow() {
                info!(latest = self.storage.latest_block_number(), "validity synchronizer stopped");
                return Ok(());
            }

            match self.sync_next().await {
                Ok(Some(_)) => continue,
                Ok(None) => debug!("no new block"),
                Err(e) => warn!("failed to sync block {}: {e:#}", self.storage.latest_block_number() + 1),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.fetch_interval()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        error!("shutdown channel closed");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Process every block that is already posted
    pub async fn sync_all(&mut self) -> Result<BlockNumber> {
        while self.sync_next().await?.is_some() {}
        Ok(self.storage.latest_block_number())
    }

    /// Process the next block if it has been posted. A block whose proof
    /// failed is retried from the proving step.
    pub async fn sync_next(&mut self) -> Result<Option<BlockNumber>> {
        let pending = match self.pending.take() {
            Some(pending) => pending,
            None => match self.apply_next().await? {
                Some(pending) => pending,
                None => return Ok(None),
            },
        };

        let block_number = pending.block_number;
        match self.prove(&pending).await {
            Ok(()) => Ok(Some(block_number)),
            Err(e) => {
                self.pending = Some(pending);
                Err(e)
            }
        }
    }

    async fn apply_next(&mut self) -> Result<Option<PendingProof>> {
        let latest = self.storage.latest_block_number();
        let last_processed = self.sources.cursor.last_processed().await?;
        ensure!(
            last_processed == latest,
            "cursor is at block {last_processed} but storage holds block {latest}"
        );

        let block_number = latest + 1;
        let Some(event) = self.sources.blocks.posted_block(block_number).await? else {
            return Ok(None);
        };
        ensure!(
            event.block.block_number == block_number,
            "source returned block {} for block {block_number}",
            event.block.block_number
        );
        ensure!(
            event.block.prev_block_hash == self.storage.latest_block().hash(),
            "block {block_number} does not extend block {latest}"
        );

        self.catch_up_deposits(&event.block).await?;

        let block_witness = self
            .storage
            .generate_block(&event.content, event.block)
            .with_context(|| format!("failed to generate witness of block {block_number}"))?;
        let validity_witness = self
            .storage
            .apply_block(block_witness, self.verifier.as_ref())
            .with_context(|| format!("failed to apply block {block_number}"))?;

        Ok(Some(PendingProof {
            block_number,
            block_hash: event.block.hash(),
            witness: validity_witness.compress(self.storage.next_account_id() - 1)?,
        }))
    }

    async fn prove(&self, pending: &PendingProof) -> Result<()> {
        let block_number = pending.block_number;
        let local = self.storage.validity_public_inputs(block_number)?;
        let prev_proof = self.sources.proofs.get(block_number - 1).await?;
        let proof = self
            .prover
            .prove(pending.block_hash, pending.witness.clone(), prev_proof.as_ref(), &local)
            .await?;

        let proven = proof.validity_public_inputs()?;
        if proven != local {
            bail!("public inputs of the proof of block {block_number} differ from the local transition");
        }

        self.sources.proofs.save(block_number, proof).await?;
        self.sources.cursor.advance(block_number).await?;
        info!(block_number, is_valid = local.is_valid_block, "block synced");
        Ok(())
    }

    /// Append deposits until the deposit tree root matches `block`
    async fn catch_up_deposits(&mut self, block: &PostedBlock) -> Result<()> {
        if self.storage.deposit_tree_root() == block.deposit_root {
            return Ok(());
        }
        let pending = self.sources.deposits.deposits_since(self.storage.deposit_count()).await?;
        for deposit in pending {
            let index = self.storage.add_deposit(deposit)?;
            if self.storage.deposit_tree_root() == block.deposit_root {
                debug!(block_number = block.block_number, deposits = index + 1, "deposit tree caught up");
                return Ok(());
            }
        }
        bail!(
            "deposit root {} of block {} not reached with {} known deposits",
            block.deposit_root,
            block.block_number,
            self.storage.deposit_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemoryBlockSource, MemoryCursor, MemoryDepositSource, MemoryProofStore, PostedBlockEvent};
    use rollup_core::trees::DepositLeaf;
    use rollup_core::{BlockContent, BlockSender, PermissiveVerifier, Sender, SenderType, U256};

    fn deposit(i: u8) -> DepositLeaf {
        DepositLeaf { recipient_salt_hash: Bytes32::repeat_byte(i), token_index: 1, amount: U256::from(i) }
    }

    fn content(sender_type: SenderType, senders: &[(u64, u64)]) -> BlockContent {
        BlockContent {
            sender_type,
            senders: senders
                .iter()
                .map(|(key, id)| BlockSender { public_key: Sender::Real(U256::from(*key)), account_id: *id, is_signed: true })
                .collect(),
            tx_tree_root: Bytes32::repeat_byte(1),
            agg_pubkey: Default::default(),
            agg_signature: Default::default(),
            message_point: Default::default(),
        }
    }

    /// Posted chain built on a separate storage: registration then update,
    /// with two deposits before block 1 and one before block 2
    fn chain() -> (Vec<DepositLeaf>, Vec<PostedBlockEvent>) {
        let mut shadow = BlockBuilderStorage::new();
        let deposits = vec![deposit(1), deposit(2), deposit(3)];
        let mut events = Vec::new();

        let contents = [
            (content(SenderType::PublicKey, &[(900, 0), (800, 0)]), 2),
            (content(SenderType::AccountId, &[(900, 2), (800, 3)]), 1),
        ];
        let mut fed = 0;
        for (content, new_deposits) in contents {
            for leaf in &deposits[fed..fed + new_deposits] {
                shadow.add_deposit(*leaf).unwrap();
            }
            fed += new_deposits;
            let block = content.to_posted_block(&shadow.latest_block(), shadow.deposit_tree_root()).unwrap();
            let witness = shadow.generate_block(&content, block).unwrap();
            shadow.apply_block(witness, &PermissiveVerifier).unwrap();
            events.push(PostedBlockEvent { block, content });
        }
        (deposits, events)
    }

    fn synchronizer(deposits: Vec<DepositLeaf>, events: Vec<PostedBlockEvent>) -> (ValiditySynchronizer, Collaborators) {
        let sources = Collaborators {
            blocks: Arc::new(MemoryBlockSource::new(events)),
            deposits: Arc::new(MemoryDepositSource::new(deposits)),
            cursor: Arc::new(MemoryCursor::default()),
            proofs: Arc::new(MemoryProofStore::default()),
        };
        let config = Config { fetch_interval: 0, ..Config::default() };
        (ValiditySynchronizer::new(config, sources.clone(), Arc::new(PermissiveVerifier)), sources)
    }

    #[tokio::test]
    async fn test_sync_all_blocks() {
        let (deposits, events) = chain();
        let (mut sync, sources) = synchronizer(deposits, events);

        assert_eq!(sync.sync_all().await.unwrap(), 2);
        assert_eq!(sources.cursor.last_processed().await.unwrap(), 2);
        assert_eq!(sync.storage().deposit_count(), 3);

        let proof = sources.proofs.get(2).await.unwrap().unwrap();
        let pis = proof.validity_public_inputs().unwrap();
        assert!(pis.is_valid_block);
        assert_eq!(pis, sync.storage().validity_public_inputs(2).unwrap());
        assert_eq!(sync.storage().copy_account_tree(2).unwrap().last_block_number(U256::from(900u64)), Some(2));
    }

    #[tokio::test]
    async fn test_waits_for_unposted_block() {
        let (deposits, mut events) = chain();
        events.truncate(1);
        let (mut sync, _) = synchronizer(deposits, events);

        assert_eq!(sync.sync_next().await.unwrap(), Some(1));
        assert_eq!(sync.sync_next().await.unwrap(), None);
        assert_eq!(sync.storage().latest_block_number(), 1);
    }

    #[tokio::test]
    async fn test_missing_deposits_fail_the_block() {
        let (deposits, events) = chain();
        let (mut sync, sources) = synchronizer(deposits[..1].to_vec(), events);

        assert!(sync.sync_next().await.is_err());
        assert_eq!(sync.storage().latest_block_number(), 0);
        assert_eq!(sources.cursor.last_processed().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (deposits, events) = chain();
        let (mut sync, sources) = synchronizer(deposits, events);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            sync.run(rx).await.unwrap();
            sync
        });
        while sources.cursor.last_processed().await.unwrap() < 2 {
            tokio::task::yield_now().await;
        }
        tx.send(true).unwrap();
        let sync = handle.await.unwrap();
        assert_eq!(sync.storage().latest_block_number(), 2);
    }
}
