//! Block builder storage: one tree snapshot per block number
//!
//! History is an append-only vector indexed by block number. A transition
//! works on clones of the latest snapshot and only pushes the result once
//! every proof has verified, so a failed block leaves history untouched.

use rollup_merkle::{Bytes32, IndexedInsertionProof, IndexedMembershipProof, MerkleError, U256};
use tracing::{debug, info, warn};

use crate::block::{BlockContent, PostedBlock};
use crate::error::{StorageError, WitnessError};
use crate::public_state::ValidityPublicInputs;
use crate::signature::AggregationVerifier;
use crate::trees::{
    sender_leaves, AccountTree, BlockHashLeaf, BlockHashMerkleProof, BlockHashTree, DepositLeaf, DepositMerkleProof,
    DepositTree,
};
use crate::types::{AccountId, BlockNumber, ACCOUNT_TREE_HEIGHT};
use crate::witness::{AccountMerkleProof, BlockWitness, SenderProofs, ValidityTransitionWitness, ValidityWitness};

/// Read access to historical trees
pub trait TreeHistory {
    fn latest_block_number(&self) -> BlockNumber;

    /// Deep copy of the account tree as of `block_number`
    fn copy_account_tree(&self, block_number: BlockNumber) -> Result<AccountTree, StorageError>;

    /// Deep copy of the block hash tree as of `block_number`
    fn copy_block_hash_tree(&self, block_number: BlockNumber) -> Result<BlockHashTree, StorageError>;

    /// Proof of block `leaf_block_number`'s hash under the block tree root of
    /// `root_block_number`
    fn block_tree_proof(
        &self,
        root_block_number: BlockNumber,
        leaf_block_number: BlockNumber,
    ) -> Result<BlockHashMerkleProof, StorageError>;

    /// Membership of `public_key` in the account tree as of `block_number`
    fn account_membership_proof(
        &self,
        block_number: BlockNumber,
        public_key: U256,
    ) -> Result<IndexedMembershipProof, StorageError>;

    /// Proof and root of deposit `deposit_index` in the deposit tree as of
    /// `block_number`
    fn deposit_tree_proof(
        &self,
        block_number: BlockNumber,
        deposit_index: u64,
    ) -> Result<(DepositMerkleProof, Bytes32), StorageError>;

    /// First block whose deposit root covers deposit `deposit_index`
    fn block_number_by_deposit_index(&self, deposit_index: u64) -> Result<BlockNumber, StorageError>;

    /// Owner of `account_id` as of `block_number`, `None` for an unassigned id
    fn public_key_by_account_id(
        &self,
        block_number: BlockNumber,
        account_id: AccountId,
    ) -> Result<Option<U256>, StorageError>;

    fn next_account_id_at(&self, block_number: BlockNumber) -> Result<AccountId, StorageError>;

    /// Account id, leaf and inclusion proof of a registered `public_key` as of
    /// `block_number`
    fn account_inclusion_proof(
        &self,
        block_number: BlockNumber,
        public_key: U256,
    ) -> Result<Option<(AccountId, AccountMerkleProof)>, StorageError>;
}

#[derive(Clone, Debug)]
struct BlockSnapshot {
    account_tree: AccountTree,
    block_hash_tree: BlockHashTree,
    /// Leading deposits covered by the block's deposit root
    deposit_count: u64,
    block: PostedBlock,
    public_inputs: ValidityPublicInputs,
}

/// Per-block history of the account and block hash trees plus the deposit
/// tree. Single writer: mutation takes `&mut self`.
#[derive(Debug)]
pub struct BlockBuilderStorage {
    history: Vec<BlockSnapshot>,
    deposit_tree: DepositTree,
}

impl Default for BlockBuilderStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockBuilderStorage {
    /// Storage holding only the genesis snapshot
    pub fn new() -> Self {
        let genesis = BlockSnapshot {
            account_tree: AccountTree::new(),
            block_hash_tree: BlockHashTree::new(),
            deposit_count: 0,
            block: PostedBlock::genesis(),
            public_inputs: ValidityPublicInputs::genesis(),
        };
        Self { history: vec![genesis], deposit_tree: DepositTree::new() }
    }

    fn latest(&self) -> &BlockSnapshot {
        self.history.last().unwrap_or_else(|| unreachable!("history always holds genesis"))
    }

    fn snapshot(&self, block_number: BlockNumber) -> Result<&BlockSnapshot, StorageError> {
        self.history
            .get(block_number as usize)
            .ok_or(StorageError::BlockNotFound(block_number))
    }

    /// Latest applied posted block
    pub fn latest_block(&self) -> PostedBlock {
        self.latest().block
    }

    pub fn posted_block(&self, block_number: BlockNumber) -> Result<PostedBlock, StorageError> {
        Ok(self.snapshot(block_number)?.block)
    }

    pub fn validity_public_inputs(&self, block_number: BlockNumber) -> Result<ValidityPublicInputs, StorageError> {
        Ok(self.snapshot(block_number)?.public_inputs)
    }

    /// Id the next registered account will receive
    pub fn next_account_id(&self) -> AccountId {
        self.latest().account_tree.next_account_id()
    }

    pub fn account_id(&self, public_key: U256, block_number: BlockNumber) -> Result<Option<AccountId>, StorageError> {
        Ok(self.snapshot(block_number)?.account_tree.account_id(public_key))
    }

    /// Append a deposit observed on L1, returning its index
    pub fn add_deposit(&mut self, leaf: DepositLeaf) -> Result<u64, StorageError> {
        let (index, root) = self.deposit_tree.push(leaf)?;
        debug!(index, %root, "deposit appended");
        Ok(index)
    }

    pub fn deposit_count(&self) -> u64 {
        self.deposit_tree.len()
    }

    pub fn deposit_tree_root(&self) -> Bytes32 {
        self.deposit_tree.root()
    }

    /// Build the block witness of `content` against the latest snapshot
    pub fn generate_block(&self, content: &BlockContent, block: PostedBlock) -> Result<BlockWitness, WitnessError> {
        let latest = self.latest();
        self.check_next(block.block_number)?;

        let signature = content.signature_content()?;
        if signature.hash() != block.signature_hash {
            warn!(block_number = block.block_number, "signature content does not hash to the posted signature hash");
        }

        let senders = content.padded_senders()?;
        let account_tree = &latest.account_tree;
        let sender_proofs = match content.account_id_packed()? {
            None => {
                let account_membership_proofs = senders
                    .iter()
                    .map(|s| account_tree.prove_membership(s.public_key.public_key()))
                    .collect::<Result<Vec<_>, _>>()?;
                SenderProofs::Registration { account_membership_proofs }
            }
            Some(account_id_packed) => {
                let account_merkle_proofs = account_id_packed
                    .unpack()
                    .into_iter()
                    .map(|id| {
                        Ok(AccountMerkleProof { merkle_proof: account_tree.prove(id)?, leaf: account_tree.get_leaf(id) })
                    })
                    .collect::<Result<Vec<_>, WitnessError>>()?;
                SenderProofs::NonRegistration { account_id_packed, account_merkle_proofs }
            }
        };

        Ok(BlockWitness {
            block,
            signature,
            public_keys: senders.iter().map(|s| s.public_key).collect(),
            prev_account_tree_root: latest.account_tree.root(),
            prev_block_tree_root: latest.block_hash_tree.root(),
            sender_proofs,
        })
    }

    /// Run the transition for `block_witness` and push the next snapshot.
    ///
    /// An invalid block still advances history: its hash enters the block
    /// tree and the account tree is carried over unchanged.
    pub fn apply_block(
        &mut self,
        block_witness: BlockWitness,
        verifier: &dyn AggregationVerifier,
    ) -> Result<ValidityWitness, WitnessError> {
        let block_number = block_witness.block.block_number;
        self.check_next(block_number)?;

        let latest = self.latest();
        let deposit_root = block_witness.block.deposit_root;
        let deposit_count = self
            .deposit_tree
            .prefix_len_with_root(latest.deposit_count, deposit_root)?
            .ok_or(StorageError::DepositRootNotFound { block_number, deposit_root })?;

        if block_witness.prev_account_tree_root != latest.account_tree.root() {
            return Err(WitnessError::PrevAccountTreeRootMismatch(block_number - 1));
        }
        if block_witness.prev_block_tree_root != latest.block_hash_tree.root() {
            return Err(WitnessError::PrevBlockTreeRootMismatch(block_number - 1));
        }

        let mut account_tree = latest.account_tree.clone();
        let mut block_hash_tree = latest.block_hash_tree.clone();

        let block_merkle_proof = block_hash_tree.prove(block_number)?;
        block_merkle_proof
            .verify(&BlockHashLeaf::default(), u64::from(block_number), &block_hash_tree.root())
            .map_err(|_| WitnessError::InvalidBlockMerkleProof)?;
        let block_hash = block_witness.block.hash();
        let block_tree_root = block_hash_tree.push(block_number, block_hash)?;
        block_merkle_proof
            .verify(&BlockHashLeaf(block_hash), u64::from(block_number), &block_tree_root)
            .map_err(|_| WitnessError::InvalidBlockMerkleProof)?;

        let main = block_witness.main_validation_public_inputs(verifier)?;
        let leaves = sender_leaves(&block_witness.public_keys, &block_witness.signature.sender_flag);

        let mut account_registration_proofs = None;
        let mut account_update_proofs = None;
        if main.is_valid && main.is_registration_block {
            let mut proofs = Vec::with_capacity(leaves.len());
            for leaf in &leaves {
                let last_block_number = if leaf.is_valid { block_number } else { 0 };
                let proof = if leaf.sender.is_dummy() {
                    IndexedInsertionProof::dummy(ACCOUNT_TREE_HEIGHT)
                } else {
                    let key = leaf.sender.public_key();
                    account_tree
                        .register(key, last_block_number)
                        .map_err(|e| WitnessError::Registration(key, e))?
                };
                proofs.push(proof);
            }
            account_registration_proofs = Some(proofs);
        }
        if main.is_valid && !main.is_registration_block {
            let mut proofs = Vec::with_capacity(leaves.len());
            for leaf in &leaves {
                let key = leaf.sender.public_key();
                let prev_last_block_number = account_tree
                    .last_block_number(key)
                    .ok_or(WitnessError::Update(key, MerkleError::KeyNotFound))?;
                let last_block_number = if leaf.is_valid { block_number } else { prev_last_block_number };
                let proof = account_tree
                    .update(key, last_block_number)
                    .map_err(|e| WitnessError::Update(key, e))?;
                proofs.push(proof);
            }
            account_update_proofs = Some(proofs);
        }

        let witness = ValidityWitness {
            block_witness,
            validity_transition_witness: ValidityTransitionWitness {
                sender_leaves: leaves,
                block_merkle_proof,
                account_registration_proofs,
                account_update_proofs,
            },
        };

        let public_inputs = witness.validity_public_inputs_from(&main)?;
        if public_inputs.public_state.account_tree_root != account_tree.root()
            || public_inputs.public_state.block_tree_root != block_tree_root
        {
            return Err(WitnessError::TransitionRootMismatch);
        }

        self.history.push(BlockSnapshot {
            account_tree,
            block_hash_tree,
            deposit_count,
            block: witness.block_witness.block,
            public_inputs,
        });

        info!(
            block_number,
            is_valid = main.is_valid,
            is_registration = main.is_registration_block,
            deposit_count,
            account_tree_root = %public_inputs.public_state.account_tree_root,
            "block applied"
        );

        Ok(witness)
    }

    fn check_next(&self, block_number: BlockNumber) -> Result<(), WitnessError> {
        let latest = self.latest_block_number();
        if latest.checked_add(1) != Some(block_number) {
            return Err(WitnessError::NonSequentialBlock { latest, actual: block_number });
        }
        Ok(())
    }
}

impl TreeHistory for BlockBuilderStorage {
    fn latest_block_number(&self) -> BlockNumber {
        (self.history.len() - 1) as BlockNumber
    }

    fn copy_account_tree(&self, block_number: BlockNumber) -> Result<AccountTree, StorageError> {
        Ok(self.snapshot(block_number)?.account_tree.clone())
    }

    fn copy_block_hash_tree(&self, block_number: BlockNumber) -> Result<BlockHashTree, StorageError> {
        Ok(self.snapshot(block_number)?.block_hash_tree.clone())
    }

    fn block_tree_proof(
        &self,
        root_block_number: BlockNumber,
        leaf_block_number: BlockNumber,
    ) -> Result<BlockHashMerkleProof, StorageError> {
        if root_block_number < leaf_block_number {
            return Err(StorageError::RootBeforeLeaf { root: root_block_number, leaf: leaf_block_number });
        }
        Ok(self.snapshot(root_block_number)?.block_hash_tree.prove(leaf_block_number)?)
    }

    fn account_membership_proof(
        &self,
        block_number: BlockNumber,
        public_key: U256,
    ) -> Result<IndexedMembershipProof, StorageError> {
        Ok(self.snapshot(block_number)?.account_tree.prove_membership(public_key)?)
    }

    fn deposit_tree_proof(
        &self,
        block_number: BlockNumber,
        deposit_index: u64,
    ) -> Result<(DepositMerkleProof, Bytes32), StorageError> {
        let count = self.snapshot(block_number)?.deposit_count;
        if deposit_index >= count {
            return Err(StorageError::DepositIndexOutOfRange { index: deposit_index, count, block_number });
        }
        let leaves = &self.deposit_tree.leaves()[..count as usize];
        Ok(DepositTree::compute_merkle_proof(deposit_index, leaves)?)
    }

    fn block_number_by_deposit_index(&self, deposit_index: u64) -> Result<BlockNumber, StorageError> {
        let position = self.history.partition_point(|s| s.deposit_count <= deposit_index);
        if position == self.history.len() {
            return Err(StorageError::DepositNotIncluded(deposit_index));
        }
        Ok(position as BlockNumber)
    }

    fn public_key_by_account_id(
        &self,
        block_number: BlockNumber,
        account_id: AccountId,
    ) -> Result<Option<U256>, StorageError> {
        let account_tree = &self.snapshot(block_number)?.account_tree;
        if account_id == 0 || account_id >= account_tree.len() {
            return Ok(None);
        }
        Ok(Some(account_tree.get_leaf(account_id).key))
    }

    fn next_account_id_at(&self, block_number: BlockNumber) -> Result<AccountId, StorageError> {
        Ok(self.snapshot(block_number)?.account_tree.next_account_id())
    }

    fn account_inclusion_proof(
        &self,
        block_number: BlockNumber,
        public_key: U256,
    ) -> Result<Option<(AccountId, AccountMerkleProof)>, StorageError> {
        let account_tree = &self.snapshot(block_number)?.account_tree;
        let Some(account_id) = account_tree.account_id(public_key) else {
            return Ok(None);
        };
        let proof =
            AccountMerkleProof { merkle_proof: account_tree.prove(account_id)?, leaf: account_tree.get_leaf(account_id) };
        Ok(Some((account_id, proof)))
    }
}
