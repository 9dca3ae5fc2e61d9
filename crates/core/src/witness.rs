//! Validity witness state machine
//!
//! A [`BlockWitness`] is the evidence for one posted block. Main validation
//! turns it into [`MainValidationPublicInputs`], deciding whether the block
//! is valid. A [`ValidityTransitionWitness`] carries the account tree and
//! block hash tree proofs that move the public state from block `n - 1` to
//! block `n`. Together they form the [`ValidityWitness`] consumed by the
//! prover.

use rollup_merkle::{
    Bytes32, IndexedInsertionProof, IndexedMembershipProof, IndexedMerkleLeaf, IndexedMerkleProof,
    IndexedUpdateProof, MerkleError, PoseidonHashOut, U256,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::account_id::AccountIdPacked;
use crate::block::PostedBlock;
use crate::error::WitnessError;
use crate::public_state::{PublicState, ValidityPublicInputs};
use crate::signature::{pubkey_hash, AggregationVerifier, SignatureContent};
use crate::trees::{sender_leaves, sender_tree_root, BlockHashLeaf, BlockHashMerkleProof, SenderLeaf};
use crate::types::{AccountId, BlockNumber, Sender, NUM_SENDERS_IN_BLOCK};

/// Proof that a public key owns the leaf at a given account id
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountMerkleProof {
    pub merkle_proof: IndexedMerkleProof,
    pub leaf: IndexedMerkleLeaf,
}

impl AccountMerkleProof {
    pub fn verify(
        &self,
        account_tree_root: &PoseidonHashOut,
        account_id: AccountId,
        public_key: U256,
    ) -> Result<(), MerkleError> {
        self.merkle_proof.verify(&self.leaf, account_id, account_tree_root)?;
        if self.leaf.key != public_key {
            return Err(MerkleError::KeyMismatch);
        }
        Ok(())
    }
}

/// Account proofs of a block, by sender type
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SenderProofs {
    /// Every sender must be absent from the account tree
    Registration { account_membership_proofs: Vec<IndexedMembershipProof> },
    /// Every sender must own the account id it is posted with
    NonRegistration { account_id_packed: AccountIdPacked, account_merkle_proofs: Vec<AccountMerkleProof> },
}

impl SenderProofs {
    pub const fn is_registration(&self) -> bool {
        matches!(self, Self::Registration { .. })
    }
}

/// Evidence for one posted block
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockWitness {
    pub block: PostedBlock,
    pub signature: SignatureContent,
    #[serde(rename = "pubkeys")]
    pub public_keys: Vec<Sender>,
    pub prev_account_tree_root: PoseidonHashOut,
    pub prev_block_tree_root: PoseidonHashOut,
    pub sender_proofs: SenderProofs,
}

/// Result of main validation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainValidationPublicInputs {
    pub prev_block_hash: Bytes32,
    pub block_hash: Bytes32,
    pub deposit_tree_root: Bytes32,
    pub account_tree_root: PoseidonHashOut,
    pub tx_tree_root: Bytes32,
    pub sender_tree_root: PoseidonHashOut,
    pub block_number: BlockNumber,
    pub is_registration_block: bool,
    pub is_valid: bool,
}

impl MainValidationPublicInputs {
    fn genesis() -> Self {
        let pis = ValidityPublicInputs::genesis();
        Self {
            prev_block_hash: PostedBlock::genesis().prev_block_hash,
            block_hash: pis.public_state.block_hash,
            deposit_tree_root: pis.public_state.deposit_tree_root,
            account_tree_root: pis.public_state.account_tree_root,
            tx_tree_root: pis.tx_tree_root,
            sender_tree_root: pis.sender_tree_root,
            block_number: 0,
            is_registration_block: false,
            is_valid: pis.is_valid_block,
        }
    }
}

impl BlockWitness {
    fn raw_public_keys(&self) -> Vec<U256> {
        self.public_keys.iter().map(Sender::public_key).collect()
    }

    /// Decide validity of the block.
    ///
    /// Malformed or improperly signed blocks yield `is_valid = false`. An
    /// error means the witness itself is inconsistent and the block cannot
    /// be processed.
    pub fn main_validation_public_inputs(
        &self,
        verifier: &dyn AggregationVerifier,
    ) -> Result<MainValidationPublicInputs, WitnessError> {
        if self.block.is_genesis() {
            return Ok(MainValidationPublicInputs::genesis());
        }
        if self.public_keys.len() != NUM_SENDERS_IN_BLOCK {
            return Err(WitnessError::LengthMismatch {
                what: "public keys",
                expected: NUM_SENDERS_IN_BLOCK,
                actual: self.public_keys.len(),
            });
        }

        let public_keys = self.raw_public_keys();
        let account_tree_root = self.prev_account_tree_root;
        let is_registration_block = self.signature.is_registration_block;

        let mut is_valid = self.signature.pubkey_hash == pubkey_hash(&public_keys);
        if self.sender_proofs.is_registration() != is_registration_block {
            debug!(block_number = self.block.block_number, "sender proofs do not match the block kind");
            is_valid = false;
        }

        match &self.sender_proofs {
            SenderProofs::Registration { account_membership_proofs } => {
                check_len("account membership proofs", account_membership_proofs.len())?;
                for (proof, sender) in account_membership_proofs.iter().zip(&self.public_keys) {
                    proof
                        .verify(sender.public_key(), &account_tree_root)
                        .map_err(WitnessError::InvalidMembershipProof)?;
                    is_valid &= !proof.is_included || sender.is_dummy();
                }
            }
            SenderProofs::NonRegistration { account_id_packed, account_merkle_proofs } => {
                check_len("account merkle proofs", account_merkle_proofs.len())?;
                is_valid &= account_id_packed.hash() == self.signature.account_id_hash;
                let account_ids = account_id_packed.unpack();
                for ((proof, account_id), sender) in account_merkle_proofs.iter().zip(account_ids).zip(&self.public_keys) {
                    is_valid &= proof.verify(&account_tree_root, account_id, sender.public_key()).is_ok();
                }
            }
        }

        if let Err(e) = self.signature.is_valid_format(&public_keys) {
            debug!(block_number = self.block.block_number, error = %e, "invalid signature format");
            is_valid = false;
        }
        if is_valid {
            is_valid = verifier.verify_aggregation(&self.signature, &public_keys);
        }

        let leaves = sender_leaves(&self.public_keys, &self.signature.sender_flag);

        Ok(MainValidationPublicInputs {
            prev_block_hash: self.block.prev_block_hash,
            block_hash: self.block.hash(),
            deposit_tree_root: self.block.deposit_root,
            account_tree_root,
            tx_tree_root: self.signature.tx_tree_root,
            sender_tree_root: sender_tree_root(&leaves)?,
            block_number: self.block.block_number,
            is_registration_block,
            is_valid,
        })
    }
}

fn check_len(what: &'static str, actual: usize) -> Result<(), WitnessError> {
    if actual != NUM_SENDERS_IN_BLOCK {
        return Err(WitnessError::LengthMismatch { what, expected: NUM_SENDERS_IN_BLOCK, actual });
    }
    Ok(())
}

/// Account tree and block hash tree proofs of one transition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityTransitionWitness {
    pub sender_leaves: Vec<SenderLeaf>,
    /// Proof of the empty slot at the new block number
    pub block_merkle_proof: BlockHashMerkleProof,
    /// Present for a valid registration block
    pub account_registration_proofs: Option<Vec<IndexedInsertionProof>>,
    /// Present for a valid non-registration block
    pub account_update_proofs: Option<Vec<IndexedUpdateProof>>,
}

/// Everything the prover needs for one block
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityWitness {
    pub block_witness: BlockWitness,
    pub validity_transition_witness: ValidityTransitionWitness,
}

impl ValidityWitness {
    pub fn validity_public_inputs(
        &self,
        verifier: &dyn AggregationVerifier,
    ) -> Result<ValidityPublicInputs, WitnessError> {
        let main = self.block_witness.main_validation_public_inputs(verifier)?;
        self.validity_public_inputs_from(&main)
    }

    /// Apply the transition proofs on top of an already computed main
    /// validation. Any proof failure here is fatal.
    pub fn validity_public_inputs_from(
        &self,
        main: &MainValidationPublicInputs,
    ) -> Result<ValidityPublicInputs, WitnessError> {
        if self.block_witness.block.is_genesis() {
            return Ok(ValidityPublicInputs::genesis());
        }

        let transition = &self.validity_transition_witness;
        let block_number = main.block_number;
        let prev_block_tree_root = self.block_witness.prev_block_tree_root;

        transition
            .block_merkle_proof
            .verify(&BlockHashLeaf::default(), u64::from(block_number), &prev_block_tree_root)
            .map_err(|_| WitnessError::InvalidBlockMerkleProof)?;
        let block_tree_root =
            transition.block_merkle_proof.get_root(&BlockHashLeaf(main.block_hash), u64::from(block_number));

        let mut account_tree_root = main.account_tree_root;
        if main.is_valid && main.is_registration_block {
            let proofs = transition
                .account_registration_proofs
                .as_ref()
                .ok_or(WitnessError::MissingProofs("account registration"))?;
            check_len("account registration proofs", proofs.len())?;
            for (leaf, proof) in transition.sender_leaves.iter().zip(proofs) {
                let last_block_number = if leaf.is_valid { block_number } else { 0 };
                let key = leaf.sender.public_key();
                account_tree_root = proof
                    .conditional_get_new_root(!leaf.sender.is_dummy(), key, u64::from(last_block_number), &account_tree_root)
                    .map_err(|e| WitnessError::Registration(key, e))?;
            }
        }
        if main.is_valid && !main.is_registration_block {
            let proofs = transition
                .account_update_proofs
                .as_ref()
                .ok_or(WitnessError::MissingProofs("account update"))?;
            check_len("account update proofs", proofs.len())?;
            for (leaf, proof) in transition.sender_leaves.iter().zip(proofs) {
                let prev_last_block_number = proof.prev_leaf.value;
                let last_block_number =
                    if leaf.is_valid { u64::from(block_number) } else { prev_last_block_number };
                let key = leaf.sender.public_key();
                account_tree_root = proof
                    .get_new_root(key, prev_last_block_number, last_block_number, &account_tree_root)
                    .map_err(|e| WitnessError::Update(key, e))?;
            }
        }

        Ok(ValidityPublicInputs {
            public_state: PublicState {
                block_tree_root,
                prev_account_tree_root: main.account_tree_root,
                account_tree_root,
                deposit_tree_root: main.deposit_tree_root,
                block_hash: main.block_hash,
                block_number,
            },
            tx_tree_root: main.tx_tree_root,
            sender_tree_root: main.sender_tree_root,
            is_valid_block: main.is_valid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::PermissiveVerifier;
    use crate::storage::{BlockBuilderStorage, TreeHistory};
    use crate::test_utils::{key, non_registration, post, registration, KEY_A, KEY_B};

    fn registration_witness() -> (BlockBuilderStorage, BlockWitness) {
        let storage = BlockBuilderStorage::new();
        let content = registration(&[KEY_A, KEY_B]);
        let witness = storage.generate_block(&content, post(&storage, &content)).unwrap();
        (storage, witness)
    }

    #[test]
    fn test_main_validation_of_registration_block() {
        let (_, witness) = registration_witness();
        let main = witness.main_validation_public_inputs(&PermissiveVerifier).unwrap();
        assert!(main.is_valid);
        assert!(main.is_registration_block);
        assert_eq!(main.block_number, 1);
        assert_eq!(main.block_hash, witness.block.hash());
        assert_eq!(main.account_tree_root, witness.prev_account_tree_root);
    }

    #[test]
    fn test_tampered_membership_proof_is_fatal() {
        let (_, mut witness) = registration_witness();
        let SenderProofs::Registration { account_membership_proofs } = &mut witness.sender_proofs else {
            panic!("expected registration proofs");
        };
        account_membership_proofs[0].leaf_proof.siblings[0] = PoseidonHashOut::hash_inputs_u64(&[7]);

        assert!(matches!(
            witness.main_validation_public_inputs(&PermissiveVerifier),
            Err(WitnessError::InvalidMembershipProof(_))
        ));
    }

    #[test]
    fn test_pubkey_hash_mismatch_is_invalid() {
        let (_, mut witness) = registration_witness();
        witness.signature.pubkey_hash = Bytes32::repeat_byte(1);
        assert!(!witness.main_validation_public_inputs(&PermissiveVerifier).unwrap().is_valid);
    }

    #[test]
    fn test_sender_kind_mismatch_is_invalid() {
        let (mut storage, witness) = registration_witness();
        storage.apply_block(witness, &PermissiveVerifier).unwrap();

        let content = non_registration(&[(KEY_A, 2, true)]);
        let mut witness = storage.generate_block(&content, post(&storage, &content)).unwrap();
        witness.signature.is_registration_block = true;
        assert!(!witness.main_validation_public_inputs(&PermissiveVerifier).unwrap().is_valid);
    }

    #[test]
    fn test_wrong_public_key_count_is_fatal() {
        let (_, mut witness) = registration_witness();
        witness.public_keys.pop();
        assert!(matches!(
            witness.main_validation_public_inputs(&PermissiveVerifier),
            Err(WitnessError::LengthMismatch { what: "public keys", .. })
        ));
    }

    #[test]
    fn test_account_merkle_proof_checks_key() {
        let (mut storage, witness) = registration_witness();
        storage.apply_block(witness, &PermissiveVerifier).unwrap();
        let tree = storage.copy_account_tree(1).unwrap();

        let proof = AccountMerkleProof { merkle_proof: tree.prove(2).unwrap(), leaf: tree.get_leaf(2) };
        proof.verify(&tree.root(), 2, key(KEY_A)).unwrap();
        assert_eq!(proof.verify(&tree.root(), 2, key(KEY_B)), Err(MerkleError::KeyMismatch));
        assert!(proof.verify(&tree.root(), 3, key(KEY_A)).is_err());
    }

    #[test]
    fn test_transition_requires_empty_block_slot() {
        let (mut storage, witness) = registration_witness();
        let mut validity_witness = storage.apply_block(witness, &PermissiveVerifier).unwrap();
        validity_witness.block_witness.prev_block_tree_root = PoseidonHashOut::hash_inputs_u64(&[1]);
        assert_eq!(
            validity_witness.validity_public_inputs(&PermissiveVerifier).unwrap_err(),
            WitnessError::InvalidBlockMerkleProof
        );
    }

    #[test]
    fn test_transition_requires_proofs_for_valid_block() {
        let (mut storage, witness) = registration_witness();
        let mut validity_witness = storage.apply_block(witness, &PermissiveVerifier).unwrap();
        validity_witness.validity_transition_witness.account_registration_proofs = None;
        assert_eq!(
            validity_witness.validity_public_inputs(&PermissiveVerifier).unwrap_err(),
            WitnessError::MissingProofs("account registration")
        );
    }

    #[test]
    fn test_serde_roundtrip_keeps_witness() {
        let (_, witness) = registration_witness();
        let json = serde_json::to_value(&witness).unwrap();
        assert_eq!(json["senderProofs"]["kind"], "registration");
        assert!(json["pubkeys"].is_array());
        let back: BlockWitness = serde_json::from_value(json).unwrap();
        assert_eq!(back, witness);
    }
}
