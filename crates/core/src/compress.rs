//! Witness compression for the prover request
//!
//! Every account proof in a block touches leaves below `max_account_id`, so
//! the siblings above `bit_length(max_account_id)` are the same empty
//! subtrees for every sender. They are sent once as the common proof and
//! each per-sender proof keeps only its significant low siblings.

use rollup_merkle::{
    IndexedInsertionProof, IndexedMembershipProof, IndexedMerkleLeaf, IndexedMerkleProof, IndexedUpdateProof,
    PoseidonHashOut,
};
use serde::{Deserialize, Serialize};

use crate::block::PostedBlock;
use crate::error::WitnessError;
use crate::signature::SignatureContent;
use crate::trees::{BlockHashMerkleProof, SenderLeaf};
use crate::types::{AccountId, Sender, ACCOUNT_TREE_HEIGHT};
use crate::witness::{AccountMerkleProof, BlockWitness, SenderProofs, ValidityTransitionWitness, ValidityWitness};

/// Number of low siblings that differ between senders
pub fn significant_height(max_account_id: AccountId) -> usize {
    let bits = (u64::BITS - max_account_id.leading_zeros()) as usize;
    bits.min(ACCOUNT_TREE_HEIGHT)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressedBlockWitness {
    pub block: PostedBlock,
    pub signature: SignatureContent,
    #[serde(rename = "pubkeys")]
    pub public_keys: Vec<Sender>,
    pub prev_account_tree_root: PoseidonHashOut,
    pub prev_block_tree_root: PoseidonHashOut,
    /// Sender proofs with truncated siblings
    pub significant_sender_proofs: SenderProofs,
    pub common_account_merkle_proof: Vec<PoseidonHashOut>,
}

/// Insertion proof with truncated siblings. `None` marks a dummy proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignificantInsertionProof {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_leaf_proof: Option<IndexedMerkleProof>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaf_proof: Option<IndexedMerkleProof>,
    pub index: u64,
    pub low_leaf_index: u64,
    pub prev_low_leaf: IndexedMerkleLeaf,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressedValidityTransitionWitness {
    pub sender_leaves: Vec<SenderLeaf>,
    pub block_merkle_proof: BlockHashMerkleProof,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub significant_account_registration_proofs: Option<Vec<SignificantInsertionProof>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub significant_account_update_proofs: Option<Vec<IndexedUpdateProof>>,
    pub common_account_merkle_proof: Vec<PoseidonHashOut>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressedValidityWitness {
    pub block_witness: CompressedBlockWitness,
    pub validity_transition_witness: CompressedValidityTransitionWitness,
}

/// Splits proofs at the significant height and checks the upper parts agree
struct Splitter {
    height: usize,
    common: Option<Vec<PoseidonHashOut>>,
}

impl Splitter {
    const fn new(height: usize) -> Self {
        Self { height, common: None }
    }

    fn split(&mut self, proof: &IndexedMerkleProof) -> Result<IndexedMerkleProof, WitnessError> {
        if proof.siblings.len() != ACCOUNT_TREE_HEIGHT {
            return Err(WitnessError::LengthMismatch {
                what: "account proof siblings",
                expected: ACCOUNT_TREE_HEIGHT,
                actual: proof.siblings.len(),
            });
        }
        let (low, high) = proof.siblings.split_at(self.height);
        match &self.common {
            Some(common) if common.as_slice() != high => return Err(WitnessError::CommonSiblingsMismatch),
            Some(_) => {}
            None => self.common = Some(high.to_vec()),
        }
        Ok(IndexedMerkleProof { siblings: low.to_vec() })
    }

    fn finish(self) -> Vec<PoseidonHashOut> {
        self.common.unwrap_or_default()
    }
}

fn join(proof: &IndexedMerkleProof, common: &[PoseidonHashOut]) -> Result<IndexedMerkleProof, WitnessError> {
    let actual = proof.siblings.len() + common.len();
    if actual != ACCOUNT_TREE_HEIGHT {
        return Err(WitnessError::LengthMismatch { what: "account proof siblings", expected: ACCOUNT_TREE_HEIGHT, actual });
    }
    let mut siblings = proof.siblings.clone();
    siblings.extend_from_slice(common);
    Ok(IndexedMerkleProof { siblings })
}

impl BlockWitness {
    pub fn compress(&self, max_account_id: AccountId) -> Result<CompressedBlockWitness, WitnessError> {
        let mut splitter = Splitter::new(significant_height(max_account_id));
        let significant_sender_proofs = match &self.sender_proofs {
            SenderProofs::Registration { account_membership_proofs } => SenderProofs::Registration {
                account_membership_proofs: account_membership_proofs
                    .iter()
                    .map(|p| -> Result<_, WitnessError> {
                        Ok(IndexedMembershipProof { leaf_proof: splitter.split(&p.leaf_proof)?, ..p.clone() })
                    })
                    .collect::<Result<_, WitnessError>>()?,
            },
            SenderProofs::NonRegistration { account_id_packed, account_merkle_proofs } => SenderProofs::NonRegistration {
                account_id_packed: account_id_packed.clone(),
                account_merkle_proofs: account_merkle_proofs
                    .iter()
                    .map(|p| -> Result<_, WitnessError> {
                        Ok(AccountMerkleProof { merkle_proof: splitter.split(&p.merkle_proof)?, leaf: p.leaf.clone() })
                    })
                    .collect::<Result<_, WitnessError>>()?,
            },
        };

        Ok(CompressedBlockWitness {
            block: self.block,
            signature: self.signature.clone(),
            public_keys: self.public_keys.clone(),
            prev_account_tree_root: self.prev_account_tree_root,
            prev_block_tree_root: self.prev_block_tree_root,
            significant_sender_proofs,
            common_account_merkle_proof: splitter.finish(),
        })
    }
}

impl CompressedBlockWitness {
    pub fn decompress(&self) -> Result<BlockWitness, WitnessError> {
        let common = &self.common_account_merkle_proof;
        let sender_proofs = match &self.significant_sender_proofs {
            SenderProofs::Registration { account_membership_proofs } => SenderProofs::Registration {
                account_membership_proofs: account_membership_proofs
                    .iter()
                    .map(|p| -> Result<_, WitnessError> {
                        Ok(IndexedMembershipProof { leaf_proof: join(&p.leaf_proof, common)?, ..p.clone() })
                    })
                    .collect::<Result<_, WitnessError>>()?,
            },
            SenderProofs::NonRegistration { account_id_packed, account_merkle_proofs } => SenderProofs::NonRegistration {
                account_id_packed: account_id_packed.clone(),
                account_merkle_proofs: account_merkle_proofs
                    .iter()
                    .map(|p| -> Result<_, WitnessError> {
                        Ok(AccountMerkleProof { merkle_proof: join(&p.merkle_proof, common)?, leaf: p.leaf.clone() })
                    })
                    .collect::<Result<_, WitnessError>>()?,
            },
        };

        Ok(BlockWitness {
            block: self.block,
            signature: self.signature.clone(),
            public_keys: self.public_keys.clone(),
            prev_account_tree_root: self.prev_account_tree_root,
            prev_block_tree_root: self.prev_block_tree_root,
            sender_proofs,
        })
    }
}

impl ValidityTransitionWitness {
    pub fn compress(&self, max_account_id: AccountId) -> Result<CompressedValidityTransitionWitness, WitnessError> {
        let mut splitter = Splitter::new(significant_height(max_account_id));

        let significant_account_registration_proofs = self
            .account_registration_proofs
            .as_ref()
            .map(|proofs| {
                proofs
                    .iter()
                    .map(|p| -> Result<_, WitnessError> {
                        let (low_leaf_proof, leaf_proof) = if p.is_dummy() {
                            (None, None)
                        } else {
                            (Some(splitter.split(&p.low_leaf_proof)?), Some(splitter.split(&p.leaf_proof)?))
                        };
                        Ok(SignificantInsertionProof {
                            low_leaf_proof,
                            leaf_proof,
                            index: p.index,
                            low_leaf_index: p.low_leaf_index,
                            prev_low_leaf: p.prev_low_leaf.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>, WitnessError>>()
            })
            .transpose()?;

        let significant_account_update_proofs = self
            .account_update_proofs
            .as_ref()
            .map(|proofs| {
                proofs
                    .iter()
                    .map(|p| -> Result<_, WitnessError> {
                        Ok(IndexedUpdateProof { leaf_proof: splitter.split(&p.leaf_proof)?, ..p.clone() })
                    })
                    .collect::<Result<Vec<_>, WitnessError>>()
            })
            .transpose()?;

        Ok(CompressedValidityTransitionWitness {
            sender_leaves: self.sender_leaves.clone(),
            block_merkle_proof: self.block_merkle_proof.clone(),
            significant_account_registration_proofs,
            significant_account_update_proofs,
            common_account_merkle_proof: splitter.finish(),
        })
    }
}

impl CompressedValidityTransitionWitness {
    pub fn decompress(&self) -> Result<ValidityTransitionWitness, WitnessError> {
        let common = &self.common_account_merkle_proof;

        let account_registration_proofs = self
            .significant_account_registration_proofs
            .as_ref()
            .map(|proofs| {
                proofs
                    .iter()
                    .map(|p| -> Result<_, WitnessError> {
                        let restore = |proof: &Option<IndexedMerkleProof>| match proof {
                            Some(proof) => join(proof, common),
                            None => Ok(IndexedMerkleProof::dummy(ACCOUNT_TREE_HEIGHT)),
                        };
                        Ok(IndexedInsertionProof {
                            index: p.index,
                            low_leaf_proof: restore(&p.low_leaf_proof)?,
                            leaf_proof: restore(&p.leaf_proof)?,
                            low_leaf_index: p.low_leaf_index,
                            prev_low_leaf: p.prev_low_leaf.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>, WitnessError>>()
            })
            .transpose()?;

        let account_update_proofs = self
            .significant_account_update_proofs
            .as_ref()
            .map(|proofs| {
                proofs
                    .iter()
                    .map(|p| -> Result<_, WitnessError> {
                        Ok(IndexedUpdateProof { leaf_proof: join(&p.leaf_proof, common)?, ..p.clone() })
                    })
                    .collect::<Result<Vec<_>, WitnessError>>()
            })
            .transpose()?;

        Ok(ValidityTransitionWitness {
            sender_leaves: self.sender_leaves.clone(),
            block_merkle_proof: self.block_merkle_proof.clone(),
            account_registration_proofs,
            account_update_proofs,
        })
    }
}

impl ValidityWitness {
    /// Compress for a prover that knows accounts up to `max_account_id`
    pub fn compress(&self, max_account_id: AccountId) -> Result<CompressedValidityWitness, WitnessError> {
        Ok(CompressedValidityWitness {
            block_witness: self.block_witness.compress(max_account_id)?,
            validity_transition_witness: self.validity_transition_witness.compress(max_account_id)?,
        })
    }
}

impl CompressedValidityWitness {
    pub fn decompress(&self) -> Result<ValidityWitness, WitnessError> {
        Ok(ValidityWitness {
            block_witness: self.block_witness.decompress()?,
            validity_transition_witness: self.validity_transition_witness.decompress()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::PermissiveVerifier;
    use crate::storage::BlockBuilderStorage;
    use crate::test_utils::{non_registration, post, registration, KEY_A, KEY_B};

    fn apply(storage: &mut BlockBuilderStorage, content: &crate::block::BlockContent) -> ValidityWitness {
        let witness = storage.generate_block(content, post(storage, content)).unwrap();
        storage.apply_block(witness, &PermissiveVerifier).unwrap()
    }

    #[test]
    fn test_compress_registration_block() {
        let mut storage = BlockBuilderStorage::new();
        let witness = apply(&mut storage, &registration(&[KEY_A, KEY_B]));
        let max_account_id = storage.next_account_id() - 1;

        let compressed = witness.compress(max_account_id).unwrap();
        let transition = &compressed.validity_transition_witness;
        assert_eq!(transition.common_account_merkle_proof.len(), ACCOUNT_TREE_HEIGHT - 2);
        let proofs = transition.significant_account_registration_proofs.as_ref().unwrap();
        assert!(proofs[0].leaf_proof.is_some());
        assert!(proofs[2].leaf_proof.is_none());

        let restored = compressed.decompress().unwrap();
        assert_eq!(restored, witness);
        assert_eq!(
            restored.validity_public_inputs(&PermissiveVerifier).unwrap(),
            storage.validity_public_inputs(1).unwrap()
        );
    }

    #[test]
    fn test_compress_update_block() {
        let mut storage = BlockBuilderStorage::new();
        apply(&mut storage, &registration(&[KEY_A, KEY_B]));
        let witness = apply(&mut storage, &non_registration(&[(KEY_A, 2, true), (KEY_B, 3, true)]));

        let compressed = witness.compress(storage.next_account_id() - 1).unwrap();
        assert!(compressed.validity_transition_witness.significant_account_registration_proofs.is_none());
        let json = serde_json::to_string(&compressed).unwrap();
        let back: CompressedValidityWitness = serde_json::from_str(&json).unwrap();
        assert_eq!(back.decompress().unwrap(), witness);
    }

    #[test]
    fn test_too_small_max_account_id_is_detected() {
        let mut storage = BlockBuilderStorage::new();
        let witness = apply(&mut storage, &registration(&[KEY_A, KEY_B]));
        assert_eq!(witness.compress(1), Err(WitnessError::CommonSiblingsMismatch));
    }

    #[test]
    fn test_significant_height() {
        assert_eq!(significant_height(0), 0);
        assert_eq!(significant_height(1), 1);
        assert_eq!(significant_height(2), 2);
        assert_eq!(significant_height(255), 8);
        assert_eq!(significant_height(256), 9);
        assert_eq!(significant_height(u64::MAX), ACCOUNT_TREE_HEIGHT);
    }

    #[test]
    fn test_split_rejects_divergent_upper_siblings() {
        let mut splitter = Splitter::new(2);
        let a = IndexedMerkleProof::dummy(ACCOUNT_TREE_HEIGHT);
        let mut b = a.clone();
        b.siblings[10] = PoseidonHashOut::hash_inputs_u64(&[1]);

        assert_eq!(splitter.split(&a).unwrap().siblings.len(), 2);
        assert_eq!(splitter.split(&b), Err(WitnessError::CommonSiblingsMismatch));
    }

    #[test]
    fn test_join_restores_height() {
        let proof = IndexedMerkleProof { siblings: vec![PoseidonHashOut::default(); 3] };
        let common = vec![PoseidonHashOut::hash_inputs_u64(&[2]); ACCOUNT_TREE_HEIGHT - 3];
        let joined = join(&proof, &common).unwrap();
        assert_eq!(joined.siblings.len(), ACCOUNT_TREE_HEIGHT);
        assert_eq!(joined.siblings[3], common[0]);
        assert!(join(&proof, &common[1..]).is_err());
    }
}
