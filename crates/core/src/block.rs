//! Posted blocks and decoded block content

use std::sync::OnceLock;

use rollup_merkle::{Bytes32, Keccak256Hasher, U256};
use serde::{Deserialize, Serialize};

use crate::account_id::AccountIdPacked;
use crate::error::WitnessError;
use crate::signature::{pubkey_hash, sender_flag_from_bits, G1Point, G2Point, SignatureContent};
use crate::trees::DepositTree;
use crate::types::{AccountId, BlockNumber, Sender, DUMMY_ACCOUNT_ID, NUM_SENDERS_IN_BLOCK};

/// Block header as posted to the rollup contract
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostedBlock {
    pub prev_block_hash: Bytes32,
    pub deposit_root: Bytes32,
    pub signature_hash: Bytes32,
    pub block_number: BlockNumber,
}

impl PostedBlock {
    /// Block 0: no parent, empty deposit tree, no signature
    pub fn genesis() -> Self {
        static EMPTY_DEPOSIT_ROOT: OnceLock<Bytes32> = OnceLock::new();
        Self {
            prev_block_hash: Bytes32::ZERO,
            deposit_root: *EMPTY_DEPOSIT_ROOT.get_or_init(|| DepositTree::new().root()),
            signature_hash: Bytes32::ZERO,
            block_number: 0,
        }
    }

    pub fn is_genesis(&self) -> bool {
        *self == Self::genesis()
    }

    /// keccak(prev ‖ deposit root ‖ signature hash ‖ block number)
    pub fn hash(&self) -> Bytes32 {
        let mut bytes = Vec::with_capacity(100);
        bytes.extend_from_slice(self.prev_block_hash.as_slice());
        bytes.extend_from_slice(self.deposit_root.as_slice());
        bytes.extend_from_slice(self.signature_hash.as_slice());
        bytes.extend_from_slice(&self.block_number.to_be_bytes());
        Keccak256Hasher::hash(&bytes)
    }
}

/// How senders are referenced in the block calldata
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SenderType {
    /// First appearance, senders are raw public keys
    PublicKey,
    /// Senders are account ids of registered keys
    AccountId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSender {
    pub public_key: Sender,
    /// Ignored for registration blocks
    pub account_id: AccountId,
    pub is_signed: bool,
}

impl BlockSender {
    /// Padding slot
    pub const fn dummy() -> Self {
        Self { public_key: Sender::Dummy, account_id: DUMMY_ACCOUNT_ID, is_signed: false }
    }
}

/// Block content decoded from calldata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockContent {
    pub sender_type: SenderType,
    /// At most [`NUM_SENDERS_IN_BLOCK`], padded with dummies on use
    pub senders: Vec<BlockSender>,
    pub tx_tree_root: Bytes32,
    pub agg_pubkey: G1Point,
    pub agg_signature: G2Point,
    pub message_point: G2Point,
}

impl BlockContent {
    pub const fn is_registration_block(&self) -> bool {
        matches!(self.sender_type, SenderType::PublicKey)
    }

    /// Senders padded with dummies to [`NUM_SENDERS_IN_BLOCK`]
    pub fn padded_senders(&self) -> Result<Vec<BlockSender>, WitnessError> {
        if self.senders.len() > NUM_SENDERS_IN_BLOCK {
            return Err(WitnessError::TooManySenders(self.senders.len()));
        }
        let mut senders = self.senders.clone();
        senders.resize(NUM_SENDERS_IN_BLOCK, BlockSender::dummy());
        Ok(senders)
    }

    /// Padded sender public keys
    pub fn public_keys(&self) -> Result<Vec<Sender>, WitnessError> {
        Ok(self.padded_senders()?.iter().map(|s| s.public_key).collect())
    }

    /// Packed account ids, only for account id blocks
    pub fn account_id_packed(&self) -> Result<Option<AccountIdPacked>, WitnessError> {
        if self.is_registration_block() {
            return Ok(None);
        }
        let ids: Vec<AccountId> = self.padded_senders()?.iter().map(|s| s.account_id).collect();
        AccountIdPacked::pack(&ids).map(Some)
    }

    /// Signature content committed by the posted block
    pub fn signature_content(&self) -> Result<SignatureContent, WitnessError> {
        let senders = self.padded_senders()?;
        let public_keys: Vec<U256> = senders.iter().map(|s| s.public_key.public_key()).collect();
        let flags: Vec<bool> = senders.iter().map(|s| s.is_signed).collect();
        let account_id_hash = self.account_id_packed()?.map(|p| p.hash()).unwrap_or_default();

        Ok(SignatureContent {
            is_registration_block: self.is_registration_block(),
            tx_tree_root: self.tx_tree_root,
            sender_flag: sender_flag_from_bits(&flags),
            pubkey_hash: pubkey_hash(&public_keys),
            account_id_hash,
            agg_pubkey: self.agg_pubkey,
            agg_signature: self.agg_signature,
            message_point: self.message_point,
        })
    }

    /// Posted block header for this content on top of `prev`
    pub fn to_posted_block(&self, prev: &PostedBlock, deposit_root: Bytes32) -> Result<PostedBlock, WitnessError> {
        Ok(PostedBlock {
            prev_block_hash: prev.hash(),
            deposit_root,
            signature_hash: self.signature_content()?.hash(),
            block_number: prev.block_number + 1,
        })
    }
}
