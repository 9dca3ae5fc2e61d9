//! Block fixtures shared by the storage, witness and compression tests

use rollup_merkle::{Bytes32, U256};

use crate::block::{BlockContent, BlockSender, PostedBlock, SenderType};
use crate::signature::{AggregationVerifier, SignatureContent};
use crate::storage::BlockBuilderStorage;
use crate::types::{AccountId, Sender};

pub(crate) const KEY_A: u64 = 3000;
pub(crate) const KEY_B: u64 = 2000;

pub(crate) fn key(x: u64) -> U256 {
    U256::from(x)
}

/// Registration block of signed senders; `keys` must be descending
pub(crate) fn registration(keys: &[u64]) -> BlockContent {
    content(
        SenderType::PublicKey,
        keys.iter()
            .map(|k| BlockSender { public_key: Sender::Real(key(*k)), account_id: 0, is_signed: true })
            .collect(),
    )
}

/// Account id block from `(public key, claimed account id, signed)`
pub(crate) fn non_registration(senders: &[(u64, AccountId, bool)]) -> BlockContent {
    content(
        SenderType::AccountId,
        senders
            .iter()
            .map(|(k, id, signed)| BlockSender { public_key: Sender::Real(key(*k)), account_id: *id, is_signed: *signed })
            .collect(),
    )
}

fn content(sender_type: SenderType, senders: Vec<BlockSender>) -> BlockContent {
    BlockContent {
        sender_type,
        senders,
        tx_tree_root: Bytes32::repeat_byte(0x42),
        agg_pubkey: Default::default(),
        agg_signature: Default::default(),
        message_point: Default::default(),
    }
}

/// Header for `content` on top of the latest block in `storage`
pub(crate) fn post(storage: &BlockBuilderStorage, content: &BlockContent) -> PostedBlock {
    content.to_posted_block(&storage.latest_block(), storage.deposit_tree_root()).unwrap()
}

#[derive(Debug)]
pub(crate) struct RejectingVerifier;

impl AggregationVerifier for RejectingVerifier {
    fn verify_aggregation(&self, _signature: &SignatureContent, _public_keys: &[U256]) -> bool {
        false
    }
}
