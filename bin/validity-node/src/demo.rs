//! Deterministic demo chain
//!
//! Odd blocks register fresh public keys, even blocks reference registered
//! accounts by id with some senders not signing. Every block is preceded by
//! one deposit.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rollup_core::trees::DepositLeaf;
use rollup_core::{
    AccountId, BlockBuilderStorage, BlockContent, BlockSender, Bytes32, PermissiveVerifier, Sender, SenderType,
    TreeHistory, U256,
};
use rollup_host::PostedBlockEvent;

const SENDERS_PER_BLOCK: usize = 4;

#[derive(Debug)]
pub(crate) struct DemoChain {
    pub(crate) deposits: Vec<DepositLeaf>,
    pub(crate) events: Vec<PostedBlockEvent>,
}

pub(crate) fn build_chain(blocks: u32, seed: u64) -> Result<DemoChain> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut shadow = BlockBuilderStorage::new();
    let mut registered: Vec<U256> = Vec::new();
    let mut deposits = Vec::new();
    let mut events = Vec::new();

    for block_number in 1..=blocks {
        let deposit = DepositLeaf {
            recipient_salt_hash: Bytes32::from(rng.gen::<[u8; 32]>()),
            token_index: rng.gen_range(0..4),
            amount: U256::from(rng.gen_range(1..1_000_000u64)),
        };
        shadow.add_deposit(deposit)?;
        deposits.push(deposit);

        let content = if block_number % 2 == 1 || registered.is_empty() {
            let keys = fresh_keys(&mut rng);
            registered.extend(&keys);
            registration(&keys)
        } else {
            let mut keys: Vec<U256> = registered.choose_multiple(&mut rng, SENDERS_PER_BLOCK).copied().collect();
            keys.sort_unstable_by(|a, b| b.cmp(a));
            let senders = keys
                .iter()
                .map(|key| -> Result<(U256, AccountId, bool)> {
                    let account_id = shadow
                        .account_id(*key, shadow.latest_block_number())?
                        .with_context(|| format!("demo key {key} is not registered"))?;
                    Ok((*key, account_id, rng.gen_bool(0.75)))
                })
                .collect::<Result<Vec<_>>>()?;
            non_registration(&senders)
        };

        let block = content.to_posted_block(&shadow.latest_block(), shadow.deposit_tree_root())?;
        let witness = shadow.generate_block(&content, block)?;
        shadow.apply_block(witness, &PermissiveVerifier)?;
        events.push(PostedBlockEvent { block, content });
    }

    Ok(DemoChain { deposits, events })
}

/// Distinct keys above the dummy key, descending
fn fresh_keys(rng: &mut StdRng) -> Vec<U256> {
    let mut keys: Vec<U256> = (0..SENDERS_PER_BLOCK).map(|_| U256::from_limbs(rng.gen()) | U256::from(2u64)).collect();
    keys.sort_unstable_by(|a, b| b.cmp(a));
    keys.dedup();
    keys
}

fn registration(keys: &[U256]) -> BlockContent {
    let senders = keys
        .iter()
        .map(|key| BlockSender { public_key: Sender::Real(*key), account_id: 0, is_signed: true })
        .collect();
    content(SenderType::PublicKey, senders)
}

fn non_registration(senders: &[(U256, AccountId, bool)]) -> BlockContent {
    let mut senders: Vec<BlockSender> = senders
        .iter()
        .map(|(key, account_id, is_signed)| BlockSender {
            public_key: Sender::Real(*key),
            account_id: *account_id,
            is_signed: *is_signed,
        })
        .collect();
    if !senders.iter().any(|s| s.is_signed) {
        senders[0].is_signed = true;
    }
    content(SenderType::AccountId, senders)
}

fn content(sender_type: SenderType, senders: Vec<BlockSender>) -> BlockContent {
    BlockContent {
        sender_type,
        senders,
        tx_tree_root: Bytes32::ZERO,
        agg_pubkey: Default::default(),
        agg_signature: Default::default(),
        message_point: Default::default(),
    }
}
