//! Account tree: public key -> last block number the account sent in
//!
//! Account ids are leaf indices. Leaf 0 is the reserved empty leaf and the
//! dummy public key owns [`DUMMY_ACCOUNT_ID`], so real accounts start at 2.

use rollup_merkle::{
    IndexedInsertionProof, IndexedMembershipProof, IndexedMerkleLeaf, IndexedMerkleProof, IndexedMerkleTree,
    IndexedUpdateProof, MerkleError, PoseidonHashOut, U256,
};

use crate::types::{AccountId, BlockNumber, ACCOUNT_TREE_HEIGHT, DUMMY_ACCOUNT_ID, DUMMY_PUBLIC_KEY};

/// Indexed tree of registered public keys
#[derive(Clone, Debug)]
pub struct AccountTree {
    inner: IndexedMerkleTree,
}

impl Default for AccountTree {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountTree {
    /// Genesis account tree holding the reserved leaf and the dummy key
    pub fn new() -> Self {
        let mut inner = IndexedMerkleTree::new(ACCOUNT_TREE_HEIGHT);
        inner
            .insert(DUMMY_PUBLIC_KEY, 0)
            .unwrap_or_else(|e| panic!("dummy public key cannot be inserted: {e}"));
        debug_assert_eq!(inner.get_index(DUMMY_PUBLIC_KEY), Some(DUMMY_ACCOUNT_ID));

        Self { inner }
    }

    pub fn root(&self) -> PoseidonHashOut {
        self.inner.root()
    }

    /// Number of leaves, including the reserved and dummy leaves
    pub fn len(&self) -> u64 {
        self.inner.len()
    }

    /// Always false after construction
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Id the next registered account will receive
    pub fn next_account_id(&self) -> AccountId {
        self.inner.len()
    }

    pub fn account_id(&self, public_key: U256) -> Option<AccountId> {
        self.inner.get_index(public_key)
    }

    /// Leaf at `account_id`, or the empty leaf
    pub fn get_leaf(&self, account_id: AccountId) -> IndexedMerkleLeaf {
        self.inner.get_leaf(account_id)
    }

    /// Last block number recorded for a registered key
    pub fn last_block_number(&self, public_key: U256) -> Option<BlockNumber> {
        self.account_id(public_key)
            .map(|id| self.inner.get_leaf(id).value as BlockNumber)
    }

    /// Register a new public key. Fails with `KeyAlreadyExists` for a key
    /// that is present, which includes the dummy key.
    pub fn register(
        &mut self,
        public_key: U256,
        last_block_number: BlockNumber,
    ) -> Result<IndexedInsertionProof, MerkleError> {
        self.inner.insert(public_key, u64::from(last_block_number))
    }

    /// Record a new last block number for a registered key
    pub fn update(
        &mut self,
        public_key: U256,
        last_block_number: BlockNumber,
    ) -> Result<IndexedUpdateProof, MerkleError> {
        self.inner.update(public_key, u64::from(last_block_number))
    }

    pub fn prove_membership(&self, public_key: U256) -> Result<IndexedMembershipProof, MerkleError> {
        self.inner.prove_membership(public_key)
    }

    /// Merkle proof of the leaf at `account_id`
    pub fn prove(&self, account_id: AccountId) -> Result<IndexedMerkleProof, MerkleError> {
        self.inner.prove(account_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_reserves_dummy_account() {
        let tree = AccountTree::new();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.account_id(DUMMY_PUBLIC_KEY), Some(DUMMY_ACCOUNT_ID));
        assert_eq!(tree.next_account_id(), 2);
    }

    #[test]
    fn test_dummy_key_cannot_register() {
        let mut tree = AccountTree::new();
        assert_eq!(tree.register(DUMMY_PUBLIC_KEY, 3), Err(MerkleError::KeyAlreadyExists));
        assert_eq!(tree.register(U256::ZERO, 3), Err(MerkleError::KeyAlreadyExists));
    }

    #[test]
    fn test_register_then_update() {
        let mut tree = AccountTree::new();
        let key = U256::from(0xabcdu64);

        let prev_root = tree.root();
        let proof = tree.register(key, 5).unwrap();
        proof.verify(key, 5, &prev_root, &tree.root()).unwrap();
        assert_eq!(tree.account_id(key), Some(2));
        assert_eq!(tree.last_block_number(key), Some(5));

        let prev_root = tree.root();
        let proof = tree.update(key, 9).unwrap();
        proof.verify(key, 5, 9, &prev_root, &tree.root()).unwrap();
        assert_eq!(tree.last_block_number(key), Some(9));

        assert_eq!(tree.update(U256::from(7u64), 1), Err(MerkleError::KeyNotFound));
    }
}
