//! Public state committed after each block and the validity public inputs
//!
//! Layout as flattened `u64` values, in order:
//!
//! | field                   | values |
//! |-------------------------|--------|
//! | `block_tree_root`       | 4      |
//! | `prev_account_tree_root`| 4      |
//! | `account_tree_root`     | 4      |
//! | `deposit_tree_root`     | 8      |
//! | `block_hash`            | 8      |
//! | `block_number`          | 1      |
//! | `tx_tree_root`          | 8      |
//! | `sender_tree_root`      | 4      |
//! | `is_valid_block`        | 1      |

use rollup_merkle::utils::{bytes32_to_u32_limbs, u32_limbs_to_bytes32};
use rollup_merkle::{Bytes32, PoseidonHashOut, NUM_HASH_OUT_ELTS};
use serde::{Deserialize, Serialize};

use crate::block::PostedBlock;
use crate::error::WitnessError;
use crate::trees::{AccountTree, BlockHashTree};
use crate::types::BlockNumber;

pub const PUBLIC_STATE_LEN: usize = 3 * NUM_HASH_OUT_ELTS + 8 + 8 + 1;
pub const VALIDITY_PUBLIC_INPUTS_LEN: usize = PUBLIC_STATE_LEN + 8 + NUM_HASH_OUT_ELTS + 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicState {
    pub block_tree_root: PoseidonHashOut,
    pub prev_account_tree_root: PoseidonHashOut,
    pub account_tree_root: PoseidonHashOut,
    pub deposit_tree_root: Bytes32,
    pub block_hash: Bytes32,
    pub block_number: BlockNumber,
}

impl PublicState {
    /// State right after block 0
    pub fn genesis() -> Self {
        let account_tree_root = AccountTree::new().root();
        let genesis = PostedBlock::genesis();
        Self {
            block_tree_root: BlockHashTree::new().root(),
            prev_account_tree_root: account_tree_root,
            account_tree_root,
            deposit_tree_root: genesis.deposit_root,
            block_hash: genesis.hash(),
            block_number: 0,
        }
    }

    pub fn to_u64_vec(&self) -> Vec<u64> {
        let mut values = Vec::with_capacity(PUBLIC_STATE_LEN);
        values.extend(self.block_tree_root.elements);
        values.extend(self.prev_account_tree_root.elements);
        values.extend(self.account_tree_root.elements);
        values.extend(bytes32_to_u32_limbs(&self.deposit_tree_root).map(u64::from));
        values.extend(bytes32_to_u32_limbs(&self.block_hash).map(u64::from));
        values.push(u64::from(self.block_number));
        values
    }

    pub fn from_u64_slice(values: &[u64]) -> Result<Self, WitnessError> {
        let mut reader = Reader::new(values, PUBLIC_STATE_LEN)?;
        Ok(Self {
            block_tree_root: reader.hash_out()?,
            prev_account_tree_root: reader.hash_out()?,
            account_tree_root: reader.hash_out()?,
            deposit_tree_root: reader.bytes32()?,
            block_hash: reader.bytes32()?,
            block_number: reader.u32()?,
        })
    }
}

/// Public inputs of one validity proof
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityPublicInputs {
    pub public_state: PublicState,
    pub tx_tree_root: Bytes32,
    pub sender_tree_root: PoseidonHashOut,
    pub is_valid_block: bool,
}

impl ValidityPublicInputs {
    pub fn genesis() -> Self {
        Self {
            public_state: PublicState::genesis(),
            tx_tree_root: Bytes32::ZERO,
            sender_tree_root: PoseidonHashOut::default(),
            is_valid_block: false,
        }
    }

    pub fn to_u64_vec(&self) -> Vec<u64> {
        let mut values = self.public_state.to_u64_vec();
        values.extend(bytes32_to_u32_limbs(&self.tx_tree_root).map(u64::from));
        values.extend(self.sender_tree_root.elements);
        values.push(u64::from(self.is_valid_block));
        values
    }

    /// Decode the leading public inputs of a proof. Trailing values are ignored.
    pub fn from_u64_slice(values: &[u64]) -> Result<Self, WitnessError> {
        let mut reader = Reader::new(values, VALIDITY_PUBLIC_INPUTS_LEN)?;
        let public_state = PublicState::from_u64_slice(reader.take(PUBLIC_STATE_LEN)?)?;
        Ok(Self {
            public_state,
            tx_tree_root: reader.bytes32()?,
            sender_tree_root: reader.hash_out()?,
            is_valid_block: reader.bool()?,
        })
    }
}

struct Reader<'a> {
    values: &'a [u64],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(values: &'a [u64], len: usize) -> Result<Self, WitnessError> {
        if values.len() < len {
            return Err(WitnessError::LengthMismatch { what: "public inputs", expected: len, actual: values.len() });
        }
        Ok(Self { values, offset: 0 })
    }

    fn take(&mut self, n: usize) -> Result<&'a [u64], WitnessError> {
        let end = self.offset + n;
        let slice = self.values.get(self.offset..end).ok_or(WitnessError::LengthMismatch {
            what: "public inputs",
            expected: end,
            actual: self.values.len(),
        })?;
        self.offset = end;
        Ok(slice)
    }

    fn hash_out(&mut self) -> Result<PoseidonHashOut, WitnessError> {
        let mut elements = [0u64; NUM_HASH_OUT_ELTS];
        elements.copy_from_slice(self.take(NUM_HASH_OUT_ELTS)?);
        Ok(PoseidonHashOut::from_elements(elements)?)
    }

    fn u32(&mut self) -> Result<u32, WitnessError> {
        let index = self.offset;
        let value = self.take(1)?[0];
        u32::try_from(value).map_err(|_| WitnessError::PublicInputOutOfRange { index, value })
    }

    fn bytes32(&mut self) -> Result<Bytes32, WitnessError> {
        let mut limbs = [0u32; 8];
        for limb in &mut limbs {
            *limb = self.u32()?;
        }
        Ok(u32_limbs_to_bytes32(&limbs))
    }

    fn bool(&mut self) -> Result<bool, WitnessError> {
        let index = self.offset;
        match self.take(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(WitnessError::PublicInputOutOfRange { index, value }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ValidityPublicInputs {
        let mut pis = ValidityPublicInputs::genesis();
        pis.public_state.block_number = 12;
        pis.tx_tree_root = Bytes32::repeat_byte(0xee);
        pis.sender_tree_root = PoseidonHashOut::hash_inputs_u64(&[3]);
        pis.is_valid_block = true;
        pis
    }

    #[test]
    fn test_layout_length() {
        assert_eq!(PUBLIC_STATE_LEN, 29);
        assert_eq!(VALIDITY_PUBLIC_INPUTS_LEN, 42);
        assert_eq!(sample().to_u64_vec().len(), 42);
    }

    #[test]
    fn test_decode_with_trailing_values() {
        let pis = sample();
        let mut values = pis.to_u64_vec();
        values.extend([99, 98]);
        assert_eq!(ValidityPublicInputs::from_u64_slice(&values).unwrap(), pis);
    }

    #[test]
    fn test_decode_rejects_bad_values() {
        let mut values = sample().to_u64_vec();
        assert!(ValidityPublicInputs::from_u64_slice(&values[..41]).is_err());

        values[41] = 2;
        assert_eq!(
            ValidityPublicInputs::from_u64_slice(&values),
            Err(WitnessError::PublicInputOutOfRange { index: 41, value: 2 })
        );

        let mut values = sample().to_u64_vec();
        values[12] = u64::from(u32::MAX) + 1;
        assert!(matches!(
            ValidityPublicInputs::from_u64_slice(&values),
            Err(WitnessError::PublicInputOutOfRange { index: 12, .. })
        ));
    }

    #[test]
    fn test_reader_stops_at_end_of_values() {
        let values = [1u64, 2, 3];
        let mut reader = Reader::new(&values, 0).unwrap();
        assert_eq!(reader.take(2).unwrap(), &[1, 2]);
        assert_eq!(
            reader.take(2).unwrap_err(),
            WitnessError::LengthMismatch { what: "public inputs", expected: 4, actual: 3 }
        );
        assert!(reader.hash_out().is_err());
        assert_eq!(reader.u32().unwrap(), 3);
    }

    #[test]
    fn test_genesis_roots() {
        let state = PublicState::genesis();
        assert_eq!(state.prev_account_tree_root, state.account_tree_root);
        assert_eq!(state.block_hash, PostedBlock::genesis().hash());
    }
}
