//! Detail Record and Number Index access.
//!
//! Layout of the detail store:
//!
//! | key                       | value                          |
//! |---------------------------|--------------------------------|
//! | `"detail:" + hex(hash)`   | bincode [`BlockDetails`]       |
//! | decimal height, e.g. `"42"` | raw 32-byte canonical hash   |
//! | `"meta"`                  | bincode [`MetaState`](crate::meta::MetaState) |
//!
//! The block store is keyed by the raw 32-byte block hash.

use canon_core::constants::DETAIL_KEY_PREFIX;
use canon_core::error::CanonError;
use canon_core::kv::KvStore;
use canon_core::types::{Block, BlockDetails, Hash256};

/// Block store key for a block.
pub fn block_key(hash: &Hash256) -> Vec<u8> {
    hash.as_bytes().to_vec()
}

/// Detail store key for a block's ancestry record.
pub fn detail_key(hash: &Hash256) -> Vec<u8> {
    format!("{DETAIL_KEY_PREFIX}{}", hash.to_hex()).into_bytes()
}

/// Detail store key for the Number Index entry at `number`.
pub fn number_key(number: u64) -> Vec<u8> {
    number.to_string().into_bytes()
}

/// Read a Detail Record.
pub fn load_details(kv: &dyn KvStore, hash: &Hash256) -> Result<Option<BlockDetails>, CanonError> {
    kv.get(&detail_key(hash))?
        .map(|bytes| BlockDetails::decode(&bytes).map_err(CanonError::from))
        .transpose()
}

/// Read the canonical hash recorded at `number`.
pub fn load_number(kv: &dyn KvStore, number: u64) -> Result<Option<Hash256>, CanonError> {
    match kv.get(&number_key(number))? {
        Some(bytes) => Hash256::from_slice(&bytes)
            .map(Some)
            .ok_or_else(|| {
                CanonError::Storage(format!(
                    "number index entry {number} has {} bytes, expected 32",
                    bytes.len()
                ))
            }),
        None => Ok(None),
    }
}

/// Read and decode a stored block.
pub fn load_block(kv: &dyn KvStore, hash: &Hash256) -> Result<Option<Block>, CanonError> {
    kv.get(&block_key(hash))?
        .map(|bytes| Block::decode(&bytes).map_err(CanonError::from))
        .transpose()
}
