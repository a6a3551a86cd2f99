//! Meta State: heads, canonical tip, and genesis.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use canon_core::constants::{DETAIL_KEY_PREFIX, META_KEY};
use canon_core::error::{BlockError, CanonError};
use canon_core::kv::KvStore;
use canon_core::types::{BlockDetails, Hash256};

use crate::details::load_details;

/// Store-wide chain metadata, persisted under the `"meta"` key.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct MetaState {
    /// Consumer name to the last block delivered to that consumer.
    pub heads: BTreeMap<String, Hash256>,
    /// Block with the greatest known total difficulty.
    pub raw_head: Option<Hash256>,
    /// Height of `raw_head`.
    pub height: u64,
    /// Total difficulty of `raw_head`.
    pub total_difficulty: u128,
    /// Genesis block hash.
    pub genesis: Option<Hash256>,
}

impl MetaState {
    /// Head recorded for `name`, falling back to the raw head.
    pub fn head(&self, name: Option<&str>) -> Option<Hash256> {
        name.and_then(|n| self.heads.get(n).copied())
            .or(self.raw_head)
    }

    pub fn encode(&self) -> Result<Vec<u8>, BlockError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| BlockError::Codec(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, BlockError> {
        let (meta, _): (MetaState, usize) =
            bincode::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| BlockError::Codec(e.to_string()))?;
        Ok(meta)
    }

    /// Load Meta State from the detail store.
    ///
    /// Returns `None` when the record is absent or cannot be decoded; storage
    /// errors propagate.
    pub fn load(kv: &dyn KvStore) -> Result<Option<Self>, CanonError> {
        let Some(bytes) = kv.get(META_KEY)? else {
            return Ok(None);
        };
        match Self::decode(&bytes) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) => {
                tracing::warn!(error = %e, "unreadable meta state");
                Ok(None)
            }
        }
    }

    /// Rebuild Meta State from the Detail Records under `genesis`.
    ///
    /// The raw head is the end of the `child` path from genesis. Each named
    /// head is the highest block carrying that consumer's delivered marker.
    /// Returns `None` if no record exists for `genesis`.
    pub fn recover(kv: &dyn KvStore, genesis: Hash256) -> Result<Option<Self>, CanonError> {
        let Some(mut tip) = load_details(kv, &genesis)? else {
            return Ok(None);
        };
        let mut tip_hash = genesis;
        while let Some(child) = tip.child {
            match load_details(kv, &child)? {
                Some(next) if next.in_chain && next.number > tip.number => {
                    tip = next;
                    tip_hash = child;
                }
                _ => break,
            }
        }

        let mut best: BTreeMap<String, (u64, bool, Hash256)> = BTreeMap::new();
        for (key, value) in kv.scan_prefix(DETAIL_KEY_PREFIX.as_bytes())? {
            let Some(hash) = std::str::from_utf8(&key[DETAIL_KEY_PREFIX.len()..])
                .ok()
                .and_then(Hash256::from_hex)
            else {
                continue;
            };
            let record = BlockDetails::decode(&value)?;
            for (name, _) in record.delivered.iter().filter(|(_, done)| **done) {
                let rank = (record.number, record.in_chain, hash);
                let entry = best.entry(name.clone()).or_insert(rank);
                if rank > *entry {
                    *entry = rank;
                }
            }
        }

        Ok(Some(Self {
            heads: best.into_iter().map(|(name, (_, _, hash))| (name, hash)).collect(),
            raw_head: Some(tip_hash),
            height: tip.number,
            total_difficulty: tip.total_difficulty,
            genesis: Some(genesis),
        }))
    }
}
