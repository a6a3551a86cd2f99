//! Staged writes and the two-store batch writer.
//!
//! A [`WriteSet`] collects every block, Detail Record, Number Index, and Meta
//! State change made by one logical operation. Reads through the set see
//! staged values first, so multi-step algorithms (fork choice followed by a
//! canonical rebuild) observe their own pending writes. [`commit`] partitions
//! the set into one batch per store and applies both batches concurrently.
//! Each batch is atomic; the pair is not.

use std::collections::BTreeMap;
use std::sync::Arc;

use canon_core::constants::META_KEY;
use canon_core::error::CanonError;
use canon_core::kv::{BatchOp, KvStore};
use canon_core::types::{BlockDetails, Hash256};

use crate::details::{block_key, detail_key, load_details, load_number, number_key};
use crate::meta::MetaState;

/// Pending writes for both stores. `None` values stage deletions.
#[derive(Debug, Default)]
pub struct WriteSet {
    blocks: BTreeMap<Hash256, Option<Vec<u8>>>,
    details: BTreeMap<Hash256, Option<BlockDetails>>,
    numbers: BTreeMap<u64, Option<Hash256>>,
    meta: Option<MetaState>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
            && self.details.is_empty()
            && self.numbers.is_empty()
            && self.meta.is_none()
    }

    pub fn put_block(&mut self, hash: Hash256, encoded: Vec<u8>) {
        self.blocks.insert(hash, Some(encoded));
    }

    pub fn delete_block(&mut self, hash: Hash256) {
        self.blocks.insert(hash, None);
    }

    pub fn put_details(&mut self, hash: Hash256, record: BlockDetails) {
        self.details.insert(hash, Some(record));
    }

    pub fn delete_details(&mut self, hash: Hash256) {
        self.details.insert(hash, None);
    }

    pub fn set_number(&mut self, number: u64, hash: Hash256) {
        self.numbers.insert(number, Some(hash));
    }

    pub fn clear_number(&mut self, number: u64) {
        self.numbers.insert(number, None);
    }

    pub fn set_meta(&mut self, meta: MetaState) {
        self.meta = Some(meta);
    }

    /// Detail Record as it will look after commit.
    pub fn details(
        &self,
        kv: &dyn KvStore,
        hash: &Hash256,
    ) -> Result<Option<BlockDetails>, CanonError> {
        match self.details.get(hash) {
            Some(staged) => Ok(staged.clone()),
            None => load_details(kv, hash),
        }
    }

    /// Number Index entry as it will look after commit.
    pub fn number(&self, kv: &dyn KvStore, number: u64) -> Result<Option<Hash256>, CanonError> {
        match self.numbers.get(&number) {
            Some(staged) => Ok(*staged),
            None => load_number(kv, number),
        }
    }

    /// Encode and partition into `(block store ops, detail store ops)`.
    pub fn into_batches(self) -> Result<(Vec<BatchOp>, Vec<BatchOp>), CanonError> {
        let block_ops = self
            .blocks
            .into_iter()
            .map(|(hash, value)| match value {
                Some(value) => BatchOp::Put { key: block_key(&hash), value },
                None => BatchOp::Delete { key: block_key(&hash) },
            })
            .collect();

        let mut detail_ops = Vec::with_capacity(self.details.len() + self.numbers.len() + 1);
        for (hash, record) in self.details {
            let key = detail_key(&hash);
            detail_ops.push(match record {
                Some(record) => BatchOp::Put { key, value: record.encode()? },
                None => BatchOp::Delete { key },
            });
        }
        for (number, hash) in self.numbers {
            let key = number_key(number);
            detail_ops.push(match hash {
                Some(hash) => BatchOp::Put { key, value: hash.as_bytes().to_vec() },
                None => BatchOp::Delete { key },
            });
        }
        if let Some(meta) = self.meta {
            detail_ops.push(BatchOp::Put { key: META_KEY.to_vec(), value: meta.encode()? });
        }

        Ok((block_ops, detail_ops))
    }
}

/// Commit a write set: one atomic batch per store, both applied concurrently.
pub async fn commit(
    block_store: &Arc<dyn KvStore>,
    detail_store: &Arc<dyn KvStore>,
    set: WriteSet,
) -> Result<(), CanonError> {
    if set.is_empty() {
        return Ok(());
    }
    let (block_ops, detail_ops) = set.into_batches()?;
    tokio::try_join!(
        write_batch(Arc::clone(block_store), block_ops),
        write_batch(Arc::clone(detail_store), detail_ops),
    )?;
    Ok(())
}

async fn write_batch(kv: Arc<dyn KvStore>, ops: Vec<BatchOp>) -> Result<(), CanonError> {
    if ops.is_empty() {
        return Ok(());
    }
    tokio::task::spawn_blocking(move || kv.write_batch(ops))
        .await
        .map_err(|e| CanonError::Storage(format!("batch task failed: {e}")))?
}
