//! Ordered key-value store interface and in-memory implementation.
//!
//! The block store keeps its data in two [`KvStore`] instances: one for
//! encoded blocks and one for ancestry records, the number index, and meta
//! state. A [`write_batch`](KvStore::write_batch) is atomic within one store;
//! nothing is atomic across stores.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::CanonError;

/// A single operation in an atomic batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOp {
    /// Key touched by this operation.
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// Byte-addressed persistence with atomic batch writes.
pub trait KvStore: Send + Sync {
    /// Read a value. Returns `None` if the key is absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CanonError>;

    /// Write a single value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), CanonError>;

    /// Delete a single key. Deleting an absent key is not an error.
    fn delete(&self, key: &[u8]) -> Result<(), CanonError>;

    /// Apply all operations atomically, in order.
    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), CanonError>;

    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, CanonError>;

    /// Whether a key is present.
    ///
    /// Default implementation delegates to [`get`](Self::get).
    fn contains(&self, key: &[u8]) -> Result<bool, CanonError> {
        Ok(self.get(key)?.is_some())
    }

    /// Persist buffered writes. A no-op for stores without buffering.
    fn flush(&self) -> Result<(), CanonError> {
        Ok(())
    }
}

/// In-memory key-value store for testing.
///
/// Stores everything in a `BTreeMap` with no persistence.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKvStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CanonError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), CanonError> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), CanonError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), CanonError> {
        let mut entries = self.entries.write();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    entries.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, CanonError> {
        Ok(self
            .entries
            .read()
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
