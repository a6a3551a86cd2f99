//! RocksDB-backed [`KvStore`].
//!
//! One database holds both logical stores in separate column families
//! (`blocks` and `details`). [`RocksKv::open_pair`] opens the database once and
//! returns a handle per column family; each handle commits through its own
//! [`WriteBatch`], so batches are atomic per store.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};

use canon_core::error::CanonError;
use canon_core::kv::{BatchOp, KvStore};

// --- Column family names ---

pub const CF_BLOCKS: &str = "blocks";
pub const CF_DETAILS: &str = "details";

const ALL_CFS: &[&str] = &[CF_BLOCKS, CF_DETAILS];

/// A [`KvStore`] view over one column family of a shared RocksDB instance.
#[derive(Clone)]
pub struct RocksKv {
    db: Arc<DB>,
    cf: &'static str,
}

impl fmt::Debug for RocksKv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RocksKv")
            .field("path", &self.db.path())
            .field("cf", &self.cf)
            .finish()
    }
}

impl RocksKv {
    /// Open or create the database at `path`.
    ///
    /// Returns `(block store, detail store)`.
    pub fn open_pair(path: impl AsRef<Path>) -> Result<(Self, Self), CanonError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(|e| CanonError::Storage(e.to_string()))?;
        tracing::info!(path = %path.as_ref().display(), "opened chain database");

        let db = Arc::new(db);
        Ok((
            Self { db: Arc::clone(&db), cf: CF_BLOCKS },
            Self { db, cf: CF_DETAILS },
        ))
    }

    fn cf_handle(&self) -> Result<&rocksdb::ColumnFamily, CanonError> {
        self.db
            .cf_handle(self.cf)
            .ok_or_else(|| CanonError::Storage(format!("missing column family: {}", self.cf)))
    }
}

impl KvStore for RocksKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CanonError> {
        let cf = self.cf_handle()?;
        self.db
            .get_cf(cf, key)
            .map_err(|e| CanonError::Storage(e.to_string()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), CanonError> {
        let cf = self.cf_handle()?;
        self.db
            .put_cf(cf, key, value)
            .map_err(|e| CanonError::Storage(e.to_string()))
    }

    fn delete(&self, key: &[u8]) -> Result<(), CanonError> {
        let cf = self.cf_handle()?;
        self.db
            .delete_cf(cf, key)
            .map_err(|e| CanonError::Storage(e.to_string()))
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), CanonError> {
        let cf = self.cf_handle()?;
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => batch.put_cf(cf, key, value),
                BatchOp::Delete { key } => batch.delete_cf(cf, key),
            }
        }
        self.db
            .write(batch)
            .map_err(|e| CanonError::Storage(e.to_string()))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, CanonError> {
        let cf = self.cf_handle()?;
        let mut out = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(|e| CanonError::Storage(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    fn flush(&self) -> Result<(), CanonError> {
        let cf = self.cf_handle()?;
        self.db
            .flush_cf(cf)
            .map_err(|e| CanonError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_pair() -> (RocksKv, RocksKv, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let (blocks, details) = RocksKv::open_pair(dir.path().join("db")).unwrap();
        (blocks, details, dir)
    }

    #[test]
    fn column_families_are_isolated() {
        let (blocks, details, _dir) = temp_pair();
        assert_eq!(blocks.cf, CF_BLOCKS);
        assert_eq!(details.cf, CF_DETAILS);

        blocks.put(b"k", b"block").unwrap();
        details.put(b"k", b"detail").unwrap();
        assert_eq!(blocks.get(b"k").unwrap(), Some(b"block".to_vec()));
        assert_eq!(details.get(b"k").unwrap(), Some(b"detail".to_vec()));

        blocks.delete(b"k").unwrap();
        assert_eq!(blocks.get(b"k").unwrap(), None);
        assert!(details.contains(b"k").unwrap());
    }

    #[test]
    fn write_batch_applies_in_order() {
        let (_blocks, details, _dir) = temp_pair();
        details
            .write_batch(vec![
                BatchOp::Put { key: b"a".to_vec(), value: b"1".to_vec() },
                BatchOp::Put { key: b"a".to_vec(), value: b"2".to_vec() },
                BatchOp::Put { key: b"b".to_vec(), value: b"x".to_vec() },
                BatchOp::Delete { key: b"b".to_vec() },
            ])
            .unwrap();
        assert_eq!(details.get(b"a").unwrap(), Some(b"2".to_vec()));
        assert_eq!(details.get(b"b").unwrap(), None);
    }

    #[test]
    fn scan_prefix_stops_at_prefix_end() {
        let (_blocks, details, _dir) = temp_pair();
        details.put(b"detail:02", b"b").unwrap();
        details.put(b"detail:01", b"a").unwrap();
        details.put(b"meta", b"m").unwrap();
        details.put(b"3", b"n").unwrap();

        let found = details.scan_prefix(b"detail:").unwrap();
        assert_eq!(
            found,
            vec![
                (b"detail:01".to_vec(), b"a".to_vec()),
                (b"detail:02".to_vec(), b"b".to_vec()),
            ]
        );
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let (blocks, _details) = RocksKv::open_pair(&path).unwrap();
            blocks.put(b"persist", b"yes").unwrap();
            blocks.flush().unwrap();
        }
        let (blocks, _details) = RocksKv::open_pair(&path).unwrap();
        assert_eq!(blocks.get(b"persist").unwrap(), Some(b"yes".to_vec()));
    }
}
