//! Integration test suite for the Canon block store.
//!
//! The tests under `tests/` drive [`canon_store::Blockchain`] through fork
//! scenarios, randomized block trees, and RocksDB-backed restarts, and check
//! the canonical-chain invariants after every step.

pub mod helpers;
