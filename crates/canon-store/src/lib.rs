//! # canon-store: Fork-aware block store.
//!
//! Persists blocks and their ancestry across two key-value stores and tracks
//! the canonical chain by total difficulty:
//! - [`Blockchain`]: ingestion, fork choice, lookups, deletion, iteration
//! - [`MetaState`]: heads, raw head, and genesis
//! - [`RocksKv`]: RocksDB backend, one column family per store
//! - [`NodeConfig`] / [`ChainConfig`]: configuration

pub mod batch;
pub mod blockchain;
pub mod config;
pub mod delete;
pub mod details;
pub mod gate;
pub mod ingest;
pub mod iterate;
pub mod meta;
pub mod rebuild;
pub mod retrieve;
pub mod rocks;

#[cfg(test)]
mod test_utils;

pub use blockchain::{Blockchain, ChainParts};
pub use config::{ChainConfig, NodeConfig};
pub use meta::MetaState;
pub use rocks::RocksKv;
