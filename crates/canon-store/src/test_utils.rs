//! Block builders and store fixtures for unit tests.

use std::sync::Arc;

use canon_core::genesis;
use canon_core::kv::{KvStore, MemoryKvStore};
use canon_core::merkle;
use canon_core::types::{Block, BlockHeader};

use crate::blockchain::Blockchain;
use crate::config::ChainConfig;

pub fn memory_stores() -> (Arc<dyn KvStore>, Arc<dyn KvStore>) {
    (Arc::new(MemoryKvStore::new()), Arc::new(MemoryKvStore::new()))
}

/// Initialized in-memory chain with validation disabled.
pub async fn memory_chain() -> Arc<Blockchain> {
    memory_chain_with(ChainConfig::trusted()).await
}

pub async fn memory_chain_with(config: ChainConfig) -> Arc<Blockchain> {
    let (blocks, details) = memory_stores();
    Blockchain::open(blocks, details, config).await.unwrap()
}

pub fn genesis() -> Block {
    genesis::genesis_block().clone()
}

/// Child of `parent` with the given difficulty. `salt` distinguishes siblings.
pub fn child(parent: &Block, difficulty: u64, salt: u8) -> Block {
    let payload = vec![vec![salt]];
    Block {
        header: BlockHeader {
            version: parent.header.version,
            parent_hash: parent.hash(),
            number: parent.number() + 1,
            timestamp: parent.header.timestamp + 10,
            difficulty,
            payload_root: merkle::payload_root(&payload),
            nonce: 0,
            extra_data: vec![salt],
        },
        payload,
    }
}

/// Linear chain of `len` blocks on top of `parent`.
pub fn extend(parent: &Block, len: usize, difficulty: u64, salt: u8) -> Vec<Block> {
    let mut out: Vec<Block> = Vec::with_capacity(len);
    for _ in 0..len {
        let tip = out.last().unwrap_or(parent);
        let next = child(tip, difficulty, salt);
        out.push(next);
    }
    out
}
