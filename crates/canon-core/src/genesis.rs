//! Default genesis block.
//!
//! The genesis block is the first block in the chain (height 0, zero parent
//! hash). All values are hardcoded and deterministic, so every store
//! bootstrapped without an explicit genesis agrees on the same root.

use std::sync::LazyLock;

use crate::constants::{BLOCK_VERSION, GENESIS_DIFFICULTY, GENESIS_TIMESTAMP};
use crate::merkle;
use crate::types::{Block, BlockHeader, Hash256};

/// Message embedded as the single genesis payload entry.
pub const GENESIS_MESSAGE: &[u8] = b"Canon genesis: heaviest chain wins.";

/// Cached genesis data, computed once on first access.
struct GenesisData {
    block: Block,
    hash: Hash256,
}

static GENESIS: LazyLock<GenesisData> = LazyLock::new(build_genesis);

fn build_genesis() -> GenesisData {
    let payload = vec![GENESIS_MESSAGE.to_vec()];
    let block = Block {
        header: BlockHeader {
            version: BLOCK_VERSION,
            parent_hash: Hash256::ZERO,
            number: 0,
            timestamp: GENESIS_TIMESTAMP,
            difficulty: GENESIS_DIFFICULTY,
            payload_root: merkle::payload_root(&payload),
            nonce: 0,
            extra_data: Vec::new(),
        },
        payload,
    };
    let hash = block.hash();
    GenesisData { block, hash }
}

/// The default genesis block (height 0).
pub fn genesis_block() -> &'static Block {
    &GENESIS.block
}

/// The default genesis block hash.
pub fn genesis_hash() -> Hash256 {
    GENESIS.hash
}

/// Check whether a block is the default genesis block by comparing header hashes.
pub fn is_default_genesis(block: &Block) -> bool {
    block.hash() == GENESIS.hash
}
