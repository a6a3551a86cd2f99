//! Shared test helpers for scenario, property, and E2E tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use canon_consensus::mine_block;
use canon_core::kv::MemoryKvStore;
use canon_core::traits::ChainReader;
use canon_core::types::{Block, BlockHeader, Hash256};
use canon_core::{genesis, merkle};
use canon_store::{Blockchain, ChainConfig};

/// The default genesis block.
pub fn genesis() -> Block {
    genesis::genesis_block().clone()
}

/// Child of `parent` with the given difficulty and a valid payload root.
///
/// `salt` lands in the payload and `extra_data`, so siblings built with
/// different salts have different hashes.
pub fn make_block(parent: &Block, difficulty: u64, salt: u8) -> Block {
    let payload = vec![vec![salt; 4], parent.number().to_le_bytes().to_vec()];
    Block {
        header: BlockHeader {
            version: parent.header.version,
            parent_hash: parent.hash(),
            number: parent.number() + 1,
            timestamp: parent.header.timestamp + 60,
            difficulty,
            payload_root: merkle::payload_root(&payload),
            nonce: 0,
            extra_data: vec![salt],
        },
        payload,
    }
}

/// Like [`make_block`], with a nonce that satisfies the PoW check.
pub fn mined_block(parent: &Block, difficulty: u64, salt: u8) -> Block {
    let mut block = make_block(parent, difficulty, salt);
    assert!(mine_block(&mut block, u64::MAX), "nonce space exhausted");
    block
}

/// Linear chain of `len` blocks on top of `parent`.
pub fn make_chain(parent: &Block, len: usize, difficulty: u64, salt: u8) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::with_capacity(len);
    for _ in 0..len {
        let next = make_block(blocks.last().unwrap_or(parent), difficulty, salt);
        blocks.push(next);
    }
    blocks
}

/// Initialized chain over two in-memory stores.
pub async fn memory_chain(config: ChainConfig) -> Arc<Blockchain> {
    Blockchain::open(
        Arc::new(MemoryKvStore::new()),
        Arc::new(MemoryKvStore::new()),
        config,
    )
    .await
    .unwrap()
}

/// Hashes from genesis to the raw head, following parent links.
pub async fn canonical_path(chain: &Blockchain) -> Vec<Hash256> {
    let meta = chain.meta().await.unwrap();
    let mut path = Vec::new();
    let mut cursor = meta.raw_head;
    while let Some(hash) = cursor {
        let record = chain.get_details(&hash).await.unwrap();
        path.push(hash);
        cursor = (!record.is_genesis).then_some(record.parent);
    }
    path.reverse();
    path
}

/// Check every fork-choice invariant against the blocks ingested so far.
///
/// `ingested` must contain every stored block except genesis.
pub async fn assert_chain_invariants(chain: &Blockchain, ingested: &[Block]) {
    let meta = chain.meta().await.unwrap();
    let genesis_hash = meta.genesis.expect("genesis recorded");

    let mut all: HashMap<Hash256, Block> = ingested.iter().map(|b| (b.hash(), b.clone())).collect();
    all.insert(genesis_hash, chain.get_block(genesis_hash).await.unwrap());

    let mut children: HashMap<Hash256, HashSet<Hash256>> = HashMap::new();
    for (hash, block) in &all {
        if *hash != genesis_hash {
            children.entry(block.parent_hash()).or_default().insert(*hash);
        }
    }

    // Raw head carries the maximum total difficulty.
    let mut max_td = 0u128;
    for hash in all.keys() {
        let record = chain.get_details(hash).await.unwrap();
        max_td = max_td.max(record.total_difficulty);
    }
    assert_eq!(meta.total_difficulty, max_td, "raw head is not the heaviest block");

    // The in-chain set is exactly the path genesis -> raw head.
    let path = canonical_path(chain).await;
    assert_eq!(path.first(), Some(&genesis_hash));
    assert_eq!(path.len() as u64, meta.height + 1);
    let on_path: HashSet<Hash256> = path.iter().copied().collect();

    for (hash, block) in &all {
        let record = chain.get_details(hash).await.unwrap();
        assert_eq!(
            record.in_chain,
            on_path.contains(hash),
            "in_chain mismatch for block {hash} at height {}",
            record.number
        );
        assert_eq!(record.is_genesis, *hash == genesis_hash);

        let parent_td = if record.is_genesis {
            0
        } else {
            chain.get_details(&record.parent).await.unwrap().total_difficulty
        };
        assert_eq!(record.total_difficulty, parent_td + u128::from(block.difficulty()));

        if let Some(child) = record.child {
            assert!(!record.stale_children.contains(&child), "child listed as stale");
        }
        let linked: HashSet<Hash256> = record.children().collect();
        let expected = children.remove(hash).unwrap_or_default();
        assert_eq!(linked, expected, "children of {hash} out of sync");
    }

    // Canonical links and the Number Index follow the path.
    for (height, hash) in path.iter().enumerate() {
        let record = chain.get_details(hash).await.unwrap();
        assert_eq!(record.child, path.get(height + 1).copied());
        let indexed = chain.get_block(height as u64).await.unwrap();
        assert_eq!(indexed.hash(), *hash, "number index wrong at height {height}");
    }
    assert!(chain.get_block(meta.height + 1).await.unwrap_err().is_not_found());
    for hash in all.keys() {
        assert!(chain.contains(hash).unwrap());
    }
}
