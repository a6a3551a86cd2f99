//! RocksDB-backed block store tests: persistence across reopen.

use canon_core::genesis;
use canon_core::merkle;
use canon_core::types::{Block, BlockHeader, Hash256};
use canon_store::{Blockchain, ChainConfig};

fn make_block(parent: &Block, difficulty: u64, salt: u8) -> Block {
    let payload = vec![vec![salt; 8]];
    Block {
        header: BlockHeader {
            version: 1,
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

fn make_chain(parent: &Block, len: usize, difficulty: u64, salt: u8) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    for _ in 0..len {
        let tip = blocks.last().unwrap_or(parent).clone();
        blocks.push(make_block(&tip, difficulty, salt));
    }
    blocks
}

#[tokio::test]
async fn fresh_database_bootstraps_genesis() {
    let dir = tempfile::tempdir().unwrap();
    let chain = Blockchain::open_rocks(dir.path().join("chaindata"), ChainConfig::trusted())
        .await
        .unwrap();

    let head = chain.get_head(None).await.unwrap();
    assert_eq!(head.hash(), genesis::genesis_hash());
    assert_eq!(chain.meta().await.unwrap().genesis, Some(genesis::genesis_hash()));
}

#[tokio::test]
async fn chain_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chaindata");
    let g = genesis::genesis_block().clone();
    let main = make_chain(&g, 4, 2, 1);
    let fork = make_chain(&main[1], 1, 1, 2);

    {
        let chain = Blockchain::open_rocks(&path, ChainConfig::trusted()).await.unwrap();
        chain.put_blocks(&main).await.unwrap();
        chain.put_blocks(&fork).await.unwrap();
        let delivered = chain.iterate("vm", |_, _| Ok(())).await.unwrap();
        assert_eq!(delivered, 5);
    }

    let chain = Blockchain::open_rocks(&path, ChainConfig::trusted()).await.unwrap();
    let meta = chain.meta().await.unwrap();
    assert_eq!(meta.raw_head, Some(main[3].hash()));
    assert_eq!(meta.height, 4);
    assert_eq!(meta.total_difficulty, 9);
    assert_eq!(meta.heads["vm"], main[3].hash());

    for (i, block) in main.iter().enumerate() {
        assert_eq!(&chain.get_block(i as u64 + 1).await.unwrap(), block);
    }
    let fork_record = chain.get_details(&fork[0].hash()).await.unwrap();
    assert!(!fork_record.in_chain);
    let root = chain.get_details(&main[1].hash()).await.unwrap();
    assert_eq!(root.stale_children, vec![fork[0].hash()]);

    // Resumes where the consumer stopped.
    let next = make_block(&main[3], 2, 1);
    chain.put_block(&next).await.unwrap();
    let mut seen = Vec::new();
    chain
        .iterate("vm", |block, reorg| {
            seen.push((block.hash(), reorg));
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(seen, vec![(next.hash(), false)]);
}

#[tokio::test]
async fn deletion_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chaindata");
    let g = genesis::genesis_block().clone();
    let main = make_chain(&g, 3, 1, 1);

    {
        let chain = Blockchain::open_rocks(&path, ChainConfig::trusted()).await.unwrap();
        chain.put_blocks(&main).await.unwrap();
        chain.del_block(main[1].hash()).await.unwrap();
    }

    let chain = Blockchain::open_rocks(&path, ChainConfig::trusted()).await.unwrap();
    assert_eq!(chain.get_head(None).await.unwrap(), main[0]);
    assert!(chain.get_block(main[2].hash()).await.unwrap_err().is_not_found());
    assert_eq!(
        chain.select_needed_hashes(&main.iter().map(Block::hash).collect::<Vec<Hash256>>())
            .await
            .unwrap(),
        vec![main[1].hash(), main[2].hash()]
    );
}
