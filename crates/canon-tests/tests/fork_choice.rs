//! Property-based fork-choice tests.
//!
//! Random block trees are ingested one block at a time; after every block the
//! raw head must carry the maximum total difficulty seen so far, and after the
//! whole tree every canonical-chain invariant must hold.

use proptest::prelude::*;

use canon_core::types::Block;
use canon_store::ChainConfig;
use canon_tests::helpers::*;

/// A generated block: (parent selector, difficulty).
fn tree_strategy() -> impl Strategy<Value = Vec<(usize, u64)>> {
    prop::collection::vec((any::<usize>(), 1u64..8), 1..32)
}

/// Materialize a tree: each block's parent is chosen among genesis and the
/// blocks built before it.
fn build_tree(specs: &[(usize, u64)]) -> Vec<Block> {
    let mut nodes = vec![genesis()];
    for (i, (selector, difficulty)) in specs.iter().enumerate() {
        let parent = nodes[selector % nodes.len()].clone();
        nodes.push(make_block(&parent, *difficulty, i as u8));
    }
    nodes.split_off(1)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn raw_head_is_always_heaviest(specs in tree_strategy()) {
        let blocks = build_tree(&specs);
        runtime().block_on(async {
            let chain = memory_chain(ChainConfig::trusted()).await;
            let mut best = 1u128;
            for block in &blocks {
                chain.put_block(block).await.unwrap();
                let td = chain.get_details(&block.hash()).await.unwrap().total_difficulty;
                best = best.max(td);
                assert_eq!(chain.meta().await.unwrap().total_difficulty, best);
            }
            assert_chain_invariants(&chain, &blocks).await;
        });
    }

    #[test]
    fn ingestion_order_of_siblings_only_breaks_ties(specs in tree_strategy()) {
        let blocks = build_tree(&specs);
        let mut reversed_siblings = blocks.clone();
        // Any topological order works; stable-sort by height to reorder
        // blocks at the same height.
        reversed_siblings.reverse();
        reversed_siblings.sort_by_key(Block::number);

        runtime().block_on(async {
            let forward = memory_chain(ChainConfig::trusted()).await;
            forward.put_blocks(&blocks).await.unwrap();
            let backward = memory_chain(ChainConfig::trusted()).await;
            backward.put_blocks(&reversed_siblings).await.unwrap();

            let a = forward.meta().await.unwrap();
            let b = backward.meta().await.unwrap();
            assert_eq!(a.total_difficulty, b.total_difficulty);
            assert_chain_invariants(&forward, &blocks).await;
            assert_chain_invariants(&backward, &reversed_siblings).await;
        });
    }

    #[test]
    fn subtree_deletion_keeps_links_consistent(specs in tree_strategy(), pick in any::<usize>()) {
        let blocks = build_tree(&specs);
        runtime().block_on(async {
            let chain = memory_chain(ChainConfig::trusted()).await;
            chain.put_blocks(&blocks).await.unwrap();

            let target = &blocks[pick % blocks.len()];
            chain.del_block(target).await.unwrap();

            let mut survivors = Vec::new();
            for block in &blocks {
                if chain.get_details(&block.hash()).await.is_ok() {
                    survivors.push(block.clone());
                } else {
                    assert!(chain.get_block(block.hash()).await.is_err());
                }
            }
            assert!(!survivors.iter().any(|b| b.hash() == target.hash()));
            for block in &survivors {
                let parent = chain.get_details(&block.parent_hash()).await.unwrap();
                assert!(parent.children().any(|h| h == block.hash()));
            }
            let meta = chain.meta().await.unwrap();
            let head = meta.raw_head.unwrap();
            assert!(chain.get_details(&head).await.unwrap().in_chain);
        });
    }
}
