//! Resumable per-consumer iteration over the canonical chain.
//!
//! Each consumer's position is its named head in [`MetaState`](crate::meta::MetaState).
//! Every delivered block is checkpointed before moving on, so a later call
//! resumes after the last block the callback accepted.

use canon_core::error::{CanonError, ChainError};
use canon_core::types::{Block, BlockId, Hash256};

use crate::batch::{self, WriteSet};
use crate::blockchain::Blockchain;
use crate::details::load_details;

impl Blockchain {
    /// Deliver canonical blocks to `on_block` from `name`'s resume point.
    ///
    /// The callback receives each block and whether it does not build on the
    /// block delivered before it (a reorganization happened in between). A
    /// callback error stops iteration; blocks delivered before it stay
    /// checkpointed. Returns the number of blocks delivered.
    pub async fn iterate<F>(&self, name: &str, mut on_block: F) -> Result<u64, CanonError>
    where
        F: FnMut(&Block, bool) -> Result<(), CanonError>,
    {
        self.gate.wait().await?;

        let recorded = self.meta.lock().await.heads.get(name).copied();
        let (mut next, mut previous) = match recorded {
            Some(head) => (self.resume_after(head)?, Some(head)),
            None => (self.meta.lock().await.genesis, None),
        };

        let mut delivered = 0u64;
        while let Some(hash) = next {
            let block = self.read_block(BlockId::Hash(hash))?;
            let reorg = previous.is_some_and(|prev| prev != block.parent_hash());
            on_block(&block, reorg)?;

            next = self.checkpoint(name, hash).await?;
            previous = Some(hash);
            delivered += 1;
            tracing::debug!(consumer = name, %hash, number = block.number(), reorg, "delivered block");
        }
        Ok(delivered)
    }

    /// Record `hash` as delivered to `name` and return the next block to
    /// deliver.
    async fn checkpoint(&self, name: &str, hash: Hash256) -> Result<Option<Hash256>, CanonError> {
        let mut meta = self.meta.lock().await;
        let mut record = load_details(self.detail_store.as_ref(), &hash)?
            .ok_or_else(|| ChainError::DetailsNotFound(hash.to_string()))?;
        record.delivered.insert(name.to_string(), true);
        let next_block = if record.in_chain { record.child } else { None };

        let mut next = meta.clone();
        next.heads.insert(name.to_string(), hash);
        let mut set = WriteSet::new();
        let in_chain = record.in_chain;
        set.put_details(hash, record);
        set.set_meta(next.clone());
        batch::commit(&self.block_store, &self.detail_store, set).await?;
        *meta = next;
        drop(meta);

        if in_chain {
            Ok(next_block)
        } else {
            self.resume_after(hash)
        }
    }

    /// First canonical block after `head`.
    ///
    /// If `head` has been reorganized off the canonical chain, walks back to
    /// its nearest canonical ancestor and continues from that ancestor's child.
    fn resume_after(&self, head: Hash256) -> Result<Option<Hash256>, CanonError> {
        let detail_store = self.detail_store.as_ref();
        let max_depth = self.config.max_reorg_depth;
        let mut hash = head;
        for _ in 0..=max_depth {
            let record = load_details(detail_store, &hash)?
                .ok_or_else(|| ChainError::DetailsNotFound(hash.to_string()))?;
            if record.in_chain {
                return Ok(record.child);
            }
            hash = record.parent;
        }
        Err(ChainError::DepthExceeded(max_depth).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::test_utils::{child, extend, genesis, memory_chain};

    async fn collect(chain: &Blockchain, name: &str) -> Vec<(Hash256, bool)> {
        let mut seen = Vec::new();
        chain
            .iterate(name, |block, reorg| {
                seen.push((block.hash(), reorg));
                Ok(())
            })
            .await
            .unwrap();
        seen
    }

    #[tokio::test]
    async fn delivers_from_genesis_then_resumes() {
        let chain = memory_chain().await;
        let g = genesis();
        let blocks = extend(&g, 2, 1, 0);
        chain.put_blocks(&blocks).await.unwrap();

        let seen = collect(&chain, "vm").await;
        assert_eq!(
            seen,
            vec![(g.hash(), false), (blocks[0].hash(), false), (blocks[1].hash(), false)]
        );
        assert!(collect(&chain, "vm").await.is_empty());

        let c = child(&blocks[1], 1, 0);
        chain.put_block(&c).await.unwrap();
        assert_eq!(collect(&chain, "vm").await, vec![(c.hash(), false)]);

        let record = chain.get_details(&c.hash()).await.unwrap();
        assert!(record.is_delivered_to("vm"));
        assert!(!record.is_delivered_to("indexer"));
        assert_eq!(chain.meta().await.unwrap().heads["vm"], c.hash());
    }

    #[tokio::test]
    async fn consumers_are_independent() {
        let chain = memory_chain().await;
        let blocks = extend(&genesis(), 3, 1, 0);
        chain.put_blocks(&blocks).await.unwrap();

        assert_eq!(collect(&chain, "vm").await.len(), 4);
        assert_eq!(collect(&chain, "indexer").await.len(), 4);
        let record = chain.get_details(&blocks[2].hash()).await.unwrap();
        assert!(record.is_delivered_to("vm"));
        assert!(record.is_delivered_to("indexer"));
    }

    #[tokio::test]
    async fn reorg_is_flagged_on_resume() {
        let chain = memory_chain().await;
        let g = genesis();
        let a = child(&g, 1, 1);
        let b = child(&a, 1, 1);
        chain.put_blocks(&[a.clone(), b.clone()]).await.unwrap();
        assert_eq!(collect(&chain, "vm").await.len(), 3);

        let a_prime = child(&g, 5, 2);
        chain.put_block(&a_prime).await.unwrap();

        assert_eq!(collect(&chain, "vm").await, vec![(a_prime.hash(), true)]);
        let b_prime = child(&a_prime, 1, 2);
        chain.put_block(&b_prime).await.unwrap();
        assert_eq!(collect(&chain, "vm").await, vec![(b_prime.hash(), false)]);
    }

    #[tokio::test]
    async fn callback_error_stops_after_checkpoint() {
        let chain = memory_chain().await;
        let blocks = extend(&genesis(), 4, 1, 0);
        chain.put_blocks(&blocks).await.unwrap();

        let mut calls = 0;
        let err = chain
            .iterate("vm", |_, _| {
                calls += 1;
                if calls == 3 {
                    Err(CanonError::Consumer("stop".into()))
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CanonError::Consumer(_)));
        assert_eq!(chain.meta().await.unwrap().heads["vm"], blocks[0].hash());

        let rest = collect(&chain, "vm").await;
        let expected: Vec<_> = blocks[1..].iter().map(|b| (b.hash(), false)).collect();
        assert_eq!(rest, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reorg_during_iteration_resumes_on_new_branch() {
        let chain = memory_chain().await;
        let g = genesis();
        let main = extend(&g, 3, 1, 1);
        let fork = extend(&g, 3, 5, 2);
        chain.put_blocks(&main).await.unwrap();

        // A heavier branch lands while main[0] is being delivered.
        let handle = tokio::runtime::Handle::current();
        let writer = Arc::clone(&chain);
        let mut seen = Vec::new();
        chain
            .iterate("vm", |block, reorg| {
                seen.push((block.hash(), reorg));
                if block.hash() == main[0].hash() {
                    tokio::task::block_in_place(|| handle.block_on(writer.put_blocks(&fork)))?;
                }
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(
            seen,
            vec![
                (g.hash(), false),
                (main[0].hash(), false),
                (fork[0].hash(), true),
                (fork[1].hash(), false),
                (fork[2].hash(), false),
            ]
        );
        let stale = chain.get_details(&main[0].hash()).await.unwrap();
        assert!(stale.is_delivered_to("vm"));
        assert!(!stale.in_chain);
        assert_eq!(chain.meta().await.unwrap().heads["vm"], fork[2].hash());
    }
}
