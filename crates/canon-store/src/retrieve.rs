//! Block and record lookups.

use canon_core::error::{CanonError, ChainError};
use canon_core::types::{Block, BlockDetails, BlockId, Hash256};

use crate::batch::{self, WriteSet};
use crate::blockchain::Blockchain;
use crate::details::{load_block, load_details, load_number};
use crate::meta::MetaState;

impl Blockchain {
    /// Block by hash, or by canonical height through the Number Index.
    pub async fn get_block(&self, id: impl Into<BlockId>) -> Result<Block, CanonError> {
        self.gate.wait().await?;
        self.read_block(id.into())
    }

    /// Canonical range walk starting at `start`.
    ///
    /// Emits every `skip + 1`-th block by height, ascending or (with
    /// `reverse`) descending, up to `max` blocks. Stops early at the first
    /// height with no canonical block.
    pub async fn get_blocks(
        &self,
        start: impl Into<BlockId>,
        max: usize,
        skip: u64,
        reverse: bool,
    ) -> Result<Vec<Block>, CanonError> {
        self.gate.wait().await?;
        let mut out = Vec::new();
        if max == 0 {
            return Ok(out);
        }

        let first = match self.read_block(start.into()) {
            Ok(block) => block,
            Err(e) if e.is_not_found() => return Ok(out),
            Err(e) => return Err(e),
        };
        let step = skip.saturating_add(1);
        let mut number = first.number();
        out.push(first);

        while out.len() < max {
            let next = if reverse {
                number.checked_sub(step)
            } else {
                number.checked_add(step)
            };
            let Some(next) = next else { break };
            match self.read_block(BlockId::Number(next)) {
                Ok(block) => out.push(block),
                Err(e) if e.is_not_found() => break,
                Err(e) => return Err(e),
            }
            number = next;
        }
        Ok(out)
    }

    pub async fn get_details(&self, hash: &Hash256) -> Result<BlockDetails, CanonError> {
        self.gate.wait().await?;
        load_details(self.detail_store.as_ref(), hash)?
            .ok_or_else(|| ChainError::DetailsNotFound(hash.to_string()).into())
    }

    /// Overwrite a Detail Record.
    pub async fn put_details(&self, hash: &Hash256, record: BlockDetails) -> Result<(), CanonError> {
        self.gate.wait().await?;
        let _meta = self.meta.lock().await;
        let mut set = WriteSet::new();
        set.put_details(*hash, record);
        batch::commit(&self.block_store, &self.detail_store, set).await
    }

    /// Suffix of `hashes` not yet stored.
    ///
    /// Assumes the stored hashes form a prefix of the input, as with a
    /// sequence of announced blocks, and binary-searches for its end.
    pub async fn select_needed_hashes(
        &self,
        hashes: &[Hash256],
    ) -> Result<Vec<Hash256>, CanonError> {
        self.gate.wait().await?;
        let detail_store = self.detail_store.as_ref();
        let (mut lo, mut hi) = (0usize, hashes.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if load_details(detail_store, &hashes[mid])?.is_some() {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(hashes[lo..].to_vec())
    }

    /// Block last delivered to `name`, or the raw head.
    pub async fn get_head(&self, name: Option<&str>) -> Result<Block, CanonError> {
        self.gate.wait().await?;
        let head = self
            .meta
            .lock()
            .await
            .head(name)
            .ok_or_else(|| ChainError::BlockNotFound("head".into()))?;
        self.read_block(BlockId::Hash(head))
    }

    /// Snapshot of Meta State.
    pub async fn meta(&self) -> Result<MetaState, CanonError> {
        self.gate.wait().await?;
        Ok(self.meta.lock().await.clone())
    }

    pub(crate) fn resolve(&self, id: BlockId) -> Result<Hash256, CanonError> {
        match id {
            BlockId::Hash(hash) => Ok(hash),
            BlockId::Number(number) => load_number(self.detail_store.as_ref(), number)?
                .ok_or_else(|| ChainError::BlockNotFound(number.to_string()).into()),
        }
    }

    pub(crate) fn read_block(&self, id: BlockId) -> Result<Block, CanonError> {
        let hash = self.resolve(id)?;
        load_block(self.block_store.as_ref(), &hash)?
            .ok_or_else(|| ChainError::BlockNotFound(hash.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::details::block_key;
    use crate::test_utils::{child, extend, genesis, memory_chain};

    #[tokio::test]
    async fn get_block_by_hash_and_number() {
        let chain = memory_chain().await;
        let blocks = extend(&genesis(), 2, 1, 0);
        chain.put_blocks(&blocks).await.unwrap();

        let by_hash = chain.get_block(blocks[1].hash()).await.unwrap();
        let by_number = chain.get_block(2u64).await.unwrap();
        assert_eq!(by_hash, by_number);
        assert_eq!(by_hash.encode().unwrap(), blocks[1].encode().unwrap());

        assert!(chain.get_block(3u64).await.unwrap_err().is_not_found());
        assert!(chain.get_block(Hash256([5; 32])).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn get_blocks_forward_reverse_and_skip() {
        let chain = memory_chain().await;
        let g = genesis();
        let blocks = extend(&g, 5, 1, 0);
        chain.put_blocks(&blocks).await.unwrap();
        let numbers = |v: Vec<Block>| v.iter().map(Block::number).collect::<Vec<_>>();

        let first_three = chain.get_blocks(g.hash(), 3, 0, false).await.unwrap();
        assert_eq!(first_three, vec![g.clone(), blocks[0].clone(), blocks[1].clone()]);

        assert_eq!(numbers(chain.get_blocks(0u64, 10, 1, false).await.unwrap()), vec![0, 2, 4]);
        assert_eq!(numbers(chain.get_blocks(5u64, 3, 0, true).await.unwrap()), vec![5, 4, 3]);
        assert_eq!(numbers(chain.get_blocks(5u64, 10, 2, true).await.unwrap()), vec![5, 2]);
        assert_eq!(numbers(chain.get_blocks(4u64, 10, 0, false).await.unwrap()), vec![4, 5]);
        assert!(chain.get_blocks(9u64, 10, 0, false).await.unwrap().is_empty());
        assert!(chain.get_blocks(0u64, 0, 0, false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_blocks_propagates_corruption() {
        let chain = memory_chain().await;
        let blocks = extend(&genesis(), 2, 1, 0);
        chain.put_blocks(&blocks).await.unwrap();
        chain
            .block_store
            .put(&block_key(&blocks[0].hash()), &[0xff, 0x00])
            .unwrap();

        let err = chain.get_blocks(0u64, 3, 0, false).await.unwrap_err();
        assert!(matches!(err, CanonError::Block(_)));
    }

    #[tokio::test]
    async fn select_needed_hashes_returns_unknown_suffix() {
        let chain = memory_chain().await;
        let blocks = extend(&genesis(), 5, 1, 0);
        chain.put_blocks(&blocks[..3]).await.unwrap();
        let hashes: Vec<Hash256> = blocks.iter().map(Block::hash).collect();

        assert_eq!(chain.select_needed_hashes(&hashes).await.unwrap(), hashes[3..].to_vec());
        assert_eq!(chain.select_needed_hashes(&hashes[..3]).await.unwrap(), Vec::<Hash256>::new());
        assert_eq!(
            chain.select_needed_hashes(&hashes[3..]).await.unwrap(),
            hashes[3..].to_vec()
        );
        assert!(chain.select_needed_hashes(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn details_round_trip() {
        let chain = memory_chain().await;
        let a = child(&genesis(), 1, 1);
        chain.put_block(&a).await.unwrap();

        let mut record = chain.get_details(&a.hash()).await.unwrap();
        record.delivered.insert("audit".into(), true);
        chain.put_details(&a.hash(), record.clone()).await.unwrap();
        assert_eq!(chain.get_details(&a.hash()).await.unwrap(), record);

        let missing = chain.get_details(&Hash256([3; 32])).await.unwrap_err();
        assert!(matches!(missing, CanonError::Chain(ChainError::DetailsNotFound(_))));
    }

    #[tokio::test]
    async fn get_head_by_name() {
        let chain = memory_chain().await;
        let a = child(&genesis(), 1, 1);
        chain.put_block(&a).await.unwrap();
        assert_eq!(chain.get_head(None).await.unwrap(), a);
        assert_eq!(chain.get_head(Some("vm")).await.unwrap(), a);

        chain.iterate("vm", |_, _| Ok(())).await.unwrap();
        let b = child(&a, 1, 1);
        chain.put_block(&b).await.unwrap();
        assert_eq!(chain.get_head(Some("vm")).await.unwrap(), a);
        assert_eq!(chain.get_head(None).await.unwrap(), b);
    }
}
