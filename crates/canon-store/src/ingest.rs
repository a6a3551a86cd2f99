//! Block ingestion and total-difficulty fork choice.
//!
//! A block becomes the raw head only when its total difficulty strictly
//! exceeds the current head's. Ties keep the first-seen head.

use canon_core::error::{BlockError, CanonError, ChainError};
use canon_core::traits::ChainReader;
use canon_core::types::{Block, BlockDetails, Hash256};

use crate::batch::{self, WriteSet};
use crate::blockchain::Blockchain;
use crate::meta::MetaState;

impl Blockchain {
    /// Ingest a block whose parent is already stored.
    pub async fn put_block(&self, block: &Block) -> Result<(), CanonError> {
        self.gate.wait().await?;
        self.ingest(block, false).await
    }

    /// Ingest blocks in order, stopping at the first failure.
    pub async fn put_blocks(&self, blocks: &[Block]) -> Result<(), CanonError> {
        for block in blocks {
            self.put_block(block).await?;
        }
        Ok(())
    }

    /// Ingest a genesis block.
    ///
    /// Fails with [`ChainError::AlreadyGenesis`] if a different genesis is
    /// already recorded.
    pub async fn put_genesis(&self, block: &Block) -> Result<(), CanonError> {
        self.gate.wait().await?;
        self.ingest(block, true).await
    }

    pub(crate) async fn ingest(&self, block: &Block, is_genesis: bool) -> Result<(), CanonError> {
        let _ingest = self.ingest_lock.lock().await;
        let mut meta = self.meta.lock().await;
        let hash = block.hash();
        let detail_store = self.detail_store.as_ref();

        if meta.genesis.is_some_and(|existing| is_genesis && existing != hash) {
            return Err(ChainError::AlreadyGenesis.into());
        }
        if self.contains(&hash)? {
            tracing::debug!(%hash, "block already known");
            return Ok(());
        }

        if self.config.validate {
            if block.is_genesis() && !is_genesis {
                return Err(ChainError::AlreadyGenesis.into());
            }
            self.validator.validate(block, self)?;
            if !self.pow.verify(block) {
                return Err(BlockError::InvalidPoW.into());
            }
        }

        let mut set = WriteSet::new();
        set.put_block(hash, block.encode()?);

        let parent_hash = block.parent_hash();
        let parent_td = if is_genesis {
            0
        } else {
            let mut parent = set
                .details(detail_store, &parent_hash)?
                .ok_or_else(|| ChainError::ParentNotFound(parent_hash.to_string()))?;
            parent.add_stale_child(hash);
            let td = parent.total_difficulty;
            set.put_details(parent_hash, parent);
            td
        };
        let total_difficulty = parent_td + u128::from(block.difficulty());
        let mut record =
            BlockDetails::new(parent_hash, total_difficulty, block.number(), is_genesis);

        tracing::debug!(
            %hash,
            number = block.number(),
            total_difficulty,
            "ingesting block"
        );

        if !is_genesis && total_difficulty <= meta.total_difficulty {
            set.put_details(hash, record);
            return batch::commit(&self.block_store, &self.detail_store, set).await;
        }

        // New raw head.
        record.in_chain = true;
        self.demote_canonical_from(&mut set, &meta, block.number(), hash)?;
        set.put_details(hash, record);
        set.set_number(block.number(), hash);
        if !is_genesis {
            self.rebuild(&mut set, hash, parent_hash)?;
        }

        let mut next = meta.clone();
        next.raw_head = Some(hash);
        next.height = block.number();
        next.total_difficulty = total_difficulty;
        if is_genesis {
            next.genesis = Some(hash);
        }
        set.set_meta(next.clone());
        batch::commit(&self.block_store, &self.detail_store, set).await?;

        if meta.raw_head.is_some_and(|old| old != parent_hash) {
            tracing::info!(
                old_head = ?meta.raw_head,
                old_height = meta.height,
                new_head = %hash,
                new_height = next.height,
                "chain reorganized"
            );
        }
        *meta = next;
        Ok(())
    }

    /// Demote the canonical blocks at heights `from..=meta.height` ahead of
    /// installing `new_head` at height `from`, and drop Number Index entries
    /// above `from`.
    fn demote_canonical_from(
        &self,
        set: &mut WriteSet,
        meta: &MetaState,
        from: u64,
        new_head: Hash256,
    ) -> Result<(), CanonError> {
        if meta.raw_head.is_none() {
            return Ok(());
        }
        let detail_store = self.detail_store.as_ref();
        for number in from..=meta.height {
            let Some(old) = set.number(detail_store, number)? else {
                continue;
            };
            if old != new_head {
                if let Some(mut record) = set.details(detail_store, &old)? {
                    record.in_chain = false;
                    set.put_details(old, record);
                }
            }
            if number > from {
                set.clear_number(number);
            }
        }
        Ok(())
    }
}
