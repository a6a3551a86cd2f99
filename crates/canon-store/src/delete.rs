//! Subtree deletion.

use std::collections::HashSet;

use canon_core::error::{CanonError, ChainError};
use canon_core::types::{BlockId, Hash256};

use crate::batch::{self, WriteSet};
use crate::blockchain::Blockchain;

impl Blockchain {
    /// Delete a block and every descendant (canonical and stale).
    ///
    /// Named heads pointing into the deleted subtree move to the target's
    /// parent. If the target was canonical, the parent becomes the raw head.
    /// Returns the number of blocks deleted.
    pub async fn del_block(&self, id: impl Into<BlockId>) -> Result<u64, CanonError> {
        self.gate.wait().await?;
        let _ingest = self.ingest_lock.lock().await;
        let mut meta = self.meta.lock().await;
        let detail_store = self.detail_store.as_ref();

        let target_hash = self.resolve(id.into())?;
        let mut set = WriteSet::new();
        let target = set
            .details(detail_store, &target_hash)?
            .ok_or_else(|| ChainError::DetailsNotFound(target_hash.to_string()))?;
        if target.is_genesis {
            return Err(ChainError::GenesisDeletion.into());
        }

        let mut parent = set
            .details(detail_store, &target.parent)?
            .ok_or_else(|| ChainError::DetailsNotFound(target.parent.to_string()))?;
        if parent.child == Some(target_hash) {
            parent.child = None;
        }
        parent.remove_stale_child(&target_hash);
        let parent_td = parent.total_difficulty;
        set.put_details(target.parent, parent);

        let deleted = self.stage_subtree_removal(&mut set, target_hash)?;

        let mut next = meta.clone();
        for head in next.heads.values_mut() {
            if deleted.contains(head) {
                *head = target.parent;
            }
        }
        if target.in_chain {
            next.raw_head = Some(target.parent);
            next.height = target.number.saturating_sub(1);
            next.total_difficulty = parent_td;
        }
        set.set_meta(next.clone());
        batch::commit(&self.block_store, &self.detail_store, set).await?;

        tracing::info!(
            hash = %target_hash,
            number = target.number,
            deleted = deleted.len(),
            was_canonical = target.in_chain,
            "deleted block subtree"
        );
        *meta = next;
        Ok(deleted.len() as u64)
    }

    /// Stage deletion of `root` and all of its descendants. Returns the set of
    /// deleted hashes.
    fn stage_subtree_removal(
        &self,
        set: &mut WriteSet,
        root: Hash256,
    ) -> Result<HashSet<Hash256>, CanonError> {
        let detail_store = self.detail_store.as_ref();
        let max_blocks = self.config.max_reorg_depth;
        let mut visited = HashSet::new();
        let mut work = vec![root];

        while let Some(hash) = work.pop() {
            if !visited.insert(hash) {
                continue;
            }
            if visited.len() as u64 > max_blocks {
                return Err(ChainError::DepthExceeded(max_blocks).into());
            }
            if let Some(record) = set.details(detail_store, &hash)? {
                work.extend(record.children());
                if record.in_chain && set.number(detail_store, record.number)? == Some(hash) {
                    set.clear_number(record.number);
                }
            }
            set.delete_details(hash);
            set.delete_block(hash);
        }
        Ok(visited)
    }
}
