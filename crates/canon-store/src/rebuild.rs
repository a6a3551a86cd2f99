//! Canonical path re-linking.
//!
//! After a new raw head is staged, walk its ancestors until reaching one that
//! is already canonical. Each step points the ancestor's `child` at the path
//! being installed, moves the displaced child into `stale_children`, and
//! takes over the Number Index entry at the ancestor's height.

use canon_core::error::{CanonError, ChainError};
use canon_core::types::Hash256;

use crate::batch::WriteSet;
use crate::blockchain::Blockchain;

impl Blockchain {
    /// Re-link the canonical path from `child` (the new head) back to the
    /// nearest canonical ancestor, starting at `parent`.
    pub(crate) fn rebuild(
        &self,
        set: &mut WriteSet,
        mut child: Hash256,
        mut parent_hash: Hash256,
    ) -> Result<(), CanonError> {
        let detail_store = self.detail_store.as_ref();
        let max_depth = self.config.max_reorg_depth;
        let mut steps = 0u64;

        loop {
            if steps >= max_depth {
                return Err(ChainError::DepthExceeded(max_depth).into());
            }
            steps += 1;

            let mut parent = set
                .details(detail_store, &parent_hash)?
                .ok_or_else(|| ChainError::DetailsNotFound(parent_hash.to_string()))?;

            parent.remove_stale_child(&child);
            if let Some(displaced) = parent.child.replace(child).filter(|old| *old != child) {
                parent.add_stale_child(displaced);
            }

            if parent.in_chain {
                set.put_details(parent_hash, parent);
                if steps > 1 {
                    tracing::debug!(%parent_hash, steps, "rebuilt canonical path");
                }
                return Ok(());
            }

            parent.in_chain = true;
            if let Some(holder) = set.number(detail_store, parent.number)? {
                if holder != parent_hash {
                    if let Some(mut demoted) = set.details(detail_store, &holder)? {
                        demoted.in_chain = false;
                        set.put_details(holder, demoted);
                    }
                }
            }
            set.set_number(parent.number, parent_hash);

            let grandparent = parent.parent;
            let reached_genesis = parent.is_genesis;
            set.put_details(parent_hash, parent);
            if reached_genesis {
                return Ok(());
            }

            child = parent_hash;
            parent_hash = grandparent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;
    use crate::test_utils::{child, extend, genesis, memory_chain_with};

    #[tokio::test]
    async fn depth_limit_aborts_without_committing() {
        let config = ChainConfig {
            max_reorg_depth: 1,
            ..ChainConfig::trusted()
        };
        let chain = memory_chain_with(config).await;
        let g = genesis();

        // Extending the head needs one step.
        let main = extend(&g, 2, 1, 1);
        chain.put_blocks(&main).await.unwrap();

        // A heavy sibling of the head is one step away from genesis.
        let fork = extend(&g, 2, 2, 2);
        let err = chain.put_blocks(&fork).await.unwrap_err();
        assert!(matches!(
            err,
            CanonError::Chain(ChainError::DepthExceeded(1))
        ));

        let meta = chain.meta().await.unwrap();
        assert_eq!(meta.raw_head, Some(main[1].hash()));
        assert!(chain.get_details(&fork[1].hash()).await.is_err());
        assert!(!chain.get_details(&fork[0].hash()).await.unwrap().in_chain);
        assert_eq!(chain.get_block(2u64).await.unwrap(), main[1]);
    }

    #[tokio::test]
    async fn displaced_child_moves_to_stale() {
        let chain = memory_chain_with(ChainConfig::trusted()).await;
        let g = genesis();
        let a = child(&g, 1, 1);
        let b = child(&g, 1, 2);
        let b2 = child(&b, 5, 2);
        chain.put_blocks(&[a.clone(), b.clone(), b2.clone()]).await.unwrap();

        let g_record = chain.get_details(&g.hash()).await.unwrap();
        assert_eq!(g_record.child, Some(b.hash()));
        assert_eq!(g_record.stale_children, vec![a.hash()]);
        assert!(!g_record.stale_children.contains(&b.hash()));

        let b_record = chain.get_details(&b.hash()).await.unwrap();
        assert!(b_record.in_chain);
        assert_eq!(b_record.child, Some(b2.hash()));
        assert!(b_record.stale_children.is_empty());
        assert_eq!(chain.get_block(1u64).await.unwrap(), b);
    }
}
