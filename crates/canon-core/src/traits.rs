//! Trait interfaces for the collaborators of the block store.
//!
//! - [`ChainReader`]: read-only view of stored blocks and ancestry (canon-store implements)
//! - [`BlockValidator`]: structural and contextual block checks (canon-consensus implements)
//! - [`PowVerifier`]: proof-of-work check (canon-consensus implements)

use crate::error::CanonError;
use crate::types::{Block, BlockDetails, Hash256};

/// Read-only view of the stored block tree.
///
/// Handed to [`BlockValidator::validate`] so validators can look up parents
/// and ancestors of the block being ingested.
pub trait ChainReader: Send + Sync {
    /// Get a full block by its hash. Returns `None` if not stored.
    fn block(&self, hash: &Hash256) -> Result<Option<Block>, CanonError>;

    /// Get the ancestry record of a block. Returns `None` if not stored.
    fn details(&self, hash: &Hash256) -> Result<Option<BlockDetails>, CanonError>;

    /// Whether a block with this hash has been ingested.
    ///
    /// Default implementation delegates to [`details`](Self::details).
    fn contains(&self, hash: &Hash256) -> Result<bool, CanonError> {
        Ok(self.details(hash)?.is_some())
    }
}

/// Block structure and consensus-rule validation.
pub trait BlockValidator: Send + Sync {
    /// Validate `block` against its stored ancestry.
    ///
    /// Genesis blocks are validated without a parent lookup. Rule violations
    /// are [`CanonError::Block`]; failed lookups keep their own error.
    fn validate(&self, block: &Block, chain: &dyn ChainReader) -> Result<(), CanonError>;
}

/// Proof-of-work verification.
pub trait PowVerifier: Send + Sync {
    /// Whether the block header satisfies its claimed difficulty.
    fn verify(&self, block: &Block) -> bool;
}

/// Validator that accepts every block.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl BlockValidator for AcceptAll {
    fn validate(&self, _block: &Block, _chain: &dyn ChainReader) -> Result<(), CanonError> {
        Ok(())
    }
}

impl PowVerifier for AcceptAll {
    fn verify(&self, _block: &Block) -> bool {
        true
    }
}
