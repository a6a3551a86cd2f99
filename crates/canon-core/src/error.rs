//! Error types for the Canon block store.
use thiserror::Error;

/// Block-level validation and codec failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("invalid proof of work")] InvalidPoW,
    #[error("unsupported block version: {0}")] InvalidBlockVersion(u64),
    #[error("invalid payload root")] InvalidPayloadRoot,
    #[error("unknown parent: {0}")] UnknownParent(String),
    #[error("invalid number: got {got}, expected {expected}")] InvalidNumber { got: u64, expected: u64 },
    #[error("timestamp not after parent")] TimestampNotAfterParent,
    #[error("timestamp too far: {0}")] TimestampTooFar(u64),
    #[error("zero difficulty")] ZeroDifficulty,
    #[error("oversized: {size} > {max}")] OversizedBlock { size: usize, max: usize },
    #[error("too many payload entries: {count} > {max}")] TooManyPayloadEntries { count: usize, max: usize },
    #[error("extra data too long: {0} bytes")] ExtraDataTooLong(usize),
    #[error("invalid genesis: {0}")] InvalidGenesis(String),
    #[error("codec: {0}")] Codec(String),
}

/// Chain-structure failures raised by the block store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("block not found: {0}")] BlockNotFound(String),
    #[error("parent not found: {0}")] ParentNotFound(String),
    #[error("details not found: {0}")] DetailsNotFound(String),
    #[error("already have genesis set")] AlreadyGenesis,
    #[error("unknown block tag: {0}")] UnknownTag(String),
    #[error("genesis block cannot be deleted")] GenesisDeletion,
    #[error("ancestry walk exceeded {0} blocks")] DepthExceeded(u64),
    #[error("chain initialization failed: {0}")] InitFailed(String),
}

#[derive(Error, Debug)]
pub enum CanonError {
    #[error(transparent)] Block(#[from] BlockError),
    #[error(transparent)] Chain(#[from] ChainError),
    #[error("storage: {0}")] Storage(String),
    #[error("consumer: {0}")] Consumer(String),
}

impl CanonError {
    /// Whether this error reports a missing block, parent, or record.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Chain(
                ChainError::BlockNotFound(_)
                    | ChainError::ParentNotFound(_)
                    | ChainError::DetailsNotFound(_)
            )
        )
    }
}
