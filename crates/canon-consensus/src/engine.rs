//! Consensus engine implementing [`BlockValidator`] and [`PowVerifier`].
//!
//! Validation has two levels:
//!
//! - **Structural** ([`validate_structure`]): context-free checks on version,
//!   payload commitment, size limits, and difficulty.
//! - **Contextual** ([`ConsensusEngine::validate`]): parent linkage through the
//!   store's [`ChainReader`], height continuity, and timestamp rules.
//!
//! # Difficulty semantics
//!
//! `difficulty` is a work measure where **higher = harder**. The PoW check
//! interprets the first 8 bytes of the header hash as a little-endian u64 and
//! requires it to be at most `u64::MAX / difficulty`. Difficulty 1 accepts any
//! hash.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use canon_core::constants::{
    BLOCK_VERSION, MAX_BLOCK_SIZE, MAX_EXTRA_DATA, MAX_FUTURE_BLOCK_TIME, MAX_PAYLOAD_ENTRIES,
};
use canon_core::error::{BlockError, CanonError};
use canon_core::traits::{BlockValidator, ChainReader, PowVerifier};
use canon_core::types::{Block, BlockHeader};

/// PoW target for a difficulty. Zero difficulty has no valid target.
pub fn pow_target(difficulty: u64) -> Option<u64> {
    match difficulty {
        0 => None,
        d => Some(u64::MAX / d),
    }
}

/// Check if a header hash satisfies the header's own difficulty.
pub fn check_pow(header: &BlockHeader) -> bool {
    let Some(target) = pow_target(header.difficulty) else {
        return false;
    };
    let hash = header.hash();
    let [a, b, c, d, e, f, g, h, ..] = hash.0;
    u64::from_le_bytes([a, b, c, d, e, f, g, h]) <= target
}

/// Attempt to mine a block by incrementing the nonce until PoW is satisfied.
///
/// Modifies `block.header.nonce` in place. Returns `true` if a valid nonce
/// was found within `[0, max_nonce]`, `false` otherwise.
pub fn mine_block(block: &mut Block, max_nonce: u64) -> bool {
    for nonce in 0..=max_nonce {
        block.header.nonce = nonce;
        if check_pow(&block.header) {
            return true;
        }
    }
    false
}

/// Context-free block checks.
///
/// Checks:
/// - Header version is [`BLOCK_VERSION`]
/// - `extra_data` and payload entry count are within limits
/// - Difficulty is non-zero
/// - Payload root matches the payload
/// - Encoded size is within [`MAX_BLOCK_SIZE`]
pub fn validate_structure(block: &Block) -> Result<(), BlockError> {
    if block.header.version != BLOCK_VERSION {
        return Err(BlockError::InvalidBlockVersion(block.header.version));
    }

    if block.header.extra_data.len() > MAX_EXTRA_DATA {
        return Err(BlockError::ExtraDataTooLong(block.header.extra_data.len()));
    }

    if block.payload.len() > MAX_PAYLOAD_ENTRIES {
        return Err(BlockError::TooManyPayloadEntries {
            count: block.payload.len(),
            max: MAX_PAYLOAD_ENTRIES,
        });
    }

    if block.header.difficulty == 0 {
        return Err(BlockError::ZeroDifficulty);
    }

    if block.compute_payload_root() != block.header.payload_root {
        return Err(BlockError::InvalidPayloadRoot);
    }

    let size = block.encode()?.len();
    if size > MAX_BLOCK_SIZE {
        return Err(BlockError::OversizedBlock {
            size,
            max: MAX_BLOCK_SIZE,
        });
    }

    Ok(())
}

/// The default validator and PoW verifier.
pub struct ConsensusEngine {
    clock: Box<dyn Fn() -> u64 + Send + Sync>,
}

impl fmt::Debug for ConsensusEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsensusEngine").finish_non_exhaustive()
    }
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsensusEngine {
    /// Create an engine using the system clock for future-timestamp checks.
    pub fn new() -> Self {
        Self::with_clock(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        })
    }

    /// Create an engine with a custom clock (Unix seconds).
    pub fn with_clock(clock: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        Self {
            clock: Box::new(clock),
        }
    }
}

impl BlockValidator for ConsensusEngine {
    fn validate(&self, block: &Block, chain: &dyn ChainReader) -> Result<(), CanonError> {
        validate_structure(block)?;

        let now = (self.clock)();
        if block.header.timestamp > now.saturating_add(MAX_FUTURE_BLOCK_TIME) {
            return Err(BlockError::TimestampTooFar(block.header.timestamp).into());
        }

        if block.is_genesis() {
            return Ok(());
        }
        if block.number() == 0 {
            return Err(BlockError::InvalidGenesis("height 0 with non-zero parent".into()).into());
        }

        // Lookup failures propagate as-is; only a missing parent is a rule violation.
        let parent_hash = block.parent_hash();
        let parent = chain
            .block(&parent_hash)?
            .ok_or_else(|| BlockError::UnknownParent(parent_hash.to_string()))?;

        let expected = parent.number() + 1;
        if block.number() != expected {
            tracing::debug!(
                hash = %block.hash(),
                got = block.number(),
                expected,
                "rejecting block with wrong height"
            );
            return Err(BlockError::InvalidNumber {
                got: block.number(),
                expected,
            }
            .into());
        }

        if block.header.timestamp <= parent.header.timestamp {
            return Err(BlockError::TimestampNotAfterParent.into());
        }

        Ok(())
    }
}

impl PowVerifier for ConsensusEngine {
    fn verify(&self, block: &Block) -> bool {
        check_pow(&block.header)
    }
}
