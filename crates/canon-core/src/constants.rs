//! Protocol and storage constants.

/// Only block version accepted by the default validator.
pub const BLOCK_VERSION: u64 = 1;

/// Maximum encoded block size in bytes.
pub const MAX_BLOCK_SIZE: usize = 1_048_576;

/// Maximum number of payload entries in a single block.
pub const MAX_PAYLOAD_ENTRIES: usize = 4_096;

/// Maximum length of the header `extra_data` field.
pub const MAX_EXTRA_DATA: usize = 32;

/// How far (in seconds) a block timestamp may run ahead of the local clock.
pub const MAX_FUTURE_BLOCK_TIME: u64 = 2 * 60 * 60;

/// Genesis block timestamp: January 1, 2026 00:00:00 UTC.
pub const GENESIS_TIMESTAMP: u64 = 1_767_225_600;

/// Difficulty of the default genesis block.
///
/// A difficulty of 1 maps to the easiest PoW target, so any nonce is valid.
pub const GENESIS_DIFFICULTY: u64 = 1;

/// Default upper bound on ancestor steps taken by a single reorganization or
/// subtree deletion.
pub const DEFAULT_MAX_REORG_DEPTH: u64 = 100_000;

/// Key prefix for Detail Records in the detail store.
pub const DETAIL_KEY_PREFIX: &str = "detail:";

/// Key of the Meta State record in the detail store.
pub const META_KEY: &[u8] = b"meta";
