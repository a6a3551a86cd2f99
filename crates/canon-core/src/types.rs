//! Core chain types: hashes, headers, blocks, block identifiers, and the
//! per-block ancestry record kept by the store.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{BlockError, ChainError};
use crate::merkle;

/// A 32-byte hash value.
///
/// Used for block header hashes (double SHA-256) and payload roots (BLAKE3).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes). Parent hash of the genesis block.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Build a hash from a byte slice. Returns `None` unless the slice is 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    /// Parse 64 hex digits, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Option<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).ok()?;
        Self::from_slice(&bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Lowercase hex encoding without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Block header carrying the chain linkage and the proof-of-work puzzle.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    /// Protocol version.
    pub version: u64,
    /// Hash of the parent block header. Zero for genesis.
    pub parent_hash: Hash256,
    /// Height of this block. Genesis is 0.
    pub number: u64,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Proof-of-work difficulty. Higher means more work; summed into total difficulty.
    pub difficulty: u64,
    /// BLAKE3 Merkle root of the payload entries.
    pub payload_root: Hash256,
    /// Proof-of-work nonce.
    pub nonce: u64,
    /// Free-form producer data, at most [`MAX_EXTRA_DATA`](crate::constants::MAX_EXTRA_DATA) bytes.
    pub extra_data: Vec<u8>,
}

impl BlockHeader {
    /// Fixed part of the hashing layout: 5 u64 fields + 2 * 32-byte hashes.
    const FIXED_HASH_SIZE: usize = 5 * 8 + 2 * 32;

    /// Bytes committed to by the header hash.
    ///
    /// Layout: version || parent_hash || number || timestamp || difficulty ||
    /// payload_root || nonce || len(extra_data) || extra_data, integers little-endian.
    pub fn header_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(Self::FIXED_HASH_SIZE + 8 + self.extra_data.len());
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(self.parent_hash.as_bytes());
        data.extend_from_slice(&self.number.to_le_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.extend_from_slice(&self.difficulty.to_le_bytes());
        data.extend_from_slice(self.payload_root.as_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        data.extend_from_slice(&(self.extra_data.len() as u64).to_le_bytes());
        data.extend_from_slice(&self.extra_data);
        data
    }

    /// Compute the block header hash (double SHA-256 over [`header_bytes`](Self::header_bytes)).
    pub fn hash(&self) -> Hash256 {
        let first = Sha256::digest(self.header_bytes());
        Hash256(Sha256::digest(first).into())
    }
}

/// A complete block: header plus opaque payload entries.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Block {
    /// Block header with proof-of-work.
    pub header: BlockHeader,
    /// Opaque payload entries. Their contents are never interpreted by the store.
    pub payload: Vec<Vec<u8>>,
}

impl Block {
    /// Block hash (the header hash).
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// Parent block hash.
    pub fn parent_hash(&self) -> Hash256 {
        self.header.parent_hash
    }

    /// Block height.
    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Block difficulty.
    pub fn difficulty(&self) -> u64 {
        self.header.difficulty
    }

    /// Whether the block claims to be a genesis block (height 0, zero parent).
    pub fn is_genesis(&self) -> bool {
        self.header.number == 0 && self.header.parent_hash.is_zero()
    }

    /// Merkle root computed from the current payload entries.
    pub fn compute_payload_root(&self) -> Hash256 {
        merkle::payload_root(&self.payload)
    }

    /// Canonical binary encoding (bincode, standard config).
    pub fn encode(&self) -> Result<Vec<u8>, BlockError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| BlockError::Codec(e.to_string()))
    }

    /// Decode a block from its canonical encoding. Trailing bytes are rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, BlockError> {
        let (block, read): (Block, usize) =
            bincode::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| BlockError::Codec(e.to_string()))?;
        if read != bytes.len() {
            return Err(BlockError::Codec(format!(
                "{} trailing bytes after block",
                bytes.len() - read
            )));
        }
        Ok(block)
    }
}

/// Identifies a block either by hash or by canonical height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockId {
    Hash(Hash256),
    Number(u64),
}

impl From<Hash256> for BlockId {
    fn from(hash: Hash256) -> Self {
        Self::Hash(hash)
    }
}

impl From<u64> for BlockId {
    fn from(number: u64) -> Self {
        Self::Number(number)
    }
}

impl From<&Block> for BlockId {
    fn from(block: &Block) -> Self {
        Self::Hash(block.hash())
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash(hash) => write!(f, "0x{hash}"),
            Self::Number(number) => write!(f, "{number}"),
        }
    }
}

impl FromStr for BlockId {
    type Err = ChainError;

    /// Accepts 64 hex digits (optionally `0x`-prefixed) as a hash and a
    /// decimal integer as a height.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if digits.len() == 64 {
            if let Some(hash) = Hash256::from_hex(digits) {
                return Ok(Self::Hash(hash));
            }
        }
        if !trimmed.starts_with("0x") {
            if let Ok(number) = trimmed.parse::<u64>() {
                return Ok(Self::Number(number));
            }
        }
        Err(ChainError::UnknownTag(s.to_string()))
    }
}

/// Ancestry record kept for every known block.
///
/// Links are hash-valued: `parent`, the canonical `child`, and the set of
/// known non-canonical `stale_children`. `in_chain` marks membership of the
/// canonical path from genesis to the heaviest head.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockDetails {
    /// Parent block hash. Zero for genesis.
    pub parent: Hash256,
    /// Cumulative difficulty from genesis up to and including this block.
    pub total_difficulty: u128,
    /// Block height.
    pub number: u64,
    /// Child currently on the canonical path, if any.
    pub child: Option<Hash256>,
    /// Known children that are not canonical.
    pub stale_children: Vec<Hash256>,
    /// Whether this is the genesis block.
    pub is_genesis: bool,
    /// Whether this block is on the canonical path.
    pub in_chain: bool,
    /// Consumers this block has been delivered to by the chain iterator.
    pub delivered: BTreeMap<String, bool>,
}

impl BlockDetails {
    /// Fresh record with no children, not yet on the canonical path.
    pub fn new(parent: Hash256, total_difficulty: u128, number: u64, is_genesis: bool) -> Self {
        Self {
            parent,
            total_difficulty,
            number,
            is_genesis,
            ..Self::default()
        }
    }

    /// Record `hash` as a stale child. Ignores duplicates and the current canonical child.
    pub fn add_stale_child(&mut self, hash: Hash256) {
        if self.child != Some(hash) && !self.stale_children.contains(&hash) {
            self.stale_children.push(hash);
        }
    }

    /// Drop `hash` from the stale children. Returns whether it was present.
    pub fn remove_stale_child(&mut self, hash: &Hash256) -> bool {
        let before = self.stale_children.len();
        self.stale_children.retain(|h| h != hash);
        before != self.stale_children.len()
    }

    /// All known children: the canonical child first, then stale children.
    pub fn children(&self) -> impl Iterator<Item = Hash256> + '_ {
        self.child.into_iter().chain(self.stale_children.iter().copied())
    }

    /// Whether the chain iterator has delivered this block to `consumer`.
    pub fn is_delivered_to(&self, consumer: &str) -> bool {
        self.delivered.get(consumer).copied().unwrap_or(false)
    }

    pub fn encode(&self) -> Result<Vec<u8>, BlockError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| BlockError::Codec(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, BlockError> {
        let (details, _): (BlockDetails, usize) =
            bincode::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| BlockError::Codec(e.to_string()))?;
        Ok(details)
    }
}
