//! BLAKE3 Merkle root for block payload commitment.
//!
//! Leaves are `BLAKE3(0x00 || entry)` and inner nodes
//! `BLAKE3(0x01 || left || right)`. An empty payload commits to
//! [`Hash256::ZERO`].

use crate::types::Hash256;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Hash of one payload entry.
pub fn leaf_hash(data: &[u8]) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    hasher.update(data);
    Hash256(hasher.finalize().into())
}

/// Hash of two child nodes.
pub fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash256(hasher.finalize().into())
}

/// Merkle root over a block's payload entries.
///
/// Layers with an odd count pair their last hash with itself.
pub fn payload_root(entries: &[Vec<u8>]) -> Hash256 {
    let mut layer: Vec<Hash256> = entries.iter().map(|e| leaf_hash(e)).collect();
    while layer.len() > 1 {
        layer = layer
            .chunks(2)
            .map(|pair| node_hash(&pair[0], &pair[pair.len() - 1]))
            .collect();
    }
    layer.first().copied().unwrap_or(Hash256::ZERO)
}
