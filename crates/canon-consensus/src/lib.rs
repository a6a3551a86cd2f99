//! # canon-consensus: Block validation and proof-of-work.
//!
//! This crate implements the [`BlockValidator`](canon_core::traits::BlockValidator)
//! and [`PowVerifier`](canon_core::traits::PowVerifier) traits used by the
//! block store during ingestion, plus a nonce-search miner for development
//! chains and tests.

pub mod engine;

pub use engine::{check_pow, mine_block, pow_target, ConsensusEngine};
