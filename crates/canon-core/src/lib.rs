//! # canon-core
//! Foundation types, collaborator traits, and key-value abstractions for the
//! Canon block store.

pub mod constants;
pub mod error;
pub mod genesis;
pub mod kv;
pub mod merkle;
pub mod traits;
pub mod types;
