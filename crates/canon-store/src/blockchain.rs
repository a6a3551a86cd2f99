//! The [`Blockchain`] handle: store wiring, bootstrap, and the init gate.
//!
//! Operations are split by concern across sibling modules, each adding an
//! `impl Blockchain` block:
//!
//! - [`ingest`](crate::ingest): `put_block`, `put_blocks`, `put_genesis`
//! - [`rebuild`](crate::rebuild): canonical path re-linking on reorg
//! - [`retrieve`](crate::retrieve): lookups, ranges, `select_needed_hashes`
//! - [`delete`](crate::delete): subtree deletion
//! - [`iterate`](crate::iterate): resumable per-consumer iteration
//!
//! # Locking
//!
//! Two async mutexes, always taken in this order:
//!
//! 1. `ingest_lock` serializes ingestion and deletion.
//! 2. `meta` guards the in-memory [`MetaState`] and is held across every
//!    commit that rewrites Detail Records, so iterator checkpoints and
//!    ingestion never persist stale snapshots over each other.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use canon_consensus::ConsensusEngine;
use canon_core::error::{CanonError, ChainError};
use canon_core::genesis;
use canon_core::kv::KvStore;
use canon_core::traits::{BlockValidator, ChainReader, PowVerifier};
use canon_core::types::{Block, BlockDetails, Hash256};

use crate::batch::{self, WriteSet};
use crate::config::ChainConfig;
use crate::details::{load_block, load_details};
use crate::gate::{GateState, InitGate};
use crate::meta::MetaState;
use crate::rocks::RocksKv;

/// Collaborators of a [`Blockchain`].
pub struct ChainParts {
    /// Store for encoded blocks, keyed by hash.
    pub blocks: Arc<dyn KvStore>,
    /// Store for Detail Records, the Number Index, and Meta State.
    pub details: Arc<dyn KvStore>,
    pub validator: Arc<dyn BlockValidator>,
    pub pow: Arc<dyn PowVerifier>,
    /// Block installed when the detail store holds no Meta State.
    pub genesis: Block,
}

impl ChainParts {
    /// Parts using [`ConsensusEngine`] and the default genesis block.
    pub fn new(blocks: Arc<dyn KvStore>, details: Arc<dyn KvStore>) -> Self {
        let engine = Arc::new(ConsensusEngine::new());
        Self {
            blocks,
            details,
            validator: engine.clone(),
            pow: engine,
            genesis: genesis::genesis_block().clone(),
        }
    }

    /// Replace the genesis block.
    pub fn with_genesis(mut self, genesis: Block) -> Self {
        self.genesis = genesis;
        self
    }
}

/// Fork-aware block store.
///
/// Construct with [`Blockchain::new`] (gate closed) and run [`init`](Self::init)
/// or [`spawn_init`](Self::spawn_init), or use [`Blockchain::open`] for both.
pub struct Blockchain {
    pub(crate) block_store: Arc<dyn KvStore>,
    pub(crate) detail_store: Arc<dyn KvStore>,
    pub(crate) validator: Arc<dyn BlockValidator>,
    pub(crate) pow: Arc<dyn PowVerifier>,
    pub(crate) genesis: Block,
    pub(crate) config: ChainConfig,
    pub(crate) gate: InitGate,
    init_started: AtomicBool,
    pub(crate) ingest_lock: Mutex<()>,
    pub(crate) meta: Mutex<MetaState>,
}

impl fmt::Debug for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blockchain")
            .field("genesis", &self.genesis.hash())
            .field("config", &self.config)
            .field("gate", &self.gate.state())
            .finish_non_exhaustive()
    }
}

impl Blockchain {
    /// Store over the given KV pair, validated by [`ConsensusEngine`].
    pub fn new(
        blocks: Arc<dyn KvStore>,
        details: Arc<dyn KvStore>,
        config: ChainConfig,
    ) -> Arc<Self> {
        Self::with_parts(ChainParts::new(blocks, details), config)
    }

    pub fn with_parts(parts: ChainParts, config: ChainConfig) -> Arc<Self> {
        Arc::new(Self {
            block_store: parts.blocks,
            detail_store: parts.details,
            validator: parts.validator,
            pow: parts.pow,
            genesis: parts.genesis,
            config,
            gate: InitGate::new(),
            init_started: AtomicBool::new(false),
            ingest_lock: Mutex::new(()),
            meta: Mutex::new(MetaState::default()),
        })
    }

    /// [`new`](Self::new) followed by [`init`](Self::init).
    pub async fn open(
        blocks: Arc<dyn KvStore>,
        details: Arc<dyn KvStore>,
        config: ChainConfig,
    ) -> Result<Arc<Self>, CanonError> {
        let chain = Self::new(blocks, details, config);
        chain.init().await?;
        Ok(chain)
    }

    /// Open a RocksDB-backed store at `path`.
    pub async fn open_rocks(
        path: impl AsRef<Path>,
        config: ChainConfig,
    ) -> Result<Arc<Self>, CanonError> {
        let (blocks, details) = RocksKv::open_pair(path)?;
        Self::open(Arc::new(blocks), Arc::new(details), config).await
    }

    /// Load Meta State or bootstrap genesis, then open the gate.
    ///
    /// Only the first call bootstraps; later and concurrent calls wait on the
    /// gate. A bootstrap failure fails the gate permanently.
    pub async fn init(&self) -> Result<(), CanonError> {
        if self.init_started.swap(true, Ordering::SeqCst) {
            return Ok(self.gate.wait().await?);
        }
        match self.bootstrap().await {
            Ok(()) => {
                self.gate.open();
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "chain initialization failed");
                self.gate.fail(e.to_string());
                Err(ChainError::InitFailed(e.to_string()).into())
            }
        }
    }

    /// Flush both stores to durable storage.
    pub async fn flush(&self) -> Result<(), CanonError> {
        self.block_store.flush()?;
        self.detail_store.flush()
    }

    /// Run [`init`](Self::init) on the tokio runtime.
    pub fn spawn_init(self: &Arc<Self>) -> JoinHandle<Result<(), CanonError>> {
        let chain = Arc::clone(self);
        tokio::spawn(async move { chain.init().await })
    }

    /// Whether the init gate has opened.
    pub fn is_ready(&self) -> bool {
        self.gate.state() == GateState::Open
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    async fn bootstrap(&self) -> Result<(), CanonError> {
        if let Some(loaded) = MetaState::load(self.detail_store.as_ref())? {
            tracing::info!(
                height = loaded.height,
                head = ?loaded.raw_head,
                heads = loaded.heads.len(),
                "loaded chain meta state"
            );
            *self.meta.lock().await = loaded;
            return Ok(());
        }

        let genesis_hash = self.genesis.hash();
        if let Some(recovered) = MetaState::recover(self.detail_store.as_ref(), genesis_hash)? {
            let mut set = WriteSet::new();
            set.set_meta(recovered.clone());
            batch::commit(&self.block_store, &self.detail_store, set).await?;
            tracing::warn!(
                height = recovered.height,
                head = ?recovered.raw_head,
                heads = recovered.heads.len(),
                "rebuilt meta state from detail records"
            );
            *self.meta.lock().await = recovered;
            return Ok(());
        }

        *self.meta.lock().await = MetaState::default();
        let genesis = self.genesis.clone();
        self.ingest(&genesis, true).await?;
        tracing::info!(hash = %genesis.hash(), "created genesis block");
        Ok(())
    }
}

impl ChainReader for Blockchain {
    fn block(&self, hash: &Hash256) -> Result<Option<Block>, CanonError> {
        load_block(self.block_store.as_ref(), hash)
    }

    fn details(&self, hash: &Hash256) -> Result<Option<BlockDetails>, CanonError> {
        load_details(self.detail_store.as_ref(), hash)
    }
}
