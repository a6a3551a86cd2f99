//! Canon node binary.
//!
//! Opens the RocksDB-backed block store and runs one maintenance or inspection
//! command against it: print the head, show or range over blocks, mine
//! development blocks, import hex-encoded blocks, drive a named iterator, or
//! delete a subtree.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use canon_consensus::mine_block;
use canon_core::constants::BLOCK_VERSION;
use canon_core::merkle;
use canon_core::types::{Block, BlockHeader, BlockId};
use canon_store::{Blockchain, NodeConfig};

/// Canon block store node.
#[derive(Parser, Debug)]
#[command(name = "canon-node", version, about = "Inspect and maintain a Canon block store")]
struct Args {
    /// Config file (TOML or JSON). `CANON__*` environment variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory for chain storage
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long)]
    log_format: Option<String>,

    /// Skip block validation and PoW checks on ingestion
    #[arg(long)]
    no_validate: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the raw head, or the head of a named consumer
    Head {
        #[arg(long)]
        name: Option<String>,
    },
    /// Print a block and its ancestry record
    Show {
        /// Block hash (hex) or height
        id: String,
        /// Print the hex-encoded block instead of JSON
        #[arg(long)]
        raw: bool,
    },
    /// Print a range of canonical blocks
    Range {
        start: String,
        #[arg(long, default_value_t = 10)]
        max: usize,
        #[arg(long, default_value_t = 0)]
        skip: u64,
        #[arg(long)]
        reverse: bool,
    },
    /// Mine development blocks on top of the raw head
    Mine {
        #[arg(long, default_value_t = 1)]
        count: u64,
        #[arg(long, default_value_t = 16)]
        difficulty: u64,
    },
    /// Import hex-encoded blocks, one per line
    Import { file: PathBuf },
    /// Deliver new canonical blocks to a named consumer
    Iterate { name: String },
    /// Delete a block and all of its descendants
    Delete { id: String },
}

impl Args {
    /// Layer CLI flags over the loaded config.
    fn into_config(self) -> Result<(NodeConfig, Command)> {
        let mut config = NodeConfig::load(self.config.as_deref())
            .context("failed to load configuration")?;
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        if self.no_validate {
            config.chain.validate = false;
        }
        Ok((config, self.command))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, command) = Args::parse().into_config()?;
    init_logging(&config.log_level, &config.log_format);

    info!("Canon node v{}", env!("CARGO_PKG_VERSION"));
    info!("data_dir: {:?}", config.data_dir);

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create data_dir {:?}", config.data_dir))?;
    let chain = Blockchain::open_rocks(config.db_path(), config.chain.clone())
        .await
        .context("failed to open block store")?;

    run(&chain, command).await?;
    chain.flush().await.context("failed to flush block store")
}

async fn run(chain: &Arc<Blockchain>, command: Command) -> Result<()> {
    match command {
        Command::Head { name } => {
            let head = chain.get_head(name.as_deref()).await?;
            let details = chain.get_details(&head.hash()).await?;
            let meta = chain.meta().await?;
            let heads: BTreeMap<&String, String> =
                meta.heads.iter().map(|(k, v)| (k, v.to_hex())).collect();
            // u128 does not fit a JSON number.
            print_json(&json!({
                "hash": head.hash().to_hex(),
                "number": head.number(),
                "total_difficulty": details.total_difficulty.to_string(),
                "raw_head": meta.raw_head.map(|h| h.to_hex()),
                "heads": heads,
            }))
        }
        Command::Show { id, raw } => {
            let block = chain.get_block(parse_id(&id)?).await?;
            if raw {
                println!("{}", hex::encode(block.encode()?));
                return Ok(());
            }
            let details = serde_json::to_value(chain.get_details(&block.hash()).await?)?;
            print_json(&json!({
                "hash": block.hash().to_hex(),
                "block": serde_json::to_value(&block)?,
                "details": details,
            }))
        }
        Command::Range { start, max, skip, reverse } => {
            let blocks = chain.get_blocks(parse_id(&start)?, max, skip, reverse).await?;
            for block in blocks {
                println!("{} {}", block.number(), block.hash());
            }
            Ok(())
        }
        Command::Mine { count, difficulty } => {
            for _ in 0..count {
                let parent = chain.get_head(None).await?;
                let block = mine_dev_block(&parent, difficulty)?;
                chain.put_block(&block).await?;
                println!("{} {}", block.number(), block.hash());
            }
            Ok(())
        }
        Command::Import { file } => {
            let reader = BufReader::new(
                std::fs::File::open(&file).with_context(|| format!("failed to open {file:?}"))?,
            );
            let mut imported = 0u64;
            for (index, line) in reader.lines().enumerate() {
                let line = line?;
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let bytes = hex::decode(line)
                    .with_context(|| format!("line {}: invalid hex", index + 1))?;
                let block = Block::decode(&bytes)
                    .with_context(|| format!("line {}: invalid block", index + 1))?;
                chain
                    .put_block(&block)
                    .await
                    .with_context(|| format!("line {}: block {} rejected", index + 1, block.hash()))?;
                imported += 1;
            }
            info!("imported {imported} block(s)");
            Ok(())
        }
        Command::Iterate { name } => {
            let delivered = chain
                .iterate(&name, |block, reorg| {
                    println!("{} {} reorg={reorg}", block.number(), block.hash());
                    Ok(())
                })
                .await?;
            info!("delivered {delivered} block(s) to {name}");
            Ok(())
        }
        Command::Delete { id } => {
            let deleted = chain.del_block(parse_id(&id)?).await?;
            println!("deleted {deleted} block(s)");
            Ok(())
        }
    }
}

fn parse_id(s: &str) -> Result<BlockId> {
    Ok(s.parse::<BlockId>()?)
}

/// Build and mine a child of `parent` carrying the current time.
fn mine_dev_block(parent: &Block, difficulty: u64) -> Result<Block> {
    if difficulty == 0 {
        bail!("difficulty must be at least 1");
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let payload = vec![format!("dev block {}", parent.number() + 1).into_bytes()];
    let mut block = Block {
        header: BlockHeader {
            version: BLOCK_VERSION,
            parent_hash: parent.hash(),
            number: parent.number() + 1,
            timestamp: now.max(parent.header.timestamp + 1),
            difficulty,
            payload_root: merkle::payload_root(&payload),
            nonce: 0,
            extra_data: Vec::new(),
        },
        payload,
    };
    if !mine_block(&mut block, u64::MAX) {
        bail!("no valid nonce found");
    }
    Ok(block)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output. Any other value defaults
/// to human-readable text. `RUST_LOG` takes precedence over `level_str`.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_str));

    // Logs go to stderr so command output on stdout stays machine-readable.
    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}
