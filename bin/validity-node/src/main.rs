//! Validity node
//!
//! Replays a locally generated chain of posted blocks through the validity
//! synchronizer:
//! - Builds the demo chain and its deposits on a shadow storage
//! - Feeds them through the in-memory collaborators
//! - Proves each block with the configured prover (mock by default)

mod demo;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use rollup_core::{PermissiveVerifier, TreeHistory};
use rollup_host::{
    Collaborators, Config, MemoryBlockSource, MemoryCursor, MemoryDepositSource, MemoryProofStore, ProverMode,
    ValiditySynchronizer,
};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Parser)]
#[command(name = "validity-node", about = "Sync validity proofs for posted rollup blocks")]
struct Args {
    /// Validity prover base URL, overrides VALIDITY_PROVER_URL
    #[arg(long)]
    prover_url: Option<String>,

    /// Force mock proving
    #[arg(long)]
    mock: bool,

    /// Number of demo blocks to post
    #[arg(long, default_value_t = 4)]
    blocks: u32,

    /// Keep polling for blocks after the demo chain is synced
    #[arg(long)]
    follow: bool,

    /// Seed of the demo chain
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(url) = args.prover_url {
        config.prover_url = url;
        config.prover_mode = ProverMode::Remote;
    }
    if args.mock {
        config.prover_mode = ProverMode::Mock;
    }

    info!("Starting validity node...");
    info!("  Prover: {} ({:?})", config.prover_url, config.prover_mode);
    info!("  Demo blocks: {}", args.blocks);

    let chain = demo::build_chain(args.blocks, args.seed)?;
    let sources = Collaborators {
        blocks: Arc::new(MemoryBlockSource::new(chain.events)),
        deposits: Arc::new(MemoryDepositSource::new(chain.deposits)),
        cursor: Arc::new(MemoryCursor::default()),
        proofs: Arc::new(MemoryProofStore::default()),
    };
    let mut synchronizer = ValiditySynchronizer::new(config, sources, Arc::new(PermissiveVerifier));

    if args.follow {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
                let _ = shutdown_tx.send(true);
            }
        });
        synchronizer.run(shutdown_rx).await?;
    } else {
        synchronizer.sync_all().await?;
    }

    let storage = synchronizer.storage();
    let latest = storage.latest_block_number();
    let pis = storage.validity_public_inputs(latest)?;
    info!(
        latest,
        accounts = storage.next_account_id() - 2,
        deposits = storage.deposit_count(),
        account_tree_root = %pis.public_state.account_tree_root,
        block_tree_root = %pis.public_state.block_tree_root,
        "Validity node synced"
    );
    Ok(())
}
