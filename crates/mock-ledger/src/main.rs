//! Mock ledger server binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use auction_rpc::LedgerStateView;
use clap::Parser;
use tracing::info;

use mock_ledger::{serve, MockLedger};

#[derive(Parser)]
#[command(name = "mock-ledger")]
#[command(about = "In-memory ledger for local auction runs")]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:9955")]
    listen: SocketAddr,

    /// JSON file with initial points, catalog and attendance
    #[arg(long)]
    seed: Option<PathBuf>,
}

fn load_seed(path: &PathBuf) -> Result<LedgerStateView> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading seed file {}", path.display()))?;
    let seed: LedgerStateView = serde_json::from_str(&raw)
        .with_context(|| format!("parsing seed file {}", path.display()))?;
    Ok(seed)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mock_ledger=info".parse()?)
                .add_directive("jsonrpsee=warn".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let seed = match &cli.seed {
        Some(path) => load_seed(path)?,
        None => LedgerStateView::default(),
    };
    info!(
        "Seeded with {} members, {} catalog rows",
        seed.points.len(),
        seed.catalog.len()
    );

    let (addr, handle) = serve(MockLedger::new(seed), cli.listen).await?;
    info!("Mock ledger running on {}. Press Ctrl+C to stop.", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    handle.stop()?;
    handle.stopped().await;

    Ok(())
}
