//! Auctioneer daemon.
//!
//! Runs the auction engine against a ledger reached over JSON-RPC and serves
//! the gateway API that chat gateways and operators use to drive it.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use auction_module::{EngineConfig, SessionScheduler};
use auction_rpc::{GatewayApiServer, RpcLedgerClient};
use clap::Parser;
use jsonrpsee::server::Server;
use tracing::info;

mod gateway;
mod notifications;

use gateway::GatewayServer;
use notifications::NotificationLog;

#[derive(Parser)]
#[command(name = "auctioneer")]
#[command(about = "Points auction engine with a JSON-RPC gateway")]
struct Cli {
    /// Ledger RPC endpoint
    #[arg(long, default_value = "http://127.0.0.1:9955")]
    ledger_rpc: String,

    /// Address to serve the gateway API on
    #[arg(long, default_value = "127.0.0.1:9966")]
    listen: SocketAddr,

    /// JSON file with engine configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ledger request timeout in seconds
    #[arg(long, default_value = "30")]
    ledger_timeout_secs: u64,

    /// Number of notifications kept for polling
    #[arg(long, default_value = "1000")]
    notification_capacity: usize,
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("auctioneer=info".parse()?)
                .add_directive("auction_module=info".parse()?)
                .add_directive("jsonrpsee=warn".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    info!(
        preview_secs = config.preview_secs,
        confirm_timeout_secs = config.confirm_timeout_secs,
        max_extensions = config.max_extensions,
        "Engine configuration loaded"
    );

    let ledger = RpcLedgerClient::new(&cli.ledger_rpc, Duration::from_secs(cli.ledger_timeout_secs))?;
    let log = Arc::new(NotificationLog::new(cli.notification_capacity));
    let engine = SessionScheduler::spawn(config, Arc::new(ledger), log.clone());

    let server = Server::builder().build(cli.listen).await?;
    let addr = server.local_addr()?;
    let handle = server.start(GatewayServer::new(engine, log).into_rpc());

    info!("Auctioneer gateway on {}, ledger at {}", addr, cli.ledger_rpc);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    handle.stop()?;
    handle.stopped().await;

    Ok(())
}
