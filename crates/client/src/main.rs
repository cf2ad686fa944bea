//! CLI for operating points auctions.
//!
//! This binary provides commands for:
//! - Starting runs and controlling the current item
//! - Submitting and confirming bids on behalf of a member
//! - Managing the manual queue
//! - Seeding the mock ledger

use anyhow::{anyhow, Result};
use auction_module::{EngineStatus, QueueEntry};
use auction_rpc::{GatewayApiClient, LedgerAdminApiClient};
use auction_types::CatalogRow;
use clap::{Parser, Subcommand};
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use tracing::info;

#[derive(Parser)]
#[command(name = "auction-cli")]
#[command(about = "CLI for points auctions")]
struct Cli {
    /// Auctioneer gateway endpoint
    #[arg(long, default_value = "http://127.0.0.1:9966")]
    rpc: String,

    /// Ledger endpoint, used by admin commands
    #[arg(long, default_value = "http://127.0.0.1:9955")]
    ledger_rpc: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the catalog and queue and start a run
    StartRun,

    /// Propose a bid on the current item
    Bid {
        /// Gateway member id
        #[arg(long)]
        member_id: String,

        /// Display name (ledger key)
        #[arg(long)]
        name: String,

        /// Bid amount
        #[arg(long)]
        amount: String,
    },

    /// Confirm a proposed bid
    Confirm {
        #[arg(long)]
        member_id: String,

        #[arg(long)]
        confirmation_id: u64,
    },

    /// Cancel a proposed bid
    Cancel {
        #[arg(long)]
        member_id: String,

        #[arg(long)]
        confirmation_id: u64,
    },

    /// Pause the current item
    Pause,

    /// Resume the current item
    Resume,

    /// End the current item now
    Stop,

    /// Add time to the current item
    Extend {
        #[arg(long)]
        minutes: u64,
    },

    /// Show engine status
    Status,

    /// Manage the manual queue
    #[command(subcommand)]
    Queue(QueueCommands),

    /// Print notifications after a sequence number
    Notifications {
        #[arg(long, default_value = "0")]
        since: u64,
    },

    /// Seed the mock ledger
    #[command(subcommand)]
    Admin(AdminCommands),
}

#[derive(Subcommand)]
enum QueueCommands {
    /// Queue an item for the next run
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        start_price: u64,

        #[arg(long, default_value = "30")]
        duration_minutes: u64,

        #[arg(long, default_value = "1")]
        quantity: u32,
    },

    /// Remove a queued item by name
    Remove {
        #[arg(long)]
        name: String,
    },

    /// Remove every queued item
    Clear,

    /// List queued items
    List,
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Set a member's point balance
    SetPoints {
        #[arg(long)]
        member: String,

        #[arg(long)]
        points: i64,
    },

    /// Append a catalog row
    AddItem {
        #[arg(long)]
        item: String,

        #[arg(long)]
        start_price: u64,

        #[arg(long)]
        duration_minutes: Option<u64>,

        #[arg(long, default_value = "1")]
        quantity: u32,

        /// Event the item dropped from, e.g. "Venatus 10/14/26 21:30"
        #[arg(long)]
        boss_key: Option<String>,
    },

    /// Record who attended an event
    SetAttendance {
        /// Week key, e.g. WEEK_20261011
        #[arg(long)]
        week: String,

        #[arg(long)]
        event: String,

        /// Comma-separated display names
        #[arg(long)]
        attendees: String,
    },

    /// Dump the ledger contents
    State,
}

fn parse_attendees(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn print_status(status: &EngineStatus) {
    if !status.running {
        println!("No run in progress");
        println!("  Queued items: {}", status.queue_length);
        return;
    }

    println!("Run in progress{}", if status.paused { " (paused)" } else { "" });
    if let Some(session) = &status.session {
        println!(
            "  Session: {} ({}/{})",
            session.key, session.position, session.total
        );
    }
    match &status.item {
        Some(item) => {
            println!("  Item: {} [{}]", item.name, item.source.label());
            println!("    Phase: {:?}", item.phase);
            println!("    Current bid: {}", item.current_bid);
            println!(
                "    Leader: {}",
                item.winner.as_deref().unwrap_or("none")
            );
            if let Some(secs) = item.remaining_secs {
                println!("    Remaining: {}s", secs);
            }
            println!(
                "    Extensions: {}/{}",
                item.extension_count, item.max_extensions
            );
            println!("    Bids: {}", item.bid_count);
        }
        None => println!("  Between items"),
    }
    println!("  Items remaining: {}", status.items_remaining);
    println!("  Items sold: {}", status.items_sold);
    println!("  Pending confirmations: {}", status.pending_confirmations);
    println!("  Members with locked points: {}", status.locked_members);
}

fn print_queue(entries: &[QueueEntry]) {
    if entries.is_empty() {
        println!("Queue is empty");
        return;
    }
    println!("Queue:");
    for (i, entry) in entries.iter().enumerate() {
        println!(
            "  [{}] {} x{} - start {} pts, {} min",
            i + 1,
            entry.name,
            entry.quantity,
            entry.start_price,
            entry.duration_minutes
        );
    }
}

async fn run_queue(client: &HttpClient, command: QueueCommands) -> Result<()> {
    match command {
        QueueCommands::Add {
            name,
            start_price,
            duration_minutes,
            quantity,
        } => {
            let entry = client
                .queue_add(name, start_price, duration_minutes, quantity)
                .await?;
            println!("Queued {} (id {})", entry.name, entry.id);
        }
        QueueCommands::Remove { name } => {
            let entry = client.queue_remove(name).await?;
            println!("Removed {}", entry.name);
        }
        QueueCommands::Clear => {
            let removed = client.queue_clear().await?;
            println!("Removed {} queued items", removed);
        }
        QueueCommands::List => {
            let entries = client.queue_list().await?;
            print_queue(&entries);
        }
    }
    Ok(())
}

async fn run_admin(ledger: &HttpClient, command: AdminCommands) -> Result<()> {
    match command {
        AdminCommands::SetPoints { member, points } => {
            LedgerAdminApiClient::set_points(ledger, member.clone(), points).await?;
            println!("{} now has {} points", member, points);
        }
        AdminCommands::AddItem {
            item,
            start_price,
            duration_minutes,
            quantity,
            boss_key,
        } => {
            if quantity == 0 {
                return Err(anyhow!("Quantity must be at least 1"));
            }
            let row = CatalogRow {
                item,
                start_price,
                duration: duration_minutes,
                quantity,
                winner: None,
                boss_key,
            };
            let index = LedgerAdminApiClient::add_catalog_item(ledger, row).await?;
            println!("Catalog row {} added", index);
        }
        AdminCommands::SetAttendance {
            week,
            event,
            attendees,
        } => {
            let attendees = parse_attendees(&attendees);
            let count = attendees.len();
            LedgerAdminApiClient::set_attendance(ledger, week, event.clone(), attendees).await?;
            println!("{} attendees recorded for {}", count, event);
        }
        AdminCommands::State => {
            let state = LedgerAdminApiClient::get_state(ledger).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("auction_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let client = HttpClientBuilder::default().build(&cli.rpc)?;

    match cli.command {
        Commands::StartRun => {
            let overview = client.start_run().await?;
            info!("Run started at {}", overview.session_timestamp);
            println!("Run started at {}", overview.session_timestamp);
            println!(
                "  Items: {} ({} catalog, {} manual)",
                overview.total_items, overview.catalog_items, overview.manual_items
            );
            for session in &overview.sessions {
                let access = if session.gated {
                    format!("{} attendees", session.attendees)
                } else {
                    "open".to_string()
                };
                println!(
                    "  Session {}: {} items, {}",
                    session.key,
                    session.items.len(),
                    access
                );
            }
        }

        Commands::Bid {
            member_id,
            name,
            amount,
        } => {
            let prompt = client.submit_bid(member_id, name, amount).await?;
            println!("Confirmation {} for {}", prompt.confirmation_id, prompt.item);
            println!("  Bid: {} (current {})", prompt.amount, prompt.current_bid);
            if prompt.is_self_overbid {
                println!("  Raising your own bid");
            }
            println!(
                "  Reserves {} points, {} left after",
                prompt.needed, prompt.available_after
            );
            println!("  Expires in {}s", prompt.expires_in_secs);
        }

        Commands::Confirm {
            member_id,
            confirmation_id,
        } => {
            let receipt = client.confirm_bid(member_id, confirmation_id).await?;
            println!("Bid confirmed: {} on {}", receipt.amount, receipt.item);
            println!("  Previous bid: {}", receipt.previous_bid);
            println!("  Points reserved: {}", receipt.reserved);
            if let Some(outbid) = &receipt.outbid {
                println!("  Outbid: {}", outbid.display_name);
            }
            if receipt.extended {
                println!("  Extended, {}s remaining", receipt.remaining_secs);
            }
        }

        Commands::Cancel {
            member_id,
            confirmation_id,
        } => {
            client.cancel_bid(member_id, confirmation_id).await?;
            println!("Confirmation {} cancelled", confirmation_id);
        }

        Commands::Pause => {
            client.pause().await?;
            println!("Paused");
        }

        Commands::Resume => {
            client.resume().await?;
            println!("Resumed");
        }

        Commands::Stop => {
            client.stop().await?;
            println!("Item ended");
        }

        Commands::Extend { minutes } => {
            client.extend(minutes).await?;
            println!("Extended by {} min", minutes);
        }

        Commands::Status => {
            let status = client.status().await?;
            print_status(&status);
        }

        Commands::Queue(command) => run_queue(&client, command).await?,

        Commands::Notifications { since } => {
            let records = client.notifications(since).await?;
            if records.is_empty() {
                println!("No notifications after {}", since);
            }
            for record in records {
                println!(
                    "[{}] {} {}",
                    record.seq,
                    record.at.format("%H:%M:%S"),
                    serde_json::to_string(&record.notification)?
                );
            }
        }

        Commands::Admin(command) => {
            let ledger = HttpClientBuilder::default().build(&cli.ledger_rpc)?;
            run_admin(&ledger, command).await?;
        }
    }

    Ok(())
}
