//! Points auction engine.
//!
//! This crate implements timed, multi-item auctions paid in community points:
//!
//! - Sessions of items, gated on attendance of an event or open to everyone
//! - A per-item state machine with warnings and bounded soft-close extensions
//! - Point reservations that prevent double-spending across items
//! - Two-phase bid confirmation with rate limiting and freshness checks
//! - End-of-run settlement against an external ledger
//!
//! # Architecture
//!
//! - `scheduler`: the single event loop owning all run state
//! - `item`: state machine of the current item
//! - `bidding`: proposal and confirmation of bids
//! - `ledger`: cached balances and reservations
//! - `attendance`: per-session eligibility rosters
//! - `session`: grouping of catalog and manual items into sessions
//! - `settlement`: per-member spend and settlement submission
//! - `service`: the external ledger seam
//! - `call` / `queries`: request and response types
//!
//! # Example
//!
//! ```ignore
//! use auction_module::{ChannelNotifier, EngineConfig, SessionScheduler};
//!
//! let (notifier, mut notifications) = ChannelNotifier::new();
//! let engine = SessionScheduler::spawn(EngineConfig::default(), ledger, Arc::new(notifier));
//!
//! engine.start_run().await?;
//! let prompt = engine.submit_bid(member.clone(), "120").await?;
//! engine.confirm_bid(&member.id, prompt.confirmation_id).await?;
//! ```

pub mod attendance;
pub mod bidding;
pub mod call;
pub mod config;
pub mod error;
pub mod item;
pub mod ledger;
pub mod notify;
pub mod queries;
pub mod queue;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod settlement;
pub mod timers;

pub use attendance::{week_key, AttendanceGate};
pub use bidding::{BidConfirmationWorkflow, BidPolicy, BidPrompt, ConfirmationId, PendingConfirmation};
pub use call::{BidReceipt, CallResponse, EngineCall, RunOverview, SessionOverview};
pub use config::{ConfigValidationError, EngineConfig};
pub use error::{AuctionError, ErrorKind};
pub use item::{
    AuctionItemStateMachine, ExtensionPolicy, ItemCommand, ItemPhase, MAX_DURATION_MINUTES,
};
pub use ledger::PointLedger;
pub use notify::{ChannelNotifier, Notification, Notifier, SoldLine};
pub use queries::{EngineQuery, EngineQueryResponse, EngineStatus, ItemStatus, SessionStatus};
pub use queue::{ManualQueue, QueueEntry};
pub use scheduler::{SchedulerHandle, SessionScheduler};
pub use service::{LedgerError, LedgerService};
pub use session::{build_sessions, EventKey, Session, SessionId, SessionKey};
pub use settlement::{build_results, spend_summary, ResultAggregator, SettlementOutcome};
