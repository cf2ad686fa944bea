//! Outbound notifications towards the gateway.
//!
//! The engine never waits on the gateway: a [`Notifier`] must accept a
//! notification without blocking and deliver it on its own time.

use auction_types::{ItemSource, Member};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::bidding::ConfirmationId;

/// One line of the run summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoldLine {
    pub item: String,
    pub winner: String,
    pub amount: u64,
    pub source: ItemSource,
}

/// Everything the engine tells the outside world.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Notification {
    #[serde(rename_all = "camelCase")]
    RunStarted {
        sessions: usize,
        items: usize,
        catalog_items: usize,
        manual_items: usize,
        session_timestamp: String,
    },
    /// Shown during the wait before the next item is announced.
    #[serde(rename_all = "camelCase")]
    NextItem {
        item: String,
        start_price: u64,
        starts_in_secs: u64,
    },
    #[serde(rename_all = "camelCase")]
    ItemPreview {
        item: String,
        start_price: u64,
        duration_minutes: u64,
        position: usize,
        total: usize,
        session: String,
        source: ItemSource,
        opens_in_secs: u64,
    },
    #[serde(rename_all = "camelCase")]
    ItemActivated {
        item: String,
        current_bid: u64,
        duration_minutes: u64,
    },
    #[serde(rename_all = "camelCase")]
    GoingOnce {
        item: String,
        current_bid: u64,
        winner: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    GoingTwice {
        item: String,
        current_bid: u64,
        winner: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    FinalCall {
        item: String,
        current_bid: u64,
        winner: Option<String>,
    },
    /// Addressed to the bidder.
    #[serde(rename_all = "camelCase")]
    ConfirmationPrompt {
        confirmation_id: ConfirmationId,
        bidder: Member,
        item: String,
        amount: u64,
        current_bid: u64,
        needed: u64,
        available_after: u64,
        is_self_overbid: bool,
        expires_in_secs: u64,
    },
    #[serde(rename_all = "camelCase")]
    BidConfirmed {
        confirmation_id: ConfirmationId,
        bidder: Member,
        item: String,
        amount: u64,
        previous_bid: u64,
        is_self_overbid: bool,
        remaining_secs: u64,
    },
    #[serde(rename_all = "camelCase")]
    ConfirmationCancelled {
        confirmation_id: ConfirmationId,
        bidder: Member,
    },
    #[serde(rename_all = "camelCase")]
    ConfirmationTimedOut {
        confirmation_id: ConfirmationId,
        bidder: Member,
    },
    #[serde(rename_all = "camelCase")]
    ConfirmationRejected {
        confirmation_id: ConfirmationId,
        bidder: Member,
        reason: String,
    },
    /// Addressed to the displaced winner.
    #[serde(rename_all = "camelCase")]
    Outbid {
        member: Member,
        item: String,
        amount: u64,
    },
    #[serde(rename_all = "camelCase")]
    Extended {
        item: String,
        by_secs: u64,
        extension_count: u32,
        max_extensions: u32,
        remaining_secs: u64,
        by_operator: bool,
    },
    #[serde(rename_all = "camelCase")]
    Paused {
        item: String,
        remaining_secs: u64,
    },
    #[serde(rename_all = "camelCase")]
    Resumed {
        item: String,
        remaining_secs: u64,
    },
    #[serde(rename_all = "camelCase")]
    Sold {
        item: String,
        winner: Member,
        amount: u64,
        source: ItemSource,
    },
    #[serde(rename_all = "camelCase")]
    NoBids {
        item: String,
        source: ItemSource,
        /// Whether the item goes back to the catalog for the next run
        requeued: bool,
    },
    #[serde(rename_all = "camelCase")]
    RunSummary {
        sold: Vec<SoldLine>,
        catalog_items: usize,
        manual_items: usize,
        revenue: u64,
        settled: bool,
    },
    #[serde(rename_all = "camelCase")]
    LedgerWriteFailed { operation: String, detail: String },
}

impl Notification {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::RunStarted { .. } => "run_started",
            Notification::NextItem { .. } => "next_item",
            Notification::ItemPreview { .. } => "item_preview",
            Notification::ItemActivated { .. } => "item_activated",
            Notification::GoingOnce { .. } => "going_once",
            Notification::GoingTwice { .. } => "going_twice",
            Notification::FinalCall { .. } => "final_call",
            Notification::ConfirmationPrompt { .. } => "confirmation_prompt",
            Notification::BidConfirmed { .. } => "bid_confirmed",
            Notification::ConfirmationCancelled { .. } => "confirmation_cancelled",
            Notification::ConfirmationTimedOut { .. } => "confirmation_timed_out",
            Notification::ConfirmationRejected { .. } => "confirmation_rejected",
            Notification::Outbid { .. } => "outbid",
            Notification::Extended { .. } => "extended",
            Notification::Paused { .. } => "paused",
            Notification::Resumed { .. } => "resumed",
            Notification::Sold { .. } => "sold",
            Notification::NoBids { .. } => "no_bids",
            Notification::RunSummary { .. } => "run_summary",
            Notification::LedgerWriteFailed { .. } => "ledger_write_failed",
        }
    }
}

/// Sink for outbound notifications. Must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Forwards notifications into an unbounded channel.
#[derive(Clone, Debug)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        info!(kind = notification.kind(), "Notification");
        // A dropped receiver only means nobody is listening any more.
        let _ = self.tx.send(notification);
    }
}
