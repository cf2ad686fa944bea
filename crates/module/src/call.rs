//! Call message types for the auction engine.
//!
//! Calls mutate engine state and are answered with a [`CallResponse`].

use auction_types::{ItemSource, Member};
use serde::{Deserialize, Serialize};

use crate::bidding::{BidPrompt, ConfirmationId};
use crate::queue::QueueEntry;

/// State-changing requests accepted by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EngineCall {
    // === Run Lifecycle ===
    /// Build sessions from the ledger and the manual queue and start auctioning.
    StartRun,

    // === Bidding ===
    /// Propose a bid on the current item.
    SubmitBid { member: Member, amount: String },

    /// Confirm a proposed bid.
    ConfirmBid {
        member_id: String,
        confirmation_id: ConfirmationId,
    },

    /// Withdraw a proposed bid.
    CancelBid {
        member_id: String,
        confirmation_id: ConfirmationId,
    },

    // === Operator Controls ===
    Pause,
    Resume,
    /// End the current item now.
    Stop,
    /// Add time to the current item.
    Extend { minutes: u64 },

    // === Manual Queue ===
    QueueAdd {
        name: String,
        start_price: u64,
        duration_minutes: u64,
        quantity: u32,
    },
    QueueRemove { name: String },
    QueueClear,
}

/// Successful outcome of an [`EngineCall`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallResponse {
    RunStarted(RunOverview),
    BidPrompt(BidPrompt),
    BidConfirmed(BidReceipt),
    BidCancelled { confirmation_id: ConfirmationId },
    /// Operator control applied.
    Done,
    Queued(QueueEntry),
    Dequeued(QueueEntry),
    QueueCleared { removed: usize },
}

/// Summary of a started run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOverview {
    pub session_timestamp: String,
    pub sessions: Vec<SessionOverview>,
    pub total_items: usize,
    pub catalog_items: usize,
    pub manual_items: usize,
}

/// One session of a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOverview {
    pub key: String,
    pub gated: bool,
    pub items: Vec<String>,
    pub attendees: usize,
}

/// Result of a confirmed bid, returned to the bidder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidReceipt {
    pub confirmation_id: ConfirmationId,
    pub item: String,
    pub amount: u64,
    pub previous_bid: u64,
    pub reserved: u64,
    pub is_self_overbid: bool,
    pub outbid: Option<Member>,
    pub extended: bool,
    pub remaining_secs: u64,
    pub source: ItemSource,
}
