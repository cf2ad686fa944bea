//! Query types for the auction engine.
//!
//! Queries are read-only and always answered, running or not.

use auction_types::{BatchTag, ItemSource};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::bidding::ceil_secs;
use crate::item::{AuctionItemStateMachine, ItemPhase};
use crate::queue::QueueEntry;

/// Query request types.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineQuery {
    /// Snapshot of the engine.
    Status,

    /// Entries waiting for the next run.
    QueueList,
}

/// Query response types.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineQueryResponse {
    Status(EngineStatus),
    Queue(Vec<QueueEntry>),
}

/// Engine snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub running: bool,
    pub paused: bool,
    pub session: Option<SessionStatus>,
    pub item: Option<ItemStatus>,
    /// Items not yet announced
    pub items_remaining: usize,
    pub items_sold: usize,
    pub pending_confirmations: usize,
    pub locked_members: usize,
    pub queue_length: usize,
}

/// Position within the session list (1-based).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub key: String,
    pub position: usize,
    pub total: usize,
}

/// The current item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStatus {
    pub name: String,
    pub batch: Option<BatchTag>,
    pub source: ItemSource,
    pub phase: ItemPhase,
    pub paused: bool,
    pub current_bid: u64,
    pub winner: Option<String>,
    pub remaining_secs: Option<u64>,
    pub extension_count: u32,
    pub max_extensions: u32,
    pub bid_count: usize,
}

impl ItemStatus {
    pub fn from_item(item: &AuctionItemStateMachine, now: Instant) -> Self {
        Self {
            name: item.item.display_name(),
            batch: item.item.batch,
            source: item.item.source,
            phase: item.phase,
            paused: item.is_paused(),
            current_bid: item.current_bid,
            winner: item.current_winner.as_ref().map(|m| m.display_name.clone()),
            remaining_secs: item.remaining(now).map(ceil_secs),
            extension_count: item.extension_count,
            max_extensions: item.policy().max_extensions,
            bid_count: item.bid_history.len(),
        }
    }
}
