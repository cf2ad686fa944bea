//! Core type definitions for points auctions.
//!
//! This crate provides the shared data structures used across the auction system,
//! including members, auction items, settlement records, and the request/response
//! shapes exchanged with the external ledger service.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =========================
// MEMBERS
// =========================

/// A community member as identified by the gateway.
///
/// `id` is opaque and stable; `display_name` is the ledger key and is matched
/// case-insensitively everywhere.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub display_name: String,
}

impl Member {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    /// Normalized ledger key for this member.
    pub fn ledger_key(&self) -> String {
        normalize_name(&self.display_name)
    }

    /// Case-insensitive display name comparison.
    pub fn same_name(&self, other: &str) -> bool {
        self.ledger_key() == normalize_name(other)
    }
}

// =========================
// AUCTION ITEMS
// =========================

/// Where an auction item came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemSource {
    /// A row of the external catalog; unsold rows stay uncommitted there.
    ExternalCatalog,
    /// Added by an operator for this run; unsold entries are pushed back to the catalog.
    ManualQueue,
}

impl ItemSource {
    pub fn label(&self) -> &'static str {
        match self {
            ItemSource::ExternalCatalog => "catalog",
            ItemSource::ManualQueue => "manual queue",
        }
    }
}

/// Position of a singleton inside an expanded batch (1-based).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTag {
    pub number: u32,
    pub total: u32,
}

/// A single item to be auctioned. Batches are expanded into one entry per unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionItem {
    pub name: String,
    pub start_price: u64,
    pub duration_minutes: u64,
    pub source: ItemSource,
    /// Row of the external catalog this item was read from.
    pub catalog_index: Option<usize>,
    pub batch: Option<BatchTag>,
}

impl AuctionItem {
    /// Name shown to members, with the batch position when part of a batch.
    pub fn display_name(&self) -> String {
        match self.batch {
            Some(tag) => format!("{} [{}/{}]", self.name, tag.number, tag.total),
            None => self.name.clone(),
        }
    }

    /// Expand `quantity` units of an item into singleton entries.
    pub fn expand(
        name: &str,
        start_price: u64,
        duration_minutes: u64,
        quantity: u32,
        source: ItemSource,
        catalog_index: Option<usize>,
    ) -> Vec<AuctionItem> {
        let single = |batch| AuctionItem {
            name: name.to_string(),
            start_price,
            duration_minutes,
            source,
            catalog_index,
            batch,
        };

        if quantity <= 1 {
            return vec![single(None)];
        }

        (1..=quantity)
            .map(|number| {
                single(Some(BatchTag {
                    number,
                    total: quantity,
                }))
            })
            .collect()
    }
}

/// A confirmed bid applied to an item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidRecord {
    pub member: Member,
    pub amount: u64,
    pub placed_at: DateTime<FixedOffset>,
}

/// Produced whenever an item ends with a winner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRecord {
    pub item: String,
    pub winner: Member,
    pub amount: u64,
    pub source: ItemSource,
    pub catalog_index: Option<usize>,
}

// =========================
// LEDGER WIRE TYPES
// =========================

/// `{member display name -> total points}` as held by the external ledger.
pub type PointsSnapshot = BTreeMap<String, i64>;

fn default_quantity() -> u32 {
    1
}

/// One row of the external catalog.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRow {
    pub item: String,
    #[serde(default)]
    pub start_price: u64,
    /// Minutes; the engine's default applies when absent.
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Non-empty when the row was already sold in an earlier run.
    #[serde(default)]
    pub winner: Option<String>,
    /// Event the row is gated on; empty means open to all.
    #[serde(default)]
    pub boss_key: Option<String>,
}

impl CatalogRow {
    pub fn is_committed(&self) -> bool {
        self.winner
            .as_deref()
            .map(|w| !w.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Attendee roster for one event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRoster {
    pub attendees: Vec<String>,
}

/// Per-item result appended to the ledger when an item sells.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultLogEntry {
    pub item_index: Option<usize>,
    pub winner: String,
    pub winning_bid: u64,
    pub total_bids: u32,
    pub bid_count_for_winner: u32,
    pub source: ItemSource,
    pub item_name: String,
    pub start_time: String,
    pub end_time: String,
}

/// Total spend of one member over a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSpend {
    pub member: String,
    pub total_spent: u64,
}

/// Outcome of a manual-queue item; losers carry an empty winner and no bid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualOutcome {
    pub item: String,
    pub start_price: u64,
    pub duration: u64,
    pub winner: String,
    pub winning_bid: Option<u64>,
    pub auction_start_time: String,
    pub auction_end_time: String,
}

/// Final settlement submitted once per run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementPayload {
    pub session_timestamp: String,
    pub results: Vec<MemberSpend>,
    pub manual_outcomes: Vec<ManualOutcome>,
}

// =========================
// HELPER FUNCTIONS
// =========================

/// Normalize a display name for case-insensitive comparison.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Format a timestamp the way the ledger records it (`MM/DD/YY HH:MM`).
pub fn format_timestamp(at: &DateTime<FixedOffset>) -> String {
    at.format("%m/%d/%y %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_batch() {
        let items = AuctionItem::expand("Relic", 50, 5, 3, ItemSource::ExternalCatalog, Some(4));
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].display_name(), "Relic [1/3]");
        assert_eq!(items[2].display_name(), "Relic [3/3]");
        assert!(items.iter().all(|i| i.catalog_index == Some(4)));
    }

    #[test]
    fn test_expand_single() {
        let items = AuctionItem::expand("Relic", 50, 5, 1, ItemSource::ManualQueue, None);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].batch, None);
        assert_eq!(items[0].display_name(), "Relic");
    }

    #[test]
    fn test_member_name_matching() {
        let alice = Member::new("1", "Alice");
        assert!(alice.same_name("  ALICE "));
        assert!(!alice.same_name("Alicia"));
    }

    #[test]
    fn test_catalog_row_defaults() {
        let row: CatalogRow = serde_json::from_str(r#"{"item":"Sword","startPrice":10}"#).unwrap();
        assert_eq!(row.quantity, 1);
        assert_eq!(row.duration, None);
        assert!(!row.is_committed());

        let sold: CatalogRow =
            serde_json::from_str(r#"{"item":"Sword","winner":"Bob"}"#).unwrap();
        assert!(sold.is_committed());
    }
}
