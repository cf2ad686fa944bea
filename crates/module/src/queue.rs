//! Manual queue of operator-added items.

use auction_types::normalize_name;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuctionError;
use crate::item::MAX_DURATION_MINUTES;

/// An item an operator queued for the next run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: String,
    pub name: String,
    pub start_price: u64,
    pub duration_minutes: u64,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
}

/// Ordered manual queue, drained into the open session when a run starts.
#[derive(Debug, Default)]
pub struct ManualQueue {
    entries: Vec<QueueEntry>,
    next_id: u64,
}

impl ManualQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an item.
    pub fn add(
        &mut self,
        name: &str,
        start_price: u64,
        duration_minutes: u64,
        quantity: u32,
    ) -> Result<QueueEntry, AuctionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuctionError::InvalidQueueItem("name is empty".into()));
        }
        if duration_minutes == 0 {
            return Err(AuctionError::InvalidQueueItem(
                "duration must be at least one minute".into(),
            ));
        }
        if duration_minutes > MAX_DURATION_MINUTES {
            return Err(AuctionError::InvalidQueueItem(format!(
                "duration must be at most {} minutes",
                MAX_DURATION_MINUTES
            )));
        }
        if quantity == 0 {
            return Err(AuctionError::InvalidQueueItem(
                "quantity must be at least one".into(),
            ));
        }

        self.next_id += 1;
        let entry = QueueEntry {
            id: format!("q{}", self.next_id),
            name: name.to_string(),
            start_price,
            duration_minutes,
            quantity,
            added_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Remove the first entry with this name (case-insensitive).
    pub fn remove(&mut self, name: &str) -> Result<QueueEntry, AuctionError> {
        let key = normalize_name(name);
        let pos = self
            .entries
            .iter()
            .position(|e| normalize_name(&e.name) == key)
            .ok_or_else(|| AuctionError::QueueItemNotFound(name.to_string()))?;
        Ok(self.entries.remove(pos))
    }

    /// Remove everything, returning how many entries were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn list(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take every entry, leaving the queue empty.
    pub fn take_all(&mut self) -> Vec<QueueEntry> {
        std::mem::take(&mut self.entries)
    }
}
