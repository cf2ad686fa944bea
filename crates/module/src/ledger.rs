//! Point ledger cache with reservations.
//!
//! Holds a snapshot of every member's total points as fetched from the external
//! ledger, plus the points locked by outstanding winning bids. Keys are normalized
//! display names, so every lookup is case-insensitive.

use std::collections::HashMap;

use auction_types::{normalize_name, PointsSnapshot};
use tracing::{debug, info, warn};

use crate::error::AuctionError;
use crate::service::LedgerService;

/// Cached point balances and reservations for one run.
#[derive(Debug, Default)]
pub struct PointLedger {
    /// normalized name -> (display name as in the ledger, total points)
    snapshot: Option<HashMap<String, (String, u64)>>,
    /// normalized name -> locked points; never holds a zero entry
    locked: HashMap<String, u64>,
}

impl PointLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the point snapshot from the ledger and replace the cached one.
    ///
    /// Existing locks are kept.
    pub async fn load_snapshot<L: LedgerService + ?Sized>(
        &mut self,
        service: &L,
    ) -> Result<usize, AuctionError> {
        let points = service
            .get_points()
            .await
            .map_err(|e| AuctionError::LedgerUnavailable(e.to_string()))?;
        let members = points.len();
        self.install_snapshot(points);
        info!(members, locked_members = self.locked.len(), "Point snapshot loaded");
        Ok(members)
    }

    /// Replace the cached snapshot. Negative ledger balances count as zero.
    pub fn install_snapshot(&mut self, points: PointsSnapshot) {
        let snapshot = points
            .into_iter()
            .map(|(name, total)| {
                if total < 0 {
                    warn!(member = %name, total, "Negative balance treated as zero");
                }
                (normalize_name(&name), (name, total.max(0) as u64))
            })
            .collect();
        self.snapshot = Some(snapshot);
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Display names of every member in the snapshot.
    pub fn members(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .snapshot
            .as_ref()
            .map(|s| s.values().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Total points of a member, 0 if unknown or no snapshot is loaded.
    pub fn total_of(&self, member: &str) -> u64 {
        self.snapshot
            .as_ref()
            .and_then(|s| s.get(&normalize_name(member)))
            .map(|(_, total)| *total)
            .unwrap_or(0)
    }

    /// Points currently reserved for a member.
    pub fn locked_of(&self, member: &str) -> u64 {
        self.locked
            .get(&normalize_name(member))
            .copied()
            .unwrap_or(0)
    }

    /// Points a member can still commit.
    pub fn available_of(&self, member: &str) -> u64 {
        self.total_of(member).saturating_sub(self.locked_of(member))
    }

    /// Reserve points for a member. Availability is the caller's concern.
    pub fn reserve(&mut self, member: &str, amount: u64) {
        if amount == 0 {
            return;
        }
        let entry = self.locked.entry(normalize_name(member)).or_insert(0);
        *entry = entry.saturating_add(amount);
        debug!(member, amount, locked = *entry, "Points reserved");
    }

    /// Release previously reserved points, never going below zero.
    pub fn release(&mut self, member: &str, amount: u64) {
        let key = normalize_name(member);
        let Some(current) = self.locked.get_mut(&key) else {
            return;
        };
        *current = current.saturating_sub(amount);
        let remaining = *current;
        if remaining == 0 {
            self.locked.remove(&key);
        }
        debug!(member, amount, locked = remaining, "Points released");
    }

    /// Drop the snapshot and every lock.
    pub fn clear(&mut self) {
        self.snapshot = None;
        self.locked.clear();
    }

    /// Number of members holding a reservation.
    pub fn locked_members(&self) -> usize {
        self.locked.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with(points: &[(&str, i64)]) -> PointLedger {
        let mut ledger = PointLedger::new();
        ledger.install_snapshot(points.iter().map(|(n, p)| (n.to_string(), *p)).collect());
        ledger
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let ledger = ledger_with(&[("Alice", 300)]);
        assert_eq!(ledger.total_of("alice"), 300);
        assert_eq!(ledger.total_of("ALICE "), 300);
        assert_eq!(ledger.total_of("bob"), 0);
    }

    #[test]
    fn test_no_snapshot() {
        let ledger = PointLedger::new();
        assert!(!ledger.has_snapshot());
        assert_eq!(ledger.total_of("alice"), 0);
        assert_eq!(ledger.available_of("alice"), 0);
    }

    #[test]
    fn test_reserve_and_release() {
        let mut ledger = ledger_with(&[("Alice", 300)]);

        ledger.reserve("Alice", 100);
        assert_eq!(ledger.locked_of("alice"), 100);
        assert_eq!(ledger.available_of("alice"), 200);

        ledger.reserve("alice", 50);
        assert_eq!(ledger.locked_of("Alice"), 150);

        ledger.release("ALICE", 150);
        assert_eq!(ledger.locked_of("alice"), 0);
        assert_eq!(ledger.locked_members(), 0);
    }

    #[test]
    fn test_release_is_floored() {
        let mut ledger = ledger_with(&[("Alice", 300)]);
        ledger.reserve("Alice", 100);

        ledger.release("Alice", 100);
        ledger.release("Alice", 100);
        assert_eq!(ledger.locked_of("Alice"), 0);
        assert_eq!(ledger.available_of("Alice"), 300);

        ledger.reserve("Alice", 10);
        ledger.release("Alice", 500);
        assert_eq!(ledger.locked_of("Alice"), 0);
        assert_eq!(ledger.locked_members(), 0);
    }

    #[test]
    fn test_available_never_negative() {
        let mut ledger = ledger_with(&[("Alice", 100), ("Bob", -20)]);
        ledger.reserve("Alice", 250);
        assert_eq!(ledger.available_of("Alice"), 0);
        assert_eq!(ledger.total_of("Bob"), 0);
        assert_eq!(ledger.available_of("Bob"), 0);
    }

    #[test]
    fn test_locks_survive_snapshot_refresh() {
        let mut ledger = ledger_with(&[("Alice", 100)]);
        ledger.reserve("Alice", 40);

        ledger.install_snapshot([("Alice".to_string(), 500)].into_iter().collect());
        assert_eq!(ledger.locked_of("Alice"), 40);
        assert_eq!(ledger.available_of("Alice"), 460);

        ledger.clear();
        assert!(!ledger.has_snapshot());
        assert_eq!(ledger.locked_of("Alice"), 0);
    }

    #[test]
    fn test_members_listing() {
        let ledger = ledger_with(&[("bob", 1), ("Alice", 2)]);
        assert_eq!(ledger.members(), vec!["Alice".to_string(), "bob".to_string()]);
    }
}
