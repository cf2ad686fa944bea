//! Sessions: groups of items sharing one eligibility rule.
//!
//! Catalog rows are grouped by the event they are gated on; manual-queue items
//! and ungated catalog rows form a single open session that always runs first.

use std::fmt;

use auction_types::{normalize_name, AuctionItem, CatalogRow, ItemSource};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::item::MAX_DURATION_MINUTES;
use crate::queue::QueueEntry;

/// Stable identifier of a session within a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u32);

/// The event an item is gated on, e.g. `"Venatus 10/14/26 21:30"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventKey {
    pub boss: String,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
}

impl EventKey {
    /// Parse `"<Boss> MM/DD/YY HH:MM"` or `"[MM/DD/YY HH:MM] <Boss>"`.
    ///
    /// Anything else non-empty is kept as a bare boss name.
    pub fn parse(raw: &str) -> Option<EventKey> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Some(rest) = raw.strip_prefix('[') {
            if let Some((stamp, boss)) = rest.split_once(']') {
                let mut parts = stamp.split_whitespace();
                if let (Some(date), Some(time), None) = (parts.next(), parts.next(), parts.next()) {
                    if let (Some(date), Some(time)) = (parse_date(date), parse_time(time)) {
                        let boss = boss.trim();
                        if !boss.is_empty() {
                            return Some(EventKey::dated(boss, date, time));
                        }
                    }
                }
            }
        }

        let mut parts = raw.rsplitn(3, char::is_whitespace);
        if let (Some(time), Some(date), Some(boss)) = (parts.next(), parts.next(), parts.next()) {
            if let (Some(date), Some(time)) = (parse_date(date), parse_time(time)) {
                let boss = boss.trim();
                if !boss.is_empty() {
                    return Some(EventKey::dated(boss, date, time));
                }
            }
        }

        Some(EventKey {
            boss: raw.to_string(),
            date: None,
            time: None,
        })
    }

    fn dated(boss: &str, date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            boss: boss.to_string(),
            date: Some(date),
            time: Some(time),
        }
    }

    /// `MM/DD/YY HH:MM` of the event, when known.
    pub fn timestamp(&self) -> Option<String> {
        match (self.date, self.time) {
            (Some(date), Some(time)) => Some(format!(
                "{} {}",
                date.format("%m/%d/%y"),
                time.format("%H:%M")
            )),
            _ => None,
        }
    }

    /// Grouping identity: case-insensitive boss plus timestamp.
    pub fn identity(&self) -> String {
        normalize_name(&self.to_string())
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timestamp() {
            Some(ts) => write!(f, "{} {}", self.boss, ts),
            None => write!(f, "{}", self.boss),
        }
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%m/%d/%y")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .ok()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

/// Eligibility rule of a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionKey {
    /// Everyone may bid.
    Open,
    /// Only attendees of the event may bid.
    Event(EventKey),
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKey::Open => write!(f, "open"),
            SessionKey::Event(key) => write!(f, "{}", key),
        }
    }
}

/// An ordered group of items sharing one eligibility rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub key: SessionKey,
    pub items: Vec<AuctionItem>,
}

impl Session {
    pub fn is_open(&self) -> bool {
        matches!(self.key, SessionKey::Open)
    }

    pub fn event(&self) -> Option<&EventKey> {
        match &self.key {
            SessionKey::Open => None,
            SessionKey::Event(key) => Some(key),
        }
    }
}

/// Build the ordered sessions of a run.
///
/// Committed catalog rows and rows without a name are skipped. Batches are
/// expanded into singletons. Catalog durations are capped at
/// [`MAX_DURATION_MINUTES`]. The open session, when it has items, comes first.
pub fn build_sessions(
    catalog: &[CatalogRow],
    manual: &[QueueEntry],
    default_duration_minutes: u64,
) -> Vec<Session> {
    let mut open_items: Vec<AuctionItem> = manual
        .iter()
        .flat_map(|entry| {
            AuctionItem::expand(
                &entry.name,
                entry.start_price,
                entry.duration_minutes,
                entry.quantity,
                ItemSource::ManualQueue,
                None,
            )
        })
        .collect();

    let mut events: Vec<(EventKey, Vec<AuctionItem>)> = Vec::new();

    for (index, row) in catalog.iter().enumerate() {
        let name = row.item.trim();
        if name.is_empty() || row.is_committed() {
            continue;
        }

        let mut duration = row
            .duration
            .filter(|d| *d > 0)
            .unwrap_or(default_duration_minutes);
        if duration > MAX_DURATION_MINUTES {
            warn!(
                item = name,
                duration,
                "Catalog duration capped at {} minutes", MAX_DURATION_MINUTES
            );
            duration = MAX_DURATION_MINUTES;
        }

        let items = AuctionItem::expand(
            name,
            row.start_price,
            duration,
            row.quantity,
            ItemSource::ExternalCatalog,
            Some(index),
        );

        match row.boss_key.as_deref().and_then(EventKey::parse) {
            None => open_items.extend(items),
            Some(key) => {
                let identity = key.identity();
                match events.iter_mut().find(|(k, _)| k.identity() == identity) {
                    Some((_, group)) => group.extend(items),
                    None => events.push((key, items)),
                }
            }
        }
    }

    let mut sessions = Vec::with_capacity(events.len() + 1);
    if !open_items.is_empty() {
        sessions.push((SessionKey::Open, open_items));
    }
    sessions.extend(
        events
            .into_iter()
            .map(|(key, items)| (SessionKey::Event(key), items)),
    );

    sessions
        .into_iter()
        .enumerate()
        .map(|(i, (key, items))| Session {
            id: SessionId(i as u32),
            key,
            items,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(item: &str, boss_key: Option<&str>) -> CatalogRow {
        CatalogRow {
            item: item.to_string(),
            start_price: 10,
            duration: Some(5),
            quantity: 1,
            winner: None,
            boss_key: boss_key.map(str::to_string),
        }
    }

    fn queued(name: &str, quantity: u32) -> QueueEntry {
        QueueEntry {
            id: "q1".into(),
            name: name.into(),
            start_price: 5,
            duration_minutes: 2,
            quantity,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_parse_trailing_timestamp() {
        let key = EventKey::parse("Lady Dalia 10/14/26 21:30").unwrap();
        assert_eq!(key.boss, "Lady Dalia");
        assert_eq!(key.date, NaiveDate::from_ymd_opt(2026, 10, 14));
        assert_eq!(key.timestamp().as_deref(), Some("10/14/26 21:30"));
        assert_eq!(key.to_string(), "Lady Dalia 10/14/26 21:30");
    }

    #[test]
    fn test_parse_bracketed_timestamp() {
        let key = EventKey::parse("[10/14/26 21:30] Venatus").unwrap();
        assert_eq!(key.boss, "Venatus");
        assert_eq!(key.time, NaiveTime::from_hms_opt(21, 30, 0));
    }

    #[test]
    fn test_parse_bare_boss() {
        let key = EventKey::parse("Venatus").unwrap();
        assert_eq!(key.boss, "Venatus");
        assert_eq!(key.date, None);
        assert!(EventKey::parse("   ").is_none());
    }

    #[test]
    fn test_open_session_first_and_grouping() {
        let catalog = vec![
            row("Sword", Some("Venatus 10/14/26 21:30")),
            row("Shield", Some("Clemantis 10/15/26 11:00")),
            row("Helm", Some("venatus 10/14/26 21:30")),
            row("Potion", None),
        ];
        let sessions = build_sessions(&catalog, &[queued("Ring", 2)], 30);

        assert_eq!(sessions.len(), 3);
        assert!(sessions[0].is_open());
        let open: Vec<String> = sessions[0].items.iter().map(|i| i.display_name()).collect();
        assert_eq!(open, vec!["Ring [1/2]", "Ring [2/2]", "Potion"]);

        assert_eq!(sessions[1].event().unwrap().boss, "Venatus");
        let venatus: Vec<&str> = sessions[1].items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(venatus, vec!["Sword", "Helm"]);
        assert_eq!(sessions[2].event().unwrap().boss, "Clemantis");
        assert_eq!(sessions[2].id, SessionId(2));
    }

    #[test]
    fn test_committed_and_unnamed_rows_skipped() {
        let mut sold = row("Sword", Some("Venatus 10/14/26 21:30"));
        sold.winner = Some("Alice".into());
        let catalog = vec![sold, row("  ", None)];
        assert!(build_sessions(&catalog, &[], 30).is_empty());
    }

    #[test]
    fn test_catalog_index_and_default_duration() {
        let mut no_duration = row("Sword", None);
        no_duration.duration = None;
        let sessions = build_sessions(&[row("Skip", None), no_duration], &[], 30);
        let sword = &sessions[0].items[1];
        assert_eq!(sword.catalog_index, Some(1));
        assert_eq!(sword.duration_minutes, 30);
        assert_eq!(sword.source, ItemSource::ExternalCatalog);
    }

    #[test]
    fn test_catalog_duration_capped() {
        let mut huge = row("Sword", None);
        huge.duration = Some(u64::MAX);
        let sessions = build_sessions(&[huge, row("Shield", None)], &[], 30);
        assert_eq!(sessions[0].items[0].duration_minutes, MAX_DURATION_MINUTES);
        assert_eq!(sessions[0].items[1].duration_minutes, 5);
    }
}
