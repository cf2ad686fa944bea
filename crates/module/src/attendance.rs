//! Attendance-based bidding eligibility.
//!
//! Items gated on an event may only be bid on by members who attended that
//! event. Rosters are fetched per session at run start and dropped once the
//! session is over.

use std::collections::{HashMap, HashSet};

use auction_types::normalize_name;
use chrono::{Datelike, NaiveDate};
use tracing::info;

use crate::error::AuctionError;
use crate::service::LedgerService;
use crate::session::{Session, SessionId};

/// Week identifier the ledger files attendance under: the Sunday starting the week.
pub fn week_key(date: NaiveDate) -> String {
    let back = date.weekday().num_days_from_sunday() as i64;
    let sunday = date - chrono::Duration::days(back);
    format!("WEEK_{}", sunday.format("%Y%m%d"))
}

/// Per-session eligibility rosters.
#[derive(Debug, Default)]
pub struct AttendanceGate {
    rosters: HashMap<SessionId, HashSet<String>>,
}

impl AttendanceGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the roster of an event-gated session. Open sessions need none.
    ///
    /// `fallback_date` is used for the week key when the event has no date.
    pub async fn load_for_session<L: LedgerService + ?Sized>(
        &mut self,
        session: &Session,
        service: &L,
        fallback_date: NaiveDate,
    ) -> Result<usize, AuctionError> {
        let Some(event) = session.event() else {
            return Ok(0);
        };

        let week = week_key(event.date.unwrap_or(fallback_date));
        let event_key = event.to_string();
        let roster = service
            .get_attendance(&week, &event_key)
            .await
            .map_err(|e| AuctionError::AttendanceLoadFailed {
                event: event_key.clone(),
                reason: e.to_string(),
            })?;

        let attendees: HashSet<String> = roster
            .attendees
            .iter()
            .map(|name| normalize_name(name))
            .filter(|name| !name.is_empty())
            .collect();
        let count = attendees.len();
        self.install_roster(session.id, attendees);

        info!(session = session.id.0, event = %event_key, week = %week, attendees = count, "Attendance loaded");
        Ok(count)
    }

    /// Install an already normalized roster.
    pub fn install_roster(&mut self, session: SessionId, attendees: HashSet<String>) {
        self.rosters.insert(session, attendees);
    }

    /// Whether a member may bid on the items of a session.
    pub fn is_eligible(&self, session: &Session, member_display_name: &str) -> bool {
        if session.is_open() {
            return true;
        }
        self.rosters
            .get(&session.id)
            .map(|roster| roster.contains(&normalize_name(member_display_name)))
            .unwrap_or(false)
    }

    /// Drop the roster of a session that is no longer current.
    pub fn release_session(&mut self, session: SessionId) {
        if self.rosters.remove(&session).is_some() {
            info!(session = session.0, "Attendance roster released");
        }
    }

    pub fn loaded_sessions(&self) -> usize {
        self.rosters.len()
    }

    pub fn clear(&mut self) {
        self.rosters.clear();
    }
}
