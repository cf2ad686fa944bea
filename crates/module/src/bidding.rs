//! Two-phase bid confirmation.
//!
//! A bid is first validated and turned into a [`PendingConfirmation`]. Nothing is
//! reserved until the bidder confirms; the confirmation then re-validates against
//! the item as it is at that moment, so a confirmation outrun by another bid is
//! rejected instead of applied.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use auction_types::Member;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::attendance::AttendanceGate;
use crate::error::AuctionError;
use crate::item::{AuctionItemStateMachine, BidApplied, ItemCommand, ItemEvent};
use crate::ledger::PointLedger;
use crate::session::Session;

/// Identifier of a pending confirmation, unique within the engine's lifetime.
pub type ConfirmationId = u64;

/// Bid acceptance rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BidPolicy {
    pub rate_limit: Duration,
    pub confirm_timeout: Duration,
    /// A bid must beat the current one by at least this much
    pub min_increment: u64,
}

impl Default for BidPolicy {
    fn default() -> Self {
        Self {
            rate_limit: Duration::from_secs(3),
            confirm_timeout: Duration::from_secs(10),
            min_increment: 1,
        }
    }
}

/// A validated bid awaiting an explicit confirm or cancel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingConfirmation {
    pub id: ConfirmationId,
    pub bidder: Member,
    pub item_seq: u64,
    pub proposed_amount: u64,
    /// Points to reserve when confirmed
    pub needed: u64,
    pub is_self_overbid: bool,
    pub expires_at: Instant,
}

impl PendingConfirmation {
    pub fn expires_in(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

/// Outcome of a confirmed bid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmedBid {
    pub confirmation: PendingConfirmation,
    /// Reservation made at apply time
    pub reserved: u64,
    pub is_self_overbid: bool,
    pub applied: BidApplied,
}

impl ConfirmedBid {
    /// Member displaced by this bid, if any.
    pub fn outbid(&self) -> Option<&Member> {
        if self.is_self_overbid {
            return None;
        }
        self.applied.previous_winner.as_ref()
    }
}

/// Member-facing view of a [`PendingConfirmation`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidPrompt {
    pub confirmation_id: ConfirmationId,
    pub item: String,
    pub amount: u64,
    pub current_bid: u64,
    pub needed: u64,
    pub available_after: u64,
    pub is_self_overbid: bool,
    pub expires_in_secs: u64,
}

/// Proposal and confirmation bookkeeping.
#[derive(Debug, Default)]
pub struct BidConfirmationWorkflow {
    policy: BidPolicy,
    /// member id -> time of the last accepted submission
    last_bid: HashMap<String, Instant>,
    pending: BTreeMap<ConfirmationId, PendingConfirmation>,
    next_id: ConfirmationId,
}

impl BidConfirmationWorkflow {
    pub fn new(policy: BidPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn policy(&self) -> &BidPolicy {
        &self.policy
    }

    /// Validate a bid and open a confirmation for it.
    ///
    /// Checks run in a fixed order and the first failure is returned. Apart from
    /// the rate-limit stamp, a rejected bid leaves everything untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_bid(
        &mut self,
        bidder: &Member,
        raw_amount: &str,
        item: &AuctionItemStateMachine,
        session: &Session,
        gate: &AttendanceGate,
        ledger: &PointLedger,
        now: Instant,
    ) -> Result<PendingConfirmation, AuctionError> {
        if !item.is_active() {
            return Err(AuctionError::ItemNotActive);
        }
        if item.is_paused() {
            return Err(AuctionError::ItemPaused);
        }

        if !gate.is_eligible(session, &bidder.display_name) {
            return Err(AuctionError::NotEligible {
                event: session.key.to_string(),
            });
        }

        if let Some(open) = self
            .pending
            .values()
            .find(|p| p.item_seq == item.seq && p.bidder.id == bidder.id)
        {
            return Err(AuctionError::ConfirmationPending {
                expires_in_secs: ceil_secs(open.expires_in(now)),
            });
        }

        if let Some(last) = self.last_bid.get(&bidder.id) {
            let next_allowed = *last + self.policy.rate_limit;
            if now < next_allowed {
                return Err(AuctionError::RateLimited {
                    retry_after_secs: ceil_secs(next_allowed - now),
                });
            }
        }
        self.last_bid.insert(bidder.id.clone(), now);

        let amount = parse_amount(raw_amount)?;

        let minimum = item.current_bid.saturating_add(self.policy.min_increment);
        if amount < minimum {
            return Err(AuctionError::BidTooLow {
                current: item.current_bid,
                minimum,
            });
        }

        if !ledger.has_snapshot() {
            return Err(AuctionError::NoLedgerData);
        }

        let (is_self_overbid, needed) = reservation_needed(bidder, amount, item, ledger)?;

        self.next_id += 1;
        let pending = PendingConfirmation {
            id: self.next_id,
            bidder: bidder.clone(),
            item_seq: item.seq,
            proposed_amount: amount,
            needed,
            is_self_overbid,
            expires_at: now + self.policy.confirm_timeout,
        };
        self.pending.insert(pending.id, pending.clone());

        debug!(
            confirmation = pending.id,
            bidder = %bidder.display_name,
            amount,
            needed,
            is_self_overbid,
            "Bid proposed"
        );
        Ok(pending)
    }

    /// Apply a pending confirmation on behalf of its bidder.
    ///
    /// The confirmation is consumed whether it succeeds or not, except when the
    /// caller is not its bidder.
    pub fn confirm(
        &mut self,
        id: ConfirmationId,
        member_id: &str,
        item: &mut AuctionItemStateMachine,
        ledger: &mut PointLedger,
        now: Instant,
        placed_at: DateTime<FixedOffset>,
    ) -> Result<ConfirmedBid, AuctionError> {
        let pending = self.take_owned(id, member_id)?;

        if now >= pending.expires_at {
            return Err(AuctionError::ConfirmationExpired(id));
        }
        if pending.item_seq != item.seq || !item.is_active() {
            return Err(AuctionError::ItemNotActive);
        }
        if item.is_paused() {
            return Err(AuctionError::ItemPaused);
        }

        let amount = pending.proposed_amount;
        if amount < item.current_bid.saturating_add(self.policy.min_increment) {
            return Err(AuctionError::StaleConfirmation {
                proposed: amount,
                current: item.current_bid,
            });
        }

        // The winner may have changed since the proposal.
        let (is_self_overbid, needed) = reservation_needed(&pending.bidder, amount, item, ledger)?;

        let event = item.apply(
            ItemCommand::ApplyBid {
                bidder: pending.bidder.clone(),
                amount,
                placed_at,
            },
            now,
        )?;
        let ItemEvent::BidApplied(applied) = event else {
            return Err(AuctionError::ItemNotActive);
        };

        if !is_self_overbid {
            if let Some(previous) = &applied.previous_winner {
                ledger.release(&previous.display_name, applied.previous_bid);
            }
        }
        ledger.reserve(&pending.bidder.display_name, needed);

        debug!(
            confirmation = id,
            bidder = %pending.bidder.display_name,
            amount,
            reserved = needed,
            extended = applied.extended,
            "Bid confirmed"
        );

        Ok(ConfirmedBid {
            confirmation: pending,
            reserved: needed,
            is_self_overbid,
            applied,
        })
    }

    /// Drop a confirmation at its bidder's request. No ledger effect.
    pub fn cancel(
        &mut self,
        id: ConfirmationId,
        member_id: &str,
    ) -> Result<PendingConfirmation, AuctionError> {
        self.take_owned(id, member_id)
    }

    /// Drop a confirmation whose timeout elapsed. No ledger effect.
    pub fn expire(&mut self, id: ConfirmationId) -> Option<PendingConfirmation> {
        self.pending.remove(&id)
    }

    /// Drop every confirmation opened against an item.
    pub fn clear_item(&mut self, item_seq: u64) -> Vec<PendingConfirmation> {
        let ids: Vec<ConfirmationId> = self
            .pending
            .values()
            .filter(|p| p.item_seq == item_seq)
            .map(|p| p.id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.pending.remove(&id))
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn get(&self, id: ConfirmationId) -> Option<&PendingConfirmation> {
        self.pending.get(&id)
    }

    /// Forget all confirmations and rate-limit stamps.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.last_bid.clear();
    }

    fn take_owned(
        &mut self,
        id: ConfirmationId,
        member_id: &str,
    ) -> Result<PendingConfirmation, AuctionError> {
        match self.pending.get(&id) {
            None => Err(AuctionError::ConfirmationNotFound(id)),
            Some(p) if p.bidder.id != member_id => Err(AuctionError::NotYourConfirmation(id)),
            Some(_) => self
                .pending
                .remove(&id)
                .ok_or(AuctionError::ConfirmationNotFound(id)),
        }
    }
}

/// Whether the bid raises the bidder's own winning bid, and how many points it
/// needs to reserve. Fails when the bidder cannot cover it.
fn reservation_needed(
    bidder: &Member,
    amount: u64,
    item: &AuctionItemStateMachine,
    ledger: &PointLedger,
) -> Result<(bool, u64), AuctionError> {
    let is_self_overbid = item
        .current_winner
        .as_ref()
        .map(|w| w.same_name(&bidder.display_name))
        .unwrap_or(false);
    let needed = if is_self_overbid {
        amount.saturating_sub(item.current_bid)
    } else {
        amount
    };

    let name = &bidder.display_name;
    let available = ledger.available_of(name);
    if needed > available {
        return Err(AuctionError::InsufficientPoints {
            total: ledger.total_of(name),
            locked: ledger.locked_of(name),
            available,
            needed,
        });
    }
    Ok((is_self_overbid, needed))
}

fn parse_amount(raw: &str) -> Result<u64, AuctionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AuctionError::InvalidAmount(raw.to_string()));
    }
    match trimmed.parse::<u64>() {
        Ok(amount) if amount > 0 => Ok(amount),
        _ => Err(AuctionError::InvalidAmount(raw.to_string())),
    }
}

/// Whole seconds, rounded up.
pub(crate) fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
