//! Lifecycle of the single in-flight auction item.
//!
//! `preview -> active -> ended`. While active, the deadline can move: late
//! confirmed bids extend it (bounded), operators extend it, and pausing shifts
//! it by the paused duration. Every deadline change bumps `generation` so timers
//! scheduled against an older deadline can be recognized and dropped.

use std::time::Duration;

use auction_types::{
    format_timestamp, AuctionItem, BidRecord, Member, ResultLogEntry,
    SettlementRecord,
};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::AuctionError;
use crate::session::SessionId;

/// Lead time of the "going once" warning.
pub const GOING_ONCE_LEAD: Duration = Duration::from_secs(60);
/// Lead time of the "going twice" warning.
pub const GOING_TWICE_LEAD: Duration = Duration::from_secs(30);
/// Lead time of the "final call" warning.
pub const FINAL_CALL_LEAD: Duration = Duration::from_secs(10);
/// Longest duration, in minutes, an item or operator extension may ask for.
pub const MAX_DURATION_MINUTES: u64 = 24 * 60;

/// Phase of an item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemPhase {
    Preview,
    Active,
    Ended,
}

/// Time-relative callbacks scheduled against the item deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ItemTimer {
    GoingOnce,
    GoingTwice,
    FinalCall,
    End,
}

impl ItemTimer {
    fn lead(&self) -> Duration {
        match self {
            ItemTimer::GoingOnce => GOING_ONCE_LEAD,
            ItemTimer::GoingTwice => GOING_TWICE_LEAD,
            ItemTimer::FinalCall => FINAL_CALL_LEAD,
            ItemTimer::End => Duration::ZERO,
        }
    }
}

/// Soft-close rule applied to confirmed bids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtensionPolicy {
    pub max_extensions: u32,
    pub extension: Duration,
    pub window: Duration,
}

impl Default for ExtensionPolicy {
    fn default() -> Self {
        Self {
            max_extensions: 15,
            extension: Duration::from_secs(60),
            window: Duration::from_secs(60),
        }
    }
}

/// The closed set of mutations an item accepts.
#[derive(Clone, Debug)]
pub enum ItemCommand {
    /// Open bidding; the deadline is `now + duration`.
    Activate { started_at: DateTime<FixedOffset> },
    /// Apply an already validated, confirmed bid.
    ApplyBid {
        bidder: Member,
        amount: u64,
        placed_at: DateTime<FixedOffset>,
    },
    /// Operator extension; does not count against the extension limit.
    Extend(Duration),
    Pause,
    Resume,
    End { ended_at: DateTime<FixedOffset> },
}

/// What happened when a bid was applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BidApplied {
    pub previous_winner: Option<Member>,
    pub previous_bid: u64,
    pub extended: bool,
    pub remaining: Duration,
}

/// Result of an ended item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    Sold {
        record: SettlementRecord,
        log: ResultLogEntry,
    },
    NoBids {
        item: AuctionItem,
    },
}

/// Effect of an [`ItemCommand`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemEvent {
    Activated { end_time: Instant },
    BidApplied(BidApplied),
    Extended { end_time: Instant },
    Paused { remaining: Duration },
    Resumed { paused_for: Duration, end_time: Instant },
    Ended(ItemOutcome),
}

/// State machine of the current item.
#[derive(Clone, Debug)]
pub struct AuctionItemStateMachine {
    /// Run-unique sequence number of this item
    pub seq: u64,
    /// Session the item belongs to
    pub session: SessionId,
    pub item: AuctionItem,
    pub current_bid: u64,
    pub current_winner: Option<Member>,
    pub bid_history: Vec<BidRecord>,
    pub phase: ItemPhase,
    pub end_time: Option<Instant>,
    pub extension_count: u32,
    pub announced_once_left: bool,
    pub announced_twice_left: bool,
    pub paused_at: Option<Instant>,
    /// Bumped on every deadline change
    pub generation: u64,
    pub started_at: Option<DateTime<FixedOffset>>,
    policy: ExtensionPolicy,
}

impl AuctionItemStateMachine {
    /// Announce an item; it starts in preview at its start price.
    pub fn new(seq: u64, session: SessionId, item: AuctionItem, policy: ExtensionPolicy) -> Self {
        Self {
            seq,
            session,
            current_bid: item.start_price,
            item,
            current_winner: None,
            bid_history: Vec::new(),
            phase: ItemPhase::Preview,
            end_time: None,
            extension_count: 0,
            announced_once_left: false,
            announced_twice_left: false,
            paused_at: None,
            generation: 0,
            started_at: None,
            policy,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase == ItemPhase::Active
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn policy(&self) -> &ExtensionPolicy {
        &self.policy
    }

    /// Time left before the deadline. Frozen while paused.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let end = self.end_time?;
        let reference = self.paused_at.unwrap_or(now);
        Some(end.saturating_duration_since(reference))
    }

    /// Apply one mutation.
    pub fn apply(&mut self, command: ItemCommand, now: Instant) -> Result<ItemEvent, AuctionError> {
        match command {
            ItemCommand::Activate { started_at } => {
                if self.phase != ItemPhase::Preview {
                    return Err(AuctionError::ItemNotActive);
                }
                let end_time = deadline_after(now, self.item.duration_minutes)?;
                self.phase = ItemPhase::Active;
                self.end_time = Some(end_time);
                self.started_at = Some(started_at);
                self.generation += 1;
                Ok(ItemEvent::Activated { end_time })
            }

            ItemCommand::ApplyBid {
                bidder,
                amount,
                placed_at,
            } => {
                self.ensure_biddable()?;
                if amount <= self.current_bid {
                    return Err(AuctionError::StaleConfirmation {
                        proposed: amount,
                        current: self.current_bid,
                    });
                }
                let end = self.end_time.ok_or(AuctionError::ItemNotActive)?;
                let left = end.saturating_duration_since(now);
                let extended_end = if left < self.policy.window
                    && self.extension_count < self.policy.max_extensions
                {
                    end.checked_add(self.policy.extension)
                } else {
                    None
                };

                let previous_winner = self.current_winner.replace(bidder.clone());
                let previous_bid = std::mem::replace(&mut self.current_bid, amount);
                self.bid_history.push(BidRecord {
                    member: bidder,
                    amount,
                    placed_at,
                });

                let extended = extended_end.is_some();
                if let Some(new_end) = extended_end {
                    self.push_deadline(new_end);
                    self.extension_count += 1;
                }

                Ok(ItemEvent::BidApplied(BidApplied {
                    previous_winner,
                    previous_bid,
                    extended,
                    remaining: self.remaining(now).unwrap_or_default(),
                }))
            }

            ItemCommand::Extend(by) => {
                if self.phase != ItemPhase::Active {
                    return Err(AuctionError::ItemNotActive);
                }
                let end = self.end_time.ok_or(AuctionError::ItemNotActive)?;
                let end_time = end
                    .checked_add(by)
                    .ok_or_else(|| AuctionError::InvalidAmount(format!("{}s", by.as_secs())))?;
                self.push_deadline(end_time);
                Ok(ItemEvent::Extended { end_time })
            }

            ItemCommand::Pause => {
                if self.phase != ItemPhase::Active {
                    return Err(AuctionError::ItemNotActive);
                }
                if self.is_paused() {
                    return Err(AuctionError::AlreadyPaused);
                }
                self.paused_at = Some(now);
                self.generation += 1;
                Ok(ItemEvent::Paused {
                    remaining: self.remaining(now).unwrap_or_default(),
                })
            }

            ItemCommand::Resume => {
                let paused_at = self.paused_at.ok_or(AuctionError::NotPaused)?;
                let paused_for = now.saturating_duration_since(paused_at);
                let end = self.end_time.ok_or(AuctionError::ItemNotActive)?;
                let end_time = end.checked_add(paused_for).unwrap_or(end);
                self.paused_at = None;
                self.end_time = Some(end_time);
                self.generation += 1;
                Ok(ItemEvent::Resumed {
                    paused_for,
                    end_time,
                })
            }

            ItemCommand::End { ended_at } => {
                if self.phase == ItemPhase::Ended {
                    return Err(AuctionError::ItemNotActive);
                }
                self.phase = ItemPhase::Ended;
                self.paused_at = None;
                self.generation += 1;
                Ok(ItemEvent::Ended(self.outcome(ended_at)))
            }
        }
    }

    fn ensure_biddable(&self) -> Result<(), AuctionError> {
        if self.phase != ItemPhase::Active {
            return Err(AuctionError::ItemNotActive);
        }
        if self.is_paused() {
            return Err(AuctionError::ItemPaused);
        }
        Ok(())
    }

    /// Move the deadline out; warnings may fire again against the new one.
    fn push_deadline(&mut self, end_time: Instant) {
        self.end_time = Some(end_time);
        self.announced_once_left = false;
        self.announced_twice_left = false;
        self.generation += 1;
    }

    fn outcome(&self, ended_at: DateTime<FixedOffset>) -> ItemOutcome {
        let Some(winner) = self.current_winner.clone() else {
            return ItemOutcome::NoBids {
                item: self.item.clone(),
            };
        };

        let bid_count_for_winner = self
            .bid_history
            .iter()
            .filter(|b| b.member.same_name(&winner.display_name))
            .count() as u32;
        let started_at = self.started_at.unwrap_or(ended_at);

        ItemOutcome::Sold {
            record: SettlementRecord {
                item: self.item.display_name(),
                winner: winner.clone(),
                amount: self.current_bid,
                source: self.item.source,
                catalog_index: self.item.catalog_index,
            },
            log: ResultLogEntry {
                item_index: self.item.catalog_index,
                winner: winner.display_name,
                winning_bid: self.current_bid,
                total_bids: self.bid_history.len() as u32,
                bid_count_for_winner,
                source: self.item.source,
                item_name: self.item.display_name(),
                start_time: format_timestamp(&started_at),
                end_time: format_timestamp(&ended_at),
            },
        }
    }

    /// Callbacks to schedule against the current deadline.
    ///
    /// Empty unless the item is active and running. Warnings that already fired
    /// for this deadline, or whose firing point has passed, are left out.
    pub fn pending_timers(&self, now: Instant) -> Vec<(ItemTimer, Instant)> {
        let Some(end) = self.end_time else {
            return Vec::new();
        };
        if self.phase != ItemPhase::Active || self.is_paused() {
            return Vec::new();
        }

        let mut timers = Vec::with_capacity(4);
        for timer in [ItemTimer::GoingOnce, ItemTimer::GoingTwice, ItemTimer::FinalCall] {
            let already = match timer {
                ItemTimer::GoingOnce => self.announced_once_left,
                ItemTimer::GoingTwice => self.announced_twice_left,
                _ => false,
            };
            let Some(at) = end.checked_sub(timer.lead()) else {
                continue;
            };
            if !already && at > now {
                timers.push((timer, at));
            }
        }
        timers.push((ItemTimer::End, end));
        timers
    }

    /// Record that a warning fired. Returns false when it must be ignored.
    pub fn mark_warning(&mut self, timer: ItemTimer) -> bool {
        if self.phase != ItemPhase::Active || self.is_paused() {
            return false;
        }
        match timer {
            ItemTimer::GoingOnce => {
                if self.announced_once_left {
                    return false;
                }
                self.announced_once_left = true;
            }
            ItemTimer::GoingTwice => {
                if self.announced_twice_left {
                    return false;
                }
                self.announced_twice_left = true;
            }
            ItemTimer::FinalCall => {}
            ItemTimer::End => return false,
        }
        true
    }
}

/// `now + minutes`, or `InvalidAmount` when that is not representable.
fn deadline_after(now: Instant, minutes: u64) -> Result<Instant, AuctionError> {
    minutes
        .checked_mul(60)
        .and_then(|secs| now.checked_add(Duration::from_secs(secs)))
        .ok_or_else(|| AuctionError::InvalidAmount(minutes.to_string()))
}
