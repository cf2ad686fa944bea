//! Session scheduler: the engine's single event loop.
//!
//! One task owns every piece of run state (point ledger, attendance rosters,
//! pending confirmations, the current item). Gateway calls arrive over an
//! `mpsc` channel with a `oneshot` reply; timers post events over a second
//! channel. Handlers never hold state across an `.await` except while a run is
//! being started or settled, when no item is live.

use std::sync::Arc;
use std::time::Duration;

use auction_types::{format_timestamp, ItemSource, ManualOutcome, Member};
use chrono::{DateTime, FixedOffset, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::attendance::AttendanceGate;
use crate::bidding::{ceil_secs, BidConfirmationWorkflow, BidPolicy, BidPrompt, ConfirmationId};
use crate::call::{BidReceipt, CallResponse, EngineCall, RunOverview, SessionOverview};
use crate::config::EngineConfig;
use crate::error::AuctionError;
use crate::item::{
    AuctionItemStateMachine, ExtensionPolicy, ItemCommand, ItemEvent, ItemOutcome, ItemPhase,
    ItemTimer, MAX_DURATION_MINUTES,
};
use crate::ledger::PointLedger;
use crate::notify::{Notification, Notifier, SoldLine};
use crate::queries::{EngineQuery, EngineQueryResponse, EngineStatus, ItemStatus, SessionStatus};
use crate::queue::{ManualQueue, QueueEntry};
use crate::service::LedgerService;
use crate::session::{build_sessions, Session};
use crate::settlement::{spend_summary, ResultAggregator};
use crate::timers::TimerSet;

/// Capacity of the request channel.
const REQUEST_BUFFER: usize = 64;

/// Messages accepted by the scheduler task.
enum Request {
    Call(EngineCall, oneshot::Sender<Result<CallResponse, AuctionError>>),
    Query(EngineQuery, oneshot::Sender<EngineQueryResponse>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum TimerKey {
    Advance,
    Activate,
    Item(ItemTimer),
    Confirmation(ConfirmationId),
}

#[derive(Clone, Copy, Debug)]
enum TimerEvent {
    /// Announce the item at the run's cursor.
    Advance { run_id: u64 },
    /// Open the previewed item for bids.
    Activate { seq: u64 },
    Item {
        seq: u64,
        generation: u64,
        timer: ItemTimer,
    },
    ConfirmationExpired(ConfirmationId),
}

/// Run-scoped state, dropped when the run ends.
struct Run {
    id: u64,
    sessions: Vec<Session>,
    /// Cursor: session and item to announce next, or being auctioned
    session_idx: usize,
    item_idx: usize,
    current: Option<AuctionItemStateMachine>,
    records: Vec<auction_types::SettlementRecord>,
    manual_outcomes: Vec<ManualOutcome>,
    session_timestamp: String,
    total_items: usize,
    announced: usize,
    catalog_items: usize,
    manual_items: usize,
}

impl Run {
    fn session_of(&self, item: &AuctionItemStateMachine) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == item.session)
    }
}

/// Owner of all engine state. Driven by [`SessionScheduler::spawn`].
pub struct SessionScheduler {
    config: EngineConfig,
    service: Arc<dyn LedgerService>,
    notifier: Arc<dyn Notifier>,
    points: PointLedger,
    gate: AttendanceGate,
    bids: BidConfirmationWorkflow,
    queue: ManualQueue,
    run: Option<Run>,
    timers: TimerSet<TimerKey>,
    timer_tx: mpsc::UnboundedSender<TimerEvent>,
    next_run_id: u64,
    next_item_seq: u64,
}

impl SessionScheduler {
    /// Start the scheduler task. It stops once every handle is dropped.
    pub fn spawn(
        config: EngineConfig,
        service: Arc<dyn LedgerService>,
        notifier: Arc<dyn Notifier>,
    ) -> SchedulerHandle {
        let (tx, rx) = mpsc::channel(REQUEST_BUFFER);
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        let scheduler = SessionScheduler {
            bids: BidConfirmationWorkflow::new(BidPolicy {
                rate_limit: config.rate_limit(),
                confirm_timeout: config.confirm_timeout(),
                min_increment: config.min_increment,
            }),
            config,
            service,
            notifier,
            points: PointLedger::new(),
            gate: AttendanceGate::new(),
            queue: ManualQueue::new(),
            run: None,
            timers: TimerSet::new(),
            timer_tx,
            next_run_id: 0,
            next_item_seq: 0,
        };
        tokio::spawn(scheduler.run_loop(rx, timer_rx));

        SchedulerHandle { tx }
    }

    async fn run_loop(
        mut self,
        mut requests: mpsc::Receiver<Request>,
        mut timer_events: mpsc::UnboundedReceiver<TimerEvent>,
    ) {
        info!("Scheduler started");
        loop {
            tokio::select! {
                biased;
                Some(event) = timer_events.recv() => self.handle_timer(event).await,
                request = requests.recv() => match request {
                    Some(Request::Call(call, reply)) => {
                        let result = self.handle_call(call).await;
                        let _ = reply.send(result);
                    }
                    Some(Request::Query(query, reply)) => {
                        let _ = reply.send(self.handle_query(query));
                    }
                    None => break,
                },
            }
        }
        self.timers.cancel_all();
        info!("Scheduler stopped");
    }

    fn policy(&self) -> ExtensionPolicy {
        ExtensionPolicy {
            max_extensions: self.config.max_extensions,
            extension: self.config.extension(),
            window: self.config.extension_window(),
        }
    }

    fn wall_now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.config.offset())
    }

    fn notify(&self, notification: Notification) {
        self.notifier.notify(notification);
    }

    // =========================
    // CALLS
    // =========================

    async fn handle_call(&mut self, call: EngineCall) -> Result<CallResponse, AuctionError> {
        match call {
            EngineCall::StartRun => self.start_run().await.map(CallResponse::RunStarted),
            EngineCall::SubmitBid { member, amount } => {
                self.submit_bid(member, &amount).map(CallResponse::BidPrompt)
            }
            EngineCall::ConfirmBid {
                member_id,
                confirmation_id,
            } => self
                .confirm_bid(&member_id, confirmation_id)
                .map(CallResponse::BidConfirmed),
            EngineCall::CancelBid {
                member_id,
                confirmation_id,
            } => {
                self.cancel_bid(&member_id, confirmation_id)?;
                Ok(CallResponse::BidCancelled { confirmation_id })
            }
            EngineCall::Pause => self.pause().map(|_| CallResponse::Done),
            EngineCall::Resume => self.resume().map(|_| CallResponse::Done),
            EngineCall::Stop => self.stop().await.map(|_| CallResponse::Done),
            EngineCall::Extend { minutes } => self.extend(minutes).map(|_| CallResponse::Done),
            EngineCall::QueueAdd {
                name,
                start_price,
                duration_minutes,
                quantity,
            } => {
                let entry = self.queue.add(&name, start_price, duration_minutes, quantity)?;
                info!(id = %entry.id, name = %entry.name, quantity, "Queued manual item");
                Ok(CallResponse::Queued(entry))
            }
            EngineCall::QueueRemove { name } => {
                let entry = self.queue.remove(&name)?;
                info!(id = %entry.id, name = %entry.name, "Removed manual item");
                Ok(CallResponse::Dequeued(entry))
            }
            EngineCall::QueueClear => {
                let removed = self.queue.clear();
                info!(removed, "Cleared manual queue");
                Ok(CallResponse::QueueCleared { removed })
            }
        }
    }

    async fn start_run(&mut self) -> Result<RunOverview, AuctionError> {
        if self.run.is_some() {
            return Err(AuctionError::AlreadyRunning);
        }
        let result = self.build_run().await;
        if let Err(e) = &result {
            warn!(error = %e, "Run start failed");
            self.points.clear();
            self.gate.clear();
        }
        result
    }

    async fn build_run(&mut self) -> Result<RunOverview, AuctionError> {
        let started = self.wall_now();

        self.points.load_snapshot(self.service.as_ref()).await?;
        let catalog = self
            .service
            .get_catalog_items()
            .await
            .map_err(|e| AuctionError::LedgerUnavailable(e.to_string()))?;

        let sessions = build_sessions(
            &catalog,
            self.queue.list(),
            self.config.default_duration_minutes,
        );
        if sessions.is_empty() {
            return Err(AuctionError::NoItemsToAuction);
        }

        let mut overview = Vec::with_capacity(sessions.len());
        for session in &sessions {
            let attendees = self
                .gate
                .load_for_session(session, self.service.as_ref(), started.date_naive())
                .await?;
            overview.push(SessionOverview {
                key: session.key.to_string(),
                gated: !session.is_open(),
                items: session.items.iter().map(|i| i.display_name()).collect(),
                attendees,
            });
        }

        // Only a successful start consumes the queue.
        let drained = self.queue.take_all();

        let total_items: usize = sessions.iter().map(|s| s.items.len()).sum();
        let manual_items = sessions
            .iter()
            .flat_map(|s| &s.items)
            .filter(|i| i.source == ItemSource::ManualQueue)
            .count();

        self.next_run_id += 1;
        let run = Run {
            id: self.next_run_id,
            sessions,
            session_idx: 0,
            item_idx: 0,
            current: None,
            records: Vec::new(),
            manual_outcomes: Vec::new(),
            session_timestamp: format_timestamp(&started),
            total_items,
            announced: 0,
            catalog_items: total_items - manual_items,
            manual_items,
        };

        let result = RunOverview {
            session_timestamp: run.session_timestamp.clone(),
            sessions: overview,
            total_items,
            catalog_items: run.catalog_items,
            manual_items,
        };

        info!(
            run = run.id,
            sessions = run.sessions.len(),
            items = total_items,
            manual_entries = drained.len(),
            "Run started"
        );
        self.notify(Notification::RunStarted {
            sessions: run.sessions.len(),
            items: total_items,
            catalog_items: run.catalog_items,
            manual_items,
            session_timestamp: run.session_timestamp.clone(),
        });

        self.run = Some(run);
        self.announce_next().await;
        Ok(result)
    }

    fn submit_bid(&mut self, member: Member, raw_amount: &str) -> Result<BidPrompt, AuctionError> {
        let now = Instant::now();
        let run = self.run.as_ref().ok_or(AuctionError::NotRunning)?;
        let item = run.current.as_ref().ok_or(AuctionError::NoActiveItem)?;
        let session = run.session_of(item).ok_or(AuctionError::NoActiveItem)?;

        let pending = self.bids.submit_bid(
            &member,
            raw_amount,
            item,
            session,
            &self.gate,
            &self.points,
            now,
        )?;

        let prompt = BidPrompt {
            confirmation_id: pending.id,
            item: item.item.display_name(),
            amount: pending.proposed_amount,
            current_bid: item.current_bid,
            needed: pending.needed,
            available_after: self
                .points
                .available_of(&member.display_name)
                .saturating_sub(pending.needed),
            is_self_overbid: pending.is_self_overbid,
            expires_in_secs: ceil_secs(pending.expires_in(now)),
        };

        self.timers.schedule(
            TimerKey::Confirmation(pending.id),
            pending.expires_at,
            &self.timer_tx,
            TimerEvent::ConfirmationExpired(pending.id),
        );
        self.notify(Notification::ConfirmationPrompt {
            confirmation_id: pending.id,
            bidder: member,
            item: prompt.item.clone(),
            amount: prompt.amount,
            current_bid: prompt.current_bid,
            needed: prompt.needed,
            available_after: prompt.available_after,
            is_self_overbid: prompt.is_self_overbid,
            expires_in_secs: prompt.expires_in_secs,
        });
        Ok(prompt)
    }

    fn confirm_bid(
        &mut self,
        member_id: &str,
        id: ConfirmationId,
    ) -> Result<BidReceipt, AuctionError> {
        let now = Instant::now();
        let placed_at = self.wall_now();
        let run = self.run.as_mut().ok_or(AuctionError::NotRunning)?;
        let item = run.current.as_mut().ok_or(AuctionError::NoActiveItem)?;

        let bidder = self.bids.get(id).map(|p| p.bidder.clone());
        let result = self
            .bids
            .confirm(id, member_id, item, &mut self.points, now, placed_at);

        if self.bids.get(id).is_none() {
            self.timers.cancel(TimerKey::Confirmation(id));
        }

        let confirmed = match result {
            Ok(confirmed) => confirmed,
            Err(e) => {
                // Only report confirmations the attempt consumed.
                if self.bids.get(id).is_none() {
                    if let Some(bidder) = bidder {
                        self.notifier.notify(Notification::ConfirmationRejected {
                            confirmation_id: id,
                            bidder,
                            reason: e.to_string(),
                        });
                    }
                }
                return Err(e);
            }
        };

        let item_name = item.item.display_name();
        let remaining_secs = ceil_secs(confirmed.applied.remaining);
        let receipt = BidReceipt {
            confirmation_id: id,
            item: item_name.clone(),
            amount: confirmed.confirmation.proposed_amount,
            previous_bid: confirmed.applied.previous_bid,
            reserved: confirmed.reserved,
            is_self_overbid: confirmed.is_self_overbid,
            outbid: confirmed.outbid().cloned(),
            extended: confirmed.applied.extended,
            remaining_secs,
            source: item.item.source,
        };
        let extension_count = item.extension_count;

        info!(
            item = %item_name,
            bidder = %confirmed.confirmation.bidder.display_name,
            amount = receipt.amount,
            extended = receipt.extended,
            "Bid applied"
        );
        self.notify(Notification::BidConfirmed {
            confirmation_id: id,
            bidder: confirmed.confirmation.bidder.clone(),
            item: item_name.clone(),
            amount: receipt.amount,
            previous_bid: receipt.previous_bid,
            is_self_overbid: receipt.is_self_overbid,
            remaining_secs,
        });
        if let Some(displaced) = &receipt.outbid {
            self.notify(Notification::Outbid {
                member: displaced.clone(),
                item: item_name.clone(),
                amount: receipt.amount,
            });
        }
        if receipt.extended {
            self.notify(Notification::Extended {
                item: item_name,
                by_secs: self.config.extension_secs,
                extension_count,
                max_extensions: self.config.max_extensions,
                remaining_secs,
                by_operator: false,
            });
            self.schedule_item_timers(now);
        }
        Ok(receipt)
    }

    fn cancel_bid(&mut self, member_id: &str, id: ConfirmationId) -> Result<(), AuctionError> {
        let pending = self.bids.cancel(id, member_id)?;
        self.timers.cancel(TimerKey::Confirmation(id));
        debug!(confirmation = id, bidder = %pending.bidder.display_name, "Bid cancelled");
        self.notify(Notification::ConfirmationCancelled {
            confirmation_id: id,
            bidder: pending.bidder,
        });
        Ok(())
    }

    fn current_item_mut(&mut self) -> Result<&mut AuctionItemStateMachine, AuctionError> {
        self.run
            .as_mut()
            .ok_or(AuctionError::NotRunning)?
            .current
            .as_mut()
            .ok_or(AuctionError::NoActiveItem)
    }

    fn pause(&mut self) -> Result<(), AuctionError> {
        let now = Instant::now();
        let item = self.current_item_mut()?;
        let ItemEvent::Paused { remaining } = item.apply(ItemCommand::Pause, now)? else {
            return Err(AuctionError::ItemNotActive);
        };
        let name = item.item.display_name();

        self.cancel_item_timers();
        info!(item = %name, remaining_secs = remaining.as_secs(), "Item paused");
        self.notify(Notification::Paused {
            item: name,
            remaining_secs: ceil_secs(remaining),
        });
        Ok(())
    }

    fn resume(&mut self) -> Result<(), AuctionError> {
        let now = Instant::now();
        let item = self.current_item_mut()?;
        let ItemEvent::Resumed { paused_for, .. } = item.apply(ItemCommand::Resume, now)? else {
            return Err(AuctionError::NotPaused);
        };
        let name = item.item.display_name();
        let remaining = item.remaining(now).unwrap_or_default();

        self.schedule_item_timers(now);
        info!(item = %name, paused_secs = paused_for.as_secs(), "Item resumed");
        self.notify(Notification::Resumed {
            item: name,
            remaining_secs: ceil_secs(remaining),
        });
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), AuctionError> {
        let item = self.current_item_mut()?;
        if item.phase == ItemPhase::Ended {
            return Err(AuctionError::NoActiveItem);
        }
        info!(item = %item.item.display_name(), "Item stopped by operator");
        self.end_item().await;
        Ok(())
    }

    fn extend(&mut self, minutes: u64) -> Result<(), AuctionError> {
        if minutes == 0 || minutes > MAX_DURATION_MINUTES {
            return Err(AuctionError::InvalidAmount(minutes.to_string()));
        }
        let now = Instant::now();
        let by = Duration::from_secs(minutes * 60);
        let item = self.current_item_mut()?;
        item.apply(ItemCommand::Extend(by), now)?;
        let name = item.item.display_name();
        let extension_count = item.extension_count;
        let remaining = item.remaining(now).unwrap_or_default();

        self.schedule_item_timers(now);
        info!(item = %name, minutes, "Item extended by operator");
        self.notify(Notification::Extended {
            item: name,
            by_secs: by.as_secs(),
            extension_count,
            max_extensions: self.config.max_extensions,
            remaining_secs: ceil_secs(remaining),
            by_operator: true,
        });
        Ok(())
    }

    // =========================
    // QUERIES
    // =========================

    fn handle_query(&self, query: EngineQuery) -> EngineQueryResponse {
        match query {
            EngineQuery::Status => EngineQueryResponse::Status(self.status()),
            EngineQuery::QueueList => EngineQueryResponse::Queue(self.queue.list().to_vec()),
        }
    }

    fn status(&self) -> EngineStatus {
        let now = Instant::now();
        let mut status = EngineStatus {
            pending_confirmations: self.bids.pending_count(),
            locked_members: self.points.locked_members(),
            queue_length: self.queue.len(),
            ..Default::default()
        };
        let Some(run) = &self.run else {
            return status;
        };

        status.running = true;
        status.items_remaining = run.total_items - run.announced;
        status.items_sold = run.records.len();
        if let Some(item) = &run.current {
            status.paused = item.is_paused();
            status.item = Some(ItemStatus::from_item(item, now));
            if let Some(session) = run.session_of(item) {
                status.session = Some(SessionStatus {
                    key: session.key.to_string(),
                    position: session.id.0 as usize + 1,
                    total: run.sessions.len(),
                });
            }
        }
        status
    }

    // =========================
    // TIMERS
    // =========================

    async fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::Advance { run_id } => {
                self.timers.cancel(TimerKey::Advance);
                if self.run.as_ref().map(|r| r.id) == Some(run_id) {
                    self.announce_next().await;
                }
            }
            TimerEvent::Activate { seq } => {
                self.timers.cancel(TimerKey::Activate);
                if let Err(e) = self.activate(seq) {
                    warn!(seq, error = %e, "Activation rejected; ending item");
                    self.end_item().await;
                }
            }
            TimerEvent::Item {
                seq,
                generation,
                timer,
            } => {
                let live = self
                    .run
                    .as_ref()
                    .and_then(|r| r.current.as_ref())
                    .map(|i| i.seq == seq && i.generation == generation)
                    .unwrap_or(false);
                if !live {
                    debug!(seq, generation, ?timer, "Stale item timer ignored");
                    return;
                }
                self.timers.cancel(TimerKey::Item(timer));
                match timer {
                    ItemTimer::End => self.end_item().await,
                    warning => self.announce_warning(warning),
                }
            }
            TimerEvent::ConfirmationExpired(id) => {
                self.timers.cancel(TimerKey::Confirmation(id));
                if let Some(pending) = self.bids.expire(id) {
                    debug!(confirmation = id, bidder = %pending.bidder.display_name, "Bid confirmation timed out");
                    self.notify(Notification::ConfirmationTimedOut {
                        confirmation_id: id,
                        bidder: pending.bidder,
                    });
                }
            }
        }
    }

    fn cancel_item_timers(&mut self) {
        self.timers.cancel_where(|k| matches!(k, TimerKey::Item(_)));
    }

    /// Re-derive every item timer from the current deadline.
    fn schedule_item_timers(&mut self, now: Instant) {
        self.cancel_item_timers();
        let Some(item) = self.run.as_ref().and_then(|r| r.current.as_ref()) else {
            return;
        };
        let (seq, generation) = (item.seq, item.generation);
        for (timer, at) in item.pending_timers(now) {
            self.timers.schedule(
                TimerKey::Item(timer),
                at,
                &self.timer_tx,
                TimerEvent::Item {
                    seq,
                    generation,
                    timer,
                },
            );
        }
    }

    fn announce_warning(&mut self, timer: ItemTimer) {
        let Some(item) = self.run.as_mut().and_then(|r| r.current.as_mut()) else {
            return;
        };
        if !item.mark_warning(timer) {
            return;
        }
        let name = item.item.display_name();
        let current_bid = item.current_bid;
        let winner = item.current_winner.as_ref().map(|m| m.display_name.clone());

        debug!(item = %name, ?timer, "Warning");
        self.notify(match timer {
            ItemTimer::GoingOnce => Notification::GoingOnce {
                item: name,
                current_bid,
                winner,
            },
            ItemTimer::GoingTwice => Notification::GoingTwice {
                item: name,
                current_bid,
                winner,
            },
            _ => Notification::FinalCall {
                item: name,
                current_bid,
                winner,
            },
        });
    }

    // =========================
    // ITEM FLOW
    // =========================

    /// Announce the item at the cursor and schedule its activation.
    async fn announce_next(&mut self) {
        let preview = self.config.preview();
        let policy = self.policy();
        let Some(run) = self.run.as_mut() else {
            return;
        };
        let Some(session) = run.sessions.get(run.session_idx) else {
            self.finish_run().await;
            return;
        };
        let Some(item) = session.items.get(run.item_idx).cloned() else {
            self.finish_run().await;
            return;
        };

        self.next_item_seq += 1;
        let seq = self.next_item_seq;
        let session_id = session.id;
        let session_key = session.key.to_string();
        run.announced += 1;
        let position = run.announced;
        let total = run.total_items;

        info!(seq, item = %item.display_name(), session = %session_key, "Item announced");
        self.notifier.notify(Notification::ItemPreview {
            item: item.display_name(),
            start_price: item.start_price,
            duration_minutes: item.duration_minutes,
            position,
            total,
            session: session_key,
            source: item.source,
            opens_in_secs: preview.as_secs(),
        });
        run.current = Some(AuctionItemStateMachine::new(seq, session_id, item, policy));

        self.timers.schedule(
            TimerKey::Activate,
            Instant::now() + preview,
            &self.timer_tx,
            TimerEvent::Activate { seq },
        );
    }

    fn activate(&mut self, seq: u64) -> Result<(), AuctionError> {
        let now = Instant::now();
        let started_at = self.wall_now();
        let Some(item) = self.run.as_mut().and_then(|r| r.current.as_mut()) else {
            return Ok(());
        };
        if item.seq != seq || item.phase != ItemPhase::Preview {
            return Ok(());
        }
        item.apply(ItemCommand::Activate { started_at }, now)?;

        info!(seq, item = %item.item.display_name(), "Bidding open");
        let notification = Notification::ItemActivated {
            item: item.item.display_name(),
            current_bid: item.current_bid,
            duration_minutes: item.item.duration_minutes,
        };
        self.schedule_item_timers(now);
        self.notify(notification);
        Ok(())
    }

    /// End the current item, record its outcome and move the cursor on.
    async fn end_item(&mut self) {
        let now = Instant::now();
        let ended_at = self.wall_now();
        self.timers.cancel(TimerKey::Activate);
        self.cancel_item_timers();

        let Some(run) = self.run.as_mut() else {
            return;
        };
        let Some(item) = run.current.as_mut() else {
            return;
        };
        let outcome = match item.apply(ItemCommand::End { ended_at }, now) {
            Ok(ItemEvent::Ended(outcome)) => outcome,
            Ok(_) => return,
            Err(e) => {
                warn!(error = %e, "Item could not be ended");
                return;
            }
        };

        let seq = item.seq;
        let start_time = format_timestamp(&item.started_at.unwrap_or(ended_at));
        let end_time = format_timestamp(&ended_at);

        match outcome {
            ItemOutcome::Sold { record, log } => {
                info!(
                    item = %record.item,
                    winner = %record.winner.display_name,
                    amount = record.amount,
                    "Item sold"
                );
                if record.source == ItemSource::ManualQueue {
                    run.manual_outcomes.push(ManualOutcome {
                        item: record.item.clone(),
                        start_price: item.item.start_price,
                        duration: item.item.duration_minutes,
                        winner: record.winner.display_name.clone(),
                        winning_bid: Some(record.amount),
                        auction_start_time: start_time,
                        auction_end_time: end_time,
                    });
                }
                run.records.push(record.clone());

                let service = Arc::clone(&self.service);
                let notifier = Arc::clone(&self.notifier);
                tokio::spawn(async move {
                    let item_name = log.item_name.clone();
                    if let Err(e) = service.log_result(log).await {
                        warn!(item = %item_name, error = %e, "Result log write failed");
                        notifier.notify(Notification::LedgerWriteFailed {
                            operation: format!("logResult({})", item_name),
                            detail: e.to_string(),
                        });
                    }
                });

                self.notifier.notify(Notification::Sold {
                    item: record.item,
                    winner: record.winner,
                    amount: record.amount,
                    source: record.source,
                });
            }
            ItemOutcome::NoBids { item: unsold } => {
                info!(item = %unsold.display_name(), source = unsold.source.label(), "No bids");
                if unsold.source == ItemSource::ManualQueue {
                    run.manual_outcomes.push(ManualOutcome {
                        item: unsold.display_name(),
                        start_price: unsold.start_price,
                        duration: unsold.duration_minutes,
                        winner: String::new(),
                        winning_bid: None,
                        auction_start_time: start_time,
                        auction_end_time: end_time,
                    });
                }
                self.notifier.notify(Notification::NoBids {
                    item: unsold.display_name(),
                    source: unsold.source,
                    requeued: true,
                });
            }
        }

        for dropped in self.bids.clear_item(seq) {
            self.timers.cancel(TimerKey::Confirmation(dropped.id));
            self.notifier.notify(Notification::ConfirmationRejected {
                confirmation_id: dropped.id,
                bidder: dropped.bidder,
                reason: AuctionError::ItemNotActive.to_string(),
            });
        }

        self.advance_cursor().await;
    }

    /// Move past the ended item, waiting before the next one.
    async fn advance_cursor(&mut self) {
        let item_wait = self.config.item_wait();
        let session_wait = self.config.session_wait();
        let Some(run) = self.run.as_mut() else {
            return;
        };

        run.item_idx += 1;
        let mut wait = item_wait;
        if run
            .sessions
            .get(run.session_idx)
            .map(|s| run.item_idx >= s.items.len())
            .unwrap_or(true)
        {
            if let Some(finished) = run.sessions.get(run.session_idx) {
                self.gate.release_session(finished.id);
                info!(session = %finished.key, "Session finished");
            }
            run.session_idx += 1;
            run.item_idx = 0;
            wait = session_wait;
        }

        let Some(next) = run
            .sessions
            .get(run.session_idx)
            .and_then(|s| s.items.get(run.item_idx))
        else {
            self.finish_run().await;
            return;
        };

        let run_id = run.id;
        self.notifier.notify(Notification::NextItem {
            item: next.display_name(),
            start_price: next.start_price,
            starts_in_secs: wait.as_secs(),
        });
        self.timers.schedule(
            TimerKey::Advance,
            Instant::now() + wait,
            &self.timer_tx,
            TimerEvent::Advance { run_id },
        );
    }

    /// Settle the run and drop every piece of run state.
    async fn finish_run(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };
        self.timers.cancel_all();

        let revenue: u64 = run.records.iter().map(|r| r.amount).sum();
        info!(run = run.id, sold = run.records.len(), revenue, "Run finished; settling");

        let outcome = ResultAggregator::finalize(
            self.service.as_ref(),
            self.points.members(),
            &run.records,
            run.manual_outcomes,
            run.session_timestamp,
        )
        .await;

        let settled = outcome.submitted.is_ok();
        if let Err(e) = outcome.submitted {
            self.notify(Notification::LedgerWriteFailed {
                operation: "submitSettlement".into(),
                detail: format!("{}; {}", e, spend_summary(&outcome.payload)),
            });
        }

        self.notify(Notification::RunSummary {
            sold: run
                .records
                .iter()
                .map(|r| SoldLine {
                    item: r.item.clone(),
                    winner: r.winner.display_name.clone(),
                    amount: r.amount,
                    source: r.source,
                })
                .collect(),
            catalog_items: run.catalog_items,
            manual_items: run.manual_items,
            revenue,
            settled,
        });

        self.points.clear();
        self.gate.clear();
        self.bids.reset();
    }
}

/// Cloneable handle to a running [`SessionScheduler`].
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Request>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::Call(call, _) => f.debug_tuple("Call").field(call).finish(),
            Request::Query(query, _) => f.debug_tuple("Query").field(query).finish(),
        }
    }
}

impl SchedulerHandle {
    /// Send a call and wait for its outcome.
    pub async fn call(&self, call: EngineCall) -> Result<CallResponse, AuctionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Call(call, reply))
            .await
            .map_err(|_| AuctionError::EngineUnavailable)?;
        rx.await.map_err(|_| AuctionError::EngineUnavailable)?
    }

    /// Send a query and wait for its answer.
    pub async fn query(&self, query: EngineQuery) -> Result<EngineQueryResponse, AuctionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Query(query, reply))
            .await
            .map_err(|_| AuctionError::EngineUnavailable)?;
        rx.await.map_err(|_| AuctionError::EngineUnavailable)
    }

    pub async fn start_run(&self) -> Result<RunOverview, AuctionError> {
        match self.call(EngineCall::StartRun).await? {
            CallResponse::RunStarted(overview) => Ok(overview),
            _ => Err(AuctionError::EngineUnavailable),
        }
    }

    pub async fn submit_bid(
        &self,
        member: Member,
        amount: impl Into<String>,
    ) -> Result<BidPrompt, AuctionError> {
        let call = EngineCall::SubmitBid {
            member,
            amount: amount.into(),
        };
        match self.call(call).await? {
            CallResponse::BidPrompt(prompt) => Ok(prompt),
            _ => Err(AuctionError::EngineUnavailable),
        }
    }

    pub async fn confirm_bid(
        &self,
        member_id: impl Into<String>,
        confirmation_id: ConfirmationId,
    ) -> Result<BidReceipt, AuctionError> {
        let call = EngineCall::ConfirmBid {
            member_id: member_id.into(),
            confirmation_id,
        };
        match self.call(call).await? {
            CallResponse::BidConfirmed(receipt) => Ok(receipt),
            _ => Err(AuctionError::EngineUnavailable),
        }
    }

    pub async fn cancel_bid(
        &self,
        member_id: impl Into<String>,
        confirmation_id: ConfirmationId,
    ) -> Result<(), AuctionError> {
        let call = EngineCall::CancelBid {
            member_id: member_id.into(),
            confirmation_id,
        };
        self.call(call).await.map(|_| ())
    }

    pub async fn pause(&self) -> Result<(), AuctionError> {
        self.call(EngineCall::Pause).await.map(|_| ())
    }

    pub async fn resume(&self) -> Result<(), AuctionError> {
        self.call(EngineCall::Resume).await.map(|_| ())
    }

    pub async fn stop(&self) -> Result<(), AuctionError> {
        self.call(EngineCall::Stop).await.map(|_| ())
    }

    pub async fn extend(&self, minutes: u64) -> Result<(), AuctionError> {
        self.call(EngineCall::Extend { minutes }).await.map(|_| ())
    }

    pub async fn queue_add(
        &self,
        name: impl Into<String>,
        start_price: u64,
        duration_minutes: u64,
        quantity: u32,
    ) -> Result<QueueEntry, AuctionError> {
        let call = EngineCall::QueueAdd {
            name: name.into(),
            start_price,
            duration_minutes,
            quantity,
        };
        match self.call(call).await? {
            CallResponse::Queued(entry) => Ok(entry),
            _ => Err(AuctionError::EngineUnavailable),
        }
    }

    pub async fn queue_remove(&self, name: impl Into<String>) -> Result<QueueEntry, AuctionError> {
        match self.call(EngineCall::QueueRemove { name: name.into() }).await? {
            CallResponse::Dequeued(entry) => Ok(entry),
            _ => Err(AuctionError::EngineUnavailable),
        }
    }

    pub async fn queue_clear(&self) -> Result<usize, AuctionError> {
        match self.call(EngineCall::QueueClear).await? {
            CallResponse::QueueCleared { removed } => Ok(removed),
            _ => Err(AuctionError::EngineUnavailable),
        }
    }

    pub async fn queue_list(&self) -> Result<Vec<QueueEntry>, AuctionError> {
        match self.query(EngineQuery::QueueList).await? {
            EngineQueryResponse::Queue(entries) => Ok(entries),
            _ => Err(AuctionError::EngineUnavailable),
        }
    }

    pub async fn status(&self) -> Result<EngineStatus, AuctionError> {
        match self.query(EngineQuery::Status).await? {
            EngineQueryResponse::Status(status) => Ok(status),
            _ => Err(AuctionError::EngineUnavailable),
        }
    }
}
