//! End-to-end integration tests for the points auction engine.
//!
//! These tests drive a full scheduler through its handle:
//! 1. Run start (points, catalog, attendance)
//! 2. Preview and activation
//! 3. Bid proposal and confirmation
//! 4. Warnings, extensions, pause and stop
//! 5. Settlement against the ledger
//!
//! Timed scenarios run on a paused clock against an in-memory ledger. One test
//! goes through the mock ledger over JSON-RPC.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use auction_module::{
        AuctionError, ChannelNotifier, EngineConfig, LedgerError, LedgerService, Notification,
        SchedulerHandle, SessionScheduler, MAX_DURATION_MINUTES,
    };
    use auction_rpc::{LedgerStateView, RpcLedgerClient};
    use auction_types::{
        AttendanceRoster, CatalogRow, ItemSource, Member, PointsSnapshot, ResultLogEntry,
        SettlementPayload,
    };
    use mock_ledger::MockLedger;
    use parking_lot::Mutex;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::sleep;

    const VENATUS: &str = "Venatus 10/14/26 21:30";
    const VENATUS_WEEK: &str = "WEEK_20261011";

    // ========================================
    // In-memory ledger
    // ========================================

    #[derive(Default)]
    struct FakeState {
        points: PointsSnapshot,
        catalog: Vec<CatalogRow>,
        /// (week key, event key) -> attendees
        attendance: HashMap<(String, String), Vec<String>>,
        results: Vec<ResultLogEntry>,
        settlements: Vec<SettlementPayload>,
        fail_points: bool,
        fail_log: bool,
        fail_settlement: bool,
    }

    #[derive(Clone, Default)]
    struct FakeLedger {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeLedger {
        fn with_points(points: &[(&str, i64)]) -> Self {
            let ledger = Self::default();
            ledger.state.lock().points = points
                .iter()
                .map(|(name, total)| (name.to_string(), *total))
                .collect();
            ledger
        }

        fn add_row(&self, item: &str, start_price: u64, minutes: u64, boss_key: Option<&str>) {
            self.state.lock().catalog.push(CatalogRow {
                item: item.into(),
                start_price,
                duration: Some(minutes),
                quantity: 1,
                winner: None,
                boss_key: boss_key.map(String::from),
            });
        }

        fn set_attendance(&self, week: &str, event: &str, attendees: &[&str]) {
            self.state.lock().attendance.insert(
                (week.to_string(), event.to_string()),
                attendees.iter().map(|a| a.to_string()).collect(),
            );
        }

        fn results(&self) -> Vec<ResultLogEntry> {
            self.state.lock().results.clone()
        }

        fn settlements(&self) -> Vec<SettlementPayload> {
            self.state.lock().settlements.clone()
        }
    }

    #[async_trait]
    impl LedgerService for FakeLedger {
        async fn get_points(&self) -> Result<PointsSnapshot, LedgerError> {
            let state = self.state.lock();
            if state.fail_points {
                return Err(LedgerError::Transport("connection refused".into()));
            }
            Ok(state.points.clone())
        }

        async fn get_catalog_items(&self) -> Result<Vec<CatalogRow>, LedgerError> {
            Ok(self.state.lock().catalog.clone())
        }

        async fn get_attendance(
            &self,
            week_key: &str,
            event_key: &str,
        ) -> Result<AttendanceRoster, LedgerError> {
            self.state
                .lock()
                .attendance
                .get(&(week_key.to_string(), event_key.to_string()))
                .map(|attendees| AttendanceRoster {
                    attendees: attendees.clone(),
                })
                .ok_or_else(|| LedgerError::Status(format!("no column {}", event_key)))
        }

        async fn log_result(&self, entry: ResultLogEntry) -> Result<(), LedgerError> {
            let mut state = self.state.lock();
            if state.fail_log {
                return Err(LedgerError::Timeout);
            }
            state.results.push(entry);
            Ok(())
        }

        async fn submit_settlement(&self, payload: SettlementPayload) -> Result<(), LedgerError> {
            let mut state = self.state.lock();
            if state.fail_settlement {
                return Err(LedgerError::Status("quota exceeded".into()));
            }
            state.settlements.push(payload);
            Ok(())
        }

        async fn column_exists(&self, boss: &str, timestamp: &str) -> Result<bool, LedgerError> {
            let wanted = format!("{} {}", boss, timestamp);
            Ok(self
                .state
                .lock()
                .attendance
                .keys()
                .any(|(_, event)| *event == wanted))
        }
    }

    // ========================================
    // Helpers
    // ========================================

    fn engine(ledger: &FakeLedger) -> (SchedulerHandle, UnboundedReceiver<Notification>) {
        let (notifier, rx) = ChannelNotifier::new();
        let handle = SessionScheduler::spawn(
            EngineConfig::default(),
            Arc::new(ledger.clone()),
            Arc::new(notifier),
        );
        (handle, rx)
    }

    fn alice() -> Member {
        Member::new("u-alice", "Alice")
    }

    fn bob() -> Member {
        Member::new("u-bob", "Bob")
    }

    fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    fn kinds(notifications: &[Notification]) -> Vec<&'static str> {
        notifications.iter().map(Notification::kind).collect()
    }

    /// Let time pass, then round-trip a query so pending timer events are handled.
    async fn pass(handle: &SchedulerHandle, secs: u64) {
        sleep(Duration::from_secs(secs)).await;
        handle.status().await.unwrap();
    }

    async fn bid(handle: &SchedulerHandle, member: Member, amount: &str) -> Result<u64, AuctionError> {
        let id = member.id.clone();
        let prompt = handle.submit_bid(member, amount).await?;
        handle.confirm_bid(id, prompt.confirmation_id).await?;
        Ok(prompt.amount)
    }

    // ========================================
    // Scenarios
    // ========================================

    /// Test a complete run with competing bidders and settlement.
    #[tokio::test(start_paused = true)]
    async fn test_full_run_settles_winner() {
        let ledger = FakeLedger::with_points(&[("Alice", 500), ("Bob", 300)]);
        ledger.add_row("Sword", 100, 2, None);
        let (engine, mut rx) = engine(&ledger);

        let overview = engine.start_run().await.unwrap();
        assert_eq!(overview.total_items, 1);
        assert_eq!(overview.catalog_items, 1);
        assert!(!overview.sessions[0].gated);
        assert_eq!(kinds(&drain(&mut rx)), vec!["run_started", "item_preview"]);

        // Not open during the preview
        let err = engine.submit_bid(alice(), "120").await.unwrap_err();
        assert_eq!(err, AuctionError::ItemNotActive);

        pass(&engine, 21).await;
        assert_eq!(kinds(&drain(&mut rx)), vec!["item_activated"]);

        let err = engine.submit_bid(bob(), "100").await.unwrap_err();
        assert!(matches!(err, AuctionError::BidTooLow { minimum: 101, .. }));

        bid(&engine, alice(), "120").await.unwrap();
        sleep(Duration::from_secs(4)).await;
        bid(&engine, bob(), "150").await.unwrap();

        let events = drain(&mut rx);
        assert!(events.iter().any(|n| matches!(
            n,
            Notification::Outbid { member, amount: 150, .. } if member.id == "u-alice"
        )));

        sleep(Duration::from_secs(4)).await;
        let prompt = engine.submit_bid(alice(), "170").await.unwrap();
        assert!(!prompt.is_self_overbid);
        assert_eq!(prompt.needed, 170);
        let receipt = engine.confirm_bid("u-alice", prompt.confirmation_id).await.unwrap();
        assert_eq!(receipt.previous_bid, 150);
        assert_eq!(receipt.outbid.map(|m| m.id), Some("u-bob".to_string()));
        assert!(!receipt.extended);

        let status = engine.status().await.unwrap();
        assert_eq!(status.locked_members, 1);
        let item = status.item.unwrap();
        assert_eq!(item.current_bid, 170);
        assert_eq!(item.winner.as_deref(), Some("Alice"));
        assert_eq!(item.bid_count, 3);

        pass(&engine, 130).await;
        let events = drain(&mut rx);
        let names = kinds(&events);
        assert!(names.contains(&"going_once"));
        assert!(names.contains(&"going_twice"));
        assert!(names.contains(&"final_call"));
        assert!(events.iter().any(|n| matches!(
            n,
            Notification::Sold { winner, amount: 170, .. } if winner.id == "u-alice"
        )));
        assert!(events.iter().any(|n| matches!(
            n,
            Notification::RunSummary { revenue: 170, settled: true, .. }
        )));

        let results = ledger.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].winner, "Alice");
        assert_eq!(results[0].total_bids, 3);
        assert_eq!(results[0].item_index, Some(0));

        let settlements = ledger.settlements();
        assert_eq!(settlements.len(), 1);
        let spend: HashMap<_, _> = settlements[0]
            .results
            .iter()
            .map(|r| (r.member.clone(), r.total_spent))
            .collect();
        assert_eq!(spend["Alice"], 170);
        assert_eq!(spend["Bob"], 0);

        let status = engine.status().await.unwrap();
        assert!(!status.running);
        assert_eq!(status.locked_members, 0);
    }

    /// Test that a failed start leaves nothing behind.
    #[tokio::test(start_paused = true)]
    async fn test_start_run_failures() {
        let ledger = FakeLedger::with_points(&[("Alice", 100)]);
        let (engine, _rx) = engine(&ledger);

        assert_eq!(
            engine.start_run().await.unwrap_err(),
            AuctionError::NoItemsToAuction
        );

        ledger.state.lock().fail_points = true;
        engine.queue_add("Ring", 5, 2, 1).await.unwrap();
        assert!(matches!(
            engine.start_run().await.unwrap_err(),
            AuctionError::LedgerUnavailable(_)
        ));
        ledger.state.lock().fail_points = false;

        // Gated row without a roster
        ledger.add_row("Sword", 10, 2, Some(VENATUS));
        assert!(matches!(
            engine.start_run().await.unwrap_err(),
            AuctionError::AttendanceLoadFailed { .. }
        ));
        let status = engine.status().await.unwrap();
        assert!(!status.running);
        assert_eq!(status.queue_length, 1);

        ledger.set_attendance(VENATUS_WEEK, VENATUS, &["Alice"]);
        let overview = engine.start_run().await.unwrap();
        assert_eq!(overview.sessions.len(), 2);
        assert_eq!(overview.sessions[0].key, "open");
        assert_eq!(overview.sessions[1].attendees, 1);
        assert_eq!(overview.manual_items, 1);
        assert!(engine.queue_list().await.unwrap().is_empty());

        assert_eq!(
            engine.start_run().await.unwrap_err(),
            AuctionError::AlreadyRunning
        );
    }

    /// Test attendance gating on an event session.
    #[tokio::test(start_paused = true)]
    async fn test_gated_session_eligibility() {
        let ledger = FakeLedger::with_points(&[("Alice", 100), ("Bob", 100)]);
        ledger.add_row("Venatus Blade", 10, 2, Some(VENATUS));
        ledger.set_attendance(VENATUS_WEEK, VENATUS, &["alice"]);
        let (engine, _rx) = engine(&ledger);

        let overview = engine.start_run().await.unwrap();
        assert!(overview.sessions[0].gated);
        pass(&engine, 21).await;

        let err = engine.submit_bid(bob(), "20").await.unwrap_err();
        assert!(matches!(err, AuctionError::NotEligible { .. }));
        bid(&engine, alice(), "20").await.unwrap();

        let status = engine.status().await.unwrap();
        assert_eq!(status.session.unwrap().key, VENATUS);
    }

    /// Test soft-close extension of a late bid.
    #[tokio::test(start_paused = true)]
    async fn test_late_bid_extends() {
        let ledger = FakeLedger::with_points(&[("Alice", 100)]);
        ledger.add_row("Sword", 10, 1, None);
        let (engine, mut rx) = engine(&ledger);

        engine.start_run().await.unwrap();
        pass(&engine, 21).await;
        drain(&mut rx);

        // 59s left, inside the 60s window
        let prompt = engine.submit_bid(alice(), "20").await.unwrap();
        let receipt = engine.confirm_bid("u-alice", prompt.confirmation_id).await.unwrap();
        assert!(receipt.extended);
        assert_eq!(receipt.remaining_secs, 119);
        assert!(drain(&mut rx).iter().any(|n| matches!(
            n,
            Notification::Extended { extension_count: 1, by_operator: false, .. }
        )));

        // The pre-extension deadline passes without ending the item
        pass(&engine, 60).await;
        let status = engine.status().await.unwrap();
        assert_eq!(status.item.unwrap().extension_count, 1);
        assert!(!kinds(&drain(&mut rx)).contains(&"sold"));

        pass(&engine, 60).await;
        assert!(kinds(&drain(&mut rx)).contains(&"sold"));
    }

    /// Test that pausing freezes the countdown and bidding.
    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume() {
        let ledger = FakeLedger::with_points(&[("Alice", 100)]);
        ledger.add_row("Sword", 10, 2, None);
        let (engine, mut rx) = engine(&ledger);

        engine.start_run().await.unwrap();
        pass(&engine, 30).await;
        drain(&mut rx);

        engine.pause().await.unwrap();
        assert_eq!(engine.pause().await.unwrap_err(), AuctionError::AlreadyPaused);
        assert!(drain(&mut rx)
            .iter()
            .any(|n| matches!(n, Notification::Paused { remaining_secs: 110, .. })));

        pass(&engine, 600).await;
        let status = engine.status().await.unwrap();
        assert!(status.paused);
        assert_eq!(status.item.unwrap().remaining_secs, Some(110));
        assert!(drain(&mut rx).is_empty());

        let err = engine.submit_bid(alice(), "20").await.unwrap_err();
        assert_eq!(err, AuctionError::ItemPaused);

        engine.resume().await.unwrap();
        assert_eq!(engine.resume().await.unwrap_err(), AuctionError::NotPaused);
        pass(&engine, 111).await;
        let events = drain(&mut rx);
        assert!(kinds(&events).contains(&"resumed"));
        assert!(events
            .iter()
            .any(|n| matches!(n, Notification::NoBids { source: ItemSource::ExternalCatalog, .. })));
    }

    /// Test operator stop and extend.
    #[tokio::test(start_paused = true)]
    async fn test_operator_stop_and_extend() {
        let ledger = FakeLedger::with_points(&[("Alice", 100)]);
        ledger.add_row("Sword", 10, 2, None);
        ledger.add_row("Shield", 10, 2, None);
        let (engine, mut rx) = engine(&ledger);

        engine.start_run().await.unwrap();
        assert_eq!(engine.extend(1).await.unwrap_err(), AuctionError::ItemNotActive);

        // Stopping during preview ends the item unsold
        engine.stop().await.unwrap();
        let events = drain(&mut rx);
        assert!(kinds(&events).contains(&"no_bids"));
        assert!(kinds(&events).contains(&"next_item"));

        pass(&engine, 41).await;
        assert_eq!(engine.extend(0).await.unwrap_err(), AuctionError::InvalidAmount("0".into()));
        engine.extend(2).await.unwrap();
        let status = engine.status().await.unwrap();
        let item = status.item.unwrap();
        assert_eq!(item.name, "Shield");
        assert_eq!(item.remaining_secs, Some(239));
        assert_eq!(item.extension_count, 0);

        bid(&engine, alice(), "40").await.unwrap();
        engine.stop().await.unwrap();
        let events = drain(&mut rx);
        assert!(events.iter().any(|n| matches!(
            n,
            Notification::Sold { amount: 40, .. }
        )));
        assert!(events.iter().any(|n| matches!(
            n,
            Notification::RunSummary { revenue: 40, .. }
        )));
        assert_eq!(engine.stop().await.unwrap_err(), AuctionError::NotRunning);
    }

    /// Test that oversized durations are rejected or capped without stalling the run.
    #[tokio::test(start_paused = true)]
    async fn test_oversized_durations() {
        let ledger = FakeLedger::with_points(&[("Alice", 100)]);
        ledger.add_row("Sword", 10, u64::MAX, None);
        let (engine, mut rx) = engine(&ledger);

        let err = engine.queue_add("Ring", 5, u64::MAX, 1).await.unwrap_err();
        assert!(matches!(err, AuctionError::InvalidQueueItem(_)));
        assert!(engine.queue_list().await.unwrap().is_empty());

        engine.start_run().await.unwrap();
        pass(&engine, 21).await;
        let cap = MAX_DURATION_MINUTES * 60;
        let remaining = engine.status().await.unwrap().item.unwrap().remaining_secs;
        assert_eq!(remaining, Some(cap - 1));

        for minutes in [u64::MAX / 60, u64::MAX, MAX_DURATION_MINUTES + 1] {
            assert_eq!(
                engine.extend(minutes).await.unwrap_err(),
                AuctionError::InvalidAmount(minutes.to_string())
            );
        }
        let status = engine.status().await.unwrap();
        assert!(status.running);
        assert_eq!(status.item.unwrap().remaining_secs, Some(cap - 1));

        bid(&engine, alice(), "20").await.unwrap();
        engine.stop().await.unwrap();
        let events = drain(&mut rx);
        assert!(events.iter().any(|n| matches!(
            n,
            Notification::RunSummary { revenue: 20, settled: true, .. }
        )));
    }

    /// Test that a rejected settlement reports what was left unsubmitted.
    #[tokio::test(start_paused = true)]
    async fn test_failed_settlement_reports_spend() {
        let ledger = FakeLedger::with_points(&[("Alice", 100), ("Bob", 100)]);
        ledger.state.lock().fail_settlement = true;
        ledger.add_row("Sword", 10, 2, None);
        let (engine, mut rx) = engine(&ledger);

        engine.start_run().await.unwrap();
        pass(&engine, 21).await;
        bid(&engine, alice(), "40").await.unwrap();
        engine.stop().await.unwrap();

        let events = drain(&mut rx);
        let detail = events
            .iter()
            .find_map(|n| match n {
                Notification::LedgerWriteFailed { operation, detail }
                    if operation == "submitSettlement" =>
                {
                    Some(detail.clone())
                }
                _ => None,
            })
            .expect("settlement failure notified");
        assert!(detail.contains("quota exceeded"));
        assert!(detail.contains("spent: Alice=40"));
        assert!(!detail.contains("Bob="));
        assert!(events.iter().any(|n| matches!(
            n,
            Notification::RunSummary { revenue: 40, settled: false, .. }
        )));
        assert!(ledger.settlements().is_empty());
    }

    /// Test confirmation expiry and cancellation.
    #[tokio::test(start_paused = true)]
    async fn test_confirmation_lifecycle() {
        let ledger = FakeLedger::with_points(&[("Alice", 100), ("Bob", 100)]);
        ledger.add_row("Sword", 10, 2, None);
        let (engine, mut rx) = engine(&ledger);

        engine.start_run().await.unwrap();
        pass(&engine, 21).await;
        drain(&mut rx);

        let prompt = engine.submit_bid(alice(), "20").await.unwrap();
        assert_eq!(prompt.expires_in_secs, 10);
        assert_eq!(
            engine.confirm_bid("u-bob", prompt.confirmation_id).await.unwrap_err(),
            AuctionError::NotYourConfirmation(prompt.confirmation_id)
        );

        pass(&engine, 11).await;
        assert!(drain(&mut rx)
            .iter()
            .any(|n| matches!(n, Notification::ConfirmationTimedOut { .. })));
        assert_eq!(
            engine.confirm_bid("u-alice", prompt.confirmation_id).await.unwrap_err(),
            AuctionError::ConfirmationNotFound(prompt.confirmation_id)
        );

        let prompt = engine.submit_bid(bob(), "30").await.unwrap();
        engine.cancel_bid("u-bob", prompt.confirmation_id).await.unwrap();
        assert_eq!(engine.status().await.unwrap().pending_confirmations, 0);

        // A pending bid beaten before confirmation goes stale
        sleep(Duration::from_secs(4)).await;
        let stale = engine.submit_bid(bob(), "30").await.unwrap();
        bid(&engine, alice(), "40").await.unwrap();
        let err = engine.confirm_bid("u-bob", stale.confirmation_id).await.unwrap_err();
        assert!(matches!(err, AuctionError::StaleConfirmation { proposed: 30, current: 40 }));
        assert!(drain(&mut rx)
            .iter()
            .any(|n| matches!(n, Notification::ConfirmationRejected { .. })));
    }

    /// Test that winnings stay locked across items.
    #[tokio::test(start_paused = true)]
    async fn test_reservations_span_items() {
        let ledger = FakeLedger::with_points(&[("Alice", 200)]);
        ledger.add_row("Sword", 100, 2, None);
        ledger.add_row("Shield", 10, 2, None);
        let (engine, _rx) = engine(&ledger);

        engine.start_run().await.unwrap();
        pass(&engine, 21).await;
        bid(&engine, alice(), "150").await.unwrap();

        // Sword ends at 140s, Shield opens at 180s
        pass(&engine, 160).await;
        let status = engine.status().await.unwrap();
        assert_eq!(status.items_sold, 1);
        assert_eq!(status.item.unwrap().name, "Shield");

        let err = engine.submit_bid(alice(), "60").await.unwrap_err();
        assert!(matches!(err, AuctionError::InsufficientPoints { .. }));
        sleep(Duration::from_secs(4)).await;
        let prompt = engine.submit_bid(alice(), "50").await.unwrap();
        assert_eq!(prompt.available_after, 0);
    }

    /// Test manual items and a failing result log.
    #[tokio::test(start_paused = true)]
    async fn test_manual_items_and_log_failure() {
        let ledger = FakeLedger::with_points(&[("Alice", 100)]);
        ledger.state.lock().fail_log = true;
        let (engine, mut rx) = engine(&ledger);

        engine.queue_add("Ring", 5, 1, 1).await.unwrap();
        engine.queue_add("Gem", 5, 1, 1).await.unwrap();
        engine.start_run().await.unwrap();

        // Ring: unsold
        pass(&engine, 81).await;
        // Gem: previewed at 101s, open at 121s
        pass(&engine, 50).await;
        bid(&engine, alice(), "10").await.unwrap();
        pass(&engine, 200).await;

        let events = drain(&mut rx);
        assert!(events.iter().any(|n| matches!(
            n,
            Notification::NoBids { source: ItemSource::ManualQueue, requeued: true, .. }
        )));
        assert!(events.iter().any(|n| matches!(
            n,
            Notification::LedgerWriteFailed { operation, .. } if operation == "logResult(Gem)"
        )));
        assert!(events.iter().any(|n| matches!(
            n,
            Notification::RunSummary { manual_items: 2, settled: true, .. }
        )));

        let settlements = ledger.settlements();
        let outcomes = &settlements[0].manual_outcomes;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].item, "Ring");
        assert!(outcomes[0].winner.is_empty());
        assert_eq!(outcomes[1].winner, "Alice");
        assert_eq!(outcomes[1].winning_bid, Some(10));
    }

    /// Test a run against the mock ledger over JSON-RPC.
    #[tokio::test]
    async fn test_run_against_mock_ledger() {
        let mut seed = LedgerStateView::default();
        seed.points.insert("Alice".into(), 250);
        seed.catalog.push(CatalogRow {
            item: "Sword".into(),
            start_price: 10,
            duration: Some(2),
            quantity: 1,
            winner: None,
            boss_key: None,
        });
        let mock = MockLedger::new(seed);
        let (addr, server) = mock_ledger::serve(mock.clone(), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let client =
            RpcLedgerClient::new(&format!("http://{}", addr), Duration::from_secs(5)).unwrap();
        assert_eq!(client.get_points().await.unwrap()["Alice"], 250);
        assert!(client.get_attendance(VENATUS_WEEK, VENATUS).await.is_err());

        let (notifier, _rx) = ChannelNotifier::new();
        let engine = SessionScheduler::spawn(
            EngineConfig::default(),
            Arc::new(client),
            Arc::new(notifier),
        );
        let overview = engine.start_run().await.unwrap();
        assert_eq!(overview.total_items, 1);
        engine.stop().await.unwrap();

        let state = mock.snapshot();
        assert_eq!(state.settlements.len(), 1);
        assert_eq!(state.points["Alice"], 250);
        assert!(state.catalog[0].winner.is_none());

        server.stop().unwrap();
    }
}
