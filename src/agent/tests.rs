//! End-to-end cycle tests against mock collaborators and in-memory SQLite

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::client::mock::{live_event, market, MockLiveEventSource, MockMarketSource};
    use crate::client::{MockOrderExecutor, PaperExecutor};
    use crate::coordination::ContendedStore;
    use crate::error::BotError;
    use crate::gate::DecisionLog;
    use crate::poller::PollTier;
    use crate::types::{Conclusion, OpportunitySource, OutcomeSide};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 15, 0, 0).unwrap()
    }

    fn base_config() -> Config {
        Config::from_toml_str(
            r#"
            [agent]
            id = "test-agent"
            cycle_jitter_ms = 0

            [live_feed]
            base_url = "http://localhost:9000"
            "#,
        )
        .unwrap()
    }

    struct Harness {
        agent: StrategyAgent,
        db: Arc<Database>,
        feed: Arc<MockLiveEventSource>,
        paper: Arc<PaperExecutor>,
    }

    async fn harness(config: Config, markets: MockMarketSource, feed: MockLiveEventSource) -> Harness {
        harness_with_executor(config, markets, feed, None).await
    }

    async fn harness_with_executor(
        config: Config,
        markets: MockMarketSource,
        feed: MockLiveEventSource,
        executor: Option<Arc<dyn OrderExecutor>>,
    ) -> Harness {
        build_harness(config, markets, feed, executor, None).await
    }

    /// `ledger_wins` limits how many ledger writes succeed before every
    /// further compare-and-set loses
    async fn build_harness(
        config: Config,
        markets: MockMarketSource,
        feed: MockLiveEventSource,
        executor: Option<Arc<dyn OrderExecutor>>,
        ledger_wins: Option<u32>,
    ) -> Harness {
        let db = Arc::new(Database::connect_in_memory().await.unwrap());
        let feed = Arc::new(feed);
        let paper = Arc::new(PaperExecutor::new(dec!(1000)));
        let executor = executor.unwrap_or_else(|| paper.clone() as Arc<dyn OrderExecutor>);
        let store: Arc<dyn CoordinationStore> = match ledger_wins {
            Some(wins) => Arc::new(ContendedStore::new(db.clone(), wins)),
            None => db.clone(),
        };

        let agent = StrategyAgent::new(
            &config,
            AgentDeps {
                markets: Arc::new(markets),
                live_feed: feed.clone(),
                executor,
                paper: paper.clone(),
                store,
                db: db.clone(),
            },
            t0(),
        )
        .unwrap();

        Harness {
            agent,
            db,
            feed,
            paper,
        }
    }

    #[tokio::test]
    async fn test_arbitrage_trades_without_live_data() {
        let markets = MockMarketSource::new(vec![market("arb", "Lakers", "Celtics", dec!(0.40), dec!(0.55))]);
        let mut h = harness(base_config(), markets, MockLiveEventSource::new(Vec::new())).await;

        let report = h.agent.run_cycle(t0()).await.unwrap();
        assert_eq!(report.opportunities, 1);
        assert_eq!(report.decisions.len(), 1);

        let decision = &report.decisions[0];
        assert_eq!(decision.source, OpportunitySource::Arbitrage);
        assert_eq!(decision.conclusion, Conclusion::Bet);
        assert_eq!(decision.confidence, Decimal::ONE);
        assert!(decision.fast_mode);

        assert_eq!(report.orders_submitted, 1);
        assert_eq!(report.intents[0].size, dec!(50));
        assert_eq!(report.intents[0].side, OutcomeSide::Both);
        assert_eq!(h.paper.fills().len(), 1);

        let ledger = h.db.load_ledger(t0()).await.unwrap();
        assert_eq!(ledger.exposure, dec!(50));
        assert_eq!(ledger.day_start_balance, dec!(1000));
        assert_eq!(h.db.recent(10).await.unwrap().len(), 1);
        assert_eq!(h.db.recent_orders(10).await.unwrap()[0].status, "filled");
    }

    #[tokio::test]
    async fn test_confident_data_edge_becomes_order() {
        let mut config = base_config();
        // an edge at the plausible maximum scores 0.95 in play
        config.gate.max_plausible_edge = dec!(0.15);

        let markets = MockMarketSource::new(vec![market("m1", "Arsenal", "Chelsea", dec!(0.30), dec!(0.70))]);
        let feed = MockLiveEventSource::new(vec![live_event("e1", "Arsenal FC", "Chelsea FC", Some(dec!(0.45)))]);
        let mut h = harness(config, markets, feed).await;

        let report = h.agent.run_cycle(t0()).await.unwrap();
        assert_eq!(report.matched, 1);
        assert_eq!(report.decisions.len(), 1);

        let decision = &report.decisions[0];
        assert_eq!(decision.source, OpportunitySource::DataEdge);
        assert_eq!(decision.conclusion, Conclusion::Bet);
        assert_eq!(decision.confidence, dec!(0.95));
        assert_eq!(decision.tiers_consulted, vec!["tier1-heuristic".to_string()]);

        let intent = &report.intents[0];
        assert_eq!(intent.side, OutcomeSide::A);
        assert_eq!(intent.price, dec!(0.30));
        assert_eq!(intent.size, dec!(16.07));
    }

    #[tokio::test]
    async fn test_ambiguous_edge_without_llm_tiers_passes() {
        let markets = MockMarketSource::new(vec![market("m1", "Arsenal", "Chelsea", dec!(0.30), dec!(0.70))]);
        let feed = MockLiveEventSource::new(vec![live_event("e1", "Chelsea", "Arsenal", Some(dec!(0.55)))]);
        let mut h = harness(base_config(), markets, feed).await;

        let report = h.agent.run_cycle(t0()).await.unwrap();
        let decision = &report.decisions[0];
        assert_eq!(decision.conclusion, Conclusion::Pass);
        assert!(report.intents.is_empty());
        // PASS decisions are audited too
        assert_eq!(h.db.recent(10).await.unwrap()[0].conclusion, Conclusion::Pass);
    }

    #[tokio::test]
    async fn test_hibernation_leaves_only_arbitrage() {
        let mut config = base_config();
        config.poller.max_calls_per_hour = 100;

        let markets = MockMarketSource::new(vec![
            market("arb", "Lakers", "Celtics", dec!(0.40), dec!(0.55)),
            market("edge", "Arsenal", "Chelsea", dec!(0.30), dec!(0.70)),
        ]);
        let feed = MockLiveEventSource::new(vec![live_event("e1", "Arsenal", "Chelsea", Some(dec!(0.45)))]).with_cost(97);
        let mut h = harness(config, markets, feed).await;

        let first = h.agent.run_cycle(t0()).await.unwrap();
        assert_eq!(first.poll, Some(PollOutcome::Fetched { calls: 97 }));
        assert_eq!(first.opportunities, 2);

        assert_eq!(h.agent.poller().budget().thresholds().interval(PollTier::Hibernation).num_seconds(), 300);
        for offset in [45, 120, 299] {
            let report = h.agent.run_cycle(t0() + chrono::Duration::seconds(offset)).await.unwrap();
            assert_eq!(
                report.poll,
                Some(PollOutcome::Skipped {
                    tier: PollTier::Hibernation
                })
            );
            assert_eq!(report.live_events, 0);
            assert!(report
                .decisions
                .iter()
                .all(|d| d.source == OpportunitySource::Arbitrage));
        }
        assert_eq!(h.feed.fetch_count(), 1);

        let later = h.agent.run_cycle(t0() + chrono::Duration::seconds(300)).await.unwrap();
        assert!(matches!(later.poll, Some(PollOutcome::Fetched { .. })));
        assert_eq!(h.feed.fetch_count(), 2);

        let stored = h.db.load_agent("test-agent").await.unwrap().unwrap();
        assert_eq!(stored.requests_this_hour, 194);
        assert_eq!(stored.cycles, 5);
    }

    #[tokio::test]
    async fn test_paused_agent_makes_no_decisions() {
        let markets = MockMarketSource::new(vec![market("arb", "Lakers", "Celtics", dec!(0.40), dec!(0.55))]);
        let mut h = harness(base_config(), markets, MockLiveEventSource::new(Vec::new())).await;
        h.db.apply_control("test-agent", ControlCommand::Pause, t0()).await.unwrap();

        let report = h.agent.run_cycle(t0()).await.unwrap();
        assert!(report.paused);
        assert!(report.decisions.is_empty());
        assert_eq!(h.feed.fetch_count(), 0);
        assert!(h.db.recent(10).await.unwrap().is_empty());

        // heartbeat still moves while paused
        let stored = h.db.load_agent("test-agent").await.unwrap().unwrap();
        assert_eq!(stored.heartbeat, Some(t0()));

        h.db.apply_control("test-agent", ControlCommand::Resume, t0()).await.unwrap();
        let report = h.agent.run_cycle(t0()).await.unwrap();
        assert_eq!(report.decisions.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_request_is_reported() {
        let mut h = harness(base_config(), MockMarketSource::new(Vec::new()), MockLiveEventSource::new(Vec::new())).await;
        h.db.apply_control("test-agent", ControlCommand::Stop, t0()).await.unwrap();
        let report = h.agent.run_cycle(t0()).await.unwrap();
        assert!(report.stop_requested);
        assert!(report.decisions.is_empty());
    }

    #[tokio::test]
    async fn test_execution_failure_is_recorded_and_released() {
        let mut config = base_config();
        config.agent.dry_run = false;

        let mut executor = MockOrderExecutor::new();
        executor.expect_balance().returning(|| Ok(dec!(1000)));
        executor
            .expect_submit()
            .times(1)
            .returning(|_| Err(BotError::Execution("gateway returned 502".to_string())));

        let executor: Arc<dyn OrderExecutor> = Arc::new(executor);

        let markets = MockMarketSource::new(vec![market("arb", "Lakers", "Celtics", dec!(0.40), dec!(0.55))]);
        let mut h = harness_with_executor(config, markets, MockLiveEventSource::new(Vec::new()), Some(executor)).await;

        let report = h.agent.run_cycle(t0()).await.unwrap();
        assert!(!report.dry_run);
        assert_eq!(report.orders_failed, 1);
        assert_eq!(report.orders_submitted, 0);
        assert!(h.paper.fills().is_empty());

        let orders = h.db.recent_orders(10).await.unwrap();
        assert_eq!(orders[0].status, "failed");
        assert!(orders[0].error.as_deref().unwrap_or_default().contains("502"));

        assert_eq!(h.db.load_ledger(t0()).await.unwrap().exposure, Decimal::ZERO);
        let stored = h.db.load_agent("test-agent").await.unwrap().unwrap();
        assert_eq!(stored.orders_failed, 1);
        assert_eq!(stored.decisions, 1);
    }

    #[tokio::test]
    async fn test_market_outage_does_not_fail_cycle() {
        let markets = MockMarketSource::new(Vec::new()).with_failures();
        let mut h = harness(base_config(), markets, MockLiveEventSource::new(Vec::new())).await;

        let report = h.agent.run_cycle(t0()).await.unwrap();
        assert_eq!(report.markets, 0);
        assert!(report.decisions.is_empty());

        let stored = h.db.load_agent("test-agent").await.unwrap().unwrap();
        assert_eq!(stored.cycles, 1);
    }

    #[tokio::test]
    async fn test_exposure_cap_rejects_repeat_arbitrage() {
        let mut config = base_config();
        config.risk.max_exposure_pct = dec!(0.08);

        let markets = MockMarketSource::new(vec![
            market("arb1", "Lakers", "Celtics", dec!(0.40), dec!(0.55)),
            market("arb2", "Bulls", "Knicks", dec!(0.45), dec!(0.50)),
        ]);
        let mut h = harness(config, markets, MockLiveEventSource::new(Vec::new())).await;

        let report = h.agent.run_cycle(t0()).await.unwrap();
        assert_eq!(report.orders_submitted, 1);
        assert_eq!(report.rejections.len(), 1);
        assert_eq!(report.rejections[0].1.reason(), "exposure_cap");
        assert_eq!(report.decisions.len(), 2);
    }

    #[tokio::test]
    async fn test_filled_exposure_does_not_shrink_cap() {
        let mut config = base_config();
        // 100 of the day's 1000
        config.risk.max_exposure_pct = dec!(0.10);

        let markets = MockMarketSource::new(vec![
            market("arb1", "Lakers", "Celtics", dec!(0.40), dec!(0.55)),
            market("arb2", "Bulls", "Knicks", dec!(0.45), dec!(0.50)),
        ]);
        let mut h = harness(config, markets, MockLiveEventSource::new(Vec::new())).await;

        let report = h.agent.run_cycle(t0()).await.unwrap();
        assert!(report.rejections.is_empty());
        assert_eq!(report.orders_submitted, 2);
        assert_eq!(report.intents[1].size, dec!(47.5));

        let ledger = h.db.load_ledger(t0()).await.unwrap();
        assert_eq!(ledger.exposure, dec!(97.5));
        assert_eq!(ledger.day_start_balance, dec!(1000));
    }

    #[tokio::test]
    async fn test_settled_loss_trips_breaker_next_cycle() {
        let markets = MockMarketSource::new(vec![market("arb", "Lakers", "Celtics", dec!(0.40), dec!(0.55))]);
        let mut h = harness(base_config(), markets, MockLiveEventSource::new(Vec::new())).await;

        let first = h.agent.run_cycle(t0()).await.unwrap();
        assert_eq!(first.orders_submitted, 1);

        // the position resolves against us: 120 lost on a 1000 day
        let ledger = RiskEngine::new(base_config().risk)
            .settle(dec!(50), dec!(-120), h.db.as_ref(), t0())
            .await
            .unwrap();
        assert_eq!(ledger.exposure, Decimal::ZERO);

        let second = h.agent.run_cycle(t0() + chrono::Duration::seconds(60)).await.unwrap();
        assert_eq!(second.decisions.len(), 1);
        assert_eq!(second.decisions[0].conclusion, Conclusion::Bet);
        assert_eq!(second.orders_submitted, 0);
        assert_eq!(second.rejections.len(), 1);
        assert_eq!(second.rejections[0].1.reason(), "drawdown_breaker");
        assert_eq!(h.paper.fills().len(), 1);
    }

    #[tokio::test]
    async fn test_settlement_frees_exposure_for_next_cycle() {
        let mut config = base_config();
        config.risk.max_exposure_pct = dec!(0.08);

        let markets = MockMarketSource::new(vec![
            market("arb1", "Lakers", "Celtics", dec!(0.40), dec!(0.55)),
            market("arb2", "Bulls", "Knicks", dec!(0.45), dec!(0.50)),
        ]);
        let mut h = harness(config, markets, MockLiveEventSource::new(Vec::new())).await;

        let first = h.agent.run_cycle(t0()).await.unwrap();
        assert_eq!(first.orders_submitted, 1);
        assert_eq!(first.rejections[0].1.reason(), "exposure_cap");

        RiskEngine::new(base_config().risk)
            .settle(dec!(50), dec!(2.5), h.db.as_ref(), t0())
            .await
            .unwrap();

        // room for one more 5% order under the 80 cap
        let second = h.agent.run_cycle(t0() + chrono::Duration::seconds(60)).await.unwrap();
        assert_eq!(second.orders_submitted, 1);
        assert_eq!(second.intents[0].size, dec!(47.5));
        assert_eq!(second.rejections[0].1.reason(), "exposure_cap");

        let ledger = h.db.load_ledger(t0()).await.unwrap();
        assert_eq!(ledger.exposure, dec!(47.5));
        assert_eq!(ledger.realized_pnl_today, dec!(2.5));
    }

    #[tokio::test]
    async fn test_contended_ledger_does_not_abort_cycle() {
        let mut config = base_config();
        config.agent.dry_run = false;

        let mut executor = MockOrderExecutor::new();
        executor.expect_balance().returning(|| Ok(dec!(1000)));
        executor
            .expect_submit()
            .times(1)
            .returning(|_| Err(BotError::Execution("gateway timeout".to_string())));
        let executor: Arc<dyn OrderExecutor> = Arc::new(executor);

        let markets = MockMarketSource::new(vec![
            market("arb1", "Lakers", "Celtics", dec!(0.40), dec!(0.55)),
            market("arb2", "Bulls", "Knicks", dec!(0.45), dec!(0.50)),
        ]);
        // opening the day and the first reservation win; the release and
        // the second reservation always lose
        let mut h = build_harness(config, markets, MockLiveEventSource::new(Vec::new()), Some(executor), Some(2)).await;

        let report = h.agent.run_cycle(t0()).await.unwrap();
        assert_eq!(report.decisions.len(), 2);
        assert_eq!(report.orders_failed, 1);
        assert_eq!(report.intents.len(), 1);

        // the failed order's exposure could not be handed back
        assert_eq!(h.db.load_ledger(t0()).await.unwrap().exposure, dec!(50));

        let stored = h.db.load_agent("test-agent").await.unwrap().unwrap();
        assert_eq!(stored.cycles, 1);
        assert_eq!(stored.heartbeat, Some(t0()));
        assert_eq!(stored.decisions, 2);
    }
}
