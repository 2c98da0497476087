//! Tests for the rate budget tracker and adaptive poller

#[cfg(test)]
mod tests {
    use crate::client::mock::{live_event, MockLiveEventSource};
    use crate::config::PollerConfig;
    use crate::poller::{AdaptivePoller, PollOutcome, PollTier, RateBudgetTracker, TierThresholds};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rand::Rng;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
    }

    fn tracker(max: u32) -> RateBudgetTracker {
        RateBudgetTracker::new(max, Duration::hours(1), TierThresholds::default(), t0())
    }

    fn poller(max: u32) -> AdaptivePoller {
        let config = PollerConfig {
            max_calls_per_hour: max,
            ..PollerConfig::default()
        };
        AdaptivePoller::new(&config, t0())
    }

    // ---- tiers ----

    #[test]
    fn test_tier_boundaries_closed_open() {
        let th = TierThresholds::default();
        assert_eq!(PollTier::classify(0.0, &th), PollTier::Discovery);
        assert_eq!(PollTier::classify(0.4999, &th), PollTier::Discovery);
        assert_eq!(PollTier::classify(0.5, &th), PollTier::Active);
        assert_eq!(PollTier::classify(0.7999, &th), PollTier::Active);
        assert_eq!(PollTier::classify(0.8, &th), PollTier::Backoff);
        assert_eq!(PollTier::classify(0.9499, &th), PollTier::Backoff);
        assert_eq!(PollTier::classify(0.95, &th), PollTier::Hibernation);
        assert_eq!(PollTier::classify(1.7, &th), PollTier::Hibernation);
    }

    #[test]
    fn test_tier_classification_covers_unit_interval() {
        let th = TierThresholds::default();
        let mut rng = rand::rng();

        for _ in 0..10_000 {
            let r: f64 = rng.random_range(0.0..1.0);
            let tier = PollTier::classify(r, &th);
            // pure: same input, same tier
            assert_eq!(tier, PollTier::classify(r, &th));

            let expected = if r < 0.5 {
                PollTier::Discovery
            } else if r < 0.8 {
                PollTier::Active
            } else if r < 0.95 {
                PollTier::Backoff
            } else {
                PollTier::Hibernation
            };
            assert_eq!(tier, expected, "ratio {}", r);
        }
    }

    #[test]
    fn test_tier_intervals() {
        let th = TierThresholds::default();
        assert_eq!(th.interval(PollTier::Discovery), Duration::seconds(45));
        assert_eq!(th.interval(PollTier::Active), Duration::seconds(45));
        assert_eq!(th.interval(PollTier::Backoff), Duration::seconds(120));
        assert_eq!(th.interval(PollTier::Hibernation), Duration::seconds(300));
    }

    // ---- budget ----

    #[test]
    fn test_usage_ratio() {
        let mut budget = tracker(100);
        budget.record_calls_at(25, t0());
        assert!((budget.usage_ratio_at(t0()) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_window_resets_after_exactly_one_window() {
        let mut budget = tracker(100);
        budget.record_calls_at(90, t0());

        let later = t0() + Duration::hours(1);
        assert_eq!(budget.usage_ratio_at(later), 0.0);
        assert_eq!(budget.window_start(), later);

        budget.record_calls_at(7, later);
        assert!((budget.usage_ratio_at(later) - 0.07).abs() < 1e-9);
    }

    #[test]
    fn test_window_not_reset_before_one_window() {
        let mut budget = tracker(100);
        budget.record_calls_at(40, t0());

        let almost = t0() + Duration::hours(1) - Duration::seconds(1);
        assert!((budget.usage_ratio_at(almost) - 0.40).abs() < 1e-9);
        assert_eq!(budget.window_start(), t0());
    }

    #[test]
    fn test_multiple_elapsed_windows_reset_once() {
        let mut budget = tracker(100);
        budget.record_calls_at(60, t0());

        let much_later = t0() + Duration::hours(5) + Duration::minutes(17);
        assert_eq!(budget.usage_ratio_at(much_later), 0.0);
        assert_eq!(budget.window_start(), much_later);

        // next reset is one window after the new start, not aligned to the hour
        budget.record_calls_at(10, much_later);
        let inside = much_later + Duration::minutes(59);
        assert!((budget.usage_ratio_at(inside) - 0.10).abs() < 1e-9);
    }

    #[test]
    fn test_record_after_elapsed_window_discards_old_calls() {
        let mut budget = tracker(10);
        budget.record_calls_at(9, t0());
        budget.record_calls_at(2, t0() + Duration::hours(2));
        assert_eq!(budget.calls_this_hour(), 2);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut budget = tracker(100);
        budget.record_calls_at(33, t0());
        let snap = budget.snapshot();

        let mut resumed = tracker(100);
        resumed.restore(snap);
        assert_eq!(resumed.calls_this_hour(), 33);
        assert_eq!(resumed.window_start(), t0());
    }

    // ---- poller ----

    #[test]
    fn test_cold_start_always_polls() {
        for calls in [0, 50, 80, 97, 250] {
            let mut p = poller(100);
            p.budget_mut().record_calls_at(calls, t0());
            assert!(p.should_poll(None, t0()), "calls {}", calls);
        }
    }

    #[test]
    fn test_should_poll_respects_tier_interval() {
        let mut p = poller(100);
        let last = t0();
        assert!(!p.should_poll(Some(last), t0() + Duration::seconds(44)));
        assert!(p.should_poll(Some(last), t0() + Duration::seconds(45)));

        p.budget_mut().record_calls_at(85, t0());
        assert_eq!(p.tier(t0()), PollTier::Backoff);
        assert!(!p.should_poll(Some(last), t0() + Duration::seconds(119)));
        assert!(p.should_poll(Some(last), t0() + Duration::seconds(120)));
    }

    #[tokio::test]
    async fn test_poll_fetches_and_records_calls() {
        let feed = MockLiveEventSource::new(vec![live_event("e1", "A", "B", None)]).with_cost(2);
        let mut p = poller(100);

        let poll = p.poll_live_events(&feed, t0()).await;
        assert_eq!(poll.events.len(), 1);
        assert_eq!(poll.outcome, PollOutcome::Fetched { calls: 2 });
        assert_eq!(p.budget().calls_this_hour(), 2);
        assert_eq!(p.last_poll(), Some(t0()));

        // within the interval: empty set, feed untouched
        let poll = p.poll_live_events(&feed, t0() + Duration::seconds(10)).await;
        assert!(poll.events.is_empty());
        assert!(matches!(poll.outcome, PollOutcome::Skipped { .. }));
        assert_eq!(feed.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_feed_failure_degrades_to_empty_set() {
        let feed = MockLiveEventSource::default().with_failures();
        let mut p = poller(100);

        let poll = p.poll_live_events(&feed, t0()).await;
        assert!(poll.events.is_empty());
        assert!(matches!(poll.outcome, PollOutcome::Failed { .. }));
        assert_eq!(p.budget().calls_this_hour(), 1);
    }

    #[tokio::test]
    async fn test_hibernation_suppresses_polling_until_interval() {
        let feed = MockLiveEventSource::new(vec![live_event("e1", "A", "B", None)]);
        let mut p = poller(100);

        p.poll_live_events(&feed, t0()).await;
        p.budget_mut().record_calls_at(96, t0());
        assert_eq!(p.tier(t0()), PollTier::Hibernation);

        for secs in [45, 120, 299] {
            let poll = p.poll_live_events(&feed, t0() + Duration::seconds(secs)).await;
            assert!(poll.events.is_empty(), "polled at +{}s", secs);
        }
        assert_eq!(feed.fetch_count(), 1);

        let poll = p.poll_live_events(&feed, t0() + Duration::seconds(300)).await;
        assert_eq!(poll.events.len(), 1);
        assert_eq!(feed.fetch_count(), 2);
    }
}
