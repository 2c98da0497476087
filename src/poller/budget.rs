//! Hourly call budget for the live-event feed

use super::tier::{PollTier, TierThresholds};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Counts feed calls against an hourly quota.
///
/// The window resets lazily: the first read or write at least one window
/// length after `window_start` zeroes the counter and moves the window start
/// to that moment. Missed windows are never replayed.
#[derive(Debug, Clone)]
pub struct RateBudgetTracker {
    max_calls_per_hour: u32,
    window: Duration,
    calls_this_hour: u32,
    window_start: DateTime<Utc>,
    thresholds: TierThresholds,
    last_tier: Option<PollTier>,
}

/// Persistable counter state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    pub calls_this_hour: u32,
    pub window_start: DateTime<Utc>,
}

impl RateBudgetTracker {
    pub fn new(
        max_calls_per_hour: u32,
        window: Duration,
        thresholds: TierThresholds,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            max_calls_per_hour: max_calls_per_hour.max(1),
            window,
            calls_this_hour: 0,
            window_start: now,
            thresholds,
            last_tier: None,
        }
    }

    /// Resume from counters stored in the coordination record
    pub fn restore(&mut self, snapshot: BudgetSnapshot) {
        self.calls_this_hour = snapshot.calls_this_hour;
        self.window_start = snapshot.window_start;
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        BudgetSnapshot {
            calls_this_hour: self.calls_this_hour,
            window_start: self.window_start,
        }
    }

    pub fn record_calls(&mut self, n: u32) {
        self.record_calls_at(n, Utc::now());
    }

    pub fn record_calls_at(&mut self, n: u32, now: DateTime<Utc>) {
        self.roll_window(now);
        self.calls_this_hour = self.calls_this_hour.saturating_add(n);
        self.observe_tier();
    }

    pub fn usage_ratio(&mut self) -> f64 {
        self.usage_ratio_at(Utc::now())
    }

    /// `calls_this_hour / max_calls_per_hour`, after the lazy window reset
    pub fn usage_ratio_at(&mut self, now: DateTime<Utc>) -> f64 {
        self.roll_window(now);
        self.observe_tier();
        self.ratio()
    }

    pub fn tier_at(&mut self, now: DateTime<Utc>) -> PollTier {
        let usage = self.usage_ratio_at(now);
        PollTier::classify(usage, &self.thresholds)
    }

    pub fn calls_this_hour(&self) -> u32 {
        self.calls_this_hour
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        self.window_start
    }

    pub fn max_calls_per_hour(&self) -> u32 {
        self.max_calls_per_hour
    }

    pub fn thresholds(&self) -> &TierThresholds {
        &self.thresholds
    }

    fn ratio(&self) -> f64 {
        self.calls_this_hour as f64 / self.max_calls_per_hour as f64
    }

    fn roll_window(&mut self, now: DateTime<Utc>) {
        if now - self.window_start >= self.window {
            debug!(
                "Quota window rolled over after {} calls (started {})",
                self.calls_this_hour, self.window_start
            );
            self.calls_this_hour = 0;
            self.window_start = now;
        }
    }

    fn observe_tier(&mut self) {
        let usage = self.ratio();
        let tier = PollTier::classify(usage, &self.thresholds);
        match self.last_tier {
            Some(previous) if previous != tier => {
                info!(
                    from = %previous,
                    to = %tier,
                    usage,
                    "Poll tier transition"
                );
            }
            _ => {}
        }
        self.last_tier = Some(tier);
    }
}
