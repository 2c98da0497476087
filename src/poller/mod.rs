//! Adaptive polling of the rate-limited live-event feed
//!
//! The poller never blocks a cycle on quota: when the current tier's interval
//! has not elapsed the cycle simply runs with no live events, which leaves
//! only the arbitrage path open.

pub mod budget;
pub mod tier;

#[cfg(test)]
mod tests;

pub use budget::{BudgetSnapshot, RateBudgetTracker};
pub use tier::{PollTier, TierThresholds};

use crate::client::LiveEventSource;
use crate::config::PollerConfig;
use crate::types::LiveEvent;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

/// What happened to the live feed this cycle
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Fetched { calls: u32 },
    /// Interval for the current tier has not elapsed
    Skipped { tier: PollTier },
    /// Transient feed failure, cycle continues without live data
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct LivePoll {
    pub events: Vec<LiveEvent>,
    pub outcome: PollOutcome,
    pub tier: PollTier,
}

pub struct AdaptivePoller {
    budget: RateBudgetTracker,
    last_poll: Option<DateTime<Utc>>,
}

impl AdaptivePoller {
    pub fn new(config: &PollerConfig, now: DateTime<Utc>) -> Self {
        let budget = RateBudgetTracker::new(
            config.max_calls_per_hour,
            Duration::seconds(config.window_secs),
            TierThresholds::from(config),
            now,
        );
        Self::with_budget(budget)
    }

    pub fn with_budget(budget: RateBudgetTracker) -> Self {
        Self {
            budget,
            last_poll: None,
        }
    }

    pub fn tier(&mut self, now: DateTime<Utc>) -> PollTier {
        self.budget.tier_at(now)
    }

    /// Polling interval of the tier in force at `now`
    pub fn interval(&mut self, now: DateTime<Utc>) -> Duration {
        let tier = self.tier(now);
        self.budget.thresholds().interval(tier)
    }

    /// `None` means the feed was never polled; a cold start always polls.
    pub fn should_poll(&mut self, last_poll: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_poll {
            None => true,
            Some(last) => now - last >= self.interval(now),
        }
    }

    /// Fetch live events if the budget allows it, otherwise return an empty set
    pub async fn poll_live_events(
        &mut self,
        source: &dyn LiveEventSource,
        now: DateTime<Utc>,
    ) -> LivePoll {
        let tier = self.tier(now);
        if !self.should_poll(self.last_poll, now) {
            debug!("Live feed skipped this cycle ({} tier)", tier);
            return LivePoll {
                events: Vec::new(),
                outcome: PollOutcome::Skipped { tier },
                tier,
            };
        }

        self.last_poll = Some(now);
        match source.fetch_events().await {
            Ok(batch) => {
                self.budget.record_calls_at(batch.calls_used, now);
                debug!(
                    "Fetched {} live events using {} calls",
                    batch.events.len(),
                    batch.calls_used
                );
                LivePoll {
                    events: batch.events,
                    outcome: PollOutcome::Fetched {
                        calls: batch.calls_used,
                    },
                    tier: self.tier(now),
                }
            }
            Err(e) => {
                // the attempt still costs quota on most feeds
                self.budget.record_calls_at(1, now);
                warn!("Live feed fetch failed, continuing without live data: {}", e);
                LivePoll {
                    events: Vec::new(),
                    outcome: PollOutcome::Failed {
                        reason: e.to_string(),
                    },
                    tier: self.tier(now),
                }
            }
        }
    }

    pub fn last_poll(&self) -> Option<DateTime<Utc>> {
        self.last_poll
    }

    pub fn budget(&self) -> &RateBudgetTracker {
        &self.budget
    }

    pub fn budget_mut(&mut self) -> &mut RateBudgetTracker {
        &mut self.budget
    }

    /// Resume counters persisted by a previous run of this agent
    pub fn restore(&mut self, snapshot: BudgetSnapshot) {
        self.budget.restore(snapshot);
    }
}
