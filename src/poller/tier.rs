//! Polling tiers keyed by quota usage

use crate::config::PollerConfig;
use chrono::Duration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollTier {
    Discovery,
    Active,
    Backoff,
    Hibernation,
}

impl PollTier {
    /// Classify a usage ratio. Boundaries are closed-open: `[0, active)`,
    /// `[active, backoff)`, `[backoff, hibernate)`, `[hibernate, ∞)`.
    /// Negative and NaN ratios fall into Discovery.
    pub fn classify(usage: f64, thresholds: &TierThresholds) -> Self {
        if usage >= thresholds.hibernate_at {
            PollTier::Hibernation
        } else if usage >= thresholds.backoff_at {
            PollTier::Backoff
        } else if usage >= thresholds.active_at {
            PollTier::Active
        } else {
            PollTier::Discovery
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PollTier::Discovery => "discovery",
            PollTier::Active => "active",
            PollTier::Backoff => "back-off",
            PollTier::Hibernation => "hibernation",
        }
    }
}

impl std::fmt::Display for PollTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Usage boundaries plus the polling interval of every tier
#[derive(Debug, Clone, PartialEq)]
pub struct TierThresholds {
    pub active_at: f64,
    pub backoff_at: f64,
    pub hibernate_at: f64,
    pub discovery_interval: Duration,
    pub active_interval: Duration,
    pub backoff_interval: Duration,
    pub hibernate_interval: Duration,
}

impl TierThresholds {
    pub fn interval(&self, tier: PollTier) -> Duration {
        match tier {
            PollTier::Discovery => self.discovery_interval,
            PollTier::Active => self.active_interval,
            PollTier::Backoff => self.backoff_interval,
            PollTier::Hibernation => self.hibernate_interval,
        }
    }
}

impl From<&PollerConfig> for TierThresholds {
    fn from(config: &PollerConfig) -> Self {
        Self {
            active_at: config.active_at,
            backoff_at: config.backoff_at,
            hibernate_at: config.hibernate_at,
            discovery_interval: Duration::seconds(config.discovery_interval_secs),
            active_interval: Duration::seconds(config.active_interval_secs),
            backoff_interval: Duration::seconds(config.backoff_interval_secs),
            hibernate_interval: Duration::seconds(config.hibernate_interval_secs),
        }
    }
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self::from(&PollerConfig::default())
    }
}
