//! Pluggable true-probability estimation from live numeric state
//!
//! How live state turns into a probability depends on the sport and the
//! strategy, so the calculator only sees this trait.

use crate::types::{LiveEvent, Orientation};
use rust_decimal::Decimal;

pub trait ProbabilityEstimator: Send + Sync {
    fn name(&self) -> &str;

    /// Probability in [0, 1] that market participant A wins, or None when the
    /// event carries no usable state.
    fn estimate_true_probability(&self, event: &LiveEvent, orientation: Orientation) -> Option<Decimal>;
}

/// Trusts the win probability published by the feed itself
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedImpliedEstimator;

impl ProbabilityEstimator for FeedImpliedEstimator {
    fn name(&self) -> &str {
        "feed-implied"
    }

    fn estimate_true_probability(&self, event: &LiveEvent, orientation: Orientation) -> Option<Decimal> {
        let p1 = event.state.as_ref()?.implied_probability_1?;
        if p1 < Decimal::ZERO || p1 > Decimal::ONE {
            tracing::debug!("Ignoring out-of-range implied probability {} on {}", p1, event.id);
            return None;
        }
        Some(match orientation {
            Orientation::Aligned => p1,
            Orientation::Swapped => Decimal::ONE - p1,
        })
    }
}

/// Disables the data-edge path; only arbitrage can fire
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEstimate;

impl ProbabilityEstimator for NoEstimate {
    fn name(&self) -> &str {
        "none"
    }

    fn estimate_true_probability(&self, _event: &LiveEvent, _orientation: Orientation) -> Option<Decimal> {
        None
    }
}
