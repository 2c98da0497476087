//! Tier 1: cheap statistical plausibility check

use super::{TierAssessment, ValidationRequest, ValidationTier};
use crate::config::GateConfig;
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Scores an opportunity from its edge and a few base rates, no I/O.
///
/// Real mispricings on liquid markets are small; a huge edge almost always
/// means the live data lags the market.
pub struct HeuristicTier {
    max_plausible_edge: Decimal,
}

impl HeuristicTier {
    pub fn new(max_plausible_edge: Decimal) -> Self {
        Self { max_plausible_edge }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(config.max_plausible_edge)
    }

    fn confidence(&self, request: &ValidationRequest) -> (Decimal, Vec<&'static str>) {
        let mut notes = Vec::new();
        let strength = if self.max_plausible_edge > Decimal::ZERO {
            (request.edge / self.max_plausible_edge).min(Decimal::ONE)
        } else {
            Decimal::ZERO
        };
        let mut confidence = dec!(0.50) + dec!(0.40) * strength;

        if request.in_play {
            confidence += dec!(0.05);
            notes.push("in-play data");
        } else if request.event_summary.is_none() {
            confidence -= dec!(0.10);
            notes.push("no live data");
        }

        // longshot bias: extreme prices rarely carry a real edge
        if request.entry_price < dec!(0.05) || request.entry_price > dec!(0.95) {
            confidence -= dec!(0.15);
            notes.push("extreme price");
        }

        (confidence.max(Decimal::ZERO).min(dec!(0.99)), notes)
    }
}

#[async_trait]
impl ValidationTier for HeuristicTier {
    fn name(&self) -> &str {
        "tier1-heuristic"
    }

    async fn assess(&self, request: &ValidationRequest) -> Result<TierAssessment> {
        if request.edge > self.max_plausible_edge {
            return Ok(TierAssessment::Reject {
                rationale: format!(
                    "edge {:.2}% exceeds plausible {:.2}%, likely stale data",
                    request.edge * Decimal::ONE_HUNDRED,
                    self.max_plausible_edge * Decimal::ONE_HUNDRED
                ),
            });
        }

        let (confidence, notes) = self.confidence(request);
        let rationale = if notes.is_empty() {
            format!("edge {:.2}%", request.edge * Decimal::ONE_HUNDRED)
        } else {
            format!(
                "edge {:.2}% ({})",
                request.edge * Decimal::ONE_HUNDRED,
                notes.join(", ")
            )
        };
        TierAssessment::score(confidence, rationale)
    }
}
