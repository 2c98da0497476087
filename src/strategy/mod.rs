//! Edge and arbitrage detection
//!
//! Two independent checks run on every market each cycle:
//! - arbitrage: outcome prices summing below the threshold
//! - data edge: estimated true probability against the market price
//!
//! Arbitrage takes precedence when both fire since it has no data dependency.

pub mod estimator;

#[cfg(test)]
mod tests;

pub use estimator::{FeedImpliedEstimator, NoEstimate, ProbabilityEstimator};

use crate::config::EdgeConfig;
use crate::types::{
    ArbitrageSignal, Market, MatchResult, Opportunity, OpportunitySource, OutcomeSide,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

/// Edge that came close to the threshold without firing
#[derive(Debug, Clone, PartialEq)]
pub struct NearMiss {
    pub market_id: String,
    pub edge: Decimal,
}

/// Result of scanning one cycle's markets
#[derive(Debug, Clone, Default)]
pub struct EdgeScan {
    /// Only opportunities with a source other than NONE
    pub opportunities: Vec<Opportunity>,
    pub near_misses: Vec<NearMiss>,
}

impl EdgeScan {
    pub fn count(&self, source: OpportunitySource) -> usize {
        self.opportunities.iter().filter(|o| o.source == source).count()
    }
}

pub struct EdgeCalculator {
    config: EdgeConfig,
    estimator: Arc<dyn ProbabilityEstimator>,
}

impl EdgeCalculator {
    pub fn new(config: EdgeConfig, estimator: Arc<dyn ProbabilityEstimator>) -> Self {
        Self { config, estimator }
    }

    /// Price sum strictly below the threshold; equality does not fire
    pub fn check_arbitrage(&self, market: &Market) -> Option<ArbitrageSignal> {
        let sum = market.price_sum();
        if sum > Decimal::ZERO && sum < self.config.arbitrage_threshold {
            Some(ArbitrageSignal {
                price_sum: sum,
                profit: Decimal::ONE - sum,
            })
        } else {
            None
        }
    }

    /// Favored side and its signed edge, None without a matched event with usable state.
    ///
    /// Each side is priced on its own: `p_a - price_a` for A and
    /// `(1 - p_a) - price_b` for B, since the two prices need not sum to 1.
    /// Ties go to A.
    pub fn data_edge(&self, market: &Market, match_result: Option<&MatchResult>) -> Option<(OutcomeSide, Decimal)> {
        let m = match_result?;
        let event = m.event.as_ref()?;
        let p_a = self.estimator.estimate_true_probability(event, m.orientation)?;
        let edge_a = p_a - market.price_a;
        let edge_b = (Decimal::ONE - p_a) - market.price_b;
        if edge_b > edge_a {
            Some((OutcomeSide::B, edge_b))
        } else {
            Some((OutcomeSide::A, edge_a))
        }
    }

    /// Build the opportunity for one market. Source is NONE when nothing fired.
    pub fn evaluate(
        &self,
        market: &Market,
        match_result: Option<&MatchResult>,
    ) -> (Opportunity, Option<NearMiss>) {
        let arbitrage = self.check_arbitrage(market);
        let favored = self.data_edge(market, match_result);

        let mut near_miss = None;
        let edge_fires = match favored {
            Some((_, e)) if e >= self.config.min_edge => true,
            Some((_, e)) if e >= self.config.near_miss_floor => {
                near_miss = Some(NearMiss {
                    market_id: market.id.clone(),
                    edge: e,
                });
                false
            }
            _ => false,
        };

        let (source, side) = match (arbitrage.is_some(), favored) {
            (true, _) => (OpportunitySource::Arbitrage, OutcomeSide::Both),
            (false, Some((side, _))) if edge_fires => (OpportunitySource::DataEdge, side),
            _ => (OpportunitySource::None, OutcomeSide::A),
        };

        let opportunity = Opportunity {
            entry_price: market.price_of(side),
            market: market.clone(),
            match_result: match_result.cloned(),
            edge: favored.map(|(_, e)| e),
            arbitrage,
            source,
            side,
        };
        (opportunity, near_miss)
    }

    /// Evaluate every market against its match; `matches` lines up with `markets`
    pub fn scan(&self, markets: &[Market], matches: &[MatchResult]) -> EdgeScan {
        let mut scan = EdgeScan::default();

        for (i, market) in markets.iter().enumerate() {
            let (opportunity, near_miss) = self.evaluate(market, matches.get(i));

            if let Some(miss) = near_miss {
                debug!(
                    "Near miss on {}: edge {:.2}% below {:.2}%",
                    miss.market_id,
                    miss.edge * Decimal::ONE_HUNDRED,
                    self.config.min_edge * Decimal::ONE_HUNDRED
                );
                scan.near_misses.push(miss);
            }

            match opportunity.source {
                OpportunitySource::None => continue,
                OpportunitySource::Arbitrage => {
                    info!(
                        "Arbitrage on {}: price sum {} (profit {:.2}%)",
                        market.id,
                        market.price_sum(),
                        opportunity.effective_edge() * Decimal::ONE_HUNDRED
                    );
                }
                OpportunitySource::DataEdge => {
                    info!(
                        "Data edge on {} ({:?}): {:.2}% via {}",
                        market.id,
                        opportunity.side,
                        opportunity.effective_edge() * Decimal::ONE_HUNDRED,
                        self.estimator.name()
                    );
                }
            }
            scan.opportunities.push(opportunity);
        }

        scan
    }
}
