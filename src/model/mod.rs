//! Validation tiers consulted by the decision gate
//!
//! Each tier takes a summary of the opportunity and answers with a confidence
//! score and a rationale, or rejects it outright.

pub mod heuristic;
pub mod llm;


pub use heuristic::HeuristicTier;
pub use llm::{LlmProvider, LlmTier, TierRole};

use crate::error::{BotError, Result};
use crate::types::{Opportunity, OpportunitySource, OutcomeSide};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

/// What a tier is asked to judge
#[derive(Debug, Clone, Serialize)]
pub struct ValidationRequest {
    pub market_id: String,
    pub question: String,
    pub source: OpportunitySource,
    pub side: OutcomeSide,
    pub side_label: String,
    /// Non-negative edge the trade would capture
    pub edge: Decimal,
    pub entry_price: Decimal,
    pub in_play: bool,
    pub event_summary: Option<String>,
    /// Confidence of the previous tier, if any
    pub prior_confidence: Option<Decimal>,
    pub prior_rationale: Option<String>,
}

impl ValidationRequest {
    pub fn from_opportunity(opportunity: &Opportunity) -> Self {
        let market = &opportunity.market;
        let side_label = match opportunity.side {
            OutcomeSide::A => market.participant_a.clone(),
            OutcomeSide::B => market.participant_b.clone(),
            OutcomeSide::Both => "both outcomes".to_string(),
        };
        let event_summary = opportunity.live_event().map(|event| {
            let mut summary = format!(
                "{} vs {} ({:?})",
                event.participant_1, event.participant_2, event.status
            );
            if let Some(state) = &event.state {
                if let (Some(s1), Some(s2)) = (state.score_1, state.score_2) {
                    summary.push_str(&format!(", score {}-{}", s1, s2));
                }
                if let Some(period) = &state.period {
                    summary.push_str(&format!(", period {}", period));
                }
                if let Some(secs) = state.clock_remaining_secs {
                    summary.push_str(&format!(", {}s remaining", secs));
                }
            }
            summary
        });

        Self {
            market_id: market.id.clone(),
            question: market.question.clone(),
            source: opportunity.source,
            side: opportunity.side,
            side_label,
            edge: opportunity.effective_edge(),
            entry_price: opportunity.entry_price,
            in_play: opportunity.is_in_play(),
            event_summary,
            prior_confidence: None,
            prior_rationale: None,
        }
    }

    /// Same request carrying the verdict of the tier before
    pub fn with_prior(&self, confidence: Decimal, rationale: &str) -> Self {
        Self {
            prior_confidence: Some(confidence),
            prior_rationale: Some(rationale.to_string()),
            ..self.clone()
        }
    }

    /// Plain-text rendering handed to text-based tiers
    pub fn summary(&self) -> String {
        let mut text = format!(
            "Market: {}\nSignal: {} on {} at price {:.3}\nEdge: {:.2}%\n",
            self.question,
            self.source.as_str(),
            self.side_label,
            self.entry_price,
            self.edge * Decimal::ONE_HUNDRED,
        );
        match &self.event_summary {
            Some(event) => text.push_str(&format!("Live event: {}\n", event)),
            None => text.push_str("Live event: none\n"),
        }
        if let (Some(conf), Some(why)) = (self.prior_confidence, &self.prior_rationale) {
            text.push_str(&format!(
                "Previous check: {:.0}% confident - {}\n",
                conf * Decimal::ONE_HUNDRED,
                why
            ));
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TierAssessment {
    /// Stop here, the opportunity does not trade
    Reject { rationale: String },
    Score { confidence: Decimal, rationale: String },
}

impl TierAssessment {
    /// Build a score, refusing confidences outside [0, 1]
    pub fn score(confidence: Decimal, rationale: impl Into<String>) -> Result<Self> {
        if confidence < Decimal::ZERO || confidence > Decimal::ONE {
            return Err(BotError::Validation(format!(
                "confidence {} outside [0, 1]",
                confidence
            )));
        }
        Ok(TierAssessment::Score {
            confidence,
            rationale: rationale.into(),
        })
    }
}

#[async_trait]
pub trait ValidationTier: Send + Sync {
    fn name(&self) -> &str;

    async fn assess(&self, request: &ValidationRequest) -> Result<TierAssessment>;
}
