//! Decision gate
//!
//! Turns each opportunity into exactly one audited decision. Time-critical
//! sources skip validation (fast mode); everything else walks the tiers,
//! escalating only while the confidence stays ambiguous.

pub mod audit;


pub use audit::{DecisionLog, MemoryDecisionLog};

use crate::config::{Config, GateConfig};
use crate::error::Result;
use crate::model::{HeuristicTier, LlmTier, TierAssessment, TierRole, ValidationRequest, ValidationTier};
use crate::types::{Conclusion, Decision, Opportunity, OpportunitySource};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Which sources bypass the validation tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastModePolicy {
    pub arbitrage: bool,
    /// Data edges whose matched event is in play
    pub live_edges: bool,
}

impl FastModePolicy {
    pub fn from_config(config: &GateConfig) -> Self {
        Self {
            arbitrage: config.fast_track_arbitrage,
            live_edges: config.fast_track_live_edges,
        }
    }

    pub fn applies(&self, opportunity: &Opportunity) -> bool {
        match opportunity.source {
            OpportunitySource::Arbitrage => self.arbitrage,
            OpportunitySource::DataEdge => self.live_edges && opportunity.is_in_play(),
            OpportunitySource::None => false,
        }
    }
}

struct Stage {
    tier: Arc<dyn ValidationTier>,
    timeout: Duration,
}

/// Outcome of the staged walk before it becomes a Decision
struct Verdict {
    conclusion: Conclusion,
    confidence: Decimal,
    rationale: String,
}

impl Verdict {
    fn failed(conclusion: Conclusion, rationale: String) -> Self {
        Self {
            conclusion,
            confidence: Decimal::ZERO,
            rationale,
        }
    }
}

pub struct DecisionGate {
    config: GateConfig,
    fast_mode: FastModePolicy,
    stages: Vec<Stage>,
    log: Arc<dyn DecisionLog>,
}

impl DecisionGate {
    /// Gate with tier 1 only; add the LLM tiers with the builder methods
    pub fn new(config: GateConfig, tier1: Arc<dyn ValidationTier>, log: Arc<dyn DecisionLog>) -> Self {
        let timeout = Duration::from_millis(config.tier1_timeout_ms);
        Self {
            fast_mode: FastModePolicy::from_config(&config),
            stages: vec![Stage { tier: tier1, timeout }],
            config,
            log,
        }
    }

    pub fn with_research_tier(mut self, tier: Arc<dyn ValidationTier>) -> Self {
        let timeout = Duration::from_millis(self.config.tier2_timeout_ms);
        self.stages.push(Stage { tier, timeout });
        self
    }

    pub fn with_deep_tier(mut self, tier: Arc<dyn ValidationTier>) -> Self {
        let timeout = Duration::from_millis(self.config.tier3_timeout_ms);
        self.stages.push(Stage { tier, timeout });
        self
    }

    /// Heuristic tier plus whatever LLM tiers are configured
    pub fn from_config(config: &Config, log: Arc<dyn DecisionLog>) -> Result<Self> {
        let mut gate = Self::new(
            config.gate.clone(),
            Arc::new(HeuristicTier::from_config(&config.gate)),
            log,
        );

        if let Some(llm) = &config.llm {
            if let Some(research) = &llm.research {
                gate = gate.with_research_tier(Arc::new(LlmTier::from_config(research, TierRole::Research)?));
            }
            if let Some(deep) = &llm.deep {
                gate = gate.with_deep_tier(Arc::new(LlmTier::from_config(deep, TierRole::Deep)?));
            }
        }

        if gate.heuristic_only() {
            warn!(
                "Only {} is configured: data edges must clear confidence {} on the heuristic alone. \
                 Configure [llm] tiers or gate.fast_track_live_edges to trade live edges.",
                gate.tier_names().join(", "),
                gate.config.confidence_threshold
            );
        }

        Ok(gate)
    }

    /// No LLM tier and no fast track for live edges
    pub fn heuristic_only(&self) -> bool {
        self.stages.len() == 1 && !self.fast_mode.live_edges
    }

    pub fn tier_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.tier.name().to_string()).collect()
    }

    pub async fn decide(&self, opportunity: &Opportunity) -> Decision {
        self.decide_at(opportunity, Utc::now()).await
    }

    /// Decide one opportunity and append the result to the audit log
    pub async fn decide_at(&self, opportunity: &Opportunity, now: DateTime<Utc>) -> Decision {
        let mut tiers_consulted = Vec::new();
        let fast_mode = self.fast_mode.applies(opportunity);

        let verdict = if fast_mode {
            Verdict {
                conclusion: Conclusion::Bet,
                confidence: Decimal::ONE,
                rationale: "fast-tracked".to_string(),
            }
        } else if self.config.strict_no_data && !opportunity.is_in_play() {
            Verdict {
                conclusion: Conclusion::Pass,
                confidence: Decimal::ZERO,
                rationale: "no live data".to_string(),
            }
        } else {
            self.run_stages(opportunity, &mut tiers_consulted).await
        };

        let decision = Decision {
            id: Uuid::new_v4(),
            market_id: opportunity.market.id.clone(),
            source: opportunity.source,
            conclusion: verdict.conclusion,
            confidence: verdict.confidence,
            rationale: verdict.rationale,
            fast_mode,
            tiers_consulted,
            created_at: now,
        };

        info!(
            market_id = %decision.market_id,
            source = decision.source.as_str(),
            conclusion = decision.conclusion.as_str(),
            confidence = %decision.confidence,
            fast_mode = decision.fast_mode,
            "Decision: {}",
            decision.rationale
        );

        if let Err(e) = self.log.append(&decision).await {
            warn!("Failed to write decision {} to audit log: {}", decision.id, e);
        }

        decision
    }

    /// Decide a whole cycle's opportunities in order
    pub async fn decide_all(&self, opportunities: &[Opportunity], now: DateTime<Utc>) -> Vec<Decision> {
        let mut decisions = Vec::with_capacity(opportunities.len());
        for opportunity in opportunities {
            decisions.push(self.decide_at(opportunity, now).await);
        }
        decisions
    }

    fn is_ambiguous(&self, confidence: Decimal) -> bool {
        confidence >= self.config.ambiguous_low && confidence <= self.config.ambiguous_high
    }

    async fn run_stages(&self, opportunity: &Opportunity, consulted: &mut Vec<String>) -> Verdict {
        let mut request = ValidationRequest::from_opportunity(opportunity);
        let mut confidence = Decimal::ZERO;
        let mut rationale = String::new();

        for stage in &self.stages {
            let name = stage.tier.name().to_string();
            consulted.push(name.clone());

            let assessment = match tokio::time::timeout(stage.timeout, stage.tier.assess(&request)).await {
                Err(_) => {
                    return Verdict::failed(
                        Conclusion::Timeout,
                        format!("{} timed out after {}ms", name, stage.timeout.as_millis()),
                    );
                }
                Ok(Err(e)) => {
                    return Verdict::failed(Conclusion::Error, format!("{} failed: {}", name, e));
                }
                Ok(Ok(assessment)) => assessment,
            };

            match assessment {
                TierAssessment::Reject { rationale } => {
                    return Verdict {
                        conclusion: Conclusion::Pass,
                        confidence: Decimal::ZERO,
                        rationale: format!("{}: {}", name, rationale),
                    };
                }
                TierAssessment::Score {
                    confidence: score,
                    rationale: why,
                } => {
                    debug!("{} scored {} on {}: {}", name, score, request.market_id, why);
                    confidence = score;
                    rationale = format!("{}: {}", name, why);
                    if !self.is_ambiguous(score) {
                        break;
                    }
                    request = request.with_prior(score, &why);
                }
            }
        }

        let conclusion = if confidence > self.config.confidence_threshold {
            Conclusion::Bet
        } else {
            Conclusion::Pass
        };

        Verdict {
            conclusion,
            confidence,
            rationale,
        }
    }
}
