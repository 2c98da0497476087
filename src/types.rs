//! Core pipeline types shared by every stage

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Exchange-listed binary question between two participants.
///
/// Re-fetched every cycle and never mutated in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub question: String,
    pub participant_a: String,
    pub participant_b: String,
    /// Price of the outcome "participant A wins"
    pub price_a: Decimal,
    /// Price of the outcome "participant B wins"
    pub price_b: Decimal,
    pub close_time: Option<DateTime<Utc>>,
}

impl Market {
    /// Sum of both outcome prices (does not have to be 1)
    pub fn price_sum(&self) -> Decimal {
        self.price_a + self.price_b
    }

    pub fn price_of(&self, side: OutcomeSide) -> Decimal {
        match side {
            OutcomeSide::A => self.price_a,
            OutcomeSide::B => self.price_b,
            OutcomeSide::Both => self.price_sum(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Live,
    Scheduled,
    Finished,
}

impl EventStatus {
    /// Preference when several events match the same market
    pub fn match_priority(self) -> u8 {
        match self {
            EventStatus::Live => 2,
            EventStatus::Scheduled => 1,
            EventStatus::Finished => 0,
        }
    }
}

/// Numeric state reported by the live feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveState {
    pub score_1: Option<i64>,
    pub score_2: Option<i64>,
    pub period: Option<String>,
    pub clock_remaining_secs: Option<u32>,
    /// Feed-implied probability that participant 1 wins
    pub implied_probability_1: Option<Decimal>,
}

/// Record from the external live-event feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveEvent {
    pub id: String,
    pub participant_1: String,
    pub participant_2: String,
    pub status: EventStatus,
    pub state: Option<LiveState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchConfidence {
    Exact,
    Normalized,
    Unmatched,
}

/// How the event's participants line up with the market's
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Market A is event participant 1
    Aligned,
    /// Market A is event participant 2
    Swapped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub market_id: String,
    pub event: Option<LiveEvent>,
    pub confidence: MatchConfidence,
    pub orientation: Orientation,
}

impl MatchResult {
    pub fn unmatched(market_id: impl Into<String>) -> Self {
        Self {
            market_id: market_id.into(),
            event: None,
            confidence: MatchConfidence::Unmatched,
            orientation: Orientation::Aligned,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.event.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpportunitySource {
    DataEdge,
    Arbitrage,
    None,
}

impl OpportunitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunitySource::DataEdge => "DATA_EDGE",
            OpportunitySource::Arbitrage => "ARBITRAGE",
            OpportunitySource::None => "NONE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DATA_EDGE" => Some(OpportunitySource::DataEdge),
            "ARBITRAGE" => Some(OpportunitySource::Arbitrage),
            "NONE" => Some(OpportunitySource::None),
            _ => None,
        }
    }
}

/// Which outcome(s) an order buys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeSide {
    A,
    B,
    /// Both outcomes, the arbitrage leg pair
    Both,
}

impl OutcomeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeSide::A => "A",
            OutcomeSide::B => "B",
            OutcomeSide::Both => "BOTH",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageSignal {
    pub price_sum: Decimal,
    /// Guaranteed payout minus cost per share pair, before fees
    pub profit: Decimal,
}

/// Transient per-cycle trading candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub market: Market,
    pub match_result: Option<MatchResult>,
    /// Signed edge of the favored side; None without usable live data
    pub edge: Option<Decimal>,
    pub arbitrage: Option<ArbitrageSignal>,
    pub source: OpportunitySource,
    pub side: OutcomeSide,
    pub entry_price: Decimal,
}

impl Opportunity {
    pub fn live_event(&self) -> Option<&LiveEvent> {
        self.match_result.as_ref().and_then(|m| m.event.as_ref())
    }

    /// Matched event is currently in play
    pub fn is_in_play(&self) -> bool {
        self.live_event()
            .map(|e| e.status == EventStatus::Live)
            .unwrap_or(false)
    }

    /// Edge actually captured by the trade, always non-negative for a firing signal
    pub fn effective_edge(&self) -> Decimal {
        match self.source {
            OpportunitySource::Arbitrage => self
                .arbitrage
                .as_ref()
                .map(|a| a.profit)
                .unwrap_or(Decimal::ZERO),
            OpportunitySource::DataEdge => self.edge.unwrap_or(Decimal::ZERO).max(Decimal::ZERO),
            OpportunitySource::None => Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Conclusion {
    Bet,
    Pass,
    Error,
    Timeout,
}

impl Conclusion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Conclusion::Bet => "BET",
            Conclusion::Pass => "PASS",
            Conclusion::Error => "ERROR",
            Conclusion::Timeout => "TIMEOUT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BET" => Some(Conclusion::Bet),
            "PASS" => Some(Conclusion::Pass),
            "ERROR" => Some(Conclusion::Error),
            "TIMEOUT" => Some(Conclusion::Timeout),
            _ => None,
        }
    }
}

/// Output of the decision gate, immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: Uuid,
    pub market_id: String,
    pub source: OpportunitySource,
    pub conclusion: Conclusion,
    pub confidence: Decimal,
    pub rationale: String,
    pub fast_mode: bool,
    pub tiers_consulted: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    pub fn is_bet(&self) -> bool {
        self.conclusion == Conclusion::Bet
    }
}

/// Unit handed to the execution collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub decision_id: Uuid,
    pub market_id: String,
    pub side: OutcomeSide,
    /// Notional in USDC
    pub size: Decimal,
    /// Limit price (price sum for a two-leg arbitrage)
    pub price: Decimal,
    pub edge: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Account view the risk engine sizes against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: Decimal,
    /// Open exposure across all agents
    pub exposure: Decimal,
    pub realized_pnl_today: Decimal,
    pub day_start_balance: Decimal,
}
