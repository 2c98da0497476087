//! Mock collaborators for testing
//!
//! Provide in-memory market and live-event sources for:
//! - Unit tests without network calls
//! - Scenario tests with controlled feeds
//! - Dry runs against canned data

use super::{LiveEventSource, LiveFeedBatch, MarketSource};
use crate::error::{BotError, Result};
use crate::types::{EventStatus, LiveEvent, LiveState, Market};
use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Market source returning a fixed list
#[derive(Clone, Default)]
pub struct MockMarketSource {
    markets: Arc<RwLock<Vec<Market>>>,
    simulate_failures: bool,
}

impl MockMarketSource {
    pub fn new(markets: Vec<Market>) -> Self {
        Self {
            markets: Arc::new(RwLock::new(markets)),
            simulate_failures: false,
        }
    }

    pub fn with_failures(mut self) -> Self {
        self.simulate_failures = true;
        self
    }
}

#[async_trait]
impl MarketSource for MockMarketSource {
    async fn open_markets(&self) -> Result<Vec<Market>> {
        if self.simulate_failures {
            return Err(BotError::Api("Mock market failure".into()));
        }
        Ok(self.markets.read().clone())
    }
}

/// Live-event source that counts how often it was hit
#[derive(Clone, Default)]
pub struct MockLiveEventSource {
    events: Arc<RwLock<Vec<LiveEvent>>>,
    fetches: Arc<AtomicU32>,
    cost_per_fetch: u32,
    simulate_failures: bool,
}

impl MockLiveEventSource {
    pub fn new(events: Vec<LiveEvent>) -> Self {
        Self {
            events: Arc::new(RwLock::new(events)),
            fetches: Arc::new(AtomicU32::new(0)),
            cost_per_fetch: 1,
            simulate_failures: false,
        }
    }

    pub fn with_cost(mut self, cost_per_fetch: u32) -> Self {
        self.cost_per_fetch = cost_per_fetch;
        self
    }

    pub fn with_failures(mut self) -> Self {
        self.simulate_failures = true;
        self
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveEventSource for MockLiveEventSource {
    async fn fetch_events(&self) -> Result<LiveFeedBatch> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.simulate_failures {
            return Err(BotError::Api("Mock feed failure".into()));
        }
        Ok(LiveFeedBatch {
            events: self.events.read().clone(),
            calls_used: self.cost_per_fetch,
        })
    }
}

/// Two-participant market with the given outcome prices
pub fn market(id: &str, a: &str, b: &str, price_a: Decimal, price_b: Decimal) -> Market {
    Market {
        id: id.to_string(),
        question: format!("{} vs {}: who wins?", a, b),
        participant_a: a.to_string(),
        participant_b: b.to_string(),
        price_a,
        price_b,
        close_time: None,
    }
}

/// In-play event whose feed implies `p1` for participant 1
pub fn live_event(id: &str, p1: &str, p2: &str, implied_p1: Option<Decimal>) -> LiveEvent {
    LiveEvent {
        id: id.to_string(),
        participant_1: p1.to_string(),
        participant_2: p2.to_string(),
        status: EventStatus::Live,
        state: Some(LiveState {
            score_1: Some(0),
            score_2: Some(0),
            period: Some("1H".to_string()),
            clock_remaining_secs: Some(2_700),
            implied_probability_1: implied_p1,
        }),
    }
}

pub fn scheduled_event(id: &str, p1: &str, p2: &str) -> LiveEvent {
    LiveEvent {
        id: id.to_string(),
        participant_1: p1.to_string(),
        participant_2: p2.to_string(),
        status: EventStatus::Scheduled,
        state: None,
    }
}
