//! External collaborators of the pipeline
//!
//! - Gamma API: open markets
//! - Live score feed: rate-limited live-event records
//! - Execution: paper fills or an order gateway

mod gamma;
mod live_feed;
mod executor;
pub mod mock;

pub use executor::{HttpExecutor, PaperExecutor};
pub use gamma::GammaClient;
pub use live_feed::LiveScoreClient;

use crate::error::Result;
use crate::types::{LiveEvent, Market, OrderIntent};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Read-only feed of open markets, polled once per cycle
#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn open_markets(&self) -> Result<Vec<Market>>;
}

/// Events returned by one feed fetch and the quota it consumed
#[derive(Debug, Clone, Default)]
pub struct LiveFeedBatch {
    pub events: Vec<LiveEvent>,
    pub calls_used: u32,
}

/// Rate-limited live-event feed, consumed only through the adaptive poller
#[async_trait]
pub trait LiveEventSource: Send + Sync {
    async fn fetch_events(&self) -> Result<LiveFeedBatch>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub order_id: String,
    pub status: String,
    pub filled_size: Decimal,
}

/// Accepts order intents; failures are reported, never retried here
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn submit(&self, intent: &OrderIntent) -> Result<ExecutionReport>;

    /// Spendable USDC balance
    async fn balance(&self) -> Result<Decimal>;
}
