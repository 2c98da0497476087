//! Gamma API client for market data
//!
//! Fetches open two-outcome markets with their prices.

use super::MarketSource;
use crate::config::MarketsConfig;
use crate::error::{BotError, Result};
use crate::types::Market;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Gamma API client for market data
pub struct GammaClient {
    http: Client,
    base_url: String,
    limit: usize,
    tag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GammaMarket {
    pub id: String,
    pub question: String,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    pub outcomes: Option<String>, // JSON string
    #[serde(rename = "outcomePrices")]
    pub outcome_prices: Option<String>, // JSON string "[\"0.55\", \"0.45\"]"
}

impl GammaClient {
    /// Create a new Gamma client
    pub fn new(config: &MarketsConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.gamma_url.trim_end_matches('/').to_string(),
            limit: config.limit,
            tag: config.tag.clone(),
        })
    }

    /// Open markets sorted by volume
    pub async fn get_open_markets(&self) -> Result<Vec<Market>> {
        let url = format!("{}/markets", self.base_url);
        let limit = self.limit.to_string();
        let mut query = vec![
            ("active", "true"),
            ("closed", "false"),
            ("_sort", "volume:desc"),
            ("_limit", limit.as_str()),
        ];
        if let Some(tag) = &self.tag {
            query.push(("tag_slug", tag.as_str()));
        }

        let resp = self.http.get(&url).query(&query).send().await?;
        if !resp.status().is_success() {
            return Err(BotError::Api(format!("gamma returned {}", resp.status())));
        }
        let markets: Vec<GammaMarket> = resp.json().await?;

        Ok(markets.into_iter().filter_map(parse_market).collect())
    }
}

#[async_trait]
impl MarketSource for GammaClient {
    async fn open_markets(&self) -> Result<Vec<Market>> {
        self.get_open_markets().await
    }
}

/// Keep only markets with exactly two named outcomes and two parseable prices
pub(crate) fn parse_market(gm: GammaMarket) -> Option<Market> {
    // API returns string arrays like ["0.55", "0.45"]; some older markets use numbers
    let prices: Vec<Decimal> = gm.outcome_prices.as_ref().and_then(|s| {
        if let Ok(strings) = serde_json::from_str::<Vec<String>>(s) {
            return strings.iter().map(|p| p.parse::<Decimal>().ok()).collect();
        }
        serde_json::from_str::<Vec<Decimal>>(s).ok()
    })?;

    let names: Vec<String> = gm
        .outcomes
        .as_ref()
        .and_then(|s| serde_json::from_str(s).ok())?;

    if names.len() != 2 || prices.len() != 2 {
        return None;
    }

    Some(Market {
        id: gm.id,
        question: gm.question,
        participant_a: names[0].clone(),
        participant_b: names[1].clone(),
        price_a: prices[0],
        price_b: prices[1],
        close_time: gm.end_date.as_ref().and_then(|s| s.parse().ok()),
    })
}
