//! Live score feed client
//!
//! One fetch is one request against the feed's hourly quota. The feed may
//! report a different cost in the `x-requests-cost` header.

use super::{LiveEventSource, LiveFeedBatch};
use crate::config::LiveFeedConfig;
use crate::error::{BotError, Result};
use crate::types::{EventStatus, LiveEvent, LiveState};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

pub struct LiveScoreClient {
    http: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeedResponse {
    #[serde(default)]
    pub events: Vec<FeedEvent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeedEvent {
    pub id: String,
    pub home: String,
    pub away: String,
    pub status: String,
    pub score: Option<FeedScore>,
    pub period: Option<String>,
    pub clock_remaining: Option<u32>,
    pub win_probability_home: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeedScore {
    pub home: i64,
    pub away: i64,
}

impl LiveScoreClient {
    pub fn new(config: &LiveFeedConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl LiveEventSource for LiveScoreClient {
    async fn fetch_events(&self) -> Result<LiveFeedBatch> {
        let url = format!("{}/v1/events", self.base_url);
        let resp = self
            .http
            .get(&url)
            .header("x-api-key", &self.api_key)
            .query(&[("status", "live,scheduled")])
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(BotError::Api("live feed quota exhausted upstream".into()));
        }
        if !resp.status().is_success() {
            return Err(BotError::Api(format!("live feed returned {}", resp.status())));
        }

        let calls_used = resp
            .headers()
            .get("x-requests-cost")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(1);

        let body: FeedResponse = resp.json().await?;
        Ok(LiveFeedBatch {
            events: body.events.into_iter().filter_map(convert_event).collect(),
            calls_used,
        })
    }
}

pub(crate) fn convert_event(raw: FeedEvent) -> Option<LiveEvent> {
    let status = match raw.status.to_ascii_lowercase().as_str() {
        "live" | "inplay" | "in_play" | "1h" | "2h" | "ht" => EventStatus::Live,
        "scheduled" | "ns" | "not_started" => EventStatus::Scheduled,
        "finished" | "ft" | "ended" => EventStatus::Finished,
        other => {
            tracing::debug!("Dropping live event {} with status {}", raw.id, other);
            return None;
        }
    };

    let has_state = raw.score.is_some()
        || raw.clock_remaining.is_some()
        || raw.win_probability_home.is_some();
    let state = has_state.then(|| LiveState {
        score_1: raw.score.as_ref().map(|s| s.home),
        score_2: raw.score.as_ref().map(|s| s.away),
        period: raw.period.clone(),
        clock_remaining_secs: raw.clock_remaining,
        implied_probability_1: raw.win_probability_home,
    });

    Some(LiveEvent {
        id: raw.id,
        participant_1: raw.home,
        participant_2: raw.away,
        status,
        state,
    })
}
