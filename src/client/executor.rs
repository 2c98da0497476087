//! Order execution backends

use super::{ExecutionReport, OrderExecutor};
use crate::config::ExecutionConfig;
use crate::error::{BotError, Result};
use crate::types::OrderIntent;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

/// Dry-run executor: fills everything at the intent price and debits a
/// simulated balance.
#[derive(Clone)]
pub struct PaperExecutor {
    balance: Arc<Mutex<Decimal>>,
    fills: Arc<Mutex<Vec<OrderIntent>>>,
}

impl PaperExecutor {
    pub fn new(starting_balance: Decimal) -> Self {
        Self {
            balance: Arc::new(Mutex::new(starting_balance)),
            fills: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn fills(&self) -> Vec<OrderIntent> {
        self.fills.lock().clone()
    }
}

#[async_trait]
impl OrderExecutor for PaperExecutor {
    async fn submit(&self, intent: &OrderIntent) -> Result<ExecutionReport> {
        let mut balance = self.balance.lock();
        if intent.size > *balance {
            return Err(BotError::Execution(format!(
                "paper balance {} below order size {}",
                *balance, intent.size
            )));
        }
        *balance -= intent.size;

        let mut fills = self.fills.lock();
        fills.push(intent.clone());

        Ok(ExecutionReport {
            order_id: format!("paper-{}", intent.decision_id),
            status: "filled".to_string(),
            filled_size: intent.size,
        })
    }

    async fn balance(&self) -> Result<Decimal> {
        Ok(*self.balance.lock())
    }
}

/// Submits intents to an order gateway that owns signing and the exchange
/// connection.
pub struct HttpExecutor {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayOrderResponse {
    success: bool,
    #[serde(rename = "orderId")]
    order_id: Option<String>,
    status: Option<String>,
    #[serde(rename = "filledSize")]
    filled_size: Option<Decimal>,
    #[serde(rename = "errorMsg")]
    error_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayBalanceResponse {
    balance: Decimal,
}

impl HttpExecutor {
    pub fn new(base_url: &str, config: &ExecutionConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs.unwrap_or(10)))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("Authorization", format!("Bearer {}", key)),
            None => req,
        }
    }
}

#[async_trait]
impl OrderExecutor for HttpExecutor {
    async fn submit(&self, intent: &OrderIntent) -> Result<ExecutionReport> {
        let req = self
            .http
            .post(format!("{}/orders", self.base_url))
            .json(intent);
        let resp = self.authorized(req).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(BotError::Execution(format!(
                "gateway returned {}: {}",
                status,
                &text[..text.len().min(200)]
            )));
        }

        let body: GatewayOrderResponse = serde_json::from_str(&text)?;
        if !body.success {
            return Err(BotError::Execution(
                body.error_msg.unwrap_or_else(|| "order rejected".to_string()),
            ));
        }

        Ok(ExecutionReport {
            order_id: body.order_id.unwrap_or_default(),
            status: body.status.unwrap_or_else(|| "accepted".to_string()),
            filled_size: body.filled_size.unwrap_or(Decimal::ZERO),
        })
    }

    async fn balance(&self) -> Result<Decimal> {
        let req = self.http.get(format!("{}/balance", self.base_url));
        let resp = self.authorized(req).send().await?;
        if !resp.status().is_success() {
            return Err(BotError::Api(format!("gateway returned {}", resp.status())));
        }
        let body: GatewayBalanceResponse = resp.json().await?;
        Ok(body.balance)
    }
}
