//! LLM-backed validation tiers
//!
//! Supports multiple LLM providers: DeepSeek, Anthropic, OpenAI, and OpenAI-compatible APIs.
//! The same client serves tier 2 (research) and tier 3 (deep check); only the
//! instructions differ.

use super::{TierAssessment, ValidationRequest, ValidationTier};
use crate::config::LlmConfig;
use crate::error::{BotError, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierRole {
    /// Tier 2: adjust confidence with fresh context
    Research,
    /// Tier 3: final call on ambiguous cases
    Deep,
}

impl TierRole {
    fn tier_name(&self) -> &'static str {
        match self {
            TierRole::Research => "tier2-research",
            TierRole::Deep => "tier3-deep",
        }
    }
}

#[derive(Debug, Clone)]
pub enum LlmProvider {
    DeepSeek {
        api_key: String,
        model: String,
    },
    Anthropic {
        api_key: String,
        model: String,
    },
    OpenAI {
        api_key: String,
        model: String,
        base_url: String,
    },
    /// OpenAI-compatible API (Ollama, vLLM, etc.)
    Compatible {
        api_key: Option<String>,
        model: String,
        base_url: String,
    },
}

/// Validation tier answered by an LLM
pub struct LlmTier {
    http: Client,
    provider: LlmProvider,
    role: TierRole,
}

// ============ Request/Response types ============

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: String,
}

impl LlmTier {
    pub fn new(provider: LlmProvider, role: TierRole) -> Self {
        Self {
            http: Client::new(),
            provider,
            role,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig, role: TierRole) -> Result<Self> {
        let provider = match config.provider.to_lowercase().as_str() {
            "deepseek" => LlmProvider::DeepSeek {
                api_key: config.api_key.clone(),
                model: config.model.clone().unwrap_or_else(|| "deepseek-chat".to_string()),
            },
            "anthropic" | "claude" => LlmProvider::Anthropic {
                api_key: config.api_key.clone(),
                model: config.model.clone().unwrap_or_else(|| "claude-sonnet-4-20250514".to_string()),
            },
            "openai" | "gpt" => LlmProvider::OpenAI {
                api_key: config.api_key.clone(),
                model: config.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string()),
                base_url: config.base_url.clone().unwrap_or_else(|| "https://api.openai.com".to_string()),
            },
            "ollama" => LlmProvider::Compatible {
                api_key: None,
                model: config.model.clone().unwrap_or_else(|| "qwen2.5:14b".to_string()),
                base_url: config.base_url.clone().unwrap_or_else(|| "http://localhost:11434".to_string()),
            },
            "compatible" | "custom" => LlmProvider::Compatible {
                api_key: if config.api_key.is_empty() { None } else { Some(config.api_key.clone()) },
                model: config.model.clone().ok_or_else(|| BotError::Config("model required for compatible provider".into()))?,
                base_url: config.base_url.clone().ok_or_else(|| BotError::Config("base_url required for compatible provider".into()))?,
            },
            _ => return Err(BotError::Config(format!("Unknown LLM provider: {}", config.provider))),
        };

        Ok(Self::new(provider, role))
    }

    pub fn role(&self) -> TierRole {
        self.role
    }

    pub(crate) fn build_prompt(&self, request: &ValidationRequest) -> String {
        let instructions = match self.role {
            TierRole::Research => {
                "Check the signal below against the most recent context you know of \
                 (injuries, line-ups, news, form). Raise or lower the previous confidence accordingly."
            }
            TierRole::Deep => {
                "The signal below is ambiguous. Reason carefully about whether the edge is real \
                 and make the final call."
            }
        };

        format!(
            r#"You validate trading signals on a prediction market. {}

{}
Respond with ONLY a JSON object in this exact format:
{{"confidence": <number 0-100>, "reject": <true|false>, "reasoning": "<brief explanation>"}}
"#,
            instructions,
            request.summary(),
        )
    }

    async fn call_openai_compatible(
        &self,
        base_url: &str,
        api_key: Option<&str>,
        model: &str,
        prompt: &str,
    ) -> Result<String> {
        let request = OpenAIRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let mut req = self
            .http
            .post(format!("{}/v1/chat/completions", base_url))
            .header("content-type", "application/json");

        if let Some(key) = api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req.json(&request).send().await?;
        let text = resp.text().await?;
        tracing::debug!("LLM raw response: {}", &text[..text.len().min(500)]);

        let response: OpenAIResponse = serde_json::from_str(&text)
            .map_err(|e| BotError::Api(format!("JSON parse error: {} - response: {}", e, &text[..text.len().min(200)])))?;

        response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| BotError::Api("Empty response from LLM".into()))
    }

    async fn call_anthropic(&self, api_key: &str, model: &str, prompt: &str) -> Result<String> {
        let request = AnthropicRequest {
            model: model.to_string(),
            max_tokens: 500,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response: AnthropicResponse = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        response
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| BotError::Api("Empty response from Anthropic".into()))
    }

    async fn call_llm(&self, prompt: &str) -> Result<String> {
        match &self.provider {
            LlmProvider::DeepSeek { api_key, model } => {
                self.call_openai_compatible("https://api.deepseek.com", Some(api_key), model, prompt)
                    .await
            }
            LlmProvider::Anthropic { api_key, model } => {
                self.call_anthropic(api_key, model, prompt).await
            }
            LlmProvider::OpenAI { api_key, model, base_url } => {
                self.call_openai_compatible(base_url, Some(api_key), model, prompt)
                    .await
            }
            LlmProvider::Compatible { api_key, model, base_url } => {
                self.call_openai_compatible(base_url, api_key.as_deref(), model, prompt)
                    .await
            }
        }
    }
}

/// Extract the verdict JSON from a model reply. Anything missing or out of
/// range is a validation failure, never a default.
pub(crate) fn parse_response(response: &str) -> Result<TierAssessment> {
    let json_str = match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if end > start => &response[start..=end],
        _ => response,
    };

    let parsed: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| BotError::Validation(format!("Failed to parse LLM response: {}", e)))?;

    let confidence = parsed["confidence"]
        .as_f64()
        .ok_or_else(|| BotError::Validation("Missing confidence in response".into()))?;

    let reasoning = parsed["reasoning"]
        .as_str()
        .unwrap_or("No reasoning provided")
        .to_string();

    if parsed["reject"].as_bool().unwrap_or(false) {
        return Ok(TierAssessment::Reject { rationale: reasoning });
    }

    let confidence = Decimal::try_from(confidence / 100.0)
        .map_err(|e| BotError::Validation(format!("Bad confidence {}: {}", confidence, e)))?;
    TierAssessment::score(confidence.round_dp(4), reasoning)
}

#[async_trait]
impl ValidationTier for LlmTier {
    fn name(&self) -> &str {
        self.role.tier_name()
    }

    async fn assess(&self, request: &ValidationRequest) -> Result<TierAssessment> {
        let prompt = self.build_prompt(request);
        let response = self.call_llm(&prompt).await?;
        parse_response(&response)
    }
}
