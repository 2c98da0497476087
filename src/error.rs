//! Error types for the trading agents

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Timed out after {after_ms} ms: {operation}")]
    Timeout { operation: String, after_ms: u64 },

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("State conflict: {0}")]
    StateConflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BotError {
    /// Network, upstream API and timeout failures. The cycle carries on with
    /// degraded data when one of these shows up.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BotError::Api(_) | BotError::Network(_) | BotError::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
