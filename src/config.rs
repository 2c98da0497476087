//! Configuration management

use crate::error::{BotError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub markets: MarketsConfig,
    pub live_feed: LiveFeedConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub edge: EdgeConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    pub llm: Option<LlmTiersConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Identifier of this strategy process in the coordination store
    pub id: String,
    /// Start in dry-run mode when no coordination record exists yet
    pub dry_run: bool,
    /// Sleep between scan cycles
    pub cycle_interval_secs: u64,
    /// Random jitter added to every sleep
    pub cycle_jitter_ms: u64,
    /// Sleep while paused
    pub paused_poll_secs: u64,
    /// Heartbeat older than this marks an agent as not alive
    pub heartbeat_stale_secs: i64,
    /// Starting USDC of the paper executor
    pub paper_balance: Decimal,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            dry_run: true,
            cycle_interval_secs: 45,
            cycle_jitter_ms: 2_000,
            paused_poll_secs: 15,
            heartbeat_stale_secs: 300,
            paper_balance: dec!(1000),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketsConfig {
    /// Gamma API endpoint (market data)
    pub gamma_url: String,
    /// Maximum number of open markets fetched per cycle
    pub limit: usize,
    /// Optional tag filter (e.g. "sports")
    pub tag: Option<String>,
    pub timeout_secs: u64,
}

impl Default for MarketsConfig {
    fn default() -> Self {
        Self {
            gamma_url: "https://gamma-api.polymarket.com".to_string(),
            limit: 100,
            tag: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveFeedConfig {
    /// Live score feed endpoint
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_feed_timeout")]
    pub timeout_secs: u64,
}

fn default_feed_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Hourly quota of the live-event feed
    pub max_calls_per_hour: u32,
    /// Length of the quota window
    pub window_secs: i64,
    /// Usage ratio where the Active tier starts
    pub active_at: f64,
    /// Usage ratio where the Back-off tier starts
    pub backoff_at: f64,
    /// Usage ratio where Hibernation starts
    pub hibernate_at: f64,
    pub discovery_interval_secs: i64,
    pub active_interval_secs: i64,
    pub backoff_interval_secs: i64,
    pub hibernate_interval_secs: i64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_calls_per_hour: 100,
            window_secs: 3_600,
            active_at: 0.5,
            backoff_at: 0.8,
            hibernate_at: 0.95,
            discovery_interval_secs: 45,
            active_interval_secs: 45,
            backoff_interval_secs: 120,
            hibernate_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Organizational qualifiers dropped from participant names
    pub strip_tokens: Vec<String>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        let tokens = [
            "fc", "cf", "sc", "afc", "ac", "club", "team", "esports", "gaming", "the",
        ];
        Self {
            strip_tokens: tokens.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Price sums strictly below this flag an arbitrage
    pub arbitrage_threshold: Decimal,
    /// Minimum |edge| for a data-edge signal
    pub min_edge: Decimal,
    /// Edges from here up to `min_edge` are recorded as near misses
    pub near_miss_floor: Decimal,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            arbitrage_threshold: dec!(0.985),
            min_edge: dec!(0.015),
            near_miss_floor: dec!(0.005),
        }
    }
}

/// Decision gate thresholds.
///
/// With these defaults and no `[llm]` tiers, tier 1 is the only judge of a
/// data edge. It scores `0.5 + 0.4 * edge / max_plausible_edge`, plus 0.05
/// in play, so only an in-play edge above about 23% of a 25% plausible
/// maximum clears 0.92; a 15% edge scores 0.79 and PASSes. Operators who
/// want live edges traded must configure tiers 2/3 or set
/// `fast_track_live_edges`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Final confidence must exceed this to BET
    pub confidence_threshold: Decimal,
    /// Lower edge of the band that escalates to the next tier
    pub ambiguous_low: Decimal,
    /// Upper edge of the band that escalates to the next tier
    pub ambiguous_high: Decimal,
    /// Edges above this are treated as stale data by tier 1
    pub max_plausible_edge: Decimal,
    pub fast_track_arbitrage: bool,
    pub fast_track_live_edges: bool,
    /// PASS any staged opportunity whose event is not in play
    pub strict_no_data: bool,
    pub tier1_timeout_ms: u64,
    pub tier2_timeout_ms: u64,
    pub tier3_timeout_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: dec!(0.92),
            ambiguous_low: dec!(0.5),
            ambiguous_high: dec!(0.92),
            max_plausible_edge: dec!(0.25),
            fast_track_arbitrage: true,
            fast_track_live_edges: false,
            strict_no_data: false,
            tier1_timeout_ms: 1_000,
            tier2_timeout_ms: 30_000,
            tier3_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Maximum order size as fraction of balance (e.g., 0.05 = 5%)
    pub max_fraction_per_trade: Decimal,
    /// Maximum total exposure as fraction of the day's starting equity
    pub max_exposure_pct: Decimal,
    /// Kelly fraction (e.g., 0.25 for quarter Kelly)
    pub kelly_fraction: Decimal,
    /// Smallest order worth paying fees on
    pub min_trade_size: Decimal,
    /// Realized loss today, as fraction of the day start balance, that halts sizing
    pub max_daily_drawdown_pct: Decimal,
    /// USDC that is never committed
    pub min_balance_reserve: Decimal,
    /// Compare-and-set attempts when reserving exposure
    pub reserve_attempts: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_fraction_per_trade: dec!(0.05),
            max_exposure_pct: dec!(0.50),
            kelly_fraction: dec!(0.25),
            min_trade_size: dec!(0.50),
            max_daily_drawdown_pct: dec!(0.10),
            min_balance_reserve: Decimal::ZERO,
            reserve_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path, shared by every agent process
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "agents.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Order gateway endpoint; paper execution when absent
    pub gateway_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmTiersConfig {
    /// Tier 2, research-augmented check
    pub research: Option<LlmConfig>,
    /// Tier 3, deep check
    pub deep: Option<LlmConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// LLM provider (deepseek, anthropic, openai, ollama, compatible)
    pub provider: String,
    /// API key
    #[serde(default)]
    pub api_key: String,
    /// Model name, provider default when absent
    pub model: Option<String>,
    /// Base URL for OpenAI-compatible providers
    pub base_url: Option<String>,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("POLYMARKET").separator("__"))
            .build()
            .map_err(|e| BotError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| BotError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document directly
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .map_err(|e| BotError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| BotError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations
    pub fn load_default() -> Result<Self> {
        let paths = [
            "config.toml",
            "config.yaml",
            "~/.config/polymarket-agents/config.toml",
        ];

        for path in paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::load(expanded.as_ref());
            }
        }

        Err(BotError::Config("No configuration file found".into()))
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let p = &self.poller;
        if p.max_calls_per_hour == 0 {
            return Err(BotError::Config("poller.max_calls_per_hour must be > 0".into()));
        }
        if p.window_secs <= 0 {
            return Err(BotError::Config("poller.window_secs must be > 0".into()));
        }
        if !(0.0 < p.active_at && p.active_at < p.backoff_at && p.backoff_at < p.hibernate_at) {
            return Err(BotError::Config(
                "poller tier boundaries must satisfy 0 < active_at < backoff_at < hibernate_at".into(),
            ));
        }

        let g = &self.gate;
        if g.ambiguous_low > g.ambiguous_high {
            return Err(BotError::Config("gate.ambiguous_low exceeds gate.ambiguous_high".into()));
        }
        if g.confidence_threshold < Decimal::ZERO || g.confidence_threshold > Decimal::ONE {
            return Err(BotError::Config("gate.confidence_threshold must be within [0, 1]".into()));
        }

        let e = &self.edge;
        if e.near_miss_floor > e.min_edge {
            return Err(BotError::Config("edge.near_miss_floor exceeds edge.min_edge".into()));
        }

        let r = &self.risk;
        if r.max_fraction_per_trade <= Decimal::ZERO || r.max_fraction_per_trade > Decimal::ONE {
            return Err(BotError::Config("risk.max_fraction_per_trade must be within (0, 1]".into()));
        }
        if r.kelly_fraction <= Decimal::ZERO {
            return Err(BotError::Config("risk.kelly_fraction must be > 0".into()));
        }

        Ok(())
    }
}
