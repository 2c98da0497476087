//! Cross-process coordination state
//!
//! Every agent process reads its own record at the start of a cycle and
//! writes its progress at the end. Operators flip the control flags from the
//! CLI. The exposure ledger is shared by all agents and only ever changes
//! through a version-checked compare-and-set.


use crate::error::{BotError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-agent record. Control flags belong to the operator, the rest to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRuntimeState {
    pub agent_id: String,
    pub running: bool,
    pub dry_run: bool,
    pub stop_requested: bool,
    pub heartbeat: Option<DateTime<Utc>>,
    pub requests_this_hour: u32,
    pub hour_window_start: DateTime<Utc>,
    pub cycles: u64,
    pub decisions: u64,
    pub orders_submitted: u64,
    pub orders_failed: u64,
    pub near_misses: u64,
    /// Bumped on every write
    pub version: u64,
}

impl AgentRuntimeState {
    pub fn new(agent_id: impl Into<String>, dry_run: bool, now: DateTime<Utc>) -> Self {
        Self {
            agent_id: agent_id.into(),
            running: true,
            dry_run,
            stop_requested: false,
            heartbeat: None,
            requests_this_hour: 0,
            hour_window_start: now,
            cycles: 0,
            decisions: 0,
            orders_submitted: 0,
            orders_failed: 0,
            near_misses: 0,
            version: 0,
        }
    }

    /// Copy the agent-owned fields of `progress` onto this record
    pub fn absorb_progress(&mut self, progress: &AgentRuntimeState) {
        self.heartbeat = progress.heartbeat;
        self.requests_this_hour = progress.requests_this_hour;
        self.hour_window_start = progress.hour_window_start;
        self.cycles = progress.cycles;
        self.decisions = progress.decisions;
        self.orders_submitted = progress.orders_submitted;
        self.orders_failed = progress.orders_failed;
        self.near_misses = progress.near_misses;
    }

    pub fn is_paused(&self) -> bool {
        !self.running
    }

    pub fn heartbeat_age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.heartbeat.map(|hb| now - hb)
    }
}

/// Operator commands against an agent record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Pause,
    Resume,
    SetDryRun(bool),
    Stop,
    /// Acknowledge a stop so the next `run` starts normally
    ClearStop,
}

impl ControlCommand {
    pub fn apply(self, state: &mut AgentRuntimeState) {
        match self {
            ControlCommand::Pause => state.running = false,
            ControlCommand::Resume => state.running = true,
            ControlCommand::SetDryRun(on) => state.dry_run = on,
            ControlCommand::Stop => state.stop_requested = true,
            ControlCommand::ClearStop => state.stop_requested = false,
        }
    }
}

/// Portfolio-wide exposure shared by all agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureLedger {
    pub exposure: Decimal,
    pub realized_pnl_today: Decimal,
    pub day_start_balance: Decimal,
    pub trading_day: NaiveDate,
    pub version: u64,
}

impl ExposureLedger {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            exposure: Decimal::ZERO,
            realized_pnl_today: Decimal::ZERO,
            day_start_balance: Decimal::ZERO,
            trading_day: now.date_naive(),
            version: 0,
        }
    }

    /// Start a new trading day if `now` is past the current one. Exposure
    /// carries over and counts toward the day start equity with the free `balance`.
    pub fn roll_day(&mut self, now: DateTime<Utc>, balance: Decimal) -> bool {
        let today = now.date_naive();
        if today > self.trading_day {
            self.trading_day = today;
            self.realized_pnl_today = Decimal::ZERO;
            self.day_start_balance = balance + self.exposure;
            true
        } else {
            false
        }
    }

    /// Book a closed position: its exposure is freed and its PnL realized today.
    pub fn settle(&mut self, now: DateTime<Utc>, size: Decimal, pnl: Decimal) {
        let today = now.date_naive();
        if today > self.trading_day {
            // start equity unknown until an agent opens the day
            self.trading_day = today;
            self.realized_pnl_today = Decimal::ZERO;
            self.day_start_balance = Decimal::ZERO;
        }
        self.exposure = (self.exposure - size).max(Decimal::ZERO);
        self.realized_pnl_today += pnl;
    }
}

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    async fn load_agent(&self, agent_id: &str) -> Result<Option<AgentRuntimeState>>;

    /// Insert or overwrite the whole record
    async fn upsert_agent(&self, state: &AgentRuntimeState) -> Result<()>;

    /// Write only heartbeat, budget and counters; control flags are left alone
    async fn save_progress(&self, state: &AgentRuntimeState) -> Result<()>;

    /// Apply an operator command, creating the record if needed
    async fn apply_control(
        &self,
        agent_id: &str,
        command: ControlCommand,
        now: DateTime<Utc>,
    ) -> Result<AgentRuntimeState>;

    async fn list_agents(&self) -> Result<Vec<AgentRuntimeState>>;

    async fn load_ledger(&self, now: DateTime<Utc>) -> Result<ExposureLedger>;

    /// Replace the ledger if its version is still `expected_version`.
    /// Returns false when another writer got there first.
    async fn compare_and_set_ledger(&self, expected_version: u64, next: &ExposureLedger) -> Result<bool>;
}

/// Load an agent record, registering a fresh one on first run
pub async fn load_or_register(
    store: &dyn CoordinationStore,
    agent_id: &str,
    dry_run: bool,
    now: DateTime<Utc>,
) -> Result<AgentRuntimeState> {
    if let Some(state) = store.load_agent(agent_id).await? {
        return Ok(state);
    }
    let state = AgentRuntimeState::new(agent_id, dry_run, now);
    store.upsert_agent(&state).await?;
    tracing::info!("Registered agent {} (dry_run={})", agent_id, dry_run);
    Ok(state)
}

/// Single-process store for dry runs and tests
#[derive(Default)]
pub struct MemoryCoordinationStore {
    agents: RwLock<HashMap<String, AgentRuntimeState>>,
    ledger: RwLock<Option<ExposureLedger>>,
}

impl MemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordinationStore {
    async fn load_agent(&self, agent_id: &str) -> Result<Option<AgentRuntimeState>> {
        Ok(self.agents.read().get(agent_id).cloned())
    }

    async fn upsert_agent(&self, state: &AgentRuntimeState) -> Result<()> {
        let mut agents = self.agents.write();
        let version = agents.get(&state.agent_id).map(|s| s.version + 1).unwrap_or(0);
        let mut stored = state.clone();
        stored.version = version;
        agents.insert(state.agent_id.clone(), stored);
        Ok(())
    }

    async fn save_progress(&self, state: &AgentRuntimeState) -> Result<()> {
        let mut agents = self.agents.write();
        let stored = agents
            .get_mut(&state.agent_id)
            .ok_or_else(|| BotError::StateConflict(format!("agent {} is not registered", state.agent_id)))?;
        stored.absorb_progress(state);
        stored.version += 1;
        Ok(())
    }

    async fn apply_control(
        &self,
        agent_id: &str,
        command: ControlCommand,
        now: DateTime<Utc>,
    ) -> Result<AgentRuntimeState> {
        let mut agents = self.agents.write();
        let state = agents.entry(agent_id.to_string()).or_insert_with(|| {
            // not yet run: register in dry-run so a first `run` is safe
            AgentRuntimeState::new(agent_id, true, now)
        });
        command.apply(state);
        state.version += 1;
        Ok(state.clone())
    }

    async fn list_agents(&self) -> Result<Vec<AgentRuntimeState>> {
        let mut agents: Vec<AgentRuntimeState> = self.agents.read().values().cloned().collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(agents)
    }

    async fn load_ledger(&self, now: DateTime<Utc>) -> Result<ExposureLedger> {
        let mut ledger = self.ledger.write();
        Ok(ledger.get_or_insert_with(|| ExposureLedger::new(now)).clone())
    }

    async fn compare_and_set_ledger(&self, expected_version: u64, next: &ExposureLedger) -> Result<bool> {
        let mut ledger = self.ledger.write();
        let current_version = ledger.as_ref().map(|l| l.version).unwrap_or(0);
        if current_version != expected_version {
            return Ok(false);
        }
        let mut stored = next.clone();
        stored.version = expected_version + 1;
        *ledger = Some(stored);
        Ok(true)
    }
}

/// Store whose ledger writes start losing once `wins` have gone through,
/// as if another agent always got there first
#[cfg(test)]
pub(crate) struct ContendedStore {
    inner: std::sync::Arc<dyn CoordinationStore>,
    wins_left: std::sync::atomic::AtomicU32,
}

#[cfg(test)]
impl ContendedStore {
    pub(crate) fn new(inner: std::sync::Arc<dyn CoordinationStore>, wins: u32) -> Self {
        Self {
            inner,
            wins_left: std::sync::atomic::AtomicU32::new(wins),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl CoordinationStore for ContendedStore {
    async fn load_agent(&self, agent_id: &str) -> Result<Option<AgentRuntimeState>> {
        self.inner.load_agent(agent_id).await
    }

    async fn upsert_agent(&self, state: &AgentRuntimeState) -> Result<()> {
        self.inner.upsert_agent(state).await
    }

    async fn save_progress(&self, state: &AgentRuntimeState) -> Result<()> {
        self.inner.save_progress(state).await
    }

    async fn apply_control(
        &self,
        agent_id: &str,
        command: ControlCommand,
        now: DateTime<Utc>,
    ) -> Result<AgentRuntimeState> {
        self.inner.apply_control(agent_id, command, now).await
    }

    async fn list_agents(&self) -> Result<Vec<AgentRuntimeState>> {
        self.inner.list_agents().await
    }

    async fn load_ledger(&self, now: DateTime<Utc>) -> Result<ExposureLedger> {
        self.inner.load_ledger(now).await
    }

    async fn compare_and_set_ledger(&self, expected_version: u64, next: &ExposureLedger) -> Result<bool> {
        use std::sync::atomic::Ordering;
        let won = self
            .wins_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !won {
            return Ok(false);
        }
        self.inner.compare_and_set_ledger(expected_version, next).await
    }
}

/// Why settled funds may not be reclaimed right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedemptionBlock {
    Paused,
    DryRun,
    StaleHeartbeat,
}

/// Checks an agent record before settled positions are redeemed
pub struct RedemptionGuard {
    stale_after: Duration,
}

impl RedemptionGuard {
    pub fn new(stale_after: Duration) -> Self {
        Self { stale_after }
    }

    pub fn check(&self, state: &AgentRuntimeState, now: DateTime<Utc>) -> std::result::Result<(), RedemptionBlock> {
        if state.is_paused() || state.stop_requested {
            return Err(RedemptionBlock::Paused);
        }
        if state.dry_run {
            return Err(RedemptionBlock::DryRun);
        }
        match state.heartbeat_age(now) {
            Some(age) if age <= self.stale_after => Ok(()),
            _ => Err(RedemptionBlock::StaleHeartbeat),
        }
    }
}
