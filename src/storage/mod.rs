//! Data storage and persistence
//!
//! One SQLite file shared by every agent process: the decision audit trail,
//! submitted and failed orders, agent records and the exposure ledger.


use crate::coordination::{AgentRuntimeState, ControlCommand, CoordinationStore, ExposureLedger};
use crate::error::{BotError, Result};
use crate::gate::DecisionLog;
use crate::types::{Conclusion, Decision, OpportunitySource, OrderIntent};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use uuid::Uuid;

/// Database for decisions, orders and coordination state
pub struct Database {
    pool: SqlitePool,
}

/// Stored outcome of one order submission
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRecord {
    pub id: String,
    pub decision_id: String,
    pub market_id: String,
    pub side: String,
    pub size: Decimal,
    pub price: Decimal,
    pub status: String,
    pub exchange_order_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OrderRecord {
    pub fn from_intent(
        intent: &OrderIntent,
        status: &str,
        exchange_order_id: Option<String>,
        error: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            decision_id: intent.decision_id.to_string(),
            market_id: intent.market_id.clone(),
            side: intent.side.as_str().to_string(),
            size: intent.size,
            price: intent.price,
            status: status.to_string(),
            exchange_order_id,
            error,
            created_at: intent.created_at,
        }
    }
}

impl Database {
    /// Connect to SQLite database (creates if not exists)
    pub async fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", path.as_ref().display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Private in-memory database; a single connection so every query sees the same data
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS decisions (
                id TEXT PRIMARY KEY,
                market_id TEXT NOT NULL,
                source TEXT NOT NULL,
                conclusion TEXT NOT NULL,
                confidence TEXT NOT NULL,
                rationale TEXT NOT NULL,
                fast_mode INTEGER NOT NULL,
                tiers TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                decision_id TEXT NOT NULL,
                market_id TEXT NOT NULL,
                side TEXT NOT NULL,
                size TEXT NOT NULL,
                price TEXT NOT NULL,
                status TEXT NOT NULL,
                exchange_order_id TEXT,
                error TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agent_state (
                agent_id TEXT PRIMARY KEY,
                running INTEGER NOT NULL,
                dry_run INTEGER NOT NULL,
                stop_requested INTEGER NOT NULL,
                heartbeat TEXT,
                requests_this_hour INTEGER NOT NULL,
                hour_window_start TEXT NOT NULL,
                cycles INTEGER NOT NULL,
                decisions INTEGER NOT NULL,
                orders_submitted INTEGER NOT NULL,
                orders_failed INTEGER NOT NULL,
                near_misses INTEGER NOT NULL,
                version INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS exposure_ledger (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                exposure TEXT NOT NULL,
                realized_pnl_today TEXT NOT NULL,
                day_start_balance TEXT NOT NULL,
                trading_day TEXT NOT NULL,
                version INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Save an order submission outcome
    pub async fn save_order(&self, order: &OrderRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, decision_id, market_id, side, size, price, status, exchange_order_id, error, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order.id)
        .bind(&order.decision_id)
        .bind(&order.market_id)
        .bind(&order.side)
        .bind(order.size.to_string())
        .bind(order.price.to_string())
        .bind(&order.status)
        .bind(&order.exchange_order_id)
        .bind(&order.error)
        .bind(order.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get recent orders
    pub async fn recent_orders(&self, limit: i64) -> Result<Vec<OrderRecord>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, decision_id, market_id, side, size, price, status, exchange_order_id, error, created_at
            FROM orders
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrderRecord::try_from).collect()
    }

    /// Count decisions per conclusion
    pub async fn decision_counts(&self) -> Result<Vec<(Conclusion, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT conclusion, COUNT(*) FROM decisions GROUP BY conclusion ORDER BY conclusion",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(c, n)| {
                Conclusion::parse(&c)
                    .map(|c| (c, n))
                    .ok_or_else(|| BotError::Internal(format!("unknown conclusion {}", c)))
            })
            .collect()
    }
}

#[async_trait]
impl DecisionLog for Database {
    async fn append(&self, decision: &Decision) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO decisions (id, market_id, source, conclusion, confidence, rationale, fast_mode, tiers, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(decision.id.to_string())
        .bind(&decision.market_id)
        .bind(decision.source.as_str())
        .bind(decision.conclusion.as_str())
        .bind(decision.confidence.to_string())
        .bind(&decision.rationale)
        .bind(decision.fast_mode)
        .bind(serde_json::to_string(&decision.tiers_consulted)?)
        .bind(decision.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Decision>> {
        let rows = sqlx::query_as::<_, DecisionRow>(
            r#"
            SELECT id, market_id, source, conclusion, confidence, rationale, fast_mode, tiers, created_at
            FROM decisions
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Decision::try_from).collect()
    }
}

#[async_trait]
impl CoordinationStore for Database {
    async fn load_agent(&self, agent_id: &str) -> Result<Option<AgentRuntimeState>> {
        let row = sqlx::query_as::<_, AgentRow>(
            r#"
            SELECT agent_id, running, dry_run, stop_requested, heartbeat, requests_this_hour,
                   hour_window_start, cycles, decisions, orders_submitted, orders_failed,
                   near_misses, version
            FROM agent_state
            WHERE agent_id = ?
            "#,
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AgentRuntimeState::try_from).transpose()
    }

    async fn upsert_agent(&self, state: &AgentRuntimeState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_state (agent_id, running, dry_run, stop_requested, heartbeat, requests_this_hour,
                                     hour_window_start, cycles, decisions, orders_submitted, orders_failed,
                                     near_misses, version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(agent_id) DO UPDATE SET
                running = excluded.running,
                dry_run = excluded.dry_run,
                stop_requested = excluded.stop_requested,
                heartbeat = excluded.heartbeat,
                requests_this_hour = excluded.requests_this_hour,
                hour_window_start = excluded.hour_window_start,
                cycles = excluded.cycles,
                decisions = excluded.decisions,
                orders_submitted = excluded.orders_submitted,
                orders_failed = excluded.orders_failed,
                near_misses = excluded.near_misses,
                version = agent_state.version + 1
            "#,
        )
        .bind(&state.agent_id)
        .bind(state.running)
        .bind(state.dry_run)
        .bind(state.stop_requested)
        .bind(state.heartbeat.map(|t| t.to_rfc3339()))
        .bind(state.requests_this_hour as i64)
        .bind(state.hour_window_start.to_rfc3339())
        .bind(state.cycles as i64)
        .bind(state.decisions as i64)
        .bind(state.orders_submitted as i64)
        .bind(state.orders_failed as i64)
        .bind(state.near_misses as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_progress(&self, state: &AgentRuntimeState) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE agent_state SET
                heartbeat = ?,
                requests_this_hour = ?,
                hour_window_start = ?,
                cycles = ?,
                decisions = ?,
                orders_submitted = ?,
                orders_failed = ?,
                near_misses = ?,
                version = version + 1
            WHERE agent_id = ?
            "#,
        )
        .bind(state.heartbeat.map(|t| t.to_rfc3339()))
        .bind(state.requests_this_hour as i64)
        .bind(state.hour_window_start.to_rfc3339())
        .bind(state.cycles as i64)
        .bind(state.decisions as i64)
        .bind(state.orders_submitted as i64)
        .bind(state.orders_failed as i64)
        .bind(state.near_misses as i64)
        .bind(&state.agent_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BotError::StateConflict(format!(
                "agent {} is not registered",
                state.agent_id
            )));
        }
        Ok(())
    }

    async fn apply_control(
        &self,
        agent_id: &str,
        command: ControlCommand,
        now: DateTime<Utc>,
    ) -> Result<AgentRuntimeState> {
        // not yet run: register in dry-run so a first `run` is safe
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO agent_state (agent_id, running, dry_run, stop_requested, heartbeat,
                                               requests_this_hour, hour_window_start, cycles, decisions,
                                               orders_submitted, orders_failed, near_misses, version)
            VALUES (?, 1, 1, 0, NULL, 0, ?, 0, 0, 0, 0, 0, 0)
            "#,
        )
        .bind(agent_id)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let (column, value) = match command {
            ControlCommand::Pause => ("running", false),
            ControlCommand::Resume => ("running", true),
            ControlCommand::SetDryRun(on) => ("dry_run", on),
            ControlCommand::Stop => ("stop_requested", true),
            ControlCommand::ClearStop => ("stop_requested", false),
        };
        sqlx::query(&format!(
            "UPDATE agent_state SET {} = ?, version = version + 1 WHERE agent_id = ?",
            column
        ))
        .bind(value)
        .bind(agent_id)
        .execute(&self.pool)
        .await?;

        self.load_agent(agent_id)
            .await?
            .ok_or_else(|| BotError::Internal(format!("agent {} vanished after update", agent_id)))
    }

    async fn list_agents(&self) -> Result<Vec<AgentRuntimeState>> {
        let rows = sqlx::query_as::<_, AgentRow>(
            r#"
            SELECT agent_id, running, dry_run, stop_requested, heartbeat, requests_this_hour,
                   hour_window_start, cycles, decisions, orders_submitted, orders_failed,
                   near_misses, version
            FROM agent_state
            ORDER BY agent_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AgentRuntimeState::try_from).collect()
    }

    async fn load_ledger(&self, now: DateTime<Utc>) -> Result<ExposureLedger> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO exposure_ledger (id, exposure, realized_pnl_today, day_start_balance, trading_day, version)
            VALUES (1, '0', '0', '0', ?, 0)
            "#,
        )
        .bind(now.date_naive().to_string())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, LedgerRow>(
            r#"
            SELECT exposure, realized_pnl_today, day_start_balance, trading_day, version
            FROM exposure_ledger
            WHERE id = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        ExposureLedger::try_from(row)
    }

    async fn compare_and_set_ledger(&self, expected_version: u64, next: &ExposureLedger) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE exposure_ledger SET
                exposure = ?,
                realized_pnl_today = ?,
                day_start_balance = ?,
                trading_day = ?,
                version = version + 1
            WHERE id = 1 AND version = ?
            "#,
        )
        .bind(next.exposure.to_string())
        .bind(next.realized_pnl_today.to_string())
        .bind(next.day_start_balance.to_string())
        .bind(next.trading_day.to_string())
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// ============ Row mapping ============

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal> {
    raw.parse()
        .map_err(|e| BotError::Internal(format!("bad decimal in {}: {} ({})", field, raw, e)))
}

fn parse_time(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BotError::Internal(format!("bad timestamp in {}: {} ({})", field, raw, e)))
}

#[derive(Debug, sqlx::FromRow)]
struct DecisionRow {
    id: String,
    market_id: String,
    source: String,
    conclusion: String,
    confidence: String,
    rationale: String,
    fast_mode: bool,
    tiers: String,
    created_at: String,
}

impl TryFrom<DecisionRow> for Decision {
    type Error = BotError;

    fn try_from(row: DecisionRow) -> Result<Self> {
        Ok(Decision {
            id: Uuid::parse_str(&row.id).map_err(|e| BotError::Internal(format!("bad decision id: {}", e)))?,
            market_id: row.market_id,
            source: OpportunitySource::parse(&row.source)
                .ok_or_else(|| BotError::Internal(format!("unknown source {}", row.source)))?,
            conclusion: Conclusion::parse(&row.conclusion)
                .ok_or_else(|| BotError::Internal(format!("unknown conclusion {}", row.conclusion)))?,
            confidence: parse_decimal("confidence", &row.confidence)?,
            rationale: row.rationale,
            fast_mode: row.fast_mode,
            tiers_consulted: serde_json::from_str(&row.tiers)?,
            created_at: parse_time("created_at", &row.created_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    decision_id: String,
    market_id: String,
    side: String,
    size: String,
    price: String,
    status: String,
    exchange_order_id: Option<String>,
    error: Option<String>,
    created_at: String,
}

impl TryFrom<OrderRow> for OrderRecord {
    type Error = BotError;

    fn try_from(row: OrderRow) -> Result<Self> {
        Ok(OrderRecord {
            size: parse_decimal("size", &row.size)?,
            price: parse_decimal("price", &row.price)?,
            created_at: parse_time("created_at", &row.created_at)?,
            id: row.id,
            decision_id: row.decision_id,
            market_id: row.market_id,
            side: row.side,
            status: row.status,
            exchange_order_id: row.exchange_order_id,
            error: row.error,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AgentRow {
    agent_id: String,
    running: bool,
    dry_run: bool,
    stop_requested: bool,
    heartbeat: Option<String>,
    requests_this_hour: i64,
    hour_window_start: String,
    cycles: i64,
    decisions: i64,
    orders_submitted: i64,
    orders_failed: i64,
    near_misses: i64,
    version: i64,
}

impl TryFrom<AgentRow> for AgentRuntimeState {
    type Error = BotError;

    fn try_from(row: AgentRow) -> Result<Self> {
        Ok(AgentRuntimeState {
            heartbeat: row
                .heartbeat
                .as_deref()
                .map(|t| parse_time("heartbeat", t))
                .transpose()?,
            hour_window_start: parse_time("hour_window_start", &row.hour_window_start)?,
            agent_id: row.agent_id,
            running: row.running,
            dry_run: row.dry_run,
            stop_requested: row.stop_requested,
            requests_this_hour: row.requests_this_hour.max(0) as u32,
            cycles: row.cycles.max(0) as u64,
            decisions: row.decisions.max(0) as u64,
            orders_submitted: row.orders_submitted.max(0) as u64,
            orders_failed: row.orders_failed.max(0) as u64,
            near_misses: row.near_misses.max(0) as u64,
            version: row.version.max(0) as u64,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    exposure: String,
    realized_pnl_today: String,
    day_start_balance: String,
    trading_day: String,
    version: i64,
}

impl TryFrom<LedgerRow> for ExposureLedger {
    type Error = BotError;

    fn try_from(row: LedgerRow) -> Result<Self> {
        Ok(ExposureLedger {
            exposure: parse_decimal("exposure", &row.exposure)?,
            realized_pnl_today: parse_decimal("realized_pnl_today", &row.realized_pnl_today)?,
            day_start_balance: parse_decimal("day_start_balance", &row.day_start_balance)?,
            trading_day: row
                .trading_day
                .parse::<NaiveDate>()
                .map_err(|e| BotError::Internal(format!("bad trading day {}: {}", row.trading_day, e)))?,
            version: row.version.max(0) as u64,
        })
    }
}
