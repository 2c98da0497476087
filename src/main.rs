//! Prediction market strategy agent
//!
//! Runs the signal-to-trade pipeline and lets an operator steer running
//! agents through the shared coordination store.

use chrono::Utc;
use clap::{Parser, Subcommand};
use polymarket_agents::{
    agent::{AgentDeps, StrategyAgent},
    client::{GammaClient, HttpExecutor, LiveScoreClient, OrderExecutor, PaperExecutor},
    config::Config,
    coordination::{ControlCommand, CoordinationStore, RedemptionGuard},
    gate::DecisionLog,
    risk::RiskEngine,
    storage::Database,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "polymarket-agent")]
#[command(about = "Signal-to-trade strategy agent for prediction markets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path; default locations are searched when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Agent id, overrides agent.id from the config
    #[arg(short, long)]
    agent: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent loop until stopped
    Run,
    /// Pause trading; the agent keeps its heartbeat
    Pause,
    /// Resume a paused agent
    Resume,
    /// Switch dry-run on or off
    DryRun {
        #[arg(value_parser = ["on", "off"])]
        mode: String,
    },
    /// Ask the agent to exit after its current cycle
    Stop,
    /// Show every agent record and the exposure ledger
    Status,
    /// Show the latest audited decisions
    Decisions {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Book a closed or resolved position against the shared ledger
    Settle {
        /// Exposure the position held, in USDC
        #[arg(long)]
        size: Decimal,
        /// Realized profit, negative for a loss
        #[arg(long, allow_negative_numbers = true)]
        pnl: Decimal,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    if let Some(id) = cli.agent {
        config.agent.id = id;
    }

    let db = Database::connect(&config.database.path).await?;

    match cli.command {
        Commands::Run => run_agent(config, db).await,
        Commands::Pause => control(&config, &db, ControlCommand::Pause).await,
        Commands::Resume => control(&config, &db, ControlCommand::Resume).await,
        Commands::DryRun { mode } => control(&config, &db, ControlCommand::SetDryRun(mode == "on")).await,
        Commands::Stop => control(&config, &db, ControlCommand::Stop).await,
        Commands::Status => show_status(&config, &db).await,
        Commands::Decisions { limit } => show_decisions(&db, limit).await,
        Commands::Settle { size, pnl } => settle(&config, &db, size, pnl).await,
    }
}

async fn run_agent(config: Config, db: Database) -> anyhow::Result<()> {
    let paper: Arc<dyn OrderExecutor> = Arc::new(PaperExecutor::new(config.agent.paper_balance));
    let executor: Arc<dyn OrderExecutor> = match &config.execution.gateway_url {
        Some(url) => Arc::new(HttpExecutor::new(url, &config.execution)?),
        None => {
            tracing::warn!("No execution.gateway_url set, live mode will paper trade");
            paper.clone()
        }
    };

    let db = Arc::new(db);
    let deps = AgentDeps {
        markets: Arc::new(GammaClient::new(&config.markets)?),
        live_feed: Arc::new(LiveScoreClient::new(&config.live_feed)?),
        executor,
        paper,
        store: db.clone(),
        db,
    };

    let mut agent = StrategyAgent::new(&config, deps, Utc::now())?;
    agent.run().await?;
    Ok(())
}

async fn control(config: &Config, db: &Database, command: ControlCommand) -> anyhow::Result<()> {
    let state = db.apply_control(&config.agent.id, command, Utc::now()).await?;
    println!(
        "Agent {}: running={} dry_run={} stop_requested={}",
        state.agent_id, state.running, state.dry_run, state.stop_requested
    );
    Ok(())
}

async fn settle(config: &Config, db: &Database, size: Decimal, pnl: Decimal) -> anyhow::Result<()> {
    if size < Decimal::ZERO {
        anyhow::bail!("settled size must not be negative, got {}", size);
    }
    let ledger = RiskEngine::new(config.risk.clone())
        .settle(size, pnl, db, Utc::now())
        .await?;
    println!(
        "Settled {} (PnL {}): exposure ${:.2}, realized today ${:.2}",
        size, pnl, ledger.exposure, ledger.realized_pnl_today
    );
    Ok(())
}

async fn show_status(config: &Config, db: &Database) -> anyhow::Result<()> {
    let now = Utc::now();
    let guard = RedemptionGuard::new(chrono::Duration::seconds(config.agent.heartbeat_stale_secs));
    let agents = db.list_agents().await?;

    println!("\nAgents\n");
    println!(
        "{:<16} {:>8} {:>8} {:>10} {:>8} {:>10} {:>8}  {}",
        "Id", "Running", "DryRun", "Heartbeat", "Calls/h", "Decisions", "Orders", "Redeem"
    );
    println!("{}", "-".repeat(90));
    for state in &agents {
        let heartbeat = state
            .heartbeat_age(now)
            .map(|age| format!("{}s ago", age.num_seconds()))
            .unwrap_or_else(|| "never".to_string());
        let redeem = match guard.check(state, now) {
            Ok(()) => "ok".to_string(),
            Err(block) => format!("{:?}", block),
        };
        println!(
            "{:<16} {:>8} {:>8} {:>10} {:>8} {:>10} {:>8}  {}",
            state.agent_id,
            state.running,
            state.dry_run,
            heartbeat,
            state.requests_this_hour,
            state.decisions,
            format!("{}/{}", state.orders_submitted, state.orders_failed),
            redeem
        );
    }

    let ledger = db.load_ledger(now).await?;
    println!("\nExposure ledger ({})\n", ledger.trading_day);
    println!("Exposure:        ${:.2}", ledger.exposure);
    println!("Realized today:  ${:.2}", ledger.realized_pnl_today);
    println!("Day start:       ${:.2}", ledger.day_start_balance);
    if ledger.day_start_balance > Decimal::ZERO {
        println!(
            "Drawdown:        {:.2}%",
            -ledger.realized_pnl_today / ledger.day_start_balance * Decimal::ONE_HUNDRED
        );
    }

    let counts = db.decision_counts().await?;
    if !counts.is_empty() {
        println!("\nDecisions");
        for (conclusion, n) in counts {
            println!("  {:<8} {}", conclusion.as_str(), n);
        }
    }

    Ok(())
}

async fn show_decisions(db: &Database, limit: usize) -> anyhow::Result<()> {
    let decisions = db.recent(limit).await?;

    println!(
        "{:<20} {:<16} {:<10} {:<8} {:>6}  {}",
        "Time", "Market", "Source", "Result", "Conf", "Rationale"
    );
    println!("{}", "-".repeat(100));
    for d in decisions {
        let market = if d.market_id.chars().count() > 15 {
            format!("{}…", d.market_id.chars().take(14).collect::<String>())
        } else {
            d.market_id.clone()
        };
        println!(
            "{:<20} {:<16} {:<10} {:<8} {:>5.0}%  {}",
            d.created_at.format("%Y-%m-%d %H:%M:%S"),
            market,
            d.source.as_str(),
            d.conclusion.as_str(),
            d.confidence * Decimal::ONE_HUNDRED,
            d.rationale
        );
    }

    Ok(())
}
