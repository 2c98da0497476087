//! Strategy agent loop
//!
//! One cycle: read coordination state, fetch markets, poll the live feed if
//! the budget allows, match, scan for edges, decide, size, reserve exposure,
//! execute, write progress. Nothing inside a cycle stops the process; only a
//! stop request or Ctrl-C does.

#[cfg(test)]
mod tests;

use crate::client::{LiveEventSource, MarketSource, OrderExecutor};
use crate::config::{AgentConfig, Config};
use crate::coordination::{load_or_register, ControlCommand, CoordinationStore};
use crate::error::Result;
use crate::gate::DecisionGate;
use crate::matcher::EventMatcher;
use crate::poller::{AdaptivePoller, BudgetSnapshot, PollOutcome};
use crate::risk::{Reservation, RiskEngine, RiskRejection};
use crate::storage::{Database, OrderRecord};
use crate::strategy::{EdgeCalculator, FeedImpliedEstimator};
use crate::types::{Decision, Opportunity, OrderIntent};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// External collaborators an agent runs against
pub struct AgentDeps {
    pub markets: Arc<dyn MarketSource>,
    pub live_feed: Arc<dyn LiveEventSource>,
    /// Used when the agent record is not in dry-run
    pub executor: Arc<dyn OrderExecutor>,
    /// Used in dry-run
    pub paper: Arc<dyn OrderExecutor>,
    /// Agent records and the exposure ledger
    pub store: Arc<dyn CoordinationStore>,
    /// Decision audit and order records
    pub db: Arc<Database>,
}

/// What one cycle did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub paused: bool,
    pub stop_requested: bool,
    pub dry_run: bool,
    pub markets: usize,
    pub live_events: usize,
    pub poll: Option<PollOutcome>,
    pub matched: usize,
    pub opportunities: usize,
    pub near_misses: usize,
    pub decisions: Vec<Decision>,
    pub intents: Vec<OrderIntent>,
    pub rejections: Vec<(String, RiskRejection)>,
    pub orders_submitted: usize,
    pub orders_failed: usize,
}

pub struct StrategyAgent {
    config: AgentConfig,
    markets: Arc<dyn MarketSource>,
    live_feed: Arc<dyn LiveEventSource>,
    executor: Arc<dyn OrderExecutor>,
    paper: Arc<dyn OrderExecutor>,
    store: Arc<dyn CoordinationStore>,
    db: Arc<Database>,
    poller: AdaptivePoller,
    matcher: EventMatcher,
    edges: EdgeCalculator,
    gate: DecisionGate,
    risk: RiskEngine,
    budget_restored: bool,
}

impl StrategyAgent {
    pub fn new(config: &Config, deps: AgentDeps, now: DateTime<Utc>) -> Result<Self> {
        let gate = DecisionGate::from_config(config, deps.db.clone())?;
        Ok(Self {
            config: config.agent.clone(),
            markets: deps.markets,
            live_feed: deps.live_feed,
            executor: deps.executor,
            paper: deps.paper,
            store: deps.store,
            db: deps.db,
            poller: AdaptivePoller::new(&config.poller, now),
            matcher: EventMatcher::new(&config.matcher),
            edges: EdgeCalculator::new(config.edge.clone(), Arc::new(FeedImpliedEstimator)),
            gate,
            risk: RiskEngine::new(config.risk.clone()),
            budget_restored: false,
        })
    }

    pub fn poller(&self) -> &AdaptivePoller {
        &self.poller
    }

    /// Run cycles until a stop request or Ctrl-C
    pub async fn run(&mut self) -> Result<()> {
        let now = Utc::now();
        let state = load_or_register(self.store.as_ref(), &self.config.id, self.config.dry_run, now).await?;
        if state.stop_requested {
            self.store
                .apply_control(&self.config.id, ControlCommand::ClearStop, now)
                .await?;
        }
        info!(
            "Agent {} starting (dry_run={}, tiers={:?})",
            self.config.id,
            state.dry_run,
            self.gate.tier_names()
        );

        loop {
            let paused = match self.run_cycle(Utc::now()).await {
                Ok(report) if report.stop_requested => {
                    info!("Stop requested, agent {} exiting", self.config.id);
                    break;
                }
                Ok(report) => report.paused,
                Err(e) => {
                    error!("Cycle failed: {}", e);
                    false
                }
            };

            let base = if paused {
                self.config.paused_poll_secs
            } else {
                self.config.cycle_interval_secs
            };
            let jitter = rand::rng().random_range(0..=self.config.cycle_jitter_ms);
            let sleep = Duration::from_secs(base) + Duration::from_millis(jitter);

            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, agent {} exiting", self.config.id);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Execute one scan cycle at `now`
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport> {
        let mut state = load_or_register(self.store.as_ref(), &self.config.id, self.config.dry_run, now).await?;
        if !self.budget_restored {
            self.poller.restore(BudgetSnapshot {
                calls_this_hour: state.requests_this_hour,
                window_start: state.hour_window_start,
            });
            self.budget_restored = true;
        }

        let mut report = CycleReport {
            paused: state.is_paused(),
            stop_requested: state.stop_requested,
            dry_run: state.dry_run,
            ..CycleReport::default()
        };

        if state.stop_requested || state.is_paused() {
            debug!("Agent {} paused, skipping cycle", self.config.id);
            state.heartbeat = Some(now);
            self.store.save_progress(&state).await?;
            return Ok(report);
        }

        let executor = if state.dry_run {
            self.paper.clone()
        } else {
            self.executor.clone()
        };

        let mut balance = match executor.balance().await {
            Ok(b) => b,
            Err(e) => {
                warn!("Balance unavailable, no orders this cycle: {}", e);
                Decimal::ZERO
            }
        };
        let mut ledger = self.risk.open_day(balance, self.store.as_ref(), now).await?;

        let markets = match self.markets.open_markets().await {
            Ok(markets) => markets,
            Err(e) => {
                warn!("Market fetch failed, empty cycle: {}", e);
                Vec::new()
            }
        };
        report.markets = markets.len();

        let poll = self.poller.poll_live_events(self.live_feed.as_ref(), now).await;
        report.live_events = poll.events.len();
        report.poll = Some(poll.outcome.clone());

        let matches = self.matcher.match_cycle(&markets, &poll.events);
        report.matched = matches.iter().filter(|m| m.is_matched()).count();

        let scan = self.edges.scan(&markets, &matches);
        report.opportunities = scan.opportunities.len();
        report.near_misses = scan.near_misses.len();

        for opportunity in &scan.opportunities {
            let decision = self.gate.decide_at(opportunity, now).await;
            if decision.is_bet() {
                let account = RiskEngine::account_state(&ledger, balance);
                match self.risk.size_order_at(&decision, opportunity, &account, now) {
                    Ok(intent) => {
                        match self.risk.reserve(&intent, balance, self.store.as_ref(), now).await {
                            Ok(Reservation::Reserved(next)) => {
                                ledger = next;
                                if self.execute(executor.as_ref(), &intent, opportunity, &mut report).await {
                                    balance -= intent.size;
                                } else {
                                    match self.risk.release(intent.size, self.store.as_ref(), now).await {
                                        Ok(next) => ledger = next,
                                        // stays reserved until settled
                                        Err(e) => warn!(intent = ?intent, "Exposure release failed: {}", e),
                                    }
                                }
                                report.intents.push(intent);
                            }
                            Ok(Reservation::Rejected(rejection)) => {
                                self.note_rejection(&decision, rejection, &mut report);
                            }
                            Err(e) => warn!("Exposure reservation failed for {}: {}", intent.market_id, e),
                        }
                    }
                    Err(rejection) => self.note_rejection(&decision, rejection, &mut report),
                }
            }
            report.decisions.push(decision);
        }

        let budget = self.poller.budget().snapshot();
        state.heartbeat = Some(now);
        state.requests_this_hour = budget.calls_this_hour;
        state.hour_window_start = budget.window_start;
        state.cycles += 1;
        state.decisions += report.decisions.len() as u64;
        state.orders_submitted += report.orders_submitted as u64;
        state.orders_failed += report.orders_failed as u64;
        state.near_misses += report.near_misses as u64;
        self.store.save_progress(&state).await?;

        info!(
            "Cycle done: {} markets, {} live events ({}), {} matched, {} opportunities, {} decisions, {} orders ({} failed)",
            report.markets,
            report.live_events,
            poll.tier,
            report.matched,
            report.opportunities,
            report.decisions.len(),
            report.orders_submitted,
            report.orders_failed
        );

        Ok(report)
    }

    fn note_rejection(&self, decision: &Decision, rejection: RiskRejection, report: &mut CycleReport) {
        info!(
            market_id = %decision.market_id,
            reason = rejection.reason(),
            "Risk rejected BET: {}",
            rejection
        );
        report.rejections.push((decision.market_id.clone(), rejection));
    }

    /// Submit one intent. Failures are logged with the full intent and stored, never retried.
    async fn execute(
        &self,
        executor: &dyn OrderExecutor,
        intent: &OrderIntent,
        opportunity: &Opportunity,
        report: &mut CycleReport,
    ) -> bool {
        let (record, ok) = match executor.submit(intent).await {
            Ok(execution) => {
                info!(
                    "Order {} on {} ({:?}): {} USDC at {} [{}]",
                    execution.order_id,
                    intent.market_id,
                    intent.side,
                    intent.size,
                    intent.price,
                    opportunity.source.as_str()
                );
                report.orders_submitted += 1;
                (
                    OrderRecord::from_intent(intent, &execution.status, Some(execution.order_id), None),
                    true,
                )
            }
            Err(e) => {
                error!(intent = ?intent, "Order submission failed: {}", e);
                report.orders_failed += 1;
                (OrderRecord::from_intent(intent, "failed", None, Some(e.to_string())), false)
            }
        };

        if let Err(e) = self.db.save_order(&record).await {
            warn!("Failed to store order record for {}: {}", intent.market_id, e);
        }
        ok
    }
}
