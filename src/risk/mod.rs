//! Risk & sizing
//!
//! Turns BET decisions into order intents:
//! - drawdown circuit breaker on today's realized loss
//! - capped fractional-Kelly sizing with a minimum viable size
//! - balance reserve and portfolio exposure cap
//!
//! Exposure is committed to the shared ledger with an optimistic
//! compare-and-set so concurrent agents cannot jointly breach the cap.
//! The cap is a fraction of the day's starting equity, not of free cash,
//! so money moved into open positions is only counted once.

mod drawdown;
mod sizing;


pub use drawdown::DrawdownBreaker;
pub use sizing::{KellySizer, SizeRequest, SizeResult};

use crate::config::RiskConfig;
use crate::coordination::{CoordinationStore, ExposureLedger};
use crate::error::{BotError, Result};
use crate::types::{AccountState, Decision, Opportunity, OpportunitySource, OrderIntent};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why an order was not sized. A normal outcome, not a failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskRejection {
    #[error("decision is not a BET")]
    NotApproved,

    #[error("daily drawdown breaker is tripped")]
    DrawdownBreaker,

    #[error("no positive edge to size")]
    NoEdge,

    #[error("invalid entry price {price}")]
    InvalidPrice { price: Decimal },

    #[error("size {size} below minimum {minimum}")]
    BelowMinimum { size: Decimal, minimum: Decimal },

    #[error("size {size} exceeds available balance {available}")]
    InsufficientBalance { size: Decimal, available: Decimal },

    #[error("exposure {exposure} + {size} exceeds cap {cap}")]
    ExposureCap {
        exposure: Decimal,
        size: Decimal,
        cap: Decimal,
    },
}

impl RiskRejection {
    /// Short tag for logs and counters
    pub fn reason(&self) -> &'static str {
        match self {
            RiskRejection::NotApproved => "not_approved",
            RiskRejection::DrawdownBreaker => "drawdown_breaker",
            RiskRejection::NoEdge => "no_edge",
            RiskRejection::InvalidPrice { .. } => "invalid_price",
            RiskRejection::BelowMinimum { .. } => "min_size",
            RiskRejection::InsufficientBalance { .. } => "insufficient_balance",
            RiskRejection::ExposureCap { .. } => "exposure_cap",
        }
    }
}

/// Result of committing an intent to the shared ledger
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    Reserved(ExposureLedger),
    Rejected(RiskRejection),
}

pub struct RiskEngine {
    config: RiskConfig,
    sizer: KellySizer,
    breaker: DrawdownBreaker,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            sizer: KellySizer::new(&config),
            breaker: DrawdownBreaker::new(config.max_daily_drawdown_pct),
            config,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn account_state(ledger: &ExposureLedger, balance: Decimal) -> AccountState {
        AccountState {
            balance,
            exposure: ledger.exposure,
            realized_pnl_today: ledger.realized_pnl_today,
            day_start_balance: ledger.day_start_balance,
        }
    }

    pub fn size_order(
        &mut self,
        decision: &Decision,
        opportunity: &Opportunity,
        account: &AccountState,
    ) -> std::result::Result<OrderIntent, RiskRejection> {
        self.size_order_at(decision, opportunity, account, Utc::now())
    }

    /// Size a BET decision against the account, or say why not
    pub fn size_order_at(
        &mut self,
        decision: &Decision,
        opportunity: &Opportunity,
        account: &AccountState,
        now: DateTime<Utc>,
    ) -> std::result::Result<OrderIntent, RiskRejection> {
        if !decision.is_bet() {
            return Err(RiskRejection::NotApproved);
        }

        if self
            .breaker
            .check(account.realized_pnl_today, account.day_start_balance, now)
        {
            return Err(RiskRejection::DrawdownBreaker);
        }

        let (price, edge) = match (&opportunity.source, &opportunity.arbitrage) {
            (OpportunitySource::Arbitrage, Some(arb)) => (arb.price_sum, arb.profit),
            _ => (opportunity.entry_price, opportunity.effective_edge()),
        };

        let sized = self.sizer.size(&SizeRequest {
            balance: account.balance,
            edge,
            price,
        })?;

        let available = account.balance - self.config.min_balance_reserve;
        if sized.size > available {
            return Err(RiskRejection::InsufficientBalance {
                size: sized.size,
                available,
            });
        }

        let base = Self::cap_base(account.day_start_balance, account.balance);
        self.check_exposure(account.exposure, sized.size, base)?;

        debug!(
            "Sized {} on {}: kelly {:.4}, capped={}, floored={}",
            sized.size, opportunity.market.id, sized.kelly_fraction, sized.was_capped, sized.was_floored
        );

        Ok(OrderIntent {
            decision_id: decision.id,
            market_id: opportunity.market.id.clone(),
            side: opportunity.side,
            size: sized.size,
            price,
            edge,
            created_at: now,
        })
    }

    /// Day start equity, or the free balance before any agent opened the day
    fn cap_base(day_start_balance: Decimal, balance: Decimal) -> Decimal {
        if day_start_balance > Decimal::ZERO {
            day_start_balance
        } else {
            balance
        }
    }

    fn check_exposure(
        &self,
        exposure: Decimal,
        size: Decimal,
        base: Decimal,
    ) -> std::result::Result<(), RiskRejection> {
        let cap = base * self.config.max_exposure_pct;
        if exposure + size > cap {
            return Err(RiskRejection::ExposureCap { exposure, size, cap });
        }
        Ok(())
    }

    pub fn reset_breaker(&mut self) {
        self.breaker.reset();
        info!("Drawdown breaker reset");
    }

    pub fn breaker_tripped(&self) -> bool {
        self.breaker.is_tripped()
    }

    /// Commit the intent's size to the shared exposure ledger.
    ///
    /// The cap is re-checked against the freshest ledger on every attempt, so
    /// exposure added by another agent since sizing can still reject.
    pub async fn reserve(
        &self,
        intent: &OrderIntent,
        balance: Decimal,
        store: &dyn CoordinationStore,
        now: DateTime<Utc>,
    ) -> Result<Reservation> {
        for attempt in 1..=self.config.reserve_attempts.max(1) {
            let ledger = store.load_ledger(now).await?;
            let base = Self::cap_base(ledger.day_start_balance, balance);
            if let Err(rejection) = self.check_exposure(ledger.exposure, intent.size, base) {
                return Ok(Reservation::Rejected(rejection));
            }

            let mut next = ledger.clone();
            next.roll_day(now, balance);
            next.exposure += intent.size;

            if store.compare_and_set_ledger(ledger.version, &next).await? {
                next.version = ledger.version + 1;
                return Ok(Reservation::Reserved(next));
            }
            debug!("Exposure ledger moved under us (attempt {}), retrying", attempt);
        }

        warn!("Gave up reserving {} for {}", intent.size, intent.market_id);
        Err(BotError::StateConflict(format!(
            "exposure ledger contended after {} attempts",
            self.config.reserve_attempts
        )))
    }

    /// Give back exposure reserved for an order that never filled
    pub async fn release(
        &self,
        size: Decimal,
        store: &dyn CoordinationStore,
        now: DateTime<Utc>,
    ) -> Result<ExposureLedger> {
        self.update_ledger(store, now, "release", |ledger| {
            ledger.exposure = (ledger.exposure - size).max(Decimal::ZERO);
        })
        .await
    }

    /// Close out a position: free its exposure and book its realized PnL,
    /// which is what the drawdown breaker reads on the next sizing.
    pub async fn settle(
        &self,
        size: Decimal,
        pnl: Decimal,
        store: &dyn CoordinationStore,
        now: DateTime<Utc>,
    ) -> Result<ExposureLedger> {
        let ledger = self
            .update_ledger(store, now, "settle", |ledger| ledger.settle(now, size, pnl))
            .await?;
        info!(
            "Settled {} with PnL {}: exposure {}, realized today {}",
            size, pnl, ledger.exposure, ledger.realized_pnl_today
        );
        Ok(ledger)
    }

    async fn update_ledger<F>(
        &self,
        store: &dyn CoordinationStore,
        now: DateTime<Utc>,
        action: &str,
        apply: F,
    ) -> Result<ExposureLedger>
    where
        F: Fn(&mut ExposureLedger) + Send + Sync,
    {
        for _ in 0..self.config.reserve_attempts.max(1) {
            let ledger = store.load_ledger(now).await?;
            let mut next = ledger.clone();
            apply(&mut next);

            if store.compare_and_set_ledger(ledger.version, &next).await? {
                next.version = ledger.version + 1;
                return Ok(next);
            }
        }

        Err(BotError::StateConflict(format!("exposure ledger contended on {}", action)))
    }

    /// Refresh the ledger's trading day, recording the day start equity.
    /// Without a balance there is nothing to open the day with.
    pub async fn open_day(
        &self,
        balance: Decimal,
        store: &dyn CoordinationStore,
        now: DateTime<Utc>,
    ) -> Result<ExposureLedger> {
        let ledger = store.load_ledger(now).await?;
        if balance <= Decimal::ZERO {
            return Ok(ledger);
        }
        let mut next = ledger.clone();
        let rolled = next.roll_day(now, balance);
        let unset = next.day_start_balance <= Decimal::ZERO;
        if !rolled && !unset {
            return Ok(ledger);
        }
        if unset {
            next.day_start_balance = balance + next.exposure;
        }

        if store.compare_and_set_ledger(ledger.version, &next).await? {
            info!(
                "Trading day {} opened with equity {}",
                next.trading_day, next.day_start_balance
            );
            next.version = ledger.version + 1;
            return Ok(next);
        }
        // someone else opened the day first
        store.load_ledger(now).await
    }
}
