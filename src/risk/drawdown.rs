//! Daily drawdown circuit breaker

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

/// Halts new sizing once today's realized loss reaches the limit.
///
/// Once tripped the breaker stays latched, even if P&L recovers, until
/// `reset` is called or the UTC day changes.
#[derive(Debug, Clone)]
pub struct DrawdownBreaker {
    /// Maximum daily loss as a fraction (e.g., 0.10 = 10%)
    max_drawdown_pct: Decimal,
    tripped_on: Option<NaiveDate>,
}

impl DrawdownBreaker {
    pub fn new(max_drawdown_pct: Decimal) -> Self {
        Self {
            max_drawdown_pct,
            tripped_on: None,
        }
    }

    /// Today's drawdown as a fraction of the day start balance
    pub fn drawdown(realized_pnl_today: Decimal, day_start_balance: Decimal) -> Decimal {
        if realized_pnl_today >= Decimal::ZERO || day_start_balance <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        realized_pnl_today.abs() / day_start_balance
    }

    /// Evaluate and latch. Returns true while trading is halted.
    pub fn check(
        &mut self,
        realized_pnl_today: Decimal,
        day_start_balance: Decimal,
        now: DateTime<Utc>,
    ) -> bool {
        let today = now.date_naive();
        if let Some(day) = self.tripped_on {
            if day == today {
                return true;
            }
            tracing::info!("Drawdown breaker released on new trading day {}", today);
            self.tripped_on = None;
        }

        let drawdown = Self::drawdown(realized_pnl_today, day_start_balance);
        if drawdown >= self.max_drawdown_pct {
            tracing::warn!(
                "Drawdown breaker tripped: {:.2}% lost today (limit {:.2}%)",
                drawdown * Decimal::ONE_HUNDRED,
                self.max_drawdown_pct * Decimal::ONE_HUNDRED
            );
            self.tripped_on = Some(today);
            return true;
        }
        false
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped_on.is_some()
    }

    /// Manual reset
    pub fn reset(&mut self) {
        self.tripped_on = None;
    }

    /// Remaining loss budget before the breaker trips
    pub fn remaining_loss_budget(&self, realized_pnl_today: Decimal, day_start_balance: Decimal) -> Decimal {
        let max_loss = day_start_balance * self.max_drawdown_pct;
        if realized_pnl_today >= Decimal::ZERO {
            max_loss
        } else {
            (max_loss - realized_pnl_today.abs()).max(Decimal::ZERO)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn noon(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_profit_never_trips() {
        let mut breaker = DrawdownBreaker::new(dec!(0.10));
        assert!(!breaker.check(dec!(50), dec!(1000), noon(1)));
        assert_eq!(DrawdownBreaker::drawdown(dec!(50), dec!(1000)), Decimal::ZERO);
    }

    #[test]
    fn test_trips_at_limit() {
        let mut breaker = DrawdownBreaker::new(dec!(0.10));
        assert!(!breaker.check(dec!(-50), dec!(1000), noon(1)));
        assert!(breaker.check(dec!(-100), dec!(1000), noon(1)));
        assert!(breaker.is_tripped());
    }

    #[test]
    fn test_latches_until_reset() {
        let mut breaker = DrawdownBreaker::new(dec!(0.10));
        assert!(breaker.check(dec!(-150), dec!(1000), noon(1)));
        // recovery the same day does not release it
        assert!(breaker.check(dec!(20), dec!(1000), noon(1)));

        breaker.reset();
        assert!(!breaker.check(dec!(20), dec!(1000), noon(1)));
    }

    #[test]
    fn test_releases_on_new_day() {
        let mut breaker = DrawdownBreaker::new(dec!(0.10));
        assert!(breaker.check(dec!(-150), dec!(1000), noon(1)));
        assert!(!breaker.check(Decimal::ZERO, dec!(850), noon(2)));
        assert!(!breaker.is_tripped());
    }

    #[test]
    fn test_remaining_budget() {
        let breaker = DrawdownBreaker::new(dec!(0.10));
        assert_eq!(breaker.remaining_loss_budget(Decimal::ZERO, dec!(1000)), dec!(100));
        assert_eq!(breaker.remaining_loss_budget(dec!(-30), dec!(1000)), dec!(70));
        assert_eq!(breaker.remaining_loss_budget(dec!(-300), dec!(1000)), Decimal::ZERO);
    }

    #[test]
    fn test_no_start_balance_means_no_drawdown() {
        assert_eq!(DrawdownBreaker::drawdown(dec!(-10), Decimal::ZERO), Decimal::ZERO);
    }
}
