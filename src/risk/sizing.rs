//! Capped fractional-Kelly order sizing

use super::RiskRejection;
use crate::config::RiskConfig;
use rust_decimal::{Decimal, RoundingStrategy};

/// Inputs for one sizing calculation
#[derive(Debug, Clone)]
pub struct SizeRequest {
    pub balance: Decimal,
    /// Non-negative edge the trade captures
    pub edge: Decimal,
    /// Price paid per share (price sum for arbitrage)
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizeResult {
    /// Order size in USDC
    pub size: Decimal,
    /// Uncapped Kelly fraction of balance
    pub kelly_fraction: Decimal,
    pub was_capped: bool,
    /// Raised to the minimum viable size
    pub was_floored: bool,
}

pub struct KellySizer {
    kelly_fraction: Decimal,
    max_fraction_per_trade: Decimal,
    min_trade_size: Decimal,
}

impl KellySizer {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            kelly_fraction: config.kelly_fraction,
            max_fraction_per_trade: config.max_fraction_per_trade,
            min_trade_size: config.min_trade_size,
        }
    }

    /// Net odds of a binary share bought at `price`: win (1 - p) per p staked
    pub fn odds(price: Decimal) -> Option<Decimal> {
        if price <= Decimal::ZERO || price >= Decimal::ONE {
            return None;
        }
        Some((Decimal::ONE - price) / price)
    }

    /// `balance * min(kelly * edge / odds, max_fraction)`, floored at the
    /// minimum trade size. Rejects when even the cap cannot reach the minimum.
    pub fn size(&self, request: &SizeRequest) -> Result<SizeResult, RiskRejection> {
        let odds = Self::odds(request.price).ok_or(RiskRejection::InvalidPrice {
            price: request.price,
        })?;
        if request.edge <= Decimal::ZERO {
            return Err(RiskRejection::NoEdge);
        }

        let kelly = self.kelly_fraction * request.edge / odds;
        let fraction = kelly.min(self.max_fraction_per_trade);
        let cap = request.balance * self.max_fraction_per_trade;

        if cap < self.min_trade_size {
            return Err(RiskRejection::BelowMinimum {
                size: cap,
                minimum: self.min_trade_size,
            });
        }

        // cents, never rounding up past the cap
        let raw = (request.balance * fraction).round_dp_with_strategy(2, RoundingStrategy::ToZero);
        let size = raw.max(self.min_trade_size);

        Ok(SizeResult {
            size,
            kelly_fraction: kelly,
            was_capped: kelly > self.max_fraction_per_trade,
            was_floored: raw < self.min_trade_size,
        })
    }
}
