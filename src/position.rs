// 4.0: leveraged long position. pnl is paid in collateral units:
// pnl = size * (price - entry) / price. funding accrues against the cumulative index.
// a position is never mutated in place; adjust replaces it with a fresh baseline.

use crate::funding::accrued_funding;
use crate::math::{mul_div_down, round_up};
use crate::types::{Leverage, Price, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub entry_price: Price,
    pub margin_deposited: Decimal,
    pub additional_size: Decimal,
    pub entry_cumulative_funding: Decimal,
    pub opened_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Position {
    pub fn new(
        entry_price: Price,
        margin_deposited: Decimal,
        additional_size: Decimal,
        entry_cumulative_funding: Decimal,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            entry_price,
            margin_deposited,
            additional_size,
            entry_cumulative_funding,
            opened_at: timestamp,
            updated_at: timestamp,
        }
    }

    // 4.1: paper gains/losses at price, in collateral
    pub fn profit_loss(&self, price: Price) -> Decimal {
        calculate_profit_loss(self.additional_size, self.entry_price, price)
    }

    pub fn accrued_funding(&self, next_cumulative_funding: Decimal) -> Decimal {
        accrued_funding(
            self.additional_size,
            self.entry_cumulative_funding,
            next_cumulative_funding,
        )
    }

    pub fn summary(&self, price: Price, next_cumulative_funding: Decimal) -> PositionSummary {
        let profit_loss = self.profit_loss(price);
        let accrued_funding = self.accrued_funding(next_cumulative_funding);
        PositionSummary {
            profit_loss,
            accrued_funding,
            settled_margin: self.margin_deposited + profit_loss + accrued_funding,
        }
    }

    // size * entry price, the position's share of the aggregate pnl baseline
    pub fn entry_notional(&self) -> Decimal {
        self.additional_size * self.entry_price.value()
    }

    pub fn leverage(&self) -> Option<Leverage> {
        Leverage::from_margin_and_size(self.margin_deposited, self.additional_size)
    }

    // the same exposure restarted at `price` with everything accrued folded into margin
    pub fn rebaseline(
        &self,
        price: Price,
        cumulative_funding: Decimal,
        timestamp: Timestamp,
    ) -> (Position, PositionSummary) {
        let summary = self.summary(price, cumulative_funding);
        let rebased = Position {
            entry_price: price,
            margin_deposited: summary.settled_margin,
            additional_size: self.additional_size,
            entry_cumulative_funding: cumulative_funding,
            opened_at: self.opened_at,
            updated_at: timestamp,
        };
        (rebased, summary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSummary {
    pub profit_loss: Decimal,
    pub accrued_funding: Decimal,
    // margin + pnl + funding. may be negative for an underwater position
    pub settled_margin: Decimal,
}

// 4.2: the pnl formula, floored. size * (price - entry) / price
pub fn calculate_profit_loss(size: Decimal, entry_price: Price, price: Price) -> Decimal {
    mul_div_down(
        price.value() - entry_price.value(),
        size,
        price.value(),
    )
}

// 4.3: aggregate pnl of all longs since the last re-baseline of the global totals.
// summing size * entry over positions makes the increments telescope: realized in
// steps, a position's share always adds up to its own pnl at the final price.
// rounded up so the margin total never holds less than the positions' claims.
pub fn calculate_profit_loss_total(entry_notional_total: Decimal, reference_price: Price, price: Price) -> Decimal {
    let moved = price.value() - reference_price.value();
    round_up(entry_notional_total * moved / reference_price.value() / price.value())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageParams {
    pub leverage_min: Decimal,
    pub leverage_max: Decimal,
    pub margin_min: Decimal,
    // fraction of size charged to the pool on every size change
    pub trading_fee_ratio: Decimal,
}

impl Default for LeverageParams {
    fn default() -> Self {
        Self {
            leverage_min: dec!(1.5),
            leverage_max: dec!(25),
            margin_min: dec!(0.05),
            trading_fee_ratio: dec!(0.001),
        }
    }
}

impl LeverageParams {
    pub fn trade_fee(&self, size: Decimal) -> Decimal {
        crate::math::round_up(size.abs() * self.trading_fee_ratio)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeverageViolation {
    MarginTooSmall { margin: Decimal, minimum: Decimal },
    LeverageTooLow { leverage: Decimal, minimum: Decimal },
    LeverageTooHigh { leverage: Decimal, maximum: Decimal },
}

// 4.4: leverage = (margin + size) / margin must sit in [min, max] and margin >= margin_min
pub fn check_leverage_criteria(
    margin: Decimal,
    size: Decimal,
    params: &LeverageParams,
) -> Result<(), LeverageViolation> {
    if margin < params.margin_min || margin <= Decimal::ZERO {
        return Err(LeverageViolation::MarginTooSmall {
            margin,
            minimum: params.margin_min,
        });
    }
    // overflow means far past any leverage cap
    let leverage = margin
        .checked_add(size)
        .and_then(|notional| notional.checked_div(margin))
        .unwrap_or(Decimal::MAX);
    if leverage < params.leverage_min {
        return Err(LeverageViolation::LeverageTooLow {
            leverage,
            minimum: params.leverage_min,
        });
    }
    if leverage > params.leverage_max {
        return Err(LeverageViolation::LeverageTooHigh {
            leverage,
            maximum: params.leverage_max,
        });
    }
    Ok(())
}
