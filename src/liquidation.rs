//! Liquidation conditions and the approximate liquidation price.
//!
//! A position is liquidatable once its settled margin (margin + pnl + funding)
//! no longer covers the liquidation margin: a size-proportional buffer plus the
//! fee the liquidator is paid. The fee is set in the quote unit and clamped to
//! fixed bounds, then converted back to collateral at the current price.

use crate::math::{clamp, round_up};
use crate::position::Position;
use crate::types::Price;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationParams {
    /// Fraction of size kept as a buffer on top of the fee.
    pub buffer_ratio: Decimal,
    /// Fraction of notional paid to the liquidator.
    pub fee_ratio: Decimal,
    /// Fee floor in the quote unit.
    pub fee_lower_bound: Decimal,
    /// Fee ceiling in the quote unit.
    pub fee_upper_bound: Decimal,
}

impl Default for LiquidationParams {
    fn default() -> Self {
        Self {
            buffer_ratio: dec!(0.005),
            fee_ratio: dec!(0.002),
            fee_lower_bound: dec!(4),
            fee_upper_bound: dec!(100),
        }
    }
}

/// Liquidator fee in collateral: clamp(size * ratio * price, lower, upper) / price.
pub fn liquidation_fee(size: Decimal, price: Price, params: &LiquidationParams) -> Decimal {
    let quote_fee = clamp(
        size * params.fee_ratio * price.value(),
        params.fee_lower_bound,
        params.fee_upper_bound,
    );
    round_up(quote_fee / price.value())
}

pub fn liquidation_buffer(size: Decimal, params: &LiquidationParams) -> Decimal {
    round_up(size * params.buffer_ratio)
}

/// Minimum settled margin a position must keep to stay open.
pub fn liquidation_margin(size: Decimal, price: Price, params: &LiquidationParams) -> Decimal {
    liquidation_buffer(size, params) + liquidation_fee(size, price, params)
}

/// True iff settled margin <= liquidation margin. Zero-size positions never qualify.
pub fn can_liquidate(
    position: &Position,
    price: Price,
    next_cumulative_funding: Decimal,
    params: &LiquidationParams,
) -> bool {
    if position.additional_size.is_zero() {
        return false;
    }
    let settled = position.summary(price, next_cumulative_funding).settled_margin;
    settled <= liquidation_margin(position.additional_size, price, params)
}

/// Price at which settled margin meets liquidation margin.
///
/// Solves margin + funding + size - size * entry / p = liq_margin for p, with the
/// liquidation margin evaluated at `current_price`. Approximate: fee clamping makes
/// the real threshold non-linear for very large positions. Returns zero when the
/// equation has no positive solution or the position has no size.
pub fn approx_liquidation_price(
    position: &Position,
    next_cumulative_funding: Decimal,
    current_price: Price,
    params: &LiquidationParams,
) -> Decimal {
    let size = position.additional_size;
    if size.is_zero() {
        return Decimal::ZERO;
    }

    let liq_margin = liquidation_margin(size, current_price, params);
    let funding = position.accrued_funding(next_cumulative_funding);
    let denominator = position.margin_deposited + funding + size - liq_margin;
    if denominator <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let result = position.entry_price.value() * size / denominator;
    if result > Decimal::ZERO {
        result
    } else {
        Decimal::ZERO
    }
}
