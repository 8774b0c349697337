// 5.0: dynamic funding. skew between longs and the pool drives a funding *velocity*;
// the rate drifts at that velocity and longs pay the pool (or receive from it)
// the time integral of the rate. everything here is pure math over FundingState.
// 5.0 has the params/state structs. 5.1+ has the rate calculation logic.

use crate::math::{clamp, mul_down, round_down};
use crate::types::Timestamp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingParams {
    // max change of the daily rate per day
    pub max_funding_velocity: Decimal,
    // proportional skew at which velocity saturates. zero disables the cap.
    pub max_velocity_skew: Decimal,
}

impl Default for FundingParams {
    fn default() -> Self {
        Self {
            max_funding_velocity: dec!(0.003),
            max_velocity_skew: dec!(0.1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingState {
    pub cumulative_funding_rate: Decimal,
    pub last_recomputed_rate: Decimal,
    pub last_recomputed_at: Timestamp,
}

impl FundingState {
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            cumulative_funding_rate: Decimal::ZERO,
            last_recomputed_rate: Decimal::ZERO,
            last_recomputed_at: timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FundingError {
    #[error("skew {skew} reported against an empty pool")]
    UnbackedSkew { skew: Decimal },
}

// 5.1: skew / pool, clamped to [-1, 1]. an empty pool must carry no skew.
pub fn proportional_skew(skew: Decimal, pool_total: Decimal) -> Result<Decimal, FundingError> {
    if pool_total > Decimal::ZERO {
        Ok(clamp(skew / pool_total, -Decimal::ONE, Decimal::ONE))
    } else if skew.is_zero() {
        Ok(Decimal::ZERO)
    } else {
        Err(FundingError::UnbackedSkew { skew })
    }
}

// 5.2: linear in skew up to max_velocity_skew, flat after
pub fn funding_velocity(proportional_skew: Decimal, params: &FundingParams) -> Decimal {
    let max = params.max_funding_velocity;
    if params.max_velocity_skew > Decimal::ZERO {
        let velocity = proportional_skew * max / params.max_velocity_skew;
        clamp(velocity, -max, max)
    } else {
        proportional_skew * max
    }
}

pub fn elapsed_fraction(since: Timestamp, now: Timestamp) -> Decimal {
    round_down(since.elapsed_days(&now))
}

pub fn funding_change_since_recomputed(
    proportional_skew: Decimal,
    since: Timestamp,
    now: Timestamp,
    params: &FundingParams,
) -> Decimal {
    mul_down(funding_velocity(proportional_skew, params), elapsed_fraction(since, now))
}

pub fn current_funding_rate(last_recomputed_rate: Decimal, funding_change: Decimal) -> Decimal {
    last_recomputed_rate + funding_change
}

// 5.3: trapezoid over the interval. the rate moves linearly between recomputes
// so the average of both ends is the exact integral.
pub fn unrecorded_funding(
    last_recomputed_rate: Decimal,
    current_rate: Decimal,
    since: Timestamp,
    now: Timestamp,
) -> Decimal {
    let average = (last_recomputed_rate + current_rate) / dec!(2);
    mul_down(average, elapsed_fraction(since, now))
}

pub fn next_cumulative_funding(cumulative_funding: Decimal, unrecorded: Decimal) -> Decimal {
    cumulative_funding + unrecorded
}

// 5.4: funding owed to (positive) or by (negative) a single position since its baseline.
// floored: the sum over positions can never exceed the aggregate.
pub fn accrued_funding(
    additional_size: Decimal,
    entry_cumulative_funding: Decimal,
    next_cumulative_funding: Decimal,
) -> Decimal {
    mul_down(additional_size, entry_cumulative_funding - next_cumulative_funding)
}

// aggregate transfer to all longs for one settlement interval. not rounded.
pub fn accrued_funding_total_by_longs(size_opened_total: Decimal, unrecorded: Decimal) -> Decimal {
    -(size_opened_total * unrecorded)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingRecompute {
    pub state: FundingState,
    pub current_rate: Decimal,
    pub unrecorded_funding: Decimal,
}

// 5.5: advances funding state to `now`. calling twice at the same instant is a no-op.
pub fn update_funding_state(
    state: &FundingState,
    skew: Decimal,
    pool_total: Decimal,
    now: Timestamp,
    params: &FundingParams,
) -> Result<FundingRecompute, FundingError> {
    let p_skew = proportional_skew(skew, pool_total)?;
    let since = state.last_recomputed_at;
    let change = funding_change_since_recomputed(p_skew, since, now, params);
    let current_rate = current_funding_rate(state.last_recomputed_rate, change);
    let unrecorded = unrecorded_funding(state.last_recomputed_rate, current_rate, since, now);

    Ok(FundingRecompute {
        state: FundingState {
            cumulative_funding_rate: next_cumulative_funding(state.cumulative_funding_rate, unrecorded),
            last_recomputed_rate: current_rate,
            last_recomputed_at: now,
        },
        current_rate,
        unrecorded_funding: unrecorded,
    })
}

pub fn annualized_funding_rate(daily_rate: Decimal) -> Decimal {
    daily_rate * dec!(365)
}
