//! Delayed and limit order records.
//!
//! Every user action is announced first and executed by a keeper later. The
//! record carries the intent, the keeper fee the user committed to, and the
//! window in which a keeper may execute it. Limit orders hang off a position
//! instead of an account and carry a stop-loss / take-profit pair.

use crate::types::{AccountId, PositionId, Price, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tag of an announced action, used in events and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    StableDeposit,
    StableWithdraw,
    LeverageOpen,
    LeverageAdjust,
    LeverageClose,
}

/// Type-specific payload of a delayed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    StableDeposit {
        deposit_amount: Decimal,
        /// Fewest pool shares the depositor accepts.
        min_amount_out: Decimal,
    },
    StableWithdraw {
        /// Pool shares to burn.
        withdraw_amount: Decimal,
        /// Least collateral the withdrawer accepts after fees.
        min_amount_out: Decimal,
    },
    LeverageOpen {
        margin: Decimal,
        additional_size: Decimal,
        max_fill_price: Price,
        trade_fee: Decimal,
    },
    LeverageAdjust {
        position: PositionId,
        margin_adjustment: Decimal,
        additional_size_adjustment: Decimal,
        /// Upper bound when size grows, lower bound when it shrinks.
        fill_price: Price,
        trade_fee: Decimal,
        /// trade fee + keeper fee
        total_fee: Decimal,
    },
    LeverageClose {
        position: PositionId,
        min_fill_price: Price,
        trade_fee: Decimal,
    },
}

impl OrderKind {
    pub fn order_type(&self) -> OrderType {
        match self {
            OrderKind::StableDeposit { .. } => OrderType::StableDeposit,
            OrderKind::StableWithdraw { .. } => OrderType::StableWithdraw,
            OrderKind::LeverageOpen { .. } => OrderType::LeverageOpen,
            OrderKind::LeverageAdjust { .. } => OrderType::LeverageAdjust,
            OrderKind::LeverageClose { .. } => OrderType::LeverageClose,
        }
    }

    /// Position the order locks, if any.
    pub fn position(&self) -> Option<PositionId> {
        match self {
            OrderKind::LeverageAdjust { position, .. } | OrderKind::LeverageClose { position, .. } => {
                Some(*position)
            }
            _ => None,
        }
    }
}

/// Where an order stands relative to its execution window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderWindow {
    TooEarly,
    Open,
    Expired,
}

/// Classifies `now` against `[executable_at, executable_at + max_age]`. Both ends inclusive.
pub fn order_window(executable_at: Timestamp, now: Timestamp, max_age: Option<i64>) -> OrderWindow {
    if now < executable_at {
        return OrderWindow::TooEarly;
    }
    match max_age {
        Some(max_age) if now > executable_at.plus(max_age) => OrderWindow::Expired,
        _ => OrderWindow::Open,
    }
}

/// An announced, not yet executed action. At most one per account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub account: AccountId,
    pub kind: OrderKind,
    pub keeper_fee: Decimal,
    pub announced_at: Timestamp,
    pub executable_at: Timestamp,
}

impl Order {
    pub fn order_type(&self) -> OrderType {
        self.kind.order_type()
    }

    pub fn window(&self, now: Timestamp, max_executability_age: i64) -> OrderWindow {
        order_window(self.executable_at, now, Some(max_executability_age))
    }

    pub fn is_expired(&self, now: Timestamp, max_executability_age: i64) -> bool {
        self.window(now, max_executability_age) == OrderWindow::Expired
    }

    /// Collateral held in escrow for this order. Refunded in full on cancel.
    pub fn escrowed_collateral(&self) -> Decimal {
        match self.kind {
            OrderKind::StableDeposit { deposit_amount, .. } => deposit_amount + self.keeper_fee,
            OrderKind::LeverageOpen { margin, trade_fee, .. } => margin + trade_fee + self.keeper_fee,
            OrderKind::LeverageAdjust {
                margin_adjustment,
                total_fee,
                ..
            } if margin_adjustment > Decimal::ZERO => margin_adjustment + total_fee,
            _ => Decimal::ZERO,
        }
    }
}

/// Which side of a limit order fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitTrigger {
    StopLoss,
    TakeProfit,
}

/// Stop-loss / take-profit close order on a position. Does not expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrder {
    pub position: PositionId,
    pub owner: AccountId,
    pub price_lower_threshold: Price,
    pub price_upper_threshold: Price,
    pub announced_at: Timestamp,
    pub executable_at: Timestamp,
}

impl LimitOrder {
    /// Trigger and fill price at `price`, or None while price sits between the thresholds.
    /// Take-profit fills at the threshold itself, never better.
    pub fn trigger(&self, price: Price) -> Option<(LimitTrigger, Price)> {
        if price <= self.price_lower_threshold {
            Some((LimitTrigger::StopLoss, price))
        } else if price >= self.price_upper_threshold {
            Some((LimitTrigger::TakeProfit, self.price_upper_threshold))
        } else {
            None
        }
    }

    pub fn window(&self, now: Timestamp) -> OrderWindow {
        order_window(self.executable_at, now, None)
    }
}
