// 11.0: every state change produces an event. used for audit trails and for
// tests that replay what happened. the EventPayload enum lists all event types.

use crate::order::{LimitTrigger, OrderType};
use crate::types::{AccountId, PositionId, Price, Timestamp};
use crate::vault::ModuleKey;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    // Delayed order events
    OrderAnnounced(OrderAnnouncedEvent),
    OrderExecuted(OrderExecutedEvent),
    OrderCancelled(OrderCancelledEvent),

    // Pool events
    Deposit(DepositEvent),
    Withdraw(WithdrawEvent),
    FundingSettled(FundingSettledEvent),

    // Position events
    PositionOpened(PositionOpenedEvent),
    PositionAdjusted(PositionAdjustedEvent),
    PositionClosed(PositionClosedEvent),
    PositionLiquidated(PositionLiquidatedEvent),

    // Limit order events
    LimitOrderAnnounced(LimitOrderAnnouncedEvent),
    LimitOrderCancelled(LimitOrderCancelledEvent),
    LimitOrderExecuted(LimitOrderExecutedEvent),

    // Admin events
    ModulePauseChanged(ModulePauseChangedEvent),
    ParamsUpdated(ParamsUpdatedEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAnnouncedEvent {
    pub account: AccountId,
    pub order_type: OrderType,
    pub keeper_fee: Decimal,
    pub executable_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderExecutedEvent {
    pub account: AccountId,
    pub order_type: OrderType,
    pub keeper: AccountId,
    pub keeper_fee: Decimal,
    pub price: Price,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    // anyone may clear an order once its window has passed
    Expired,
    // a new announcement replaced an expired order
    Replaced,
    OwnerRequested,
    PositionClosed,
    PositionLiquidated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledEvent {
    pub account: AccountId,
    pub order_type: OrderType,
    pub refunded: Decimal,
    pub reason: CancelReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositEvent {
    pub account: AccountId,
    pub deposit_amount: Decimal,
    pub minted_shares: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawEvent {
    pub account: AccountId,
    pub burned_shares: Decimal,
    pub amount_out: Decimal,
    pub withdraw_fee: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingSettledEvent {
    // positive: pool paid longs. negative: longs paid the pool
    pub funding_fees: Decimal,
    pub funding_rate: Decimal,
    pub cumulative_funding_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionOpenedEvent {
    pub position: PositionId,
    pub account: AccountId,
    pub margin: Decimal,
    pub additional_size: Decimal,
    pub entry_price: Price,
    pub trade_fee: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionAdjustedEvent {
    pub position: PositionId,
    pub margin_adjustment: Decimal,
    pub additional_size_adjustment: Decimal,
    pub new_margin: Decimal,
    pub new_additional_size: Decimal,
    pub adjust_price: Price,
    pub trade_fee: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionClosedEvent {
    pub position: PositionId,
    pub account: AccountId,
    pub close_price: Price,
    pub profit_loss: Decimal,
    pub accrued_funding: Decimal,
    pub settled_margin: Decimal,
    pub amount_to_owner: Decimal,
    pub trade_fee: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionLiquidatedEvent {
    pub position: PositionId,
    pub owner: AccountId,
    pub liquidator: AccountId,
    pub price: Price,
    pub settled_margin: Decimal,
    pub liquidator_fee: Decimal,
    // collateral credited to the pool. negative when the pool absorbed a deficit
    pub pool_credit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrderAnnouncedEvent {
    pub position: PositionId,
    pub owner: AccountId,
    pub price_lower_threshold: Price,
    pub price_upper_threshold: Price,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrderCancelledEvent {
    pub position: PositionId,
    pub reason: CancelReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrderExecutedEvent {
    pub position: PositionId,
    pub trigger: LimitTrigger,
    pub fill_price: Price,
    pub keeper: AccountId,
    pub keeper_fee: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModulePauseChangedEvent {
    pub module: ModuleKey,
    pub paused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamGroup {
    Vault,
    Leverage,
    Stable,
    Liquidation,
    Oracle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamsUpdatedEvent {
    pub group: ParamGroup,
}
