//! Limit orders: stop-loss and take-profit closes attached to a position.
//!
//! One per position. The position is locked while the order lives so it cannot
//! change hands under it. Limit orders never expire; they wait for the price to
//! leave the band between the two thresholds.

use super::core::Engine;
use super::results::{EngineError, LimitOrderResult};
use crate::events::{CancelReason, EventPayload, LimitOrderAnnouncedEvent, LimitOrderCancelledEvent, LimitOrderExecutedEvent};
use crate::oracle::PullUpdate;
use crate::order::{LimitOrder, OrderWindow};
use crate::types::{AccountId, PositionId, Price};
use crate::vault::ModuleKey;
use rust_decimal::Decimal;
use tracing::info;

impl Engine {
    /// Places or replaces the limit order on `position`.
    pub fn announce_limit_order(
        &mut self,
        account: AccountId,
        position: PositionId,
        price_lower_threshold: Price,
        price_upper_threshold: Price,
    ) -> Result<LimitOrder, EngineError> {
        self.atomic(|engine| {
            engine.ensure_not_paused(&[ModuleKey::LimitOrders])?;
            engine.state.registry.ensure_owner(position, account)?;
            engine.existing_position(position)?;
            if price_lower_threshold >= price_upper_threshold {
                return Err(EngineError::InvalidThresholds {
                    lower: price_lower_threshold,
                    upper: price_upper_threshold,
                });
            }

            let min_age = engine.state.vault.params().min_executability_age;
            let order = LimitOrder {
                position,
                owner: account,
                price_lower_threshold,
                price_upper_threshold,
                announced_at: engine.current_time,
                executable_at: engine.current_time.plus(min_age),
            };

            if !engine.state.registry.is_locked_by(position, ModuleKey::LimitOrders) {
                engine.state.registry.lock(position, ModuleKey::LimitOrders)?;
            }
            engine.state.limit_orders.insert(position, order);

            info!(%position, %account, lower = %price_lower_threshold, upper = %price_upper_threshold, "limit order announced");
            engine.emit_event(EventPayload::LimitOrderAnnounced(LimitOrderAnnouncedEvent {
                position,
                owner: account,
                price_lower_threshold,
                price_upper_threshold,
            }));
            Ok(order)
        })
    }

    /// Removes the limit order on `position`. Owner only.
    pub fn cancel_limit_order(&mut self, account: AccountId, position: PositionId) -> Result<LimitOrder, EngineError> {
        self.atomic(|engine| {
            let order = *engine
                .state
                .limit_orders
                .get(&position)
                .ok_or(EngineError::LimitOrderNotFound(position))?;
            engine.state.registry.ensure_owner(position, account)?;

            engine.state.limit_orders.remove(&position);
            engine.state.registry.unlock(position, ModuleKey::LimitOrders)?;

            engine.emit_event(EventPayload::LimitOrderCancelled(LimitOrderCancelledEvent {
                position,
                reason: CancelReason::OwnerRequested,
            }));
            Ok(order)
        })
    }

    /// Closes `position` if its limit order has triggered. Any keeper may call.
    pub fn execute_limit_order(
        &mut self,
        position: PositionId,
        keeper: AccountId,
        price_update: Option<(PullUpdate, Decimal)>,
    ) -> Result<LimitOrderResult, EngineError> {
        self.atomic(|engine| {
            engine.apply_price_update(price_update)?;
            engine.ensure_not_paused(&[ModuleKey::LimitOrders])?;

            let order = *engine
                .state
                .limit_orders
                .get(&position)
                .ok_or(EngineError::LimitOrderNotFound(position))?;
            if order.window(engine.current_time) == OrderWindow::TooEarly {
                return Err(EngineError::ExecutableTimeNotReached {
                    executable_at: order.executable_at,
                });
            }

            engine.settle_funding()?;
            let price_age = order.executable_at.seconds_until(&engine.current_time);
            let price = engine.price(Some(price_age))?.price;

            let (trigger, fill_price) = order.trigger(price).ok_or(EngineError::LimitOrderPriceNotInRange {
                price,
                lower: order.price_lower_threshold,
                upper: order.price_upper_threshold,
            })?;

            engine.state.limit_orders.remove(&position);
            engine.state.registry.unlock(position, ModuleKey::LimitOrders)?;
            engine.release_orders_on(position, CancelReason::PositionClosed)?;

            let keeper_fee = engine.keeper_fee_quote();
            let existing = engine.existing_position(position)?;
            let trade_fee = engine.state.leverage.trade_fee(existing.additional_size);
            let close = engine.close_position(position, fill_price, trade_fee, keeper_fee, keeper)?;

            info!(%position, ?trigger, %fill_price, %keeper, "limit order executed");
            engine.emit_event(EventPayload::LimitOrderExecuted(LimitOrderExecutedEvent {
                position,
                trigger,
                fill_price,
                keeper,
                keeper_fee,
            }));

            Ok(LimitOrderResult {
                trigger,
                fill_price,
                close,
            })
        })
    }

    // a pending adjust or close by the owner cannot outlive the position it targets
    pub(super) fn release_orders_on(&mut self, position: PositionId, reason: CancelReason) -> Result<(), EngineError> {
        let owner = self.state.registry.owner_of(position)?;
        let targets_position = self
            .state
            .orders
            .get(&owner)
            .is_some_and(|order| order.kind.position() == Some(position));
        if targets_position {
            self.release_order(owner, reason)?;
        }
        Ok(())
    }
}
