//! Delayed orders: announce, execute, cancel.
//!
//! Announce checks the intent against the current state, escrows funds or locks
//! what the order will consume, and opens an execution window after a minimum
//! delay. Execute re-checks the user's price bound against a price no older than
//! the window start; that re-check is the binding one.

use super::core::Engine;
use super::results::{EngineError, ExecutionOutcome, OrderResult};
use crate::custody::Holder;
use crate::events::{CancelReason, EventPayload, OrderAnnouncedEvent, OrderExecutedEvent};
use crate::oracle::PullUpdate;
use crate::order::{Order, OrderKind, OrderWindow};
use crate::types::{AccountId, PositionId, Price};
use crate::vault::ModuleKey;
use rust_decimal::Decimal;
use tracing::{info, warn};

fn module_for(kind: &OrderKind) -> ModuleKey {
    match kind {
        OrderKind::StableDeposit { .. } | OrderKind::StableWithdraw { .. } => ModuleKey::Stable,
        _ => ModuleKey::Leverage,
    }
}

impl Engine {
    /// Escrows `margin + trade fee + keeper_fee` and records an open order.
    pub fn announce_leverage_open(
        &mut self,
        account: AccountId,
        margin: Decimal,
        additional_size: Decimal,
        max_fill_price: Price,
        keeper_fee: Decimal,
    ) -> Result<Order, EngineError> {
        self.atomic(|engine| {
            engine.ensure_not_paused(&[ModuleKey::Orders, ModuleKey::Leverage])?;
            if margin <= Decimal::ZERO {
                return Err(EngineError::ValueNotPositive { what: "margin" });
            }
            if additional_size <= Decimal::ZERO {
                return Err(EngineError::ValueNotPositive { what: "additional_size" });
            }
            engine.check_amount("margin", margin)?;
            engine.check_amount("additional_size", additional_size)?;
            engine.check_keeper_fee(keeper_fee)?;

            let current_price = engine.price(None)?.price;
            if current_price > max_fill_price {
                return Err(EngineError::MaxFillPriceTooLow {
                    max_fill_price,
                    current_price,
                });
            }
            engine.state.vault.check_skew_max(additional_size, Decimal::ZERO)?;
            let cumulative = engine.next_cumulative_funding()?;
            engine.check_new_position(margin, additional_size, current_price, cumulative)?;

            let trade_fee = engine.state.leverage.trade_fee(additional_size);
            let kind = OrderKind::LeverageOpen {
                margin,
                additional_size,
                max_fill_price,
                trade_fee,
            };
            engine.record_order(account, kind, keeper_fee)
        })
    }

    /// Records an adjustment of an owned position and locks it until the order resolves.
    /// `fill_price` is a ceiling when size grows and a floor when it shrinks.
    pub fn announce_leverage_adjust(
        &mut self,
        account: AccountId,
        position: PositionId,
        margin_adjustment: Decimal,
        additional_size_adjustment: Decimal,
        fill_price: Price,
        keeper_fee: Decimal,
    ) -> Result<Order, EngineError> {
        self.atomic(|engine| {
            engine.ensure_not_paused(&[ModuleKey::Orders, ModuleKey::Leverage])?;
            engine.state.registry.ensure_owner(position, account)?;
            if margin_adjustment.is_zero() && additional_size_adjustment.is_zero() {
                return Err(EngineError::ValueNotPositive { what: "adjustment" });
            }
            engine.check_amount("margin_adjustment", margin_adjustment)?;
            engine.check_amount("additional_size_adjustment", additional_size_adjustment)?;
            engine.check_keeper_fee(keeper_fee)?;

            let current_price = engine.price(None)?.price;
            check_adjust_fill_price(additional_size_adjustment, fill_price, current_price)?;
            if additional_size_adjustment > Decimal::ZERO {
                engine
                    .state
                    .vault
                    .check_skew_max(additional_size_adjustment, Decimal::ZERO)?;
            }

            let trade_fee = engine.state.leverage.trade_fee(additional_size_adjustment);
            let total_fee = trade_fee + keeper_fee;
            let cumulative = engine.next_cumulative_funding()?;
            engine.plan_adjustment(
                position,
                margin_adjustment,
                additional_size_adjustment,
                total_fee,
                current_price,
                cumulative,
            )?;

            let kind = OrderKind::LeverageAdjust {
                position,
                margin_adjustment,
                additional_size_adjustment,
                fill_price,
                trade_fee,
                total_fee,
            };
            engine.record_order(account, kind, keeper_fee)
        })
    }

    /// Records a close of an owned position. Fees are taken from its settled margin.
    pub fn announce_leverage_close(
        &mut self,
        account: AccountId,
        position: PositionId,
        min_fill_price: Price,
        keeper_fee: Decimal,
    ) -> Result<Order, EngineError> {
        self.atomic(|engine| {
            engine.ensure_not_paused(&[ModuleKey::Orders, ModuleKey::Leverage])?;
            engine.state.registry.ensure_owner(position, account)?;
            engine.check_keeper_fee(keeper_fee)?;

            let current_price = engine.price(None)?.price;
            if current_price < min_fill_price {
                return Err(EngineError::MinFillPriceTooHigh {
                    min_fill_price,
                    current_price,
                });
            }

            let existing = engine.existing_position(position)?;
            let trade_fee = engine.state.leverage.trade_fee(existing.additional_size);
            let summary = existing.summary(current_price, engine.next_cumulative_funding()?);
            if summary.settled_margin < trade_fee + keeper_fee {
                return Err(EngineError::NotEnoughMarginForFees {
                    settled_margin: summary.settled_margin,
                    fees: trade_fee + keeper_fee,
                });
            }

            let kind = OrderKind::LeverageClose {
                position,
                min_fill_price,
                trade_fee,
            };
            engine.record_order(account, kind, keeper_fee)
        })
    }

    /// Executes the pending order of `account`. Any keeper may call; `price_update`
    /// is forwarded to the pull feed first.
    pub fn execute_order(
        &mut self,
        account: AccountId,
        keeper: AccountId,
        price_update: Option<(PullUpdate, Decimal)>,
    ) -> Result<OrderResult, EngineError> {
        self.atomic(|engine| {
            engine.apply_price_update(price_update)?;

            let order = *engine
                .state
                .orders
                .get(&account)
                .ok_or(EngineError::NoExistingOrder(account))?;
            engine.ensure_not_paused(&[ModuleKey::Orders, module_for(&order.kind)])?;

            let max_age = engine.state.vault.params().max_executability_age;
            match order.window(engine.current_time, max_age) {
                OrderWindow::TooEarly => {
                    return Err(EngineError::ExecutableTimeNotReached {
                        executable_at: order.executable_at,
                    });
                }
                OrderWindow::Expired => {
                    return Err(EngineError::OrderHasExpired {
                        expired_at: order.executable_at.plus(max_age),
                    });
                }
                OrderWindow::Open => {}
            }

            // funding moves before any skew check reads the totals
            engine.settle_funding()?;
            let price_age = order.executable_at.seconds_until(&engine.current_time);
            let price = engine.price(Some(price_age))?.price;

            engine.state.orders.remove(&account);
            if let Some(position) = order.kind.position() {
                engine.state.registry.unlock(position, ModuleKey::Orders)?;
            }

            let outcome = engine.execute_kind(&order, price, keeper)?;

            info!(%account, %keeper, order_type = ?order.order_type(), %price, "order executed");
            engine.emit_event(EventPayload::OrderExecuted(OrderExecutedEvent {
                account,
                order_type: order.order_type(),
                keeper,
                keeper_fee: order.keeper_fee,
                price,
            }));

            Ok(OrderResult {
                account,
                order_type: order.order_type(),
                price,
                keeper_fee: order.keeper_fee,
                outcome,
            })
        })
    }

    /// Clears an expired order and refunds it. Callable by anyone.
    pub fn cancel_existing_order(&mut self, account: AccountId) -> Result<Order, EngineError> {
        self.atomic(|engine| {
            let order = *engine
                .state
                .orders
                .get(&account)
                .ok_or(EngineError::NoExistingOrder(account))?;
            let max_age = engine.state.vault.params().max_executability_age;
            if !order.is_expired(engine.current_time, max_age) {
                return Err(EngineError::OrderHasNotExpired {
                    expires_at: order.executable_at.plus(max_age),
                });
            }
            engine.release_order(account, CancelReason::Expired)
        })
    }

    fn execute_kind(&mut self, order: &Order, price: Price, keeper: AccountId) -> Result<ExecutionOutcome, EngineError> {
        match order.kind {
            OrderKind::StableDeposit {
                deposit_amount,
                min_amount_out,
            } => self.execute_stable_deposit(order, deposit_amount, min_amount_out, price, keeper),

            OrderKind::StableWithdraw {
                withdraw_amount,
                min_amount_out,
            } => self.execute_stable_withdraw(order, withdraw_amount, min_amount_out, price, keeper),

            OrderKind::LeverageOpen {
                margin,
                additional_size,
                max_fill_price,
                trade_fee,
            } => {
                if price > max_fill_price {
                    return Err(EngineError::MaxFillPriceTooLow {
                        max_fill_price,
                        current_price: price,
                    });
                }
                let position = self.open_position(order.account, margin, additional_size, price, trade_fee)?;
                self.transfer(Holder::OrderEscrow, Holder::Account(keeper), order.keeper_fee)?;
                Ok(ExecutionOutcome::Opened { position })
            }

            OrderKind::LeverageAdjust {
                position,
                margin_adjustment,
                additional_size_adjustment,
                fill_price,
                trade_fee,
                ..
            } => {
                check_adjust_fill_price(additional_size_adjustment, fill_price, price)?;
                self.adjust_position(
                    position,
                    margin_adjustment,
                    additional_size_adjustment,
                    price,
                    trade_fee,
                    order.keeper_fee,
                    keeper,
                )
            }

            OrderKind::LeverageClose {
                position,
                min_fill_price,
                trade_fee,
            } => {
                if price < min_fill_price {
                    return Err(EngineError::MinFillPriceTooHigh {
                        min_fill_price,
                        current_price: price,
                    });
                }
                let close = self.close_position(position, price, trade_fee, order.keeper_fee, keeper)?;
                Ok(ExecutionOutcome::Closed(close))
            }
        }
    }

    // one pending order per account. an expired one is cleared, a live one blocks.
    fn prepare_order_slot(&mut self, account: AccountId) -> Result<(), EngineError> {
        let Some(existing) = self.state.orders.get(&account).copied() else {
            return Ok(());
        };
        let max_age = self.state.vault.params().max_executability_age;
        if !existing.is_expired(self.current_time, max_age) {
            return Err(EngineError::OrderHasNotExpired {
                expires_at: existing.executable_at.plus(max_age),
            });
        }
        warn!(%account, order_type = ?existing.order_type(), "replacing expired order");
        self.release_order(account, CancelReason::Replaced)?;
        Ok(())
    }

    pub(super) fn record_order(
        &mut self,
        account: AccountId,
        kind: OrderKind,
        keeper_fee: Decimal,
    ) -> Result<Order, EngineError> {
        self.prepare_order_slot(account)?;

        let min_age = self.state.vault.params().min_executability_age;
        let order = Order {
            account,
            kind,
            keeper_fee,
            announced_at: self.current_time,
            executable_at: self.current_time.plus(min_age),
        };

        self.transfer(Holder::Account(account), Holder::OrderEscrow, order.escrowed_collateral())?;
        if let Some(position) = kind.position() {
            self.state.registry.lock(position, ModuleKey::Orders)?;
        }
        self.state.orders.insert(account, order);

        info!(%account, order_type = ?order.order_type(), executable_at = %order.executable_at, "order announced");
        self.emit_event(EventPayload::OrderAnnounced(OrderAnnouncedEvent {
            account,
            order_type: order.order_type(),
            keeper_fee,
            executable_at: order.executable_at,
        }));
        Ok(order)
    }
}

fn check_adjust_fill_price(size_adjustment: Decimal, fill_price: Price, current_price: Price) -> Result<(), EngineError> {
    if size_adjustment > Decimal::ZERO && current_price > fill_price {
        return Err(EngineError::MaxFillPriceTooLow {
            max_fill_price: fill_price,
            current_price,
        });
    }
    if size_adjustment < Decimal::ZERO && current_price < fill_price {
        return Err(EngineError::MinFillPriceTooHigh {
            min_fill_price: fill_price,
            current_price,
        });
    }
    Ok(())
}
