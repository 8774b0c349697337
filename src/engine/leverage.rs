//! Position lifecycle: open, adjust, close.
//!
//! These run with funding already settled and a price already validated; the
//! order paths decide when. Every total-changing step goes through
//! `update_global_position_data` so the aggregate pnl is realized at the same
//! price the position is re-baselined at.

use super::core::Engine;
use super::results::{CloseResult, EngineError, ExecutionOutcome};
use crate::custody::Holder;
use crate::events::{CancelReason, EventPayload, LimitOrderCancelledEvent, PositionAdjustedEvent, PositionClosedEvent, PositionOpenedEvent};
use crate::liquidation::can_liquidate;
use crate::position::{check_leverage_criteria, LeverageViolation, Position};
use crate::types::{AccountId, PositionId, Price};
use crate::vault::ModuleKey;
use rust_decimal::Decimal;
use tracing::info;

impl From<LeverageViolation> for EngineError {
    fn from(violation: LeverageViolation) -> Self {
        match violation {
            LeverageViolation::MarginTooSmall { margin, minimum } => EngineError::MarginTooSmall { margin, minimum },
            LeverageViolation::LeverageTooLow { leverage, minimum } => EngineError::LeverageTooLow { leverage, minimum },
            LeverageViolation::LeverageTooHigh { leverage, maximum } => {
                EngineError::LeverageTooHigh { leverage, maximum }
            }
        }
    }
}

/// Result of applying an adjustment to a position, before anything is written.
#[derive(Debug, Clone, Copy)]
pub(super) struct AdjustPlan {
    pub position: Position,
    // change to the aggregate margin total once the old baseline is realized
    pub margin_delta: Decimal,
    pub entry_notional_delta: Decimal,
}

impl Engine {
    // 10.1: leverage bounds plus the bad-debt guard for a fresh baseline
    pub(super) fn check_new_position(
        &self,
        margin: Decimal,
        size: Decimal,
        price: Price,
        cumulative_funding: Decimal,
    ) -> Result<Position, EngineError> {
        check_leverage_criteria(margin, size, &self.state.leverage)?;
        let position = Position::new(price, margin, size, cumulative_funding, self.current_time);
        if can_liquidate(&position, price, cumulative_funding, &self.state.liquidation) {
            return Err(EngineError::PositionCreatesBadDebt);
        }
        Ok(position)
    }

    pub(super) fn existing_position(&self, id: PositionId) -> Result<Position, EngineError> {
        self.state
            .vault
            .position(id)
            .copied()
            .ok_or(EngineError::PositionNotFound(id))
    }

    // 10.2: settles the old baseline into margin and applies the deltas.
    // when margin shrinks or stays flat the fees come out of the position.
    pub(super) fn plan_adjustment(
        &self,
        id: PositionId,
        margin_adjustment: Decimal,
        additional_size_adjustment: Decimal,
        total_fee: Decimal,
        price: Price,
        cumulative_funding: Decimal,
    ) -> Result<AdjustPlan, EngineError> {
        let current = self.existing_position(id)?;
        let summary = current.summary(price, cumulative_funding);

        let fees_from_margin = if margin_adjustment > Decimal::ZERO {
            Decimal::ZERO
        } else {
            total_fee
        };
        let new_margin = summary.settled_margin + margin_adjustment - fees_from_margin;
        let new_size = current.additional_size + additional_size_adjustment;
        if new_size <= Decimal::ZERO {
            return Err(EngineError::ValueNotPositive {
                what: "new_additional_size",
            });
        }

        let mut position = self.check_new_position(new_margin, new_size, price, cumulative_funding)?;
        position.opened_at = current.opened_at;

        Ok(AdjustPlan {
            margin_delta: new_margin - summary.settled_margin,
            entry_notional_delta: position.entry_notional() - current.entry_notional(),
            position,
        })
    }

    pub(super) fn open_position(
        &mut self,
        account: AccountId,
        margin: Decimal,
        additional_size: Decimal,
        price: Price,
        trade_fee: Decimal,
    ) -> Result<PositionId, EngineError> {
        self.state.vault.check_skew_max(additional_size, Decimal::ZERO)?;
        let cumulative = self.state.vault.funding_state().cumulative_funding_rate;
        let position = self.check_new_position(margin, additional_size, price, cumulative)?;

        self.state.vault.update_global_position_data(
            price,
            margin,
            additional_size,
            position.entry_notional(),
        )?;
        self.state.vault.update_stable_collateral_total(trade_fee);

        let id = self.state.registry.mint(account);
        self.state.vault.set_position(id, position);

        self.transfer(Holder::OrderEscrow, Holder::Vault, margin + trade_fee)?;

        info!(position = %id, %account, %margin, %additional_size, %price, "position opened");
        self.emit_event(EventPayload::PositionOpened(PositionOpenedEvent {
            position: id,
            account,
            margin,
            additional_size,
            entry_price: price,
            trade_fee,
        }));
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn adjust_position(
        &mut self,
        id: PositionId,
        margin_adjustment: Decimal,
        additional_size_adjustment: Decimal,
        price: Price,
        trade_fee: Decimal,
        keeper_fee: Decimal,
        keeper: AccountId,
    ) -> Result<ExecutionOutcome, EngineError> {
        if additional_size_adjustment > Decimal::ZERO {
            self.state.vault.check_skew_max(additional_size_adjustment, Decimal::ZERO)?;
        }
        let owner = self.state.registry.owner_of(id)?;
        let cumulative = self.state.vault.funding_state().cumulative_funding_rate;
        let plan = self.plan_adjustment(
            id,
            margin_adjustment,
            additional_size_adjustment,
            trade_fee + keeper_fee,
            price,
            cumulative,
        )?;

        self.state
            .vault
            .update_global_position_data(
                price,
                plan.margin_delta,
                additional_size_adjustment,
                plan.entry_notional_delta,
            )?;
        self.state.vault.set_position(id, plan.position);
        self.state.vault.update_stable_collateral_total(trade_fee);

        if margin_adjustment > Decimal::ZERO {
            self.transfer(Holder::OrderEscrow, Holder::Vault, margin_adjustment + trade_fee)?;
            self.transfer(Holder::OrderEscrow, Holder::Account(keeper), keeper_fee)?;
        } else {
            self.transfer(Holder::Vault, Holder::Account(keeper), keeper_fee)?;
            self.transfer(Holder::Vault, Holder::Account(owner), -margin_adjustment)?;
        }

        info!(position = %id, %margin_adjustment, %additional_size_adjustment, %price, "position adjusted");
        self.emit_event(EventPayload::PositionAdjusted(PositionAdjustedEvent {
            position: id,
            margin_adjustment,
            additional_size_adjustment,
            new_margin: plan.position.margin_deposited,
            new_additional_size: plan.position.additional_size,
            adjust_price: price,
            trade_fee,
        }));
        Ok(ExecutionOutcome::Adjusted {
            position: id,
            new_margin: plan.position.margin_deposited,
            new_additional_size: plan.position.additional_size,
        })
    }

    // 10.3: realizes the position and pays out what is left after fees.
    // the record and token go before any collateral moves.
    pub(super) fn close_position(
        &mut self,
        id: PositionId,
        price: Price,
        trade_fee: Decimal,
        keeper_fee: Decimal,
        keeper: AccountId,
    ) -> Result<CloseResult, EngineError> {
        let position = self.existing_position(id)?;
        let owner = self.state.registry.owner_of(id)?;
        let cumulative = self.state.vault.funding_state().cumulative_funding_rate;
        let summary = position.summary(price, cumulative);

        if summary.settled_margin <= Decimal::ZERO {
            return Err(EngineError::ValueNotPositive { what: "settled_margin" });
        }
        let fees = trade_fee + keeper_fee;
        if summary.settled_margin < fees {
            return Err(EngineError::NotEnoughMarginForFees {
                settled_margin: summary.settled_margin,
                fees,
            });
        }

        self.state.vault.delete_position(id);
        self.remove_limit_order(id, CancelReason::PositionClosed)?;
        self.state.registry.burn(id)?;

        self.state.vault.update_global_position_data(
            price,
            -summary.settled_margin,
            -position.additional_size,
            -position.entry_notional(),
        )?;
        self.state.vault.update_stable_collateral_total(trade_fee);

        let amount_to_owner = summary.settled_margin - fees;
        self.transfer(Holder::Vault, Holder::Account(keeper), keeper_fee)?;
        self.transfer(Holder::Vault, Holder::Account(owner), amount_to_owner)?;

        info!(position = %id, %owner, settled_margin = %summary.settled_margin, %price, "position closed");
        self.emit_event(EventPayload::PositionClosed(PositionClosedEvent {
            position: id,
            account: owner,
            close_price: price,
            profit_loss: summary.profit_loss,
            accrued_funding: summary.accrued_funding,
            settled_margin: summary.settled_margin,
            amount_to_owner,
            trade_fee,
        }));

        Ok(CloseResult {
            position: id,
            owner,
            close_price: price,
            profit_loss: summary.profit_loss,
            accrued_funding: summary.accrued_funding,
            settled_margin: summary.settled_margin,
            trade_fee,
            keeper_fee,
            amount_to_owner,
        })
    }

    // drops a limit order hanging off a position that is going away
    pub(super) fn remove_limit_order(&mut self, id: PositionId, reason: CancelReason) -> Result<(), EngineError> {
        if self.state.limit_orders.remove(&id).is_some() {
            if self.state.registry.is_locked_by(id, ModuleKey::LimitOrders) {
                self.state.registry.unlock(id, ModuleKey::LimitOrders)?;
            }
            self.emit_event(EventPayload::LimitOrderCancelled(LimitOrderCancelledEvent {
                position: id,
                reason,
            }));
        }
        Ok(())
    }
}
