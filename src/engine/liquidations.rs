//! Liquidation detection and execution.

use super::core::Engine;
use super::results::{EngineError, LiquidationResult};
use crate::custody::Holder;
use crate::events::{CancelReason, EventPayload, PositionLiquidatedEvent};
use crate::liquidation;
use crate::position::PositionSummary;
use crate::types::{AccountId, Leverage, PositionId};
use crate::vault::ModuleKey;
use rust_decimal::Decimal;
use tracing::{info, warn};

impl Engine {
    /// Liquidates `position` at the current price. Anyone may call; the caller
    /// is paid the liquidation fee out of whatever margin is left.
    pub fn liquidate(&mut self, position: PositionId, liquidator: AccountId) -> Result<LiquidationResult, EngineError> {
        self.atomic(|engine| {
            engine.ensure_not_paused(&[ModuleKey::Liquidation])?;
            let price = engine.price(None)?.price;
            engine.settle_funding()?;

            let existing = engine.existing_position(position)?;
            let owner = engine.state.registry.owner_of(position)?;
            let cumulative = engine.state.vault.funding_state().cumulative_funding_rate;
            if !liquidation::can_liquidate(&existing, price, cumulative, &engine.state.liquidation) {
                return Err(EngineError::CannotLiquidate(position));
            }

            let summary = existing.summary(price, cumulative);
            let settled_margin = summary.settled_margin;
            let fee = liquidation::liquidation_fee(existing.additional_size, price, &engine.state.liquidation);
            // the pool keeps what the liquidator does not take, or eats the deficit
            let (liquidator_fee, pool_credit) = if settled_margin > Decimal::ZERO {
                let paid = fee.min(settled_margin);
                (paid, settled_margin - paid)
            } else {
                (Decimal::ZERO, settled_margin)
            };

            engine.release_orders_on(position, CancelReason::PositionLiquidated)?;
            engine.state.vault.delete_position(position);
            engine.remove_limit_order(position, CancelReason::PositionLiquidated)?;

            // the settled margin leaves the margin total; the pool books what stays behind
            engine.state.vault.update_global_position_data(
                price,
                -settled_margin,
                -existing.additional_size,
                -existing.entry_notional(),
            )?;
            engine.state.vault.update_stable_collateral_total(pool_credit);
            engine.transfer(Holder::Vault, Holder::Account(liquidator), liquidator_fee)?;
            engine.state.registry.burn(position)?;

            if settled_margin < Decimal::ZERO {
                warn!(%position, %settled_margin, "liquidation left bad debt");
            }
            info!(%position, %owner, %liquidator, %price, %liquidator_fee, "position liquidated");
            engine.emit_event(EventPayload::PositionLiquidated(PositionLiquidatedEvent {
                position,
                owner,
                liquidator,
                price,
                settled_margin,
                liquidator_fee,
                pool_credit,
            }));

            Ok(LiquidationResult {
                position,
                owner,
                liquidation_price: price,
                settled_margin,
                liquidator_fee,
                pool_credit,
            })
        })
    }

    /// Pnl, funding and settled margin of `position` at the current price.
    pub fn position_summary(&self, position: PositionId) -> Result<PositionSummary, EngineError> {
        let existing = self.existing_position(position)?;
        let price = self.price(None)?.price;
        Ok(existing.summary(price, self.next_cumulative_funding()?))
    }

    /// (margin + size) / margin, or None for an empty position.
    pub fn leverage_of(&self, position: PositionId) -> Result<Option<Leverage>, EngineError> {
        Ok(self.existing_position(position)?.leverage())
    }

    /// Approximate price at which `position` becomes liquidatable. Zero if none.
    pub fn liquidation_price(&self, position: PositionId) -> Result<Decimal, EngineError> {
        let existing = self.existing_position(position)?;
        let price = self.price(None)?.price;
        Ok(liquidation::approx_liquidation_price(
            &existing,
            self.next_cumulative_funding()?,
            price,
            &self.state.liquidation,
        ))
    }

    pub fn can_liquidate(&self, position: PositionId) -> Result<bool, EngineError> {
        let existing = self.existing_position(position)?;
        let price = self.price(None)?.price;
        Ok(liquidation::can_liquidate(
            &existing,
            price,
            self.next_cumulative_funding()?,
            &self.state.liquidation,
        ))
    }

    /// Fee a liquidator would be paid for `position` right now, before capping at its margin.
    pub fn liquidation_fee(&self, position: PositionId) -> Result<Decimal, EngineError> {
        let existing = self.existing_position(position)?;
        let price = self.price(None)?.price;
        Ok(liquidation::liquidation_fee(
            existing.additional_size,
            price,
            &self.state.liquidation,
        ))
    }

    /// Ids of every open position that can be liquidated at the current price.
    pub fn liquidatable_positions(&self) -> Result<Vec<PositionId>, EngineError> {
        let price = self.price(None)?.price;
        let cumulative = self.next_cumulative_funding()?;
        Ok(self
            .state
            .vault
            .positions()
            .filter(|(_, p)| liquidation::can_liquidate(p, price, cumulative, &self.state.liquidation))
            .map(|(id, _)| *id)
            .collect())
    }
}
