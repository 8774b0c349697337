// 8.0 engine/core.rs: main engine. holds the vault, pool shares, position tokens
// and pending orders. every public mutator runs inside `atomic` so a failed call
// leaves no trace.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::custody::Holder;
use crate::events::{CancelReason, Event, EventId, EventPayload, OrderCancelledEvent};
use crate::keeper::KeeperFeeOracle;
use crate::liquidation::LiquidationParams;
use crate::liquidity::{PoolShares, StableParams};
use crate::oracle::{OracleAdapter, OraclePrice, PullPriceFeed, PullUpdate, PushPriceFeed};
use crate::order::{LimitOrder, Order, OrderKind};
use crate::ownership::PositionRegistry;
use crate::position::LeverageParams;
use crate::types::{AccountId, PositionId, Timestamp};
use crate::math::MAX_AMOUNT;
use crate::vault::{ModuleKey, Vault};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/** 8.1: everything a failed call must roll back */
#[derive(Debug, Clone)]
pub(super) struct EngineState {
    pub(super) vault: Vault,
    pub(super) shares: PoolShares,
    pub(super) registry: PositionRegistry,
    // delayed orders keyed by account, limit orders keyed by position
    pub(super) orders: BTreeMap<AccountId, Order>,
    pub(super) limit_orders: BTreeMap<PositionId, LimitOrder>,
    pub(super) leverage: LeverageParams,
    pub(super) stable: StableParams,
    pub(super) liquidation: LiquidationParams,
}

/** 8.2: main engine struct */
#[derive(Debug)]
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) owner: AccountId,
    pub(super) oracle: OracleAdapter,
    pub(super) keeper_fee_oracle: Arc<dyn KeeperFeeOracle>,
    pub(super) state: EngineState,
    // append-only, so rollback truncates instead of restoring a copy
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) current_time: Timestamp,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        push_feed: Arc<dyn PushPriceFeed>,
        pull_feed: Arc<dyn PullPriceFeed>,
        keeper_fee_oracle: Arc<dyn KeeperFeeOracle>,
        owner: AccountId,
    ) -> Result<Self, EngineError> {
        config.protocol.validate()?;
        let protocol = config.protocol.clone();
        let now = config.start_time;

        Ok(Self {
            oracle: OracleAdapter::new(push_feed, pull_feed, protocol.oracle),
            keeper_fee_oracle,
            owner,
            state: EngineState {
                vault: Vault::new(protocol.vault, now),
                shares: PoolShares::new(),
                registry: PositionRegistry::new(),
                orders: BTreeMap::new(),
                limit_orders: BTreeMap::new(),
                leverage: protocol.leverage,
                stable: protocol.stable,
                liquidation: protocol.liquidation,
            },
            events: Vec::new(),
            next_event_id: 1,
            current_time: now,
            config,
        })
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, secs: i64) {
        self.current_time = self.current_time.plus(secs);
    }

    pub fn owner(&self) -> AccountId {
        self.owner
    }

    pub fn vault(&self) -> &Vault {
        &self.state.vault
    }

    pub fn pool_shares(&self) -> &PoolShares {
        &self.state.shares
    }

    pub fn positions(&self) -> &PositionRegistry {
        &self.state.registry
    }

    pub fn oracle(&self) -> &OracleAdapter {
        &self.oracle
    }

    pub fn leverage_params(&self) -> &LeverageParams {
        &self.state.leverage
    }

    pub fn stable_params(&self) -> &StableParams {
        &self.state.stable
    }

    pub fn liquidation_params(&self) -> &LiquidationParams {
        &self.state.liquidation
    }

    pub fn pending_order(&self, account: AccountId) -> Option<&Order> {
        self.state.orders.get(&account)
    }

    pub fn limit_order(&self, position: PositionId) -> Option<&LimitOrder> {
        self.state.limit_orders.get(&position)
    }

    pub fn collateral_balance(&self, account: AccountId) -> Decimal {
        self.state.vault.ledger().balance_of(Holder::Account(account))
    }

    pub fn escrow_balance(&self) -> Decimal {
        self.state.vault.ledger().balance_of(Holder::OrderEscrow)
    }

    pub fn keeper_fee_quote(&self) -> Decimal {
        self.keeper_fee_oracle.keeper_fee()
    }

    // faucet. the only way collateral enters the system.
    pub fn mint_collateral(&mut self, account: AccountId, amount: Decimal) -> Result<(), EngineError> {
        self.atomic(|engine| {
            engine.check_amount("amount", amount)?;
            engine
                .state
                .vault
                .mint_collateral(Holder::Account(account), amount)?;
            Ok(())
        })
    }

    pub fn transfer_position(&mut self, from: AccountId, to: AccountId, position: PositionId) -> Result<(), EngineError> {
        self.atomic(|engine| Ok(engine.state.registry.transfer(from, to, position)?))
    }

    pub fn transfer_shares(&mut self, from: AccountId, to: AccountId, amount: Decimal) -> Result<(), EngineError> {
        self.atomic(|engine| Ok(engine.state.shares.transfer(from, to, amount)?))
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    // 8.3: all-or-nothing. state is restored if `f` fails anywhere.
    pub(super) fn atomic<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let snapshot = self.state.clone();
        let first_event_id = self.next_event_id;
        let result = f(self);
        match &result {
            Err(err) => {
                warn!(error = %err, kind = ?err.kind(), "call rolled back");
                self.state = snapshot;
                let kept = self.events.partition_point(|event| event.id.0 < first_event_id);
                self.events.truncate(kept);
                self.next_event_id = first_event_id;
            }
            Ok(_) => {
                // oldest entries only drop once the call has committed
                if self.events.len() > self.config.max_events {
                    let drain_count = self.events.len() - self.config.max_events;
                    self.events.drain(0..drain_count);
                }
            }
        }
        result
    }

    pub(super) fn ensure_owner(&self, caller: AccountId) -> Result<(), EngineError> {
        if caller != self.owner {
            return Err(EngineError::Unauthorized { caller });
        }
        Ok(())
    }

    pub(super) fn ensure_not_paused(&self, modules: &[ModuleKey]) -> Result<(), EngineError> {
        for module in modules {
            self.state.vault.ensure_not_paused(*module)?;
        }
        Ok(())
    }

    pub(super) fn check_amount(&self, what: &'static str, amount: Decimal) -> Result<(), EngineError> {
        if amount.abs() > MAX_AMOUNT {
            return Err(EngineError::AmountTooLarge {
                what,
                amount,
                maximum: MAX_AMOUNT,
            });
        }
        Ok(())
    }

    pub(super) fn check_keeper_fee(&self, keeper_fee: Decimal) -> Result<(), EngineError> {
        self.check_amount("keeper_fee", keeper_fee)?;
        let required = self.keeper_fee_quote();
        if keeper_fee < required {
            return Err(EngineError::InvalidFee {
                provided: keeper_fee,
                required,
            });
        }
        Ok(())
    }

    pub(super) fn price(&self, max_age: Option<i64>) -> Result<OraclePrice, EngineError> {
        Ok(self.oracle.get_price(self.current_time, max_age)?)
    }

    pub(super) fn apply_price_update(&self, update: Option<(PullUpdate, Decimal)>) -> Result<(), EngineError> {
        if let Some((update, fee_paid)) = update {
            self.oracle.update_pull_price(update, fee_paid)?;
        }
        Ok(())
    }

    pub(super) fn transfer(&mut self, from: Holder, to: Holder, amount: Decimal) -> Result<(), EngineError> {
        self.state.vault.transfer(from, to, amount)?;
        Ok(())
    }

    // removes a pending order and hands back whatever it was holding
    pub(super) fn release_order(&mut self, account: AccountId, reason: CancelReason) -> Result<Order, EngineError> {
        let order = self
            .state
            .orders
            .remove(&account)
            .ok_or(EngineError::NoExistingOrder(account))?;

        let refunded = order.escrowed_collateral();
        self.transfer(Holder::OrderEscrow, Holder::Account(account), refunded)?;

        match order.kind {
            OrderKind::StableWithdraw { withdraw_amount, .. } => {
                self.state.shares.unlock(account, withdraw_amount);
            }
            OrderKind::LeverageAdjust { position, .. } | OrderKind::LeverageClose { position, .. } => {
                if self.state.registry.is_locked_by(position, ModuleKey::Orders) {
                    self.state.registry.unlock(position, ModuleKey::Orders)?;
                }
            }
            _ => {}
        }

        self.emit_event(EventPayload::OrderCancelled(OrderCancelledEvent {
            account,
            order_type: order.order_type(),
            refunded,
            reason,
        }));
        Ok(order)
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;

        debug!(id = event.id.0, payload = ?event.payload, "event");

        self.events.push(event);
    }
}
