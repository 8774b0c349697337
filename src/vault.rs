// 6.0 vault.rs: the global ledger. owns the pool total, the aggregate of all open
// positions, the funding state, per-position records, custody and the pause table.
// mutators are crate-private: only the engine's lifecycle code can move funds.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::custody::{CollateralLedger, Holder, LedgerError};
use crate::funding::{
    accrued_funding_total_by_longs, update_funding_state, FundingError, FundingParams, FundingRecompute,
    FundingState,
};
use crate::math::round_down;
use crate::position::{calculate_profit_loss_total, Position};
use crate::types::{PositionId, Price, Timestamp};

// skew ceiling at or above this value turns the check off
pub const SKEW_CHECK_DISABLED: Decimal = Decimal::MAX;

// 6.1: components that can be paused independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKey {
    Stable,
    Leverage,
    Orders,
    LimitOrders,
    Liquidation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultParams {
    // sizeOpenedTotal / stableCollateralTotal ceiling for long-increasing actions
    pub skew_fraction_max: Decimal,
    pub stable_collateral_cap: Decimal,
    // seconds
    pub min_executability_age: i64,
    pub max_executability_age: i64,
    pub funding: FundingParams,
}

impl Default for VaultParams {
    fn default() -> Self {
        Self {
            skew_fraction_max: dec!(1.2),
            stable_collateral_cap: dec!(1000000),
            min_executability_age: 10,
            max_executability_age: 60,
            funding: FundingParams::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GlobalPositions {
    // margin + funding + pnl realized so far, over every open position
    pub margin_deposited_total: Decimal,
    pub size_opened_total: Decimal,
    // sum of size * entry price over open positions
    #[serde(default)]
    pub entry_notional_total: Decimal,
    // price the aggregate pnl was last realized at. None until the first open.
    pub reference_price: Option<Price>,
}

impl GlobalPositions {
    // aggregate pnl not yet moved out of the pool total
    pub fn unsettled_profit_loss(&self, price: Price) -> Decimal {
        match self.reference_price {
            Some(reference) if !self.size_opened_total.is_zero() => {
                calculate_profit_loss_total(self.entry_notional_total, reference, price)
            }
            _ => Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    #[error("max skew reached: fraction {skew_fraction}")]
    MaxSkewReached { skew_fraction: Decimal },
    #[error("deposit cap reached: cap {cap}")]
    DepositCapReached { cap: Decimal },
    #[error("insufficient global margin: total {margin_total}, delta {delta}")]
    InsufficientGlobalMargin { margin_total: Decimal, delta: Decimal },
    #[error("module {0:?} is paused")]
    ModulePaused(ModuleKey),
    #[error(transparent)]
    Funding(#[from] FundingError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingSettlement {
    // paid to longs (positive) or by longs (negative) this interval
    pub funding_fees: Decimal,
    pub current_rate: Decimal,
    pub cumulative_funding_rate: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vault {
    params: VaultParams,
    funding: FundingState,
    stable_collateral_total: Decimal,
    global: GlobalPositions,
    positions: BTreeMap<PositionId, Position>,
    paused: BTreeSet<ModuleKey>,
    ledger: CollateralLedger,
}

impl Vault {
    pub fn new(params: VaultParams, now: Timestamp) -> Self {
        Self {
            params,
            funding: FundingState::new(now),
            stable_collateral_total: Decimal::ZERO,
            global: GlobalPositions::default(),
            positions: BTreeMap::new(),
            paused: BTreeSet::new(),
            ledger: CollateralLedger::new(),
        }
    }

    pub fn params(&self) -> &VaultParams {
        &self.params
    }

    pub fn funding_state(&self) -> &FundingState {
        &self.funding
    }

    pub fn stable_collateral_total(&self) -> Decimal {
        self.stable_collateral_total
    }

    pub fn global_positions(&self) -> &GlobalPositions {
        &self.global
    }

    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.positions.get(&id)
    }

    pub fn positions(&self) -> impl Iterator<Item = (&PositionId, &Position)> {
        self.positions.iter()
    }

    pub fn ledger(&self) -> &CollateralLedger {
        &self.ledger
    }

    pub fn balance(&self) -> Decimal {
        self.ledger.balance_of(Holder::Vault)
    }

    // positive = longs outweigh the pool
    pub fn skew(&self) -> Decimal {
        self.global.size_opened_total - self.stable_collateral_total
    }

    pub fn is_paused(&self, module: ModuleKey) -> bool {
        self.paused.contains(&module)
    }

    pub fn ensure_not_paused(&self, module: ModuleKey) -> Result<(), VaultError> {
        if self.is_paused(module) {
            return Err(VaultError::ModulePaused(module));
        }
        Ok(())
    }

    // 6.2: funding as it would be at `now`, without writing anything
    pub fn preview_funding(&self, now: Timestamp) -> Result<FundingRecompute, VaultError> {
        Ok(update_funding_state(
            &self.funding,
            self.skew(),
            self.stable_collateral_total,
            now,
            &self.params.funding,
        )?)
    }

    pub fn next_cumulative_funding(&self, now: Timestamp) -> Result<Decimal, VaultError> {
        Ok(self.preview_funding(now)?.state.cumulative_funding_rate)
    }

    pub fn current_funding_rate(&self, now: Timestamp) -> Result<Decimal, VaultError> {
        Ok(self.preview_funding(now)?.current_rate)
    }

    // 6.3: pool total if every open position were settled at `price` right now
    pub fn stable_collateral_total_after_settlement(&self, price: Price, now: Timestamp) -> Result<Decimal, VaultError> {
        let recompute = self.preview_funding(now)?;
        let funding_fees =
            accrued_funding_total_by_longs(self.global.size_opened_total, recompute.unrecorded_funding);
        let settled = self.stable_collateral_total - funding_fees - self.global.unsettled_profit_loss(price);
        Ok(settled.max(Decimal::ZERO))
    }

    // 6.4: moves the interval's aggregate funding between longs and the pool.
    // a second call at the same instant moves nothing.
    pub(crate) fn settle_funding_fees(&mut self, now: Timestamp) -> Result<FundingSettlement, VaultError> {
        let recompute = self.preview_funding(now)?;
        let funding_fees =
            accrued_funding_total_by_longs(self.global.size_opened_total, recompute.unrecorded_funding);

        self.funding = recompute.state;
        self.global.margin_deposited_total =
            (self.global.margin_deposited_total + funding_fees).max(Decimal::ZERO);
        self.update_stable_collateral_total(-funding_fees);

        Ok(FundingSettlement {
            funding_fees,
            current_rate: recompute.current_rate,
            cumulative_funding_rate: recompute.state.cumulative_funding_rate,
        })
    }

    // 6.5: realize the aggregate's pnl out of the pool and into the margin total at
    // `price`, then apply the deltas. a position leaving the market takes its settled
    // margin with it, so the pool total plus the margin total always match the vault.
    pub(crate) fn update_global_position_data(
        &mut self,
        price: Price,
        margin_delta: Decimal,
        size_delta: Decimal,
        entry_notional_delta: Decimal,
    ) -> Result<(), VaultError> {
        let profit_loss_total = self.global.unsettled_profit_loss(price);
        let margin_total = self.global.margin_deposited_total + profit_loss_total + margin_delta;
        if margin_total < Decimal::ZERO {
            return Err(VaultError::InsufficientGlobalMargin {
                margin_total: self.global.margin_deposited_total + profit_loss_total,
                delta: margin_delta,
            });
        }

        self.update_stable_collateral_total(-profit_loss_total);
        self.global.margin_deposited_total = margin_total;
        self.global.size_opened_total = (self.global.size_opened_total + size_delta).max(Decimal::ZERO);
        self.global.entry_notional_total += entry_notional_delta;
        self.global.reference_price = Some(price);

        // last position gone: rounding dust goes back to the pool
        if self.global.size_opened_total.is_zero() {
            let dust = self.global.margin_deposited_total;
            self.global.margin_deposited_total = Decimal::ZERO;
            self.global.entry_notional_total = Decimal::ZERO;
            self.update_stable_collateral_total(dust);
        }
        Ok(())
    }

    // floored at zero
    pub(crate) fn update_stable_collateral_total(&mut self, delta: Decimal) {
        self.stable_collateral_total = (self.stable_collateral_total + delta).max(Decimal::ZERO);
    }

    pub(crate) fn set_position(&mut self, id: PositionId, position: Position) {
        self.positions.insert(id, position);
    }

    pub(crate) fn delete_position(&mut self, id: PositionId) -> Option<Position> {
        self.positions.remove(&id)
    }

    pub(crate) fn set_params(&mut self, params: VaultParams) {
        self.params = params;
    }

    pub(crate) fn set_paused(&mut self, module: ModuleKey, paused: bool) {
        if paused {
            self.paused.insert(module);
        } else {
            self.paused.remove(&module);
        }
    }

    pub(crate) fn mint_collateral(&mut self, holder: Holder, amount: Decimal) -> Result<(), VaultError> {
        Ok(self.ledger.mint(holder, amount)?)
    }

    pub(crate) fn transfer(&mut self, from: Holder, to: Holder, amount: Decimal) -> Result<(), VaultError> {
        Ok(self.ledger.transfer(from, to, amount)?)
    }

    // 6.6: guards
    pub fn check_skew_max(&self, size_increase: Decimal, stable_collateral_change: Decimal) -> Result<(), VaultError> {
        if self.params.skew_fraction_max >= SKEW_CHECK_DISABLED {
            return Ok(());
        }
        let (Some(total_size), Some(pool)) = (
            self.global.size_opened_total.checked_add(size_increase),
            self.stable_collateral_total.checked_add(stable_collateral_change),
        ) else {
            return Err(VaultError::MaxSkewReached {
                skew_fraction: Decimal::MAX,
            });
        };
        if pool <= Decimal::ZERO {
            if total_size > Decimal::ZERO {
                return Err(VaultError::MaxSkewReached {
                    skew_fraction: Decimal::MAX,
                });
            }
            return Ok(());
        }
        let skew_fraction = total_size.checked_div(pool).map_or(Decimal::MAX, round_down);
        if skew_fraction > self.params.skew_fraction_max {
            return Err(VaultError::MaxSkewReached { skew_fraction });
        }
        Ok(())
    }

    pub fn check_collateral_cap(&self, deposit: Decimal) -> Result<(), VaultError> {
        if self.stable_collateral_total + deposit > self.params.stable_collateral_cap {
            return Err(VaultError::DepositCapReached {
                cap: self.params.stable_collateral_cap,
            });
        }
        Ok(())
    }
}
