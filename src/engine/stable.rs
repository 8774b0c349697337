//! Pool deposits and withdrawals.

use super::core::Engine;
use super::results::{EngineError, ExecutionOutcome};
use crate::custody::Holder;
use crate::events::{DepositEvent, EventPayload, WithdrawEvent};
use crate::liquidity::{collateral_for_shares, shares_for_deposit};
use crate::order::{Order, OrderKind};
use crate::types::{AccountId, Price};
use crate::vault::ModuleKey;
use rust_decimal::Decimal;
use tracing::info;

/// Quote for a withdrawal at a given pool value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct WithdrawQuote {
    pub amount_out: Decimal,
    pub withdraw_fee: Decimal,
}

impl Engine {
    /// Escrows `deposit_amount + keeper_fee` and records a deposit order.
    pub fn announce_stable_deposit(
        &mut self,
        account: AccountId,
        deposit_amount: Decimal,
        min_amount_out: Decimal,
        keeper_fee: Decimal,
    ) -> Result<Order, EngineError> {
        self.atomic(|engine| {
            engine.ensure_not_paused(&[ModuleKey::Orders, ModuleKey::Stable])?;
            if deposit_amount <= Decimal::ZERO {
                return Err(EngineError::ValueNotPositive { what: "deposit_amount" });
            }
            engine.check_amount("deposit_amount", deposit_amount)?;
            engine.check_keeper_fee(keeper_fee)?;
            engine.state.vault.check_collateral_cap(deposit_amount)?;

            let price = engine.price(None)?.price;
            let quoted = engine.deposit_quote(deposit_amount, price)?;
            if quoted < min_amount_out {
                return Err(EngineError::HighSlippage {
                    amount_out: quoted,
                    accepted: min_amount_out,
                });
            }

            let kind = OrderKind::StableDeposit {
                deposit_amount,
                min_amount_out,
            };
            engine.record_order(account, kind, keeper_fee)
        })
    }

    /// Locks `withdraw_amount` pool shares and records a withdrawal order.
    /// The keeper fee is taken from the withdrawn collateral.
    pub fn announce_stable_withdraw(
        &mut self,
        account: AccountId,
        withdraw_amount: Decimal,
        min_amount_out: Decimal,
        keeper_fee: Decimal,
    ) -> Result<Order, EngineError> {
        self.atomic(|engine| {
            engine.ensure_not_paused(&[ModuleKey::Orders, ModuleKey::Stable])?;
            if withdraw_amount <= Decimal::ZERO {
                return Err(EngineError::ValueNotPositive { what: "withdraw_amount" });
            }
            engine.check_amount("withdraw_amount", withdraw_amount)?;
            engine.check_keeper_fee(keeper_fee)?;

            let price = engine.price(None)?.price;
            let quote = engine.withdraw_quote(withdraw_amount, price)?;
            let received = quote.amount_out - quote.withdraw_fee - keeper_fee;
            if received < min_amount_out {
                return Err(EngineError::HighSlippage {
                    amount_out: received,
                    accepted: min_amount_out,
                });
            }

            let kind = OrderKind::StableWithdraw {
                withdraw_amount,
                min_amount_out,
            };
            // slot first: a replaced withdrawal gives its shares back before we lock again
            let order = engine.record_order(account, kind, keeper_fee)?;
            engine.state.shares.lock(account, withdraw_amount)?;
            Ok(order)
        })
    }

    /// Shares minted for `deposit_amount` at `price`.
    pub fn stable_deposit_quote(&self, deposit_amount: Decimal) -> Result<Decimal, EngineError> {
        let price = self.price(None)?.price;
        self.deposit_quote(deposit_amount, price)
    }

    /// Collateral paid out for `withdraw_amount` shares before keeper fee.
    pub fn stable_withdraw_quote(&self, withdraw_amount: Decimal) -> Result<Decimal, EngineError> {
        let price = self.price(None)?.price;
        let quote = self.withdraw_quote(withdraw_amount, price)?;
        Ok(quote.amount_out - quote.withdraw_fee)
    }

    /// Value of one pool share after settling every position at the current price.
    pub fn stable_collateral_per_share(&self) -> Result<Decimal, EngineError> {
        let price = self.price(None)?.price;
        let pool = self
            .state
            .vault
            .stable_collateral_total_after_settlement(price, self.current_time)?;
        Ok(crate::liquidity::collateral_per_share(pool, self.state.shares.total_supply()))
    }

    pub(super) fn deposit_quote(&self, deposit_amount: Decimal, price: Price) -> Result<Decimal, EngineError> {
        let pool = self
            .state
            .vault
            .stable_collateral_total_after_settlement(price, self.current_time)?;
        shares_for_deposit(deposit_amount, pool, self.state.shares.total_supply()).ok_or(EngineError::PoolValueZero)
    }

    pub(super) fn withdraw_quote(&self, withdraw_amount: Decimal, price: Price) -> Result<WithdrawQuote, EngineError> {
        let pool = self
            .state
            .vault
            .stable_collateral_total_after_settlement(price, self.current_time)?;
        let amount_out = collateral_for_shares(withdraw_amount, pool, self.state.shares.total_supply());
        Ok(WithdrawQuote {
            amount_out,
            withdraw_fee: self.state.stable.withdraw_fee(amount_out),
        })
    }

    // 9.1: funding is already settled when these run
    pub(super) fn execute_stable_deposit(
        &mut self,
        order: &Order,
        deposit_amount: Decimal,
        min_amount_out: Decimal,
        price: Price,
        keeper: AccountId,
    ) -> Result<ExecutionOutcome, EngineError> {
        self.state.vault.check_collateral_cap(deposit_amount)?;

        let supply = self.state.shares.total_supply();
        let minted_shares = self.deposit_quote(deposit_amount, price)?;
        if minted_shares < min_amount_out {
            return Err(EngineError::HighSlippage {
                amount_out: minted_shares,
                accepted: min_amount_out,
            });
        }
        if supply.is_zero() && minted_shares < self.state.stable.min_liquidity {
            return Err(EngineError::AmountTooSmall {
                amount: minted_shares,
                minimum: self.state.stable.min_liquidity,
            });
        }

        self.state.vault.update_stable_collateral_total(deposit_amount);
        self.state.shares.mint(order.account, minted_shares);

        self.transfer(Holder::OrderEscrow, Holder::Vault, deposit_amount)?;
        self.transfer(Holder::OrderEscrow, Holder::Account(keeper), order.keeper_fee)?;

        info!(account = %order.account, %deposit_amount, %minted_shares, "stable deposit");
        self.emit_event(EventPayload::Deposit(DepositEvent {
            account: order.account,
            deposit_amount,
            minted_shares,
        }));
        Ok(ExecutionOutcome::Deposited { minted_shares })
    }

    pub(super) fn execute_stable_withdraw(
        &mut self,
        order: &Order,
        withdraw_amount: Decimal,
        min_amount_out: Decimal,
        price: Price,
        keeper: AccountId,
    ) -> Result<ExecutionOutcome, EngineError> {
        let account = order.account;
        let quote = self.withdraw_quote(withdraw_amount, price)?;
        let leaving_vault = quote.amount_out - quote.withdraw_fee;
        let received = leaving_vault - order.keeper_fee;
        if received < Decimal::ZERO {
            return Err(EngineError::NotEnoughMarginForFees {
                settled_margin: leaving_vault,
                fees: order.keeper_fee,
            });
        }
        if received < min_amount_out {
            return Err(EngineError::HighSlippage {
                amount_out: received,
                accepted: min_amount_out,
            });
        }

        self.state.shares.burn(account, withdraw_amount)?;
        let supply = self.state.shares.total_supply();
        let min_liquidity = self.state.stable.min_liquidity;
        if !supply.is_zero() && supply < min_liquidity {
            return Err(EngineError::AmountTooSmall {
                amount: supply,
                minimum: min_liquidity,
            });
        }

        // the fee stays behind for the remaining shares
        self.state.vault.update_stable_collateral_total(-leaving_vault);
        self.state.vault.check_skew_max(Decimal::ZERO, Decimal::ZERO)?;

        self.transfer(Holder::Vault, Holder::Account(keeper), order.keeper_fee)?;
        self.transfer(Holder::Vault, Holder::Account(account), received)?;

        info!(%account, %withdraw_amount, amount_out = %quote.amount_out, "stable withdraw");
        self.emit_event(EventPayload::Withdraw(WithdrawEvent {
            account,
            burned_shares: withdraw_amount,
            amount_out: quote.amount_out,
            withdraw_fee: quote.withdraw_fee,
        }));
        Ok(ExecutionOutcome::Withdrawn {
            amount_out: quote.amount_out,
            withdraw_fee: quote.withdraw_fee,
        })
    }
}
