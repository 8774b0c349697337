// 9.3 liquidity.rs: pool shares. fungible claims on the stable collateral total.
// value per share = pool collateral / total supply. locked shares back a pending
// withdrawal and cannot be moved until the order executes or is cancelled.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::custody::LedgerError;
use crate::math::{div_down, mul_div_down, mul_down};
use crate::types::AccountId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StableParams {
    // share of the withdrawn collateral left behind for the remaining depositors
    pub withdraw_fee_ratio: Decimal,
    // smallest non-zero share supply. keeps the first depositor from pricing shares.
    pub min_liquidity: Decimal,
}

impl Default for StableParams {
    fn default() -> Self {
        Self {
            withdraw_fee_ratio: dec!(0.0025),
            min_liquidity: dec!(0.0001),
        }
    }
}

impl StableParams {
    pub fn withdraw_fee(&self, amount_out: Decimal) -> Decimal {
        mul_down(amount_out, self.withdraw_fee_ratio)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolShares {
    balances: HashMap<AccountId, Decimal>,
    locked: HashMap<AccountId, Decimal>,
    total_supply: Decimal,
}

impl PoolShares {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_supply(&self) -> Decimal {
        self.total_supply
    }

    pub fn balance_of(&self, account: AccountId) -> Decimal {
        self.balances.get(&account).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn locked_of(&self, account: AccountId) -> Decimal {
        self.locked.get(&account).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn unlocked_balance_of(&self, account: AccountId) -> Decimal {
        self.balance_of(account) - self.locked_of(account)
    }

    pub(crate) fn mint(&mut self, account: AccountId, amount: Decimal) {
        *self.balances.entry(account).or_insert(Decimal::ZERO) += amount;
        self.total_supply += amount;
    }

    // burns locked shares first: a withdrawal consumes what it locked
    pub(crate) fn burn(&mut self, account: AccountId, amount: Decimal) -> Result<(), LedgerError> {
        let balance = self.balance_of(account);
        if balance < amount {
            return Err(LedgerError::InsufficientShares {
                account,
                available: balance,
                requested: amount,
            });
        }
        let locked = self.locked_of(account);
        self.locked.insert(account, (locked - amount).max(Decimal::ZERO));
        self.balances.insert(account, balance - amount);
        self.total_supply -= amount;
        Ok(())
    }

    pub(crate) fn lock(&mut self, account: AccountId, amount: Decimal) -> Result<(), LedgerError> {
        let available = self.unlocked_balance_of(account);
        if available < amount {
            return Err(LedgerError::InsufficientShares {
                account,
                available,
                requested: amount,
            });
        }
        *self.locked.entry(account).or_insert(Decimal::ZERO) += amount;
        Ok(())
    }

    pub(crate) fn unlock(&mut self, account: AccountId, amount: Decimal) {
        let locked = self.locked_of(account);
        self.locked.insert(account, (locked - amount).max(Decimal::ZERO));
    }

    pub fn transfer(&mut self, from: AccountId, to: AccountId, amount: Decimal) -> Result<(), LedgerError> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::NegativeAmount(amount));
        }
        let available = self.unlocked_balance_of(from);
        if available < amount {
            return Err(LedgerError::InsufficientShares {
                account: from,
                available,
                requested: amount,
            });
        }
        let balance = self.balance_of(from);
        self.balances.insert(from, balance - amount);
        *self.balances.entry(to).or_insert(Decimal::ZERO) += amount;
        Ok(())
    }
}

// 9.3.1: collateral per share. an empty pool prices shares 1:1.
pub fn collateral_per_share(pool_collateral: Decimal, total_supply: Decimal) -> Decimal {
    if total_supply.is_zero() {
        Decimal::ONE
    } else {
        div_down(pool_collateral, total_supply)
    }
}

// None when live shares are backed by nothing: any deposit would mint unbounded shares
pub fn shares_for_deposit(deposit: Decimal, pool_collateral: Decimal, total_supply: Decimal) -> Option<Decimal> {
    if total_supply.is_zero() {
        return Some(deposit);
    }
    if pool_collateral <= Decimal::ZERO {
        return None;
    }
    Some(mul_div_down(deposit, total_supply, pool_collateral))
}

pub fn collateral_for_shares(shares: Decimal, pool_collateral: Decimal, total_supply: Decimal) -> Decimal {
    if total_supply.is_zero() || pool_collateral <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    mul_div_down(shares, pool_collateral, total_supply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn mint_burn_supply() {
        let mut shares = PoolShares::new();
        shares.mint(AccountId(1), dec!(100));
        shares.mint(AccountId(2), dec!(50));
        assert_eq!(shares.total_supply(), dec!(150));

        shares.burn(AccountId(1), dec!(40)).unwrap();
        assert_eq!(shares.balance_of(AccountId(1)), dec!(60));
        assert_eq!(shares.total_supply(), dec!(110));
    }

    #[test]
    fn locked_shares_cannot_move() {
        let mut shares = PoolShares::new();
        shares.mint(AccountId(1), dec!(100));
        shares.lock(AccountId(1), dec!(80)).unwrap();

        assert_eq!(shares.unlocked_balance_of(AccountId(1)), dec!(20));
        assert!(shares.transfer(AccountId(1), AccountId(2), dec!(21)).is_err());
        shares.transfer(AccountId(1), AccountId(2), dec!(20)).unwrap();
        assert!(shares.lock(AccountId(1), dec!(1)).is_err());

        shares.unlock(AccountId(1), dec!(80));
        assert_eq!(shares.unlocked_balance_of(AccountId(1)), dec!(80));
    }

    #[test]
    fn burn_consumes_lock() {
        let mut shares = PoolShares::new();
        shares.mint(AccountId(1), dec!(100));
        shares.lock(AccountId(1), dec!(30)).unwrap();
        shares.burn(AccountId(1), dec!(30)).unwrap();
        assert_eq!(shares.locked_of(AccountId(1)), Decimal::ZERO);
        assert_eq!(shares.unlocked_balance_of(AccountId(1)), dec!(70));
    }

    #[test]
    fn share_pricing() {
        assert_eq!(collateral_per_share(Decimal::ZERO, Decimal::ZERO), Decimal::ONE);
        assert_eq!(collateral_per_share(dec!(110), dec!(100)), dec!(1.1));
        assert_eq!(shares_for_deposit(dec!(11), dec!(110), dec!(100)), Some(dec!(10)));
        assert_eq!(shares_for_deposit(dec!(5), Decimal::ZERO, Decimal::ZERO), Some(dec!(5)));
        assert_eq!(shares_for_deposit(dec!(5), Decimal::ZERO, dec!(100)), None);
        assert_eq!(collateral_for_shares(dec!(10), dec!(110), dec!(100)), dec!(11));
    }

    #[test]
    fn withdraw_fee_rounds_down() {
        let params = StableParams::default();
        assert_eq!(params.withdraw_fee(dec!(100)), dec!(0.25));
        assert_eq!(params.withdraw_fee(dec!(0.000000000000000001)), Decimal::ZERO);
    }
}
