// 9.2 custody.rs: collateral balances held by accounts, the vault, and order escrow.
// this is the asset the accounting totals must be backed by. in-memory only.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::types::AccountId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Holder {
    Account(AccountId),
    Vault,
    // funds taken at announce time, released at execute or cancel
    OrderEscrow,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("insufficient collateral: {holder:?} has {available}, needs {requested}")]
    InsufficientBalance {
        holder: Holder,
        available: Decimal,
        requested: Decimal,
    },
    #[error("insufficient pool shares: {account} has {available} unlocked, needs {requested}")]
    InsufficientShares {
        account: AccountId,
        available: Decimal,
        requested: Decimal,
    },
    #[error("negative amount {0}")]
    NegativeAmount(Decimal),
    #[error("{0} not found")]
    UnknownPosition(crate::types::PositionId),
    #[error("{account} does not own {position}")]
    NotOwner {
        account: AccountId,
        position: crate::types::PositionId,
    },
    #[error("{position} is locked")]
    PositionLocked { position: crate::types::PositionId },
    #[error("{position} is not locked by {module:?}")]
    NotLockedByModule {
        position: crate::types::PositionId,
        module: crate::vault::ModuleKey,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollateralLedger {
    balances: HashMap<Holder, Decimal>,
    total_minted: Decimal,
}

impl CollateralLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, holder: Holder) -> Decimal {
        self.balances.get(&holder).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn total_minted(&self) -> Decimal {
        self.total_minted
    }

    // faucet. collateral enters the system only here.
    pub fn mint(&mut self, holder: Holder, amount: Decimal) -> Result<(), LedgerError> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::NegativeAmount(amount));
        }
        *self.balances.entry(holder).or_insert(Decimal::ZERO) += amount;
        self.total_minted += amount;
        Ok(())
    }

    pub fn transfer(&mut self, from: Holder, to: Holder, amount: Decimal) -> Result<(), LedgerError> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::NegativeAmount(amount));
        }
        if amount.is_zero() || from == to {
            return Ok(());
        }
        let available = self.balance_of(from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                holder: from,
                available,
                requested: amount,
            });
        }
        self.balances.insert(from, available - amount);
        *self.balances.entry(to).or_insert(Decimal::ZERO) += amount;
        Ok(())
    }

    pub fn total_held(&self) -> Decimal {
        self.balances.values().copied().sum()
    }
}
