// 8.0.2: result types and errors for engine operations.

use crate::config::ConfigError;
use crate::custody::LedgerError;
use crate::oracle::OracleError;
use crate::order::{LimitTrigger, OrderType};
use crate::types::{AccountId, PositionId, Price, Timestamp};
use crate::vault::VaultError;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseResult {
    pub position: PositionId,
    pub owner: AccountId,
    pub close_price: Price,
    pub profit_loss: Decimal,
    pub accrued_funding: Decimal,
    pub settled_margin: Decimal,
    pub trade_fee: Decimal,
    pub keeper_fee: Decimal,
    pub amount_to_owner: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Deposited { minted_shares: Decimal },
    Withdrawn { amount_out: Decimal, withdraw_fee: Decimal },
    Opened { position: PositionId },
    Adjusted { position: PositionId, new_margin: Decimal, new_additional_size: Decimal },
    Closed(CloseResult),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderResult {
    pub account: AccountId,
    pub order_type: OrderType,
    pub price: Price,
    pub keeper_fee: Decimal,
    pub outcome: ExecutionOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitOrderResult {
    pub trigger: LimitTrigger,
    pub fill_price: Price,
    pub close: CloseResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingResult {
    pub funding_fees: Decimal,
    pub funding_rate: Decimal,
    pub cumulative_funding_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationResult {
    pub position: PositionId,
    pub owner: AccountId,
    pub liquidation_price: Price,
    pub settled_margin: Decimal,
    pub liquidator_fee: Decimal,
    // negative when the pool absorbed a deficit
    pub pool_credit: Decimal,
}

/// Coarse error classes callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Economic,
    Timing,
    Oracle,
    Authorization,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("{what} must be positive")]
    ValueNotPositive { what: &'static str },

    #[error("keeper fee {provided} below current quote {required}")]
    InvalidFee { provided: Decimal, required: Decimal },

    #[error("amount {amount} below minimum {minimum}")]
    AmountTooSmall { amount: Decimal, minimum: Decimal },

    #[error("{what} {amount} above maximum {maximum}")]
    AmountTooLarge {
        what: &'static str,
        amount: Decimal,
        maximum: Decimal,
    },

    #[error("invalid limit thresholds: lower {lower} must be below upper {upper}")]
    InvalidThresholds { lower: Price, upper: Price },

    #[error("High slippage: got {amount_out}, accepted at least {accepted}")]
    HighSlippage { amount_out: Decimal, accepted: Decimal },

    #[error("max fill price {max_fill_price} below current price {current_price}")]
    MaxFillPriceTooLow { max_fill_price: Price, current_price: Price },

    #[error("min fill price {min_fill_price} above current price {current_price}")]
    MinFillPriceTooHigh { min_fill_price: Price, current_price: Price },

    #[error("margin {margin} below minimum {minimum}")]
    MarginTooSmall { margin: Decimal, minimum: Decimal },

    #[error("leverage {leverage} below minimum {minimum}")]
    LeverageTooLow { leverage: Decimal, minimum: Decimal },

    #[error("leverage {leverage} above maximum {maximum}")]
    LeverageTooHigh { leverage: Decimal, maximum: Decimal },

    #[error("position would be liquidatable immediately")]
    PositionCreatesBadDebt,

    #[error("settled margin {settled_margin} cannot cover fees {fees}")]
    NotEnoughMarginForFees { settled_margin: Decimal, fees: Decimal },

    #[error("pool shares are outstanding but the pool holds no value")]
    PoolValueZero,

    #[error("{0} cannot be liquidated")]
    CannotLiquidate(PositionId),

    #[error("price {price} is between limit thresholds {lower} and {upper}")]
    LimitOrderPriceNotInRange { price: Price, lower: Price, upper: Price },

    #[error("order not executable before {executable_at}")]
    ExecutableTimeNotReached { executable_at: Timestamp },

    #[error("order expired at {expired_at}")]
    OrderHasExpired { expired_at: Timestamp },

    #[error("pending order does not expire until {expires_at}")]
    OrderHasNotExpired { expires_at: Timestamp },

    #[error("no pending order for {0}")]
    NoExistingOrder(AccountId),

    #[error("{0} not found")]
    PositionNotFound(PositionId),

    #[error("no limit order on {0}")]
    LimitOrderNotFound(PositionId),

    #[error("{caller} is not authorized")]
    Unauthorized { caller: AccountId },

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        use EngineError::*;
        match self {
            ValueNotPositive { .. }
            | InvalidFee { .. }
            | AmountTooSmall { .. }
            | AmountTooLarge { .. }
            | InvalidThresholds { .. }
            | NoExistingOrder(_)
            | PositionNotFound(_)
            | LimitOrderNotFound(_)
            | Config(_) => ErrorKind::Validation,

            HighSlippage { .. }
            | MaxFillPriceTooLow { .. }
            | MinFillPriceTooHigh { .. }
            | MarginTooSmall { .. }
            | LeverageTooLow { .. }
            | LeverageTooHigh { .. }
            | PositionCreatesBadDebt
            | NotEnoughMarginForFees { .. }
            | PoolValueZero
            | CannotLiquidate(_)
            | LimitOrderPriceNotInRange { .. } => ErrorKind::Economic,

            ExecutableTimeNotReached { .. } | OrderHasExpired { .. } | OrderHasNotExpired { .. } => {
                ErrorKind::Timing
            }

            Oracle(_) => ErrorKind::Oracle,

            Unauthorized { .. } => ErrorKind::Authorization,

            Vault(VaultError::ModulePaused(_)) => ErrorKind::Authorization,
            Vault(_) => ErrorKind::Economic,

            Ledger(LedgerError::NotOwner { .. })
            | Ledger(LedgerError::PositionLocked { .. })
            | Ledger(LedgerError::NotLockedByModule { .. }) => ErrorKind::Authorization,
            Ledger(LedgerError::UnknownPosition(_)) | Ledger(LedgerError::NegativeAmount(_)) => {
                ErrorKind::Validation
            }
            Ledger(_) => ErrorKind::Economic,
        }
    }
}
