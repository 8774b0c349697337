// 12.0 config.rs: all protocol parameters in one place. each group lives next to
// the code that uses it; this file bundles them, validates them, and loads them.
// 12.1 presets: default, conservative, testing.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::liquidation::LiquidationParams;
use crate::liquidity::StableParams;
use crate::oracle::OracleParams;
use crate::position::LeverageParams;
use crate::vault::{VaultParams, SKEW_CHECK_DISABLED};

// Complete parameter set of one market
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub vault: VaultParams,
    pub leverage: LeverageParams,
    pub stable: StableParams,
    pub liquidation: LiquidationParams,
    pub oracle: OracleParams,
}

impl ProtocolConfig {
    // Lower leverage, tighter skew and oracle bounds
    pub fn conservative() -> Self {
        let mut config = Self::default();
        config.leverage.leverage_max = dec!(10);
        config.vault.skew_fraction_max = dec!(1.1);
        config.oracle.min_confidence_ratio = dec!(2000);
        config.oracle.max_diff_percent = dec!(0.01);
        config.liquidation.buffer_ratio = dec!(0.01);
        config
    }

    // No deposit cap and no skew ceiling. for simulations and tests
    pub fn testing() -> Self {
        let mut config = Self::default();
        config.vault.skew_fraction_max = SKEW_CHECK_DISABLED;
        config.vault.stable_collateral_cap = Decimal::MAX;
        config
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.vault.validate()?;
        self.leverage.validate()?;
        self.stable.validate()?;
        self.liquidation.validate()?;
        self.oracle.validate()?;
        Ok(())
    }
}

fn is_ratio(value: Decimal) -> bool {
    value >= Decimal::ZERO && value < Decimal::ONE
}

impl VaultParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.funding.max_funding_velocity < Decimal::ZERO || self.funding.max_velocity_skew < Decimal::ZERO {
            return Err(ConfigError::InvalidVault {
                reason: "funding velocity params must not be negative".to_string(),
            });
        }
        if self.skew_fraction_max <= Decimal::ZERO {
            return Err(ConfigError::InvalidVault {
                reason: "skew fraction max must be positive".to_string(),
            });
        }
        if self.stable_collateral_cap <= Decimal::ZERO {
            return Err(ConfigError::InvalidVault {
                reason: "collateral cap must be positive".to_string(),
            });
        }
        if self.min_executability_age <= 0 || self.max_executability_age <= 0 {
            return Err(ConfigError::InvalidVault {
                reason: "executability ages must be positive".to_string(),
            });
        }
        Ok(())
    }
}

impl LeverageParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.leverage_min <= Decimal::ONE || self.leverage_min >= self.leverage_max {
            return Err(ConfigError::InvalidLeverage {
                reason: "need 1 < leverage_min < leverage_max".to_string(),
            });
        }
        if self.margin_min <= Decimal::ZERO {
            return Err(ConfigError::InvalidLeverage {
                reason: "margin min must be positive".to_string(),
            });
        }
        if !is_ratio(self.trading_fee_ratio) {
            return Err(ConfigError::InvalidLeverage {
                reason: "trading fee ratio must be in [0, 1)".to_string(),
            });
        }
        Ok(())
    }
}

impl StableParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_ratio(self.withdraw_fee_ratio) {
            return Err(ConfigError::InvalidStable {
                reason: "withdraw fee ratio must be in [0, 1)".to_string(),
            });
        }
        if self.min_liquidity < Decimal::ZERO {
            return Err(ConfigError::InvalidStable {
                reason: "min liquidity must not be negative".to_string(),
            });
        }
        Ok(())
    }
}

impl LiquidationParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_ratio(self.buffer_ratio) || !is_ratio(self.fee_ratio) {
            return Err(ConfigError::InvalidLiquidation {
                reason: "buffer and fee ratios must be in [0, 1)".to_string(),
            });
        }
        if self.fee_lower_bound < Decimal::ZERO || self.fee_lower_bound > self.fee_upper_bound {
            return Err(ConfigError::InvalidLiquidation {
                reason: "need 0 <= fee lower bound <= fee upper bound".to_string(),
            });
        }
        Ok(())
    }
}

impl OracleParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.push_max_age <= 0 || self.pull_max_age <= 0 {
            return Err(ConfigError::InvalidOracle {
                reason: "max ages must be positive".to_string(),
            });
        }
        if self.min_confidence_ratio <= Decimal::ZERO || self.max_diff_percent <= Decimal::ZERO {
            return Err(ConfigError::InvalidOracle {
                reason: "confidence ratio and diff ceiling must be positive".to_string(),
            });
        }
        Ok(())
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid vault params: {reason}")]
    InvalidVault { reason: String },
    #[error("invalid leverage params: {reason}")]
    InvalidLeverage { reason: String },
    #[error("invalid stable params: {reason}")]
    InvalidStable { reason: String },
    #[error("invalid liquidation params: {reason}")]
    InvalidLiquidation { reason: String },
    #[error("invalid oracle params: {reason}")]
    InvalidOracle { reason: String },
    #[error("config parse error: {0}")]
    Parse(String),
}
