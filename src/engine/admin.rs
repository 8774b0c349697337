//! Owner-only parameter and pause management.

use super::core::Engine;
use super::results::EngineError;
use crate::config::ProtocolConfig;
use crate::events::{EventPayload, ModulePauseChangedEvent, ParamGroup, ParamsUpdatedEvent};
use crate::liquidation::LiquidationParams;
use crate::liquidity::StableParams;
use crate::oracle::OracleParams;
use crate::position::LeverageParams;
use crate::types::AccountId;
use crate::vault::{ModuleKey, VaultParams};
use tracing::info;

impl Engine {
    /// Parameters currently in force.
    pub fn protocol_config(&self) -> ProtocolConfig {
        ProtocolConfig {
            vault: self.state.vault.params().clone(),
            leverage: self.state.leverage.clone(),
            stable: self.state.stable.clone(),
            liquidation: self.state.liquidation.clone(),
            oracle: self.oracle.params().clone(),
        }
    }

    /// Funding accrued under the old parameters is settled before the switch.
    pub fn set_vault_params(&mut self, caller: AccountId, params: VaultParams) -> Result<(), EngineError> {
        self.atomic(|engine| {
            engine.ensure_owner(caller)?;
            params.validate()?;
            engine.settle_funding()?;
            engine.state.vault.set_params(params);
            engine.params_updated(ParamGroup::Vault);
            Ok(())
        })
    }

    pub fn set_leverage_params(&mut self, caller: AccountId, params: LeverageParams) -> Result<(), EngineError> {
        self.atomic(|engine| {
            engine.ensure_owner(caller)?;
            params.validate()?;
            engine.state.leverage = params;
            engine.params_updated(ParamGroup::Leverage);
            Ok(())
        })
    }

    pub fn set_stable_params(&mut self, caller: AccountId, params: StableParams) -> Result<(), EngineError> {
        self.atomic(|engine| {
            engine.ensure_owner(caller)?;
            params.validate()?;
            engine.state.stable = params;
            engine.params_updated(ParamGroup::Stable);
            Ok(())
        })
    }

    pub fn set_liquidation_params(&mut self, caller: AccountId, params: LiquidationParams) -> Result<(), EngineError> {
        self.atomic(|engine| {
            engine.ensure_owner(caller)?;
            params.validate()?;
            engine.state.liquidation = params;
            engine.params_updated(ParamGroup::Liquidation);
            Ok(())
        })
    }

    // oracle params live outside the rollback snapshot, so nothing may fail after the write
    pub fn set_oracle_params(&mut self, caller: AccountId, params: OracleParams) -> Result<(), EngineError> {
        self.atomic(|engine| {
            engine.ensure_owner(caller)?;
            params.validate()?;
            engine.oracle.set_params(params);
            engine.params_updated(ParamGroup::Oracle);
            Ok(())
        })
    }

    pub fn set_module_paused(&mut self, caller: AccountId, module: ModuleKey, paused: bool) -> Result<(), EngineError> {
        self.atomic(|engine| {
            engine.ensure_owner(caller)?;
            engine.state.vault.set_paused(module, paused);
            info!(?module, paused, "module pause changed");
            engine.emit_event(EventPayload::ModulePauseChanged(ModulePauseChangedEvent { module, paused }));
            Ok(())
        })
    }

    fn params_updated(&mut self, group: ParamGroup) {
        info!(?group, "params updated");
        self.emit_event(EventPayload::ParamsUpdated(ParamsUpdatedEvent { group }));
    }
}
