//! Funding settlement and funding queries.

use super::core::Engine;
use super::results::{EngineError, FundingResult};
use crate::events::{EventPayload, FundingSettledEvent};
use crate::funding::annualized_funding_rate;
use rust_decimal::Decimal;

impl Engine {
    /// Settle funding up to now. Anyone may call; a repeat at the same instant moves nothing.
    pub fn settle_funding_fees(&mut self) -> Result<FundingResult, EngineError> {
        self.atomic(|engine| engine.settle_funding())
    }

    pub(super) fn settle_funding(&mut self) -> Result<FundingResult, EngineError> {
        let elapsed = self.state.vault.funding_state().last_recomputed_at < self.current_time;
        let settlement = self.state.vault.settle_funding_fees(self.current_time)?;

        let result = FundingResult {
            funding_fees: settlement.funding_fees,
            funding_rate: settlement.current_rate,
            cumulative_funding_rate: settlement.cumulative_funding_rate,
        };

        if elapsed {
            self.emit_event(EventPayload::FundingSettled(FundingSettledEvent {
                funding_fees: result.funding_fees,
                funding_rate: result.funding_rate,
                cumulative_funding_rate: result.cumulative_funding_rate,
            }));
        }

        Ok(result)
    }

    /// Daily funding rate as it stands right now.
    pub fn current_funding_rate(&self) -> Result<Decimal, EngineError> {
        Ok(self.state.vault.current_funding_rate(self.current_time)?)
    }

    pub fn annualized_funding_rate(&self) -> Result<Decimal, EngineError> {
        Ok(annualized_funding_rate(self.current_funding_rate()?))
    }

    pub fn next_cumulative_funding(&self) -> Result<Decimal, EngineError> {
        Ok(self.state.vault.next_cumulative_funding(self.current_time)?)
    }

    /// sizeOpenedTotal - stableCollateralTotal
    pub fn skew(&self) -> Decimal {
        self.state.vault.skew()
    }
}
