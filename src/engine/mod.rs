// 8.0: market engine. coordinates delayed orders, limit orders, funding
// settlement, position lifecycle and liquidation over one vault.
// deterministic: time only moves when the caller moves it.

mod admin;
mod config;
mod core;
mod funding;
mod leverage;
mod limit;
mod liquidations;
mod orders;
mod results;
mod stable;

pub use config::EngineConfig;
pub use core::Engine;
pub use results::{
    CloseResult, EngineError, ErrorKind, ExecutionOutcome, FundingResult, LimitOrderResult, LiquidationResult,
    OrderResult,
};
