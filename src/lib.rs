// perps-pool: pooled-counterparty leveraged market.
// leveraged longs trade against a single pool of stable LPs; funding keeps the
// two sides balanced. all computation is deterministic with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: AccountId, PositionId, Price, Timestamp, Leverage
//   2.x  math.rs: 18 dp fixed-point rounding helpers
//   3.x  order.rs: delayed and limit order records, execution windows
//   4.x  position.rs: position struct, pnl, leverage bounds, trade fees
//   5.x  funding.rs: skew-driven funding velocity and cumulative index
//   6.x  vault.rs: pool total, aggregate positions, pauses, settlement
//   6.5  liquidation.rs: liquidation margin, fee, approximate price
//   7.x  keeper.rs: keeper fee quotes
//   8.x  engine/: orders, limit orders, lifecycle, liquidations, admin
//   9.x  oracle.rs: push + pull price reconciliation (mocked feeds)
//   9.2  custody.rs: collateral balances and transfers
//   9.3  liquidity.rs: pool shares and share pricing
//   10.x ownership.rs: transferable position tokens with module locks
//   11.x events.rs: state transition events for audit
//   12.x config.rs: parameter groups, presets, TOML loading

// core market modules
pub mod engine;
pub mod events;
pub mod funding;
pub mod liquidation;
pub mod math;
pub mod order;
pub mod position;
pub mod types;
pub mod vault;

// integration modules
pub mod config;
pub mod custody;
pub mod keeper;
pub mod liquidity;
pub mod oracle;
pub mod ownership;

// re exports for convenience
pub use config::{ConfigError, ProtocolConfig};
pub use custody::{CollateralLedger, Holder, LedgerError};
pub use engine::*;
pub use events::*;
pub use funding::{FundingError, FundingParams, FundingState};
pub use keeper::{FixedKeeperFee, KeeperFeeOracle};
pub use liquidation::LiquidationParams;
pub use liquidity::{PoolShares, StableParams};
pub use oracle::{
    MockPullFeed, MockPushFeed, OracleAdapter, OracleError, OracleParams, OraclePrice, PriceSource, PullPrice,
    PullPriceFeed, PullUpdate, PushPriceFeed, PushRound,
};
pub use order::*;
pub use ownership::{PositionRegistry, PositionToken};
pub use position::{LeverageParams, Position, PositionSummary};
pub use types::*;
pub use vault::{GlobalPositions, ModuleKey, Vault, VaultError, VaultParams};
