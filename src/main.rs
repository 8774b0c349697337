//! Pooled Market Simulation.
//!
//! Walks the engine through the life of a market: LP deposits, leveraged opens,
//! funding accrual, limit-order closes, liquidation and order expiry.
//! Set `RUST_LOG=perps_pool=debug` to see every event.

use perps_pool::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const OWNER: AccountId = AccountId(1);
const KEEPER: AccountId = AccountId(2);
const KEEPER_FEE: Decimal = dec!(0.002);

struct Sim {
    engine: Engine,
    push: MockPushFeed,
}

impl Sim {
    fn new(protocol: ProtocolConfig, price: Decimal) -> Result<Self, EngineError> {
        let push = MockPushFeed::new();
        let pull = MockPullFeed::new();
        // wall-clock start, then simulated time from there
        let config = EngineConfig {
            start_time: Timestamp::now(),
            ..EngineConfig::with_protocol(protocol)
        };
        let engine = Engine::new(
            config,
            Arc::new(push.clone()),
            Arc::new(pull),
            Arc::new(FixedKeeperFee::new(KEEPER_FEE)),
            OWNER,
        )?;
        push.set_price(price, engine.time());
        Ok(Self { engine, push })
    }

    // move the clock and publish a fresh price at the new time
    fn tick(&mut self, secs: i64, price: Decimal) {
        self.engine.advance_time(secs);
        self.push.set_price(price, self.engine.time());
    }

    fn settle(&mut self, account: AccountId, price: Decimal) -> Result<OrderResult, EngineError> {
        let delay = self.engine.vault().params().min_executability_age;
        self.tick(delay, price);
        self.engine.execute_order(account, KEEPER, None)
    }

    fn deposit(&mut self, account: AccountId, amount: Decimal, price: Decimal) -> Result<Decimal, EngineError> {
        self.engine.mint_collateral(account, amount + KEEPER_FEE)?;
        self.engine
            .announce_stable_deposit(account, amount, Decimal::ZERO, KEEPER_FEE)?;
        match self.settle(account, price)?.outcome {
            ExecutionOutcome::Deposited { minted_shares } => Ok(minted_shares),
            _ => Ok(Decimal::ZERO),
        }
    }

    fn open(
        &mut self,
        account: AccountId,
        margin: Decimal,
        size: Decimal,
        price: Decimal,
    ) -> Result<Option<PositionId>, EngineError> {
        let fee = self.engine.leverage_params().trade_fee(size);
        self.engine.mint_collateral(account, margin + fee + KEEPER_FEE)?;
        let max_fill = Price::new_unchecked(price * dec!(1.01));
        self.engine
            .announce_leverage_open(account, margin, size, max_fill, KEEPER_FEE)?;
        match self.settle(account, price)?.outcome {
            ExecutionOutcome::Opened { position } => Ok(Some(position)),
            _ => Ok(None),
        }
    }

    fn report(&self, label: &str) {
        let vault = self.engine.vault();
        let global = vault.global_positions();
        println!(
            "  [{}] pool {} | margin total {} | size {} | vault balance {}",
            label,
            vault.stable_collateral_total().round_dp(6),
            global.margin_deposited_total.round_dp(6),
            global.size_opened_total.round_dp(6),
            vault.balance().round_dp(6),
        );
    }
}

fn main() -> Result<(), EngineError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    println!("Pooled Market Simulation");
    println!("Leveraged longs against a single LP pool\n");

    scenario_1_deposit_and_open()?;
    scenario_2_profitable_close()?;
    scenario_3_funding_accrual()?;
    scenario_4_limit_order()?;
    scenario_5_liquidation()?;
    scenario_6_expired_order()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

/// LP seeds the pool, a trader opens 4x.
fn scenario_1_deposit_and_open() -> Result<(), EngineError> {
    println!("Scenario 1: Deposit and Open\n");

    let mut sim = Sim::new(ProtocolConfig::default(), dec!(1000))?;
    let lp = AccountId(10);
    let trader = AccountId(20);

    let shares = sim.deposit(lp, dec!(100), dec!(1000))?;
    println!("  LP deposits 100, receives {} shares", shares);

    let position = sim.open(trader, dec!(10), dec!(30), dec!(1000))?;
    println!("  Trader opens margin 10, size 30 @ 1000: {:?}", position);
    if let Some(id) = position {
        println!("  Leverage: {:?}", sim.engine.leverage_of(id)?);
        println!("  Approx liquidation price: {}", sim.engine.liquidation_price(id)?.round_dp(4));
    }
    sim.report("after open");
    println!();
    Ok(())
}

/// Price rises 10%, trader closes in profit; the pool pays.
fn scenario_2_profitable_close() -> Result<(), EngineError> {
    println!("Scenario 2: Profitable Close\n");

    let mut sim = Sim::new(ProtocolConfig::default(), dec!(1000))?;
    let lp = AccountId(10);
    let trader = AccountId(20);
    sim.deposit(lp, dec!(100), dec!(1000))?;
    let Some(id) = sim.open(trader, dec!(10), dec!(30), dec!(1000))? else {
        return Ok(());
    };

    sim.tick(60, dec!(1100));
    let summary = sim.engine.position_summary(id)?;
    println!("  At 1100: pnl {} funding {}", summary.profit_loss.round_dp(6), summary.accrued_funding.round_dp(6));

    sim.engine
        .announce_leverage_close(trader, id, Price::new_unchecked(dec!(1090)), KEEPER_FEE)?;
    let result = sim.settle(trader, dec!(1100))?;
    if let ExecutionOutcome::Closed(close) = result.outcome {
        println!("  Closed: settled {} paid to owner {}", close.settled_margin.round_dp(6), close.amount_to_owner.round_dp(6));
    }
    println!("  Trader balance: {}", sim.engine.collateral_balance(trader).round_dp(6));
    sim.report("after close");
    println!();
    Ok(())
}

/// Longs outweigh the pool side; funding drifts upward and the pool earns it.
fn scenario_3_funding_accrual() -> Result<(), EngineError> {
    println!("Scenario 3: Funding Accrual\n");

    let mut sim = Sim::new(ProtocolConfig::default(), dec!(1000))?;
    sim.deposit(AccountId(10), dec!(100), dec!(1000))?;
    sim.open(AccountId(20), dec!(40), dec!(110), dec!(1000))?;

    println!("  Skew: {}", sim.engine.skew());
    for day in 1..=3 {
        sim.tick(86400, dec!(1000));
        let settled = sim.engine.settle_funding_fees()?;
        println!(
            "  Day {}: rate {} fees {} cumulative {}",
            day,
            settled.funding_rate.round_dp(8),
            settled.funding_fees.round_dp(8),
            settled.cumulative_funding_rate.round_dp(8)
        );
    }
    println!("  Annualized: {}", sim.engine.annualized_funding_rate()?.round_dp(6));
    sim.report("after funding");
    println!();
    Ok(())
}

/// Take-profit fires at its threshold.
fn scenario_4_limit_order() -> Result<(), EngineError> {
    println!("Scenario 4: Limit Order\n");

    let mut sim = Sim::new(ProtocolConfig::default(), dec!(1000))?;
    let trader = AccountId(20);
    sim.deposit(AccountId(10), dec!(100), dec!(1000))?;
    let Some(id) = sim.open(trader, dec!(10), dec!(30), dec!(1000))? else {
        return Ok(());
    };

    sim.engine
        .announce_limit_order(trader, id, Price::new_unchecked(dec!(900)), Price::new_unchecked(dec!(1050)))?;
    println!("  Stop-loss 900 / take-profit 1050 placed");

    sim.tick(30, dec!(1000));
    match sim.engine.execute_limit_order(id, KEEPER, None) {
        Ok(_) => println!("  Unexpected fill at 1000"),
        Err(e) => println!("  At 1000: {}", e),
    }

    sim.tick(30, dec!(1080));
    let result = sim.engine.execute_limit_order(id, KEEPER, None)?;
    println!("  At 1080: {:?} fills at {}", result.trigger, result.fill_price);
    println!("  Paid to owner: {}", result.close.amount_to_owner.round_dp(6));
    sim.report("after limit close");
    println!();
    Ok(())
}

/// A sharp drop pushes a high-leverage position under its liquidation margin.
fn scenario_5_liquidation() -> Result<(), EngineError> {
    println!("Scenario 5: Liquidation\n");

    let mut sim = Sim::new(ProtocolConfig::default(), dec!(1000))?;
    let liquidator = AccountId(30);
    sim.deposit(AccountId(10), dec!(100), dec!(1000))?;
    let Some(id) = sim.open(AccountId(20), dec!(2), dec!(30), dec!(1000))? else {
        return Ok(());
    };

    println!("  Margin 2, size 30, liquidation near {}", sim.engine.liquidation_price(id)?.round_dp(4));
    sim.tick(60, dec!(940));
    println!("  At 940: liquidatable = {}", sim.engine.can_liquidate(id)?);

    let result = sim.engine.liquidate(id, liquidator)?;
    println!(
        "  Liquidated: settled {} liquidator fee {} pool credit {}",
        result.settled_margin.round_dp(6),
        result.liquidator_fee.round_dp(6),
        result.pool_credit.round_dp(6)
    );
    sim.report("after liquidation");
    println!();
    Ok(())
}

/// Nobody executes in time; anyone may clear the order and refund it.
fn scenario_6_expired_order() -> Result<(), EngineError> {
    println!("Scenario 6: Expired Order\n");

    let mut sim = Sim::new(ProtocolConfig::default(), dec!(1000))?;
    let lp = AccountId(10);
    sim.engine.mint_collateral(lp, dec!(50) + KEEPER_FEE)?;
    sim.engine.announce_stable_deposit(lp, dec!(50), Decimal::ZERO, KEEPER_FEE)?;
    println!("  Escrow holds {}", sim.engine.escrow_balance());

    sim.tick(120, dec!(1000));
    if let Err(e) = sim.engine.execute_order(lp, KEEPER, None) {
        println!("  Execute after window: {}", e);
    }
    sim.engine.cancel_existing_order(lp)?;
    println!("  Cancelled by anyone, LP balance back to {}", sim.engine.collateral_balance(lp));
    println!();
    Ok(())
}
