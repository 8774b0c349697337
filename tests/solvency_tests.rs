//! Solvency and lifecycle tests.
//!
//! These drive the full announce/execute cycle against mock feeds and check
//! that collateral held by the vault always matches what the accounting says
//! it owes: `vault balance == stable collateral total + margin deposited total`.

use perps_pool::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

const OWNER: AccountId = AccountId(1);
const KEEPER: AccountId = AccountId(2);
const LP: AccountId = AccountId(10);
const TRADER: AccountId = AccountId(20);
const OTHER: AccountId = AccountId(30);
const KEEPER_FEE: Decimal = dec!(0.002);

struct Market {
    engine: Engine,
    push: MockPushFeed,
    pull: MockPullFeed,
    price: Decimal,
}

impl Market {
    fn new(protocol: ProtocolConfig) -> Self {
        Self::with_config(EngineConfig::with_protocol(protocol))
    }

    fn with_config(config: EngineConfig) -> Self {
        let push = MockPushFeed::new();
        let pull = MockPullFeed::new();
        let engine = Engine::new(
            config,
            Arc::new(push.clone()),
            Arc::new(pull.clone()),
            Arc::new(FixedKeeperFee::new(KEEPER_FEE)),
            OWNER,
        )
        .unwrap();
        push.set_price(dec!(1000), engine.time());
        Self {
            engine,
            push,
            pull,
            price: dec!(1000),
        }
    }

    fn standard() -> Self {
        Self::new(ProtocolConfig::default())
    }

    fn tick(&mut self, secs: i64, price: Decimal) {
        self.engine.advance_time(secs);
        self.price = price;
        self.push.set_price(price, self.engine.time());
    }

    fn wait(&mut self, secs: i64) {
        self.tick(secs, self.price);
    }

    fn execute(&mut self, account: AccountId) -> Result<OrderResult, EngineError> {
        self.wait(10);
        self.engine.execute_order(account, KEEPER, None)
    }

    fn deposit(&mut self, account: AccountId, amount: Decimal) -> Decimal {
        self.engine.mint_collateral(account, amount + KEEPER_FEE).unwrap();
        self.engine
            .announce_stable_deposit(account, amount, Decimal::ZERO, KEEPER_FEE)
            .unwrap();
        match self.execute(account).unwrap().outcome {
            ExecutionOutcome::Deposited { minted_shares } => minted_shares,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    fn open(&mut self, account: AccountId, margin: Decimal, size: Decimal) -> PositionId {
        let trade_fee = self.engine.leverage_params().trade_fee(size);
        self.engine
            .mint_collateral(account, margin + trade_fee + KEEPER_FEE)
            .unwrap();
        let max_fill = Price::new_unchecked(self.price * dec!(1.01));
        self.engine
            .announce_leverage_open(account, margin, size, max_fill, KEEPER_FEE)
            .unwrap();
        match self.execute(account).unwrap().outcome {
            ExecutionOutcome::Opened { position } => position,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    fn assert_conserved(&self) {
        let vault = self.engine.vault();
        let global = vault.global_positions();
        assert_eq!(
            vault.balance(),
            vault.stable_collateral_total() + global.margin_deposited_total,
            "vault balance out of line with accounting"
        );
    }

    fn has_event(&self, pred: impl Fn(&EventPayload) -> bool) -> bool {
        self.engine.events().iter().any(|e| pred(&e.payload))
    }

    fn event_ids(&self) -> Vec<u64> {
        self.engine.events().iter().map(|e| e.id.0).collect()
    }
}

fn no_trade_fees() -> ProtocolConfig {
    let mut protocol = ProtocolConfig::default();
    protocol.leverage.trading_fee_ratio = Decimal::ZERO;
    protocol
}

// no trade fees and a funding rate pinned at zero
fn fee_free() -> ProtocolConfig {
    let mut protocol = no_trade_fees();
    protocol.vault.funding.max_funding_velocity = Decimal::ZERO;
    protocol
}

mod scenario_tests {
    use super::*;

    #[test]
    fn deposit_then_open_leaves_pool_skewed() {
        let mut market = Market::new(no_trade_fees());

        let shares = market.deposit(LP, dec!(100));
        assert_eq!(shares, dec!(100));

        let id = market.open(TRADER, dec!(10), dec!(30));
        let summary = market.engine.position_summary(id).unwrap();
        assert_eq!(summary.profit_loss, Decimal::ZERO);
        assert_eq!(market.engine.skew(), dec!(-70));
        market.assert_conserved();
    }

    #[test]
    fn profit_after_price_doubles() {
        let mut market = Market::new(no_trade_fees());
        market.deposit(LP, dec!(100));
        let id = market.open(TRADER, dec!(10), dec!(30));

        market.tick(60, dec!(2000));
        let summary = market.engine.position_summary(id).unwrap();
        assert_eq!(summary.profit_loss, dec!(15));
    }

    #[test]
    fn funding_rate_capped_after_one_day() {
        let mut market = Market::new(no_trade_fees());
        market.deposit(LP, dec!(100));
        market.open(TRADER, dec!(40), dec!(120));
        assert_eq!(market.engine.skew(), dec!(20));

        let before = market.engine.current_funding_rate().unwrap();
        market.wait(86400);
        let after = market.engine.current_funding_rate().unwrap();
        assert_eq!(after - before, dec!(0.003));

        let stable_before = market.engine.vault().stable_collateral_total();
        let settled = market.engine.settle_funding_fees().unwrap();
        assert!(settled.funding_fees < Decimal::ZERO, "longs pay when they outweigh the pool");
        assert!(market.engine.vault().stable_collateral_total() > stable_before);

        let stable = market.engine.vault().stable_collateral_total();
        let again = market.engine.settle_funding_fees().unwrap();
        assert!(again.funding_fees.is_zero());
        assert_eq!(market.engine.vault().stable_collateral_total(), stable);
        market.assert_conserved();
    }

    #[test]
    fn liquidation_fee_and_threshold() {
        let mut market = Market::standard();
        market.deposit(LP, dec!(100));
        let id = market.open(TRADER, dec!(2), dec!(30));

        // clamp(30 * 0.002 * 1000, 4, 100) / 1000
        assert_eq!(market.engine.liquidation_fee(id).unwrap(), dec!(0.06));
        assert!(!market.engine.can_liquidate(id).unwrap());
        assert_eq!(
            market.engine.liquidate(id, OTHER).unwrap_err(),
            EngineError::CannotLiquidate(id)
        );

        market.tick(60, dec!(940));
        assert!(market.engine.can_liquidate(id).unwrap());
        assert!(market.engine.liquidatable_positions().unwrap().contains(&id));

        let result = market.engine.liquidate(id, OTHER).unwrap();
        assert_eq!(result.liquidator_fee, dec!(0.06));
        assert_eq!(result.pool_credit, result.settled_margin - dec!(0.06));
        assert_eq!(market.engine.collateral_balance(OTHER), dec!(0.06));
        assert!(market.engine.vault().position(id).is_none());
        assert!(market.engine.positions().owner_of(id).is_err());
        assert_eq!(market.engine.positions().burned_count(), 1);
        market.assert_conserved();
    }

    #[test]
    fn low_keeper_fee_rejected() {
        let mut market = Market::standard();
        market.engine.mint_collateral(LP, dec!(101)).unwrap();

        let err = market
            .engine
            .announce_stable_deposit(LP, dec!(100), Decimal::ZERO, dec!(0.001))
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidFee {
                provided: dec!(0.001),
                required: KEEPER_FEE
            }
        );
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(market.engine.pending_order(LP).is_none());
        assert_eq!(market.engine.collateral_balance(LP), dec!(101));
    }

    #[test]
    fn execution_window_enforced() {
        let mut market = Market::standard();
        market.engine.mint_collateral(LP, dec!(100) + KEEPER_FEE).unwrap();
        market
            .engine
            .announce_stable_deposit(LP, dec!(100), Decimal::ZERO, KEEPER_FEE)
            .unwrap();

        let early = market.engine.execute_order(LP, KEEPER, None).unwrap_err();
        assert_eq!(
            early,
            EngineError::ExecutableTimeNotReached {
                executable_at: Timestamp::from_secs(10)
            }
        );
        assert_eq!(early.kind(), ErrorKind::Timing);

        market.wait(71);
        let late = market.engine.execute_order(LP, KEEPER, None).unwrap_err();
        assert_eq!(
            late,
            EngineError::OrderHasExpired {
                expired_at: Timestamp::from_secs(70)
            }
        );
        assert!(market.engine.pending_order(LP).is_some());

        // anyone may clear it
        market.engine.cancel_existing_order(LP).unwrap();
        assert!(market.engine.pending_order(LP).is_none());
        assert_eq!(market.engine.collateral_balance(LP), dec!(100) + KEEPER_FEE);
        assert!(market.engine.escrow_balance().is_zero());
    }

    #[test]
    fn window_bounds_inclusive() {
        let mut market = Market::standard();
        market.engine.mint_collateral(LP, dec!(200)).unwrap();
        market
            .engine
            .announce_stable_deposit(LP, dec!(100), Decimal::ZERO, KEEPER_FEE)
            .unwrap();
        market.wait(70);
        assert!(market.engine.execute_order(LP, KEEPER, None).is_ok());
    }
}

mod conservation_tests {
    use super::*;

    #[test]
    fn profitable_close_pays_owner() {
        let mut market = Market::standard();
        market.deposit(LP, dec!(100));
        let id = market.open(TRADER, dec!(10), dec!(30));
        market.assert_conserved();

        market.tick(60, dec!(1100));
        market
            .engine
            .announce_leverage_close(TRADER, id, Price::new_unchecked(dec!(1090)), KEEPER_FEE)
            .unwrap();
        let result = market.execute(TRADER).unwrap();

        let ExecutionOutcome::Closed(close) = result.outcome else {
            panic!("expected close");
        };
        assert!(close.profit_loss > Decimal::ZERO);
        assert_eq!(close.trade_fee, dec!(0.03));
        assert_eq!(close.amount_to_owner, close.settled_margin - dec!(0.03) - KEEPER_FEE);
        assert_eq!(market.engine.collateral_balance(TRADER), close.amount_to_owner);
        assert!(market.engine.vault().global_positions().size_opened_total.is_zero());
        market.assert_conserved();
    }

    #[test]
    fn losing_close_pays_pool() {
        let mut market = Market::standard();
        market.deposit(LP, dec!(100));
        let id = market.open(TRADER, dec!(10), dec!(30));
        let stable_before = market.engine.vault().stable_collateral_total();

        market.tick(60, dec!(950));
        market
            .engine
            .announce_leverage_close(TRADER, id, Price::new_unchecked(dec!(940)), KEEPER_FEE)
            .unwrap();
        let result = market.execute(TRADER).unwrap();
        let ExecutionOutcome::Closed(close) = result.outcome else {
            panic!("expected close");
        };
        assert!(close.profit_loss < Decimal::ZERO);
        assert!(market.engine.vault().stable_collateral_total() > stable_before);
        market.assert_conserved();
    }

    #[test]
    fn adjust_up_then_down_then_close() {
        let mut market = Market::standard();
        market.deposit(LP, dec!(100));
        let id = market.open(TRADER, dec!(10), dec!(30));

        market.tick(30, dec!(1050));
        let trade_fee = market.engine.leverage_params().trade_fee(dec!(10));
        market
            .engine
            .mint_collateral(TRADER, dec!(5) + trade_fee + KEEPER_FEE)
            .unwrap();
        market
            .engine
            .announce_leverage_adjust(TRADER, id, dec!(5), dec!(10), Price::new_unchecked(dec!(1060)), KEEPER_FEE)
            .unwrap();
        assert_eq!(market.engine.escrow_balance(), dec!(5) + trade_fee + KEEPER_FEE);
        let result = market.execute(TRADER).unwrap();
        let ExecutionOutcome::Adjusted {
            new_margin,
            new_additional_size,
            ..
        } = result.outcome
        else {
            panic!("expected adjust");
        };
        assert_eq!(new_additional_size, dec!(40));
        assert!(new_margin > dec!(16));
        assert!(market.engine.escrow_balance().is_zero());
        let position = *market.engine.vault().position(id).unwrap();
        assert_eq!(position.entry_price, Price::new_unchecked(dec!(1050)));
        market.assert_conserved();

        let before = market.engine.collateral_balance(TRADER);
        market
            .engine
            .announce_leverage_adjust(TRADER, id, dec!(-3), dec!(-10), Price::new_unchecked(dec!(1040)), KEEPER_FEE)
            .unwrap();
        market.execute(TRADER).unwrap();
        assert_eq!(market.engine.collateral_balance(TRADER), before + dec!(3));
        assert_eq!(market.engine.vault().position(id).unwrap().additional_size, dec!(30));
        market.assert_conserved();

        market
            .engine
            .announce_leverage_close(TRADER, id, Price::new_unchecked(dec!(1000)), KEEPER_FEE)
            .unwrap();
        market.execute(TRADER).unwrap();
        assert!(market.engine.vault().position(id).is_none());
        market.assert_conserved();
    }

    #[test]
    fn withdraw_leaves_fee_in_pool() {
        let mut market = Market::standard();
        market.deposit(LP, dec!(100));

        market
            .engine
            .announce_stable_withdraw(LP, dec!(50), dec!(49), KEEPER_FEE)
            .unwrap();
        assert_eq!(market.engine.pool_shares().unlocked_balance_of(LP), dec!(50));
        assert!(market.engine.transfer_shares(LP, OTHER, dec!(60)).is_err());

        let result = market.execute(LP).unwrap();
        assert_eq!(
            result.outcome,
            ExecutionOutcome::Withdrawn {
                amount_out: dec!(50),
                withdraw_fee: dec!(0.125)
            }
        );
        assert_eq!(market.engine.collateral_balance(LP), dec!(49.873));
        assert_eq!(market.engine.vault().stable_collateral_total(), dec!(50.125));
        assert_eq!(market.engine.pool_shares().total_supply(), dec!(50));
        assert_eq!(market.engine.stable_collateral_per_share().unwrap(), dec!(1.0025));
        assert_eq!(market.engine.collateral_balance(KEEPER), KEEPER_FEE * dec!(2));
        market.assert_conserved();
    }

    #[test]
    fn bad_debt_absorbed_by_pool() {
        let mut market = Market::standard();
        market.deposit(LP, dec!(100));
        let id = market.open(TRADER, dec!(2), dec!(30));
        let stable_before = market.engine.vault().stable_collateral_total();

        market.tick(60, dec!(800));
        let result = market.engine.liquidate(id, OTHER).unwrap();
        assert!(result.settled_margin < Decimal::ZERO);
        assert!(result.liquidator_fee.is_zero());
        assert_eq!(result.pool_credit, result.settled_margin);
        assert!(market.engine.collateral_balance(OTHER).is_zero());
        // the pool keeps the margin but loses the deficit beyond it
        assert!(market.engine.vault().stable_collateral_total() > stable_before);
        market.assert_conserved();
    }

    #[test]
    fn positions_opened_at_different_prices_settle_against_the_vault() {
        let mut market = Market::new(fee_free());
        market.deposit(LP, dec!(100));

        let first = market.open(TRADER, dec!(10), dec!(30));
        market.tick(30, dec!(900));
        let second = market.open(OTHER, dec!(10), dec!(10));
        market.assert_conserved();

        market.tick(30, dec!(1000));
        for (account, id) in [(TRADER, first), (OTHER, second)] {
            market
                .engine
                .announce_leverage_close(account, id, Price::new_unchecked(dec!(990)), KEEPER_FEE)
                .unwrap();
            market.execute(account).unwrap();
            market.assert_conserved();
        }
        assert_eq!(market.engine.collateral_balance(TRADER), dec!(10) - KEEPER_FEE);
        assert_eq!(market.engine.collateral_balance(OTHER), dec!(11) - KEEPER_FEE);

        // the pool is down exactly what the second trader made
        let vault = market.engine.vault();
        assert_eq!(vault.global_positions().margin_deposited_total, Decimal::ZERO);
        assert_eq!(vault.stable_collateral_total(), dec!(99));
        assert_eq!(vault.balance(), dec!(99));

        // the LP can take all of it out
        market
            .engine
            .announce_stable_withdraw(LP, dec!(100), Decimal::ZERO, KEEPER_FEE)
            .unwrap();
        let result = market.execute(LP).unwrap();
        assert_eq!(
            result.outcome,
            ExecutionOutcome::Withdrawn {
                amount_out: dec!(99),
                withdraw_fee: dec!(0.2475)
            }
        );
        assert_eq!(market.engine.collateral_balance(LP), dec!(98.7505));
        assert!(market.engine.pool_shares().total_supply().is_zero());
        market.assert_conserved();
    }

    #[test]
    fn failed_execution_rolls_back() {
        let mut market = Market::standard();
        market.deposit(LP, dec!(100));

        let trade_fee = market.engine.leverage_params().trade_fee(dec!(30));
        let funded = dec!(10) + trade_fee + KEEPER_FEE;
        market.engine.mint_collateral(TRADER, funded).unwrap();
        market
            .engine
            .announce_leverage_open(TRADER, dec!(10), dec!(30), Price::new_unchecked(dec!(1005)), KEEPER_FEE)
            .unwrap();
        let events = market.engine.events().len();
        let funding = *market.engine.vault().funding_state();

        market.tick(10, dec!(1100));
        let err = market.engine.execute_order(TRADER, KEEPER, None).unwrap_err();
        assert_eq!(
            err,
            EngineError::MaxFillPriceTooLow {
                max_fill_price: Price::new_unchecked(dec!(1005)),
                current_price: Price::new_unchecked(dec!(1100)),
            }
        );
        assert!(market.engine.pending_order(TRADER).is_some());
        assert_eq!(market.engine.escrow_balance(), funded);
        assert_eq!(market.engine.events().len(), events);
        assert_eq!(*market.engine.vault().funding_state(), funding);

        // the slot stays taken until the order expires
        assert!(matches!(
            market.engine.announce_stable_deposit(TRADER, dec!(1), Decimal::ZERO, KEEPER_FEE),
            Err(EngineError::OrderHasNotExpired { .. })
        ));

        market.wait(61);
        market.engine.cancel_existing_order(TRADER).unwrap();
        assert_eq!(market.engine.collateral_balance(TRADER), funded);
        market.assert_conserved();
    }
}

mod order_tests {
    use super::*;

    #[test]
    fn cancel_before_expiry_rejected() {
        let mut market = Market::standard();
        market.engine.mint_collateral(LP, dec!(101)).unwrap();
        market
            .engine
            .announce_stable_deposit(LP, dec!(100), Decimal::ZERO, KEEPER_FEE)
            .unwrap();
        market.wait(20);
        assert_eq!(
            market.engine.cancel_existing_order(LP).unwrap_err(),
            EngineError::OrderHasNotExpired {
                expires_at: Timestamp::from_secs(70)
            }
        );
        assert_eq!(
            market.engine.cancel_existing_order(OTHER).unwrap_err(),
            EngineError::NoExistingOrder(OTHER)
        );
    }

    #[test]
    fn expired_order_replaced_on_new_announce() {
        let mut market = Market::standard();
        market.engine.mint_collateral(LP, dec!(100)).unwrap();
        market
            .engine
            .announce_stable_deposit(LP, dec!(50), Decimal::ZERO, KEEPER_FEE)
            .unwrap();

        market.wait(71);
        market
            .engine
            .announce_stable_deposit(LP, dec!(40), Decimal::ZERO, KEEPER_FEE)
            .unwrap();

        assert_eq!(market.engine.collateral_balance(LP), dec!(60) - KEEPER_FEE);
        assert_eq!(market.engine.escrow_balance(), dec!(40) + KEEPER_FEE);
        assert!(market.has_event(|p| matches!(
            p,
            EventPayload::OrderCancelled(e) if e.reason == CancelReason::Replaced && e.refunded == dec!(50.002)
        )));
    }

    #[test]
    fn pull_update_must_be_paid() {
        let mut market = Market::standard();
        market.pull.set_update_fee(dec!(0.0001));
        market.engine.mint_collateral(LP, dec!(101)).unwrap();
        market
            .engine
            .announce_stable_deposit(LP, dec!(100), Decimal::ZERO, KEEPER_FEE)
            .unwrap();
        market.wait(10);

        let update = PullUpdate {
            price: MockPullFeed::encode(dec!(1001), market.engine.time()),
        };
        let err = market
            .engine
            .execute_order(LP, KEEPER, Some((update, Decimal::ZERO)))
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::Oracle(OracleError::InsufficientUpdateFee {
                required: dec!(0.0001),
                paid: Decimal::ZERO
            })
        );

        let result = market
            .engine
            .execute_order(LP, KEEPER, Some((update, dec!(0.0001))))
            .unwrap();
        assert_eq!(result.price, Price::new_unchecked(dec!(1001)));
    }

    #[test]
    fn diverging_feeds_block_execution() {
        let mut market = Market::standard();
        market.engine.mint_collateral(LP, dec!(101)).unwrap();
        market
            .engine
            .announce_stable_deposit(LP, dec!(100), Decimal::ZERO, KEEPER_FEE)
            .unwrap();
        market.wait(10);

        let update = PullUpdate {
            price: MockPullFeed::encode(dec!(1100), market.engine.time()),
        };
        let err = market
            .engine
            .execute_order(LP, KEEPER, Some((update, Decimal::ZERO)))
            .unwrap_err();
        assert_eq!(err, EngineError::Oracle(OracleError::PriceMismatch { diff: dec!(0.1) }));
        assert_eq!(err.kind(), ErrorKind::Oracle);
        assert!(market.engine.pending_order(LP).is_some());
    }

    #[test]
    fn paused_module_blocks_entry() {
        let mut market = Market::standard();
        market.engine.mint_collateral(LP, dec!(101)).unwrap();
        market
            .engine
            .set_module_paused(OWNER, ModuleKey::Stable, true)
            .unwrap();

        let err = market
            .engine
            .announce_stable_deposit(LP, dec!(100), Decimal::ZERO, KEEPER_FEE)
            .unwrap_err();
        assert_eq!(err, EngineError::Vault(VaultError::ModulePaused(ModuleKey::Stable)));
        assert_eq!(err.kind(), ErrorKind::Authorization);

        market
            .engine
            .set_module_paused(OWNER, ModuleKey::Stable, false)
            .unwrap();
        assert!(market
            .engine
            .announce_stable_deposit(LP, dec!(100), Decimal::ZERO, KEEPER_FEE)
            .is_ok());
    }

    #[test]
    fn skew_cap_blocks_open() {
        let mut market = Market::standard();
        market.deposit(LP, dec!(100));
        market.engine.mint_collateral(TRADER, dec!(20)).unwrap();

        let err = market
            .engine
            .announce_leverage_open(TRADER, dec!(10), dec!(130), Price::new_unchecked(dec!(1010)), KEEPER_FEE)
            .unwrap_err();
        assert!(matches!(err, EngineError::Vault(VaultError::MaxSkewReached { .. })));
        assert!(market.engine.pending_order(TRADER).is_none());
    }

    #[test]
    fn deposit_cap_enforced() {
        let mut protocol = ProtocolConfig::default();
        protocol.vault.stable_collateral_cap = dec!(150);
        let mut market = Market::new(protocol);
        market.deposit(LP, dec!(100));

        market.engine.mint_collateral(OTHER, dec!(61)).unwrap();
        let err = market
            .engine
            .announce_stable_deposit(OTHER, dec!(60), Decimal::ZERO, KEEPER_FEE)
            .unwrap_err();
        assert_eq!(err, EngineError::Vault(VaultError::DepositCapReached { cap: dec!(150) }));
    }

    #[test]
    fn leverage_bounds_enforced() {
        let mut market = Market::standard();
        market.deposit(LP, dec!(100));
        market.engine.mint_collateral(TRADER, dec!(20)).unwrap();
        let max_fill = Price::new_unchecked(dec!(1010));

        assert!(matches!(
            market
                .engine
                .announce_leverage_open(TRADER, dec!(1), dec!(30), max_fill, KEEPER_FEE),
            Err(EngineError::LeverageTooHigh { .. })
        ));
        assert!(matches!(
            market
                .engine
                .announce_leverage_open(TRADER, dec!(10), dec!(1), max_fill, KEEPER_FEE),
            Err(EngineError::LeverageTooLow { .. })
        ));
        assert!(matches!(
            market
                .engine
                .announce_leverage_open(TRADER, dec!(0.01), dec!(0.02), max_fill, KEEPER_FEE),
            Err(EngineError::MarginTooSmall { .. })
        ));
    }

    #[test]
    fn oversized_amounts_rejected() {
        let mut market = Market::standard();
        market.deposit(LP, dec!(100));
        market.open(TRADER, dec!(10), dec!(30));
        market.engine.mint_collateral(OTHER, dec!(20)).unwrap();
        let max_fill = Price::new_unchecked(dec!(1010));

        let err = market
            .engine
            .announce_leverage_open(OTHER, dec!(1), Decimal::MAX, max_fill, KEEPER_FEE)
            .unwrap_err();
        assert!(matches!(err, EngineError::AmountTooLarge { what: "additional_size", .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(matches!(
            market
                .engine
                .announce_leverage_open(OTHER, Decimal::MAX, dec!(30), max_fill, KEEPER_FEE),
            Err(EngineError::AmountTooLarge { what: "margin", .. })
        ));
        assert!(matches!(
            market
                .engine
                .announce_stable_deposit(OTHER, Decimal::MAX, Decimal::ZERO, KEEPER_FEE),
            Err(EngineError::AmountTooLarge { .. })
        ));
        assert!(matches!(
            market.engine.mint_collateral(OTHER, Decimal::MAX),
            Err(EngineError::AmountTooLarge { .. })
        ));

        assert!(market.engine.pending_order(OTHER).is_none());
        assert_eq!(market.engine.collateral_balance(OTHER), dec!(20));
        market.assert_conserved();
    }

    #[test]
    fn rollback_restores_event_log() {
        let mut market = Market::with_config(EngineConfig {
            max_events: 2,
            ..EngineConfig::default()
        });
        market.engine.mint_collateral(LP, dec!(50) + KEEPER_FEE).unwrap();
        market
            .engine
            .announce_stable_deposit(LP, dec!(50), Decimal::ZERO, KEEPER_FEE)
            .unwrap();
        market.wait(71);
        let before = market.event_ids();

        // replacing the expired order emits a cancel, then the escrow transfer fails
        let err = market
            .engine
            .announce_stable_deposit(LP, dec!(1000), Decimal::ZERO, KEEPER_FEE)
            .unwrap_err();
        assert!(matches!(err, EngineError::Ledger(LedgerError::InsufficientBalance { .. })));
        assert_eq!(market.event_ids(), before);
        assert!(!market.has_event(|p| matches!(
            p,
            EventPayload::OrderCancelled(e) if e.reason == CancelReason::Replaced
        )));
        assert!(market.engine.pending_order(LP).is_some());

        // ids carry on without a gap and the log stays capped
        market.engine.cancel_existing_order(LP).unwrap();
        market.engine.mint_collateral(LP, dec!(1)).unwrap();
        market
            .engine
            .announce_stable_deposit(LP, dec!(1), Decimal::ZERO, KEEPER_FEE)
            .unwrap();
        let after = market.event_ids();
        assert_eq!(after.len(), 2);
        assert_eq!(after[1], after[0] + 1);
        assert_eq!(after[0], before[before.len() - 1] + 1);
    }

    #[test]
    fn bad_debt_guard_on_open() {
        let mut protocol = ProtocolConfig::default();
        protocol.liquidation.buffer_ratio = dec!(0.05);
        let mut market = Market::new(protocol);
        market.deposit(LP, dec!(100));
        market.engine.mint_collateral(TRADER, dec!(2)).unwrap();

        let err = market
            .engine
            .announce_leverage_open(TRADER, dec!(1), dec!(24), Price::new_unchecked(dec!(1010)), KEEPER_FEE)
            .unwrap_err();
        assert_eq!(err, EngineError::PositionCreatesBadDebt);
    }
}

mod position_tests {
    use super::*;

    #[test]
    fn position_token_moves_when_unlocked() {
        let mut market = Market::standard();
        market.deposit(LP, dec!(100));
        let id = market.open(TRADER, dec!(10), dec!(30));

        market.engine.transfer_position(TRADER, OTHER, id).unwrap();
        assert_eq!(market.engine.positions().owner_of(id).unwrap(), OTHER);
        assert!(matches!(
            market
                .engine
                .announce_leverage_close(TRADER, id, Price::new_unchecked(dec!(990)), KEEPER_FEE),
            Err(EngineError::Ledger(LedgerError::NotOwner { .. }))
        ));

        market
            .engine
            .announce_leverage_close(OTHER, id, Price::new_unchecked(dec!(990)), KEEPER_FEE)
            .unwrap();
        // pending close locks the token
        assert_eq!(
            market.engine.transfer_position(OTHER, TRADER, id).unwrap_err(),
            EngineError::Ledger(LedgerError::PositionLocked { position: id })
        );

        let result = market.execute(OTHER).unwrap();
        let ExecutionOutcome::Closed(close) = result.outcome else {
            panic!("expected close");
        };
        assert_eq!(close.owner, OTHER);
        assert_eq!(market.engine.collateral_balance(OTHER), close.amount_to_owner);
        market.assert_conserved();
    }

    #[test]
    fn stop_loss_fills_at_current_price() {
        let mut market = Market::standard();
        market.deposit(LP, dec!(100));
        let id = market.open(TRADER, dec!(10), dec!(30));

        market
            .engine
            .announce_limit_order(TRADER, id, Price::new_unchecked(dec!(950)), Price::new_unchecked(dec!(1100)))
            .unwrap();
        assert!(market.engine.transfer_position(TRADER, OTHER, id).is_err());

        market.wait(5);
        assert!(matches!(
            market.engine.execute_limit_order(id, KEEPER, None),
            Err(EngineError::ExecutableTimeNotReached { .. })
        ));

        market.tick(5, dec!(1000));
        assert!(matches!(
            market.engine.execute_limit_order(id, KEEPER, None),
            Err(EngineError::LimitOrderPriceNotInRange { .. })
        ));

        market.tick(5, dec!(940));
        let keeper_before = market.engine.collateral_balance(KEEPER);
        let result = market.engine.execute_limit_order(id, KEEPER, None).unwrap();
        assert_eq!(result.trigger, LimitTrigger::StopLoss);
        assert_eq!(result.fill_price, Price::new_unchecked(dec!(940)));
        assert_eq!(result.close.close_price, Price::new_unchecked(dec!(940)));
        assert_eq!(result.close.keeper_fee, KEEPER_FEE);
        assert_eq!(market.engine.collateral_balance(KEEPER), keeper_before + KEEPER_FEE);
        assert!(market.engine.limit_order(id).is_none());
        assert!(market.engine.vault().position(id).is_none());
        market.assert_conserved();
    }

    #[test]
    fn take_profit_fills_at_threshold() {
        let mut market = Market::standard();
        market.deposit(LP, dec!(100));
        let id = market.open(TRADER, dec!(10), dec!(30));

        market
            .engine
            .announce_limit_order(TRADER, id, Price::new_unchecked(dec!(900)), Price::new_unchecked(dec!(1050)))
            .unwrap();
        market.tick(10, dec!(1080));

        let result = market.engine.execute_limit_order(id, KEEPER, None).unwrap();
        assert_eq!(result.trigger, LimitTrigger::TakeProfit);
        assert_eq!(result.fill_price, Price::new_unchecked(dec!(1050)));
        assert_eq!(
            result.close.amount_to_owner,
            result.close.settled_margin - result.close.trade_fee - KEEPER_FEE
        );
        market.assert_conserved();
    }

    #[test]
    fn limit_order_thresholds_validated() {
        let mut market = Market::standard();
        market.deposit(LP, dec!(100));
        let id = market.open(TRADER, dec!(10), dec!(30));

        let err = market
            .engine
            .announce_limit_order(TRADER, id, Price::new_unchecked(dec!(1100)), Price::new_unchecked(dec!(900)))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidThresholds { .. }));

        assert!(matches!(
            market
                .engine
                .announce_limit_order(OTHER, id, Price::new_unchecked(dec!(900)), Price::new_unchecked(dec!(1100))),
            Err(EngineError::Ledger(LedgerError::NotOwner { .. }))
        ));
    }

    #[test]
    fn cancelled_limit_order_unlocks() {
        let mut market = Market::standard();
        market.deposit(LP, dec!(100));
        let id = market.open(TRADER, dec!(10), dec!(30));

        market
            .engine
            .announce_limit_order(TRADER, id, Price::new_unchecked(dec!(900)), Price::new_unchecked(dec!(1100)))
            .unwrap();
        assert!(market.engine.cancel_limit_order(OTHER, id).is_err());
        market.engine.cancel_limit_order(TRADER, id).unwrap();

        assert!(market.engine.limit_order(id).is_none());
        assert!(!market.engine.positions().is_locked(id));
        assert_eq!(
            market.engine.cancel_limit_order(TRADER, id).unwrap_err(),
            EngineError::LimitOrderNotFound(id)
        );
        market.engine.transfer_position(TRADER, OTHER, id).unwrap();
    }

    #[test]
    fn close_removes_limit_order() {
        let mut market = Market::standard();
        market.deposit(LP, dec!(100));
        let id = market.open(TRADER, dec!(10), dec!(30));

        market
            .engine
            .announce_limit_order(TRADER, id, Price::new_unchecked(dec!(900)), Price::new_unchecked(dec!(1100)))
            .unwrap();
        market
            .engine
            .announce_leverage_close(TRADER, id, Price::new_unchecked(dec!(990)), KEEPER_FEE)
            .unwrap();
        market.execute(TRADER).unwrap();

        assert!(market.engine.limit_order(id).is_none());
        assert!(market.has_event(|p| matches!(
            p,
            EventPayload::LimitOrderCancelled(e) if e.position == id && e.reason == CancelReason::PositionClosed
        )));
        market.assert_conserved();
    }

    #[test]
    fn liquidation_clears_pending_orders() {
        let mut market = Market::standard();
        market.deposit(LP, dec!(100));
        let id = market.open(TRADER, dec!(2), dec!(30));

        market
            .engine
            .announce_limit_order(TRADER, id, Price::new_unchecked(dec!(500)), Price::new_unchecked(dec!(1100)))
            .unwrap();
        market
            .engine
            .announce_leverage_close(TRADER, id, Price::new_unchecked(dec!(990)), KEEPER_FEE)
            .unwrap();

        market.tick(5, dec!(900));
        market.engine.liquidate(id, OTHER).unwrap();

        assert!(market.engine.pending_order(TRADER).is_none());
        assert!(market.engine.limit_order(id).is_none());
        assert!(market.has_event(|p| matches!(
            p,
            EventPayload::OrderCancelled(e) if e.account == TRADER && e.reason == CancelReason::PositionLiquidated
        )));
        assert!(market.has_event(|p| matches!(
            p,
            EventPayload::PositionLiquidated(e) if e.position == id && e.liquidator == OTHER
        )));
        market.assert_conserved();
    }
}
