// 7.0 keeper.rs: keeper fee quotes. the announce path takes the quote as a floor,
// limit-order execution charges it exactly. how the quote is derived is the oracle's business.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

pub trait KeeperFeeOracle: fmt::Debug + Send + Sync {
    // collateral units
    fn keeper_fee(&self) -> Decimal;
}

// shared handle so a test can move the quote after the engine is built
#[derive(Debug, Clone)]
pub struct FixedKeeperFee {
    fee: Arc<RwLock<Decimal>>,
}

impl FixedKeeperFee {
    pub fn new(fee: Decimal) -> Self {
        Self {
            fee: Arc::new(RwLock::new(fee)),
        }
    }

    pub fn set_fee(&self, fee: Decimal) {
        *self.fee.write() = fee;
    }
}

impl KeeperFeeOracle for FixedKeeperFee {
    fn keeper_fee(&self) -> Decimal {
        *self.fee.read()
    }
}
