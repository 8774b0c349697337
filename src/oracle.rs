// Oracle Adapter
//
// Reconciles two price sources into one validated price. The push feed is the
// slow, authoritative one: if it is missing or stale the read fails, there is no
// fallback. The pull feed is fast and keeper-updated; it is only used when it
// passes its own validity checks and agrees with the push feed.

use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::math::div_down;
use crate::types::{Price, Timestamp};

/// Latest round reported by the push feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRound {
    pub price: Decimal,
    pub round_id: u64,
    pub updated_at: Timestamp,
}

/// Raw pull-feed price. The real value is `price * 10^expo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullPrice {
    pub price: i64,
    pub conf: i64,
    pub expo: i32,
    pub publish_time: Timestamp,
}

impl PullPrice {
    /// Decoded price, or None when the mantissa or exponent cannot describe a positive value.
    pub fn to_decimal(&self) -> Option<Decimal> {
        if self.price <= 0 || self.expo > 0 {
            return None;
        }
        let scale = self.expo.unsigned_abs();
        Decimal::try_new(self.price, scale).ok()
    }
}

/// Signed update a keeper submits to the pull feed. The feed verifies it; the
/// adapter only checks the fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullUpdate {
    pub price: PullPrice,
}

/// Slow/authoritative feed.
pub trait PushPriceFeed: fmt::Debug + Send + Sync {
    fn latest_round(&self) -> Option<PushRound>;
}

/// Fast feed that is brought up to date by paid updates.
pub trait PullPriceFeed: fmt::Debug + Send + Sync {
    /// Fee the feed charges to apply `update`.
    fn update_fee(&self, update: &PullUpdate) -> Decimal;

    fn apply_update(&self, update: PullUpdate);

    /// Latest price if it was published within `max_age` seconds of `now`.
    fn price_no_older_than(&self, now: Timestamp, max_age: i64) -> Option<PullPrice>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Push,
    Pull,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OracleParams {
    /// Staleness bound of the push feed in seconds.
    pub push_max_age: i64,
    /// Staleness bound of the pull feed in seconds.
    pub pull_max_age: i64,
    /// Minimum price / confidence for a pull price to be trusted.
    pub min_confidence_ratio: Decimal,
    /// Largest tolerated |push - pull| / push.
    pub max_diff_percent: Decimal,
}

impl Default for OracleParams {
    fn default() -> Self {
        Self {
            push_max_age: 86_400,
            pull_max_age: 90,
            min_confidence_ratio: dec!(1000),
            max_diff_percent: dec!(0.02),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("price from {feed:?} feed is stale")]
    PriceStale { feed: PriceSource },
    #[error("price from {feed:?} feed is invalid")]
    PriceInvalid { feed: PriceSource },
    #[error("push and pull prices differ by {diff}")]
    PriceMismatch { diff: Decimal },
    #[error("update fee {required} not covered by {paid}")]
    InsufficientUpdateFee { required: Decimal, paid: Decimal },
}

/// Validated price plus the time it was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OraclePrice {
    pub price: Price,
    pub timestamp: Timestamp,
    pub source: PriceSource,
}

#[derive(Debug, Clone)]
pub struct OracleAdapter {
    push: Arc<dyn PushPriceFeed>,
    pull: Arc<dyn PullPriceFeed>,
    params: OracleParams,
}

impl OracleAdapter {
    pub fn new(push: Arc<dyn PushPriceFeed>, pull: Arc<dyn PullPriceFeed>, params: OracleParams) -> Self {
        Self { push, pull, params }
    }

    pub fn params(&self) -> &OracleParams {
        &self.params
    }

    pub(crate) fn set_params(&mut self, params: OracleParams) {
        self.params = params;
    }

    /// Forwards a signed update to the pull feed once its fee is covered.
    pub fn update_pull_price(&self, update: PullUpdate, fee_paid: Decimal) -> Result<(), OracleError> {
        let required = self.pull.update_fee(&update);
        if fee_paid < required {
            return Err(OracleError::InsufficientUpdateFee {
                required,
                paid: fee_paid,
            });
        }
        self.pull.apply_update(update);
        Ok(())
    }

    /// Returns the reconciled price. `max_age`, when given, bounds how old the
    /// result may be relative to `now` and is checked after reconciliation.
    pub fn get_price(&self, now: Timestamp, max_age: Option<i64>) -> Result<OraclePrice, OracleError> {
        let push = self.push_price(now)?;
        let pull = self.pull.price_no_older_than(now, self.params.pull_max_age);

        let mut chosen = push;
        if let Some(pull) = pull {
            if let Some(pull_value) = pull.to_decimal() {
                let diff = div_down((push.price.value() - pull_value).abs(), push.price.value());
                if diff > self.params.max_diff_percent {
                    warn!(%diff, push = %push.price, pull = %pull_value, "oracle price mismatch");
                    return Err(OracleError::PriceMismatch { diff });
                }
            }

            if self.pull_is_valid(&pull) {
                if let Some(pull_price) = pull.to_decimal().and_then(Price::new) {
                    if pull.publish_time >= push.timestamp {
                        chosen = OraclePrice {
                            price: pull_price,
                            timestamp: pull.publish_time,
                            source: PriceSource::Pull,
                        };
                    }
                }
            } else {
                debug!(?pull, "pull price rejected, using push feed");
            }
        }

        if let Some(max_age) = max_age {
            if chosen.timestamp.plus(max_age) < now {
                return Err(OracleError::PriceStale {
                    feed: chosen.source,
                });
            }
        }

        Ok(chosen)
    }

    fn push_price(&self, now: Timestamp) -> Result<OraclePrice, OracleError> {
        let round = self.push.latest_round().ok_or(OracleError::PriceInvalid {
            feed: PriceSource::Push,
        })?;
        let price = Price::new(round.price).ok_or(OracleError::PriceInvalid {
            feed: PriceSource::Push,
        })?;
        if round.updated_at.plus(self.params.push_max_age) < now {
            return Err(OracleError::PriceStale {
                feed: PriceSource::Push,
            });
        }
        Ok(OraclePrice {
            price,
            timestamp: round.updated_at,
            source: PriceSource::Push,
        })
    }

    fn pull_is_valid(&self, pull: &PullPrice) -> bool {
        if pull.price <= 0 || pull.conf <= 0 || pull.expo > 0 {
            return false;
        }
        let ratio = Decimal::from(pull.price) / Decimal::from(pull.conf);
        ratio >= self.params.min_confidence_ratio
    }
}

/// Shared push feed for tests and the simulator.
#[derive(Debug, Clone, Default)]
pub struct MockPushFeed {
    round: Arc<RwLock<Option<PushRound>>>,
}

impl MockPushFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, price: Decimal, updated_at: Timestamp) {
        let mut round = self.round.write();
        let round_id = round.map(|r| r.round_id + 1).unwrap_or(1);
        *round = Some(PushRound {
            price,
            round_id,
            updated_at,
        });
    }

    pub fn clear(&self) {
        *self.round.write() = None;
    }
}

impl PushPriceFeed for MockPushFeed {
    fn latest_round(&self) -> Option<PushRound> {
        *self.round.read()
    }
}

#[derive(Debug, Default)]
struct PullFeedState {
    latest: Option<PullPrice>,
    update_fee: Decimal,
}

/// Shared pull feed for tests and the simulator.
#[derive(Debug, Clone, Default)]
pub struct MockPullFeed {
    state: Arc<RwLock<PullFeedState>>,
}

impl MockPullFeed {
    pub const EXPO: i32 = -8;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_update_fee(&self, fee: Decimal) {
        self.state.write().update_fee = fee;
    }

    pub fn set_raw(&self, price: PullPrice) {
        self.state.write().latest = Some(price);
    }

    /// Stores `price` at 8 decimals with a tight confidence band.
    pub fn set_price(&self, price: Decimal, publish_time: Timestamp) {
        self.set_raw(Self::encode(price, publish_time));
    }

    pub fn clear(&self) {
        self.state.write().latest = None;
    }

    pub fn encode(price: Decimal, publish_time: Timestamp) -> PullPrice {
        let mantissa = (price * dec!(100000000)).trunc().to_i64().unwrap_or(0);
        PullPrice {
            price: mantissa,
            conf: (mantissa / 10_000).max(1),
            expo: Self::EXPO,
            publish_time,
        }
    }
}

impl PullPriceFeed for MockPullFeed {
    fn update_fee(&self, _update: &PullUpdate) -> Decimal {
        self.state.read().update_fee
    }

    fn apply_update(&self, update: PullUpdate) {
        let mut state = self.state.write();
        let newer = state
            .latest
            .map_or(true, |current| update.price.publish_time >= current.publish_time);
        if newer {
            state.latest = Some(update.price);
        }
    }

    fn price_no_older_than(&self, now: Timestamp, max_age: i64) -> Option<PullPrice> {
        self.state
            .read()
            .latest
            .filter(|p| p.publish_time.plus(max_age) >= now)
    }
}
