// 2.0: fixed-point helpers. every financial division in the crate goes through here.
// protocol precision is 18 fractional digits. per-position values round toward
// negative infinity so individual entitlements never sum past the aggregate.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

pub const PRECISION: u32 = 18;

// largest amount or size accepted from a caller. keeps every product and sum
// the engine forms well inside the 96-bit mantissa.
pub const MAX_AMOUNT: Decimal = dec!(1_000_000_000_000_000);

// floor at 18 dp. -0.0000000000000000001 -> -0.000000000000000001
pub fn round_down(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PRECISION, RoundingStrategy::ToNegativeInfinity)
}

pub fn round_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PRECISION, RoundingStrategy::ToPositiveInfinity)
}

pub fn mul_down(a: Decimal, b: Decimal) -> Decimal {
    round_down(a * b)
}

// a * b / c with one final rounding. c must be non-zero.
pub fn mul_div_down(a: Decimal, b: Decimal, c: Decimal) -> Decimal {
    debug_assert!(!c.is_zero());
    round_down(a * b / c)
}

pub fn div_down(a: Decimal, b: Decimal) -> Decimal {
    debug_assert!(!b.is_zero());
    round_down(a / b)
}

pub fn clamp(value: Decimal, lower: Decimal, upper: Decimal) -> Decimal {
    value.max(lower).min(upper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_toward_negative_infinity() {
        // 1/3 at 18 dp
        let third = div_down(Decimal::ONE, dec!(3));
        assert_eq!(third, dec!(0.333333333333333333));

        let neg_third = div_down(-Decimal::ONE, dec!(3));
        assert_eq!(neg_third, dec!(-0.333333333333333334));
    }

    #[test]
    fn round_up_is_the_mirror() {
        assert_eq!(round_up(Decimal::ONE / dec!(3)), dec!(0.333333333333333334));
        assert_eq!(round_up(-Decimal::ONE / dec!(3)), dec!(-0.333333333333333333));
    }

    #[test]
    fn exact_values_untouched() {
        assert_eq!(mul_down(dec!(30), dec!(0.5)), dec!(15));
        assert_eq!(mul_div_down(dec!(30), dec!(1000), dec!(2000)), dec!(15));
    }

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp(dec!(5), dec!(1), dec!(3)), dec!(3));
        assert_eq!(clamp(dec!(-5), dec!(-1), dec!(1)), dec!(-1));
        assert_eq!(clamp(dec!(0.5), dec!(0), dec!(1)), dec!(0.5));
    }
}
