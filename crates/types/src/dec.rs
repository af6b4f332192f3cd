//! Fixed-precision decimal helpers.
//!
//! Reward math runs on [`rust_decimal::Decimal`] truncated to
//! [`PRECISION`] fractional digits after every multiplication and division,
//! so that repeated accrual never rounds up and every node derives the same
//! figures.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

/// Number of fractional digits kept by reward accumulators.
pub const PRECISION: u32 = 18;

/// Smallest positive value representable at [`PRECISION`].
pub fn smallest_dec() -> Decimal {
    Decimal::new(1, PRECISION)
}

/// Convert an integer token amount into a decimal.
///
/// Amounts beyond `Decimal::MAX` (~7.9e28) saturate.
pub fn dec_from_amount(amount: u128) -> Decimal {
    Decimal::from_u128(amount).unwrap_or(Decimal::MAX)
}

/// Truncating arithmetic on reward decimals.
pub trait DecExt: Sized {
    /// Drop digits beyond [`PRECISION`], rounding towards zero.
    fn truncate_prec(self) -> Self;
    /// `self * rhs`, truncated. Saturates at the decimal range.
    fn mul_truncate(self, rhs: Self) -> Self;
    /// `self * mul / quo`, truncated. Panics when `quo` is zero.
    ///
    /// The product is taken first when it fits the decimal range; otherwise
    /// the larger factor is divided first so large stakes never overflow.
    fn mul_quo_truncate(self, mul: Self, quo: Self) -> Self;
    /// `self * mul / quo`, rounded half away from zero. Panics when `quo` is
    /// zero.
    fn mul_quo_round(self, mul: Self, quo: Self) -> Self;
    /// `self / rhs`, truncated. Panics when `rhs` is zero.
    fn quo_truncate(self, rhs: Self) -> Self;
    /// `self / rhs`, rounded half away from zero. Panics when `rhs` is zero.
    fn quo_round(self, rhs: Self) -> Self;
    /// Integer part as a token amount; negative values map to zero.
    fn to_amount(self) -> u128;
}

impl DecExt for Decimal {
    fn truncate_prec(self) -> Self {
        self.round_dp_with_strategy(PRECISION, RoundingStrategy::ToZero)
    }

    fn mul_truncate(self, rhs: Self) -> Self {
        self.checked_mul(rhs)
            .unwrap_or_else(|| saturated(self.is_sign_negative() != rhs.is_sign_negative()))
            .truncate_prec()
    }

    fn mul_quo_truncate(self, mul: Self, quo: Self) -> Self {
        mul_quo(self, mul, quo, RoundingStrategy::ToZero)
    }

    fn mul_quo_round(self, mul: Self, quo: Self) -> Self {
        mul_quo(self, mul, quo, RoundingStrategy::MidpointAwayFromZero)
    }

    fn quo_truncate(self, rhs: Self) -> Self {
        assert!(!rhs.is_zero(), "decimal division by zero");
        (self / rhs).truncate_prec()
    }

    fn quo_round(self, rhs: Self) -> Self {
        assert!(!rhs.is_zero(), "decimal division by zero");
        (self / rhs).round_dp_with_strategy(PRECISION, RoundingStrategy::MidpointAwayFromZero)
    }

    fn to_amount(self) -> u128 {
        if self.is_sign_negative() {
            return 0;
        }
        self.trunc().to_u128().unwrap_or(u128::MAX)
    }
}

fn saturated(negative: bool) -> Decimal {
    if negative {
        Decimal::MIN
    } else {
        Decimal::MAX
    }
}

fn mul_quo(value: Decimal, mul: Decimal, quo: Decimal, strategy: RoundingStrategy) -> Decimal {
    assert!(!quo.is_zero(), "decimal division by zero");
    let negative = (value.is_sign_negative() != mul.is_sign_negative()) != quo.is_sign_negative();
    let result = match value.checked_mul(mul) {
        Some(product) => product.checked_div(quo),
        None => {
            let (larger, smaller) = if value.abs() >= mul.abs() { (value, mul) } else { (mul, value) };
            larger
                .checked_div(quo)
                .and_then(|scaled| scaled.checked_mul(smaller))
        }
    };
    result
        .unwrap_or_else(|| saturated(negative))
        .round_dp_with_strategy(PRECISION, strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_truncation_never_rounds_up() {
        let third = Decimal::ONE.quo_truncate(Decimal::from(3));
        assert_eq!(third, Decimal::from_str("0.333333333333333333").unwrap());
        let two_thirds = Decimal::from(2).quo_truncate(Decimal::from(3));
        assert_eq!(two_thirds, Decimal::from_str("0.666666666666666666").unwrap());
    }

    #[test]
    fn test_to_amount() {
        assert_eq!(Decimal::from_str("5787.999").unwrap().to_amount(), 5787);
        assert_eq!(Decimal::from_str("-1.5").unwrap().to_amount(), 0);
        assert_eq!(dec_from_amount(11_574).to_amount(), 11_574);
    }

    #[test]
    fn test_mul_quo_keeps_exact_product_when_it_fits() {
        // 3000 * 1 / 3 must not go through 0.333... and lose a unit.
        let share = Decimal::from(3000).mul_quo_truncate(Decimal::ONE, Decimal::from(3));
        assert_eq!(share, Decimal::from(1000));
        let rounded = Decimal::from(2).mul_quo_round(Decimal::ONE, Decimal::from(3));
        assert_eq!(rounded, Decimal::from_str("0.666666666666666667").unwrap());
    }

    #[test]
    fn test_mul_quo_large_operands_do_not_overflow() {
        let stake = dec_from_amount(1_000_000_000_000_000_000_000_000);
        let rewards = dec_from_amount(115_740_740_740);
        assert_eq!(rewards.mul_quo_truncate(stake, stake), rewards);

        let half = dec_from_amount(500_000_000_000_000_000_000_000);
        assert_eq!(rewards.mul_quo_truncate(half, stake), dec_from_amount(57_870_370_370));
    }

    #[test]
    fn test_mul_truncate_saturates() {
        assert_eq!(Decimal::MAX.mul_truncate(Decimal::from(2)), Decimal::MAX);
        assert_eq!(Decimal::MAX.mul_truncate(Decimal::from(-2)), Decimal::MIN);
    }

    #[test]
    fn test_smallest_dec() {
        assert_eq!(smallest_dec() * Decimal::from(3), Decimal::from_str("0.000000000000000003").unwrap());
    }
}
