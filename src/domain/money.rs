//! Integer-money arithmetic helpers.
//!
//! All balances and amounts are integer minor currency units. Percentage
//! fees are computed in `rust_decimal` and rounded half-up to the nearest
//! unit, so fee arithmetic is exact and reproducible.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Compute `amount * rate / 100`, rounded half-up to the nearest unit.
///
/// `rate` is a percentage (e.g. `3` for 3%). Rates are validated to
/// [0, 100] at policy-table construction, so the result always fits i64
/// for any representable amount.
pub fn percentage_of(amount: i64, rate: Decimal) -> i64 {
    let exact = Decimal::from(amount) * rate / Decimal::ONE_HUNDRED;
    exact
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn rate(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_percentage_exact() {
        assert_eq!(percentage_of(100_000, rate("3")), 3_000);
        assert_eq!(percentage_of(50_000, rate("5")), 2_500);
        assert_eq!(percentage_of(100_000, rate("0")), 0);
    }

    #[test]
    fn test_percentage_rounds_half_up() {
        // 333 * 1.5% = 4.995 -> 5
        assert_eq!(percentage_of(333, rate("1.5")), 5);
        // 50 * 2.5% = 1.25 -> 1
        assert_eq!(percentage_of(50, rate("2.5")), 1);
        // 30 * 2.5% = 0.75 -> 1
        assert_eq!(percentage_of(30, rate("2.5")), 1);
        // 10 * 5% = 0.5 -> 1 (half-up, not banker's)
        assert_eq!(percentage_of(10, rate("5")), 1);
    }

    #[test]
    fn test_percentage_zero_amount() {
        assert_eq!(percentage_of(0, rate("10")), 0);
    }
}
