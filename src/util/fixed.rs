//! Fixed-point helpers for satoshi and cent arithmetic.
//!
//! Every product is formed in `i128` with overflow checks, then divided once with
//! round-half-to-even.

use thiserror::Error;

/// Satoshis in one whole bitcoin, the unit prices are quoted against.
pub const SATS_PER_BTC: i128 = 100_000_000;

/// Arithmetic left the representable range.
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
#[error("Arithmetic overflow while computing {0}")]
pub struct OverflowError(pub &'static str);

/// Divide `num` by a strictly positive `den`, rounding ties to the even neighbor.
pub(crate) fn div_round_half_even(num: i128, den: i128) -> i128 {
    debug_assert!(den > 0);

    let quotient = num.div_euclid(den);
    let remainder = num.rem_euclid(den);
    let above = den - remainder;

    match remainder.cmp(&above) {
        std::cmp::Ordering::Less => quotient,
        std::cmp::Ordering::Greater => quotient + 1,
        std::cmp::Ordering::Equal if quotient.rem_euclid(2) == 0 => quotient,
        std::cmp::Ordering::Equal => quotient + 1,
    }
}

/// `round(a * b / den)` with a checked product.
pub(crate) fn mul_div_round(
    a: i128,
    b: i128,
    den: i128,
    what: &'static str,
) -> Result<i128, OverflowError> {
    let product = a.checked_mul(b).ok_or(OverflowError(what))?;

    Ok(div_round_half_even(product, den))
}

/// `round(a * b * c / den)` with checked products.
pub(crate) fn mul3_div_round(
    a: i128,
    b: i128,
    c: i128,
    den: i128,
    what: &'static str,
) -> Result<i128, OverflowError> {
    let product = a
        .checked_mul(b)
        .and_then(|ab| ab.checked_mul(c))
        .ok_or(OverflowError(what))?;

    Ok(div_round_half_even(product, den))
}

/// Narrow an intermediate result back to the `i64` storage width.
pub(crate) fn narrow(value: i128, what: &'static str) -> Result<i64, OverflowError> {
    i64::try_from(value).map_err(|_| OverflowError(what))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_even() {
        assert_eq!(div_round_half_even(5, 2), 2);
        assert_eq!(div_round_half_even(7, 2), 4);
        assert_eq!(div_round_half_even(-5, 2), -2);
        assert_eq!(div_round_half_even(-7, 2), -4);
        assert_eq!(div_round_half_even(1, 3), 0);
        assert_eq!(div_round_half_even(2, 3), 1);
        assert_eq!(div_round_half_even(-2, 3), -1);
        assert_eq!(div_round_half_even(250, 100), 2);
        assert_eq!(div_round_half_even(350, 100), 4);
        assert_eq!(div_round_half_even(0, 7), 0);
    }

    #[test]
    fn test_cents_of_sats() {
        // 100,000 sats at $20,000.00 per BTC
        assert_eq!(
            mul_div_round(100_000, 2_000_000, SATS_PER_BTC, "test"),
            Ok(2_000)
        );

        // 1 sat at $0.50 per BTC rounds down to zero
        assert_eq!(mul_div_round(1, 50, SATS_PER_BTC, "test"), Ok(0));
    }

    #[test]
    fn test_overflow() {
        assert_eq!(
            mul_div_round(i128::MAX, 2, 1, "product"),
            Err(OverflowError("product"))
        );
        assert_eq!(
            mul3_div_round(i128::MAX / 2, 1, 3, 1, "fee"),
            Err(OverflowError("fee"))
        );
        assert_eq!(narrow(i128::from(i64::MAX) + 1, "narrow"), Err(OverflowError("narrow")));
    }
}
