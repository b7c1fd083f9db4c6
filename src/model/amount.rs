use crate::util::fixed::{self, OverflowError, SATS_PER_BTC};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error;

pub(crate) const BITCOIN_DIGITS: u32 = 8;
pub(crate) const FIAT_DIGITS: u32 = 2;

#[derive(Debug, Error)]
pub enum ConvertAmountError {
    /// Unable to parse decimal string.
    #[error("Unable to parse decimal string")]
    Decimal(#[from] rust_decimal::Error),

    /// The value does not fit in the integer representation.
    #[error("Amount is out of range: {0}")]
    OutOfRange(Decimal),
}

/// A quantity of bitcoin in satoshis.
///
/// Serialized as a plain integer; displayed as BTC with 8 decimals.
#[derive(
    Copy, Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct Sats(u64);

/// A USD amount in cents.
///
/// Serialized and displayed as a fixed 2-decimal string, e.g. `"-12.34"`.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct UsdCents(i64);

macro_rules! impl_checked_ops {
    ($name:ident, $label:literal) => {
        impl $name {
            pub fn checked_add(self, rhs: Self) -> Result<Self, OverflowError> {
                self.0
                    .checked_add(rhs.0)
                    .map(Self)
                    .ok_or(OverflowError(concat!($label, " addition")))
            }

            pub fn checked_sub(self, rhs: Self) -> Result<Self, OverflowError> {
                self.0
                    .checked_sub(rhs.0)
                    .map(Self)
                    .ok_or(OverflowError(concat!($label, " subtraction")))
            }

            /// Sum an iterator of amounts, failing on overflow.
            pub fn try_sum<I>(iter: I) -> Result<Self, OverflowError>
            where
                I: IntoIterator<Item = Self>,
            {
                iter.into_iter()
                    .try_fold(Self::ZERO, |acc, amount| acc.checked_add(amount))
            }
        }
    };
}

impl_checked_ops!(Sats, "satoshi");
impl_checked_ops!(UsdCents, "cent");

impl Sats {
    pub const ZERO: Self = Self(0);

    pub const fn from_sat(sats: u64) -> Self {
        Self(sats)
    }

    pub const fn to_sat(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// USD value of this quantity at `price` per whole BTC, rounded once to cents.
    pub fn value_at(self, price: UsdCents) -> Result<UsdCents, OverflowError> {
        let value = fixed::mul_div_round(
            i128::from(self.0),
            i128::from(price.0),
            SATS_PER_BTC,
            "value at price",
        )?;

        fixed::narrow(value, "value at price").map(UsdCents)
    }
}

impl UsdCents {
    pub const ZERO: Self = Self(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Sats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SATS_PER_BTC as u64;
        let frac = self.0 % SATS_PER_BTC as u64;

        write!(f, "{whole}.{frac:0width$}", width = BITCOIN_DIGITS as usize)
    }
}

impl fmt::Display for UsdCents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();

        write!(
            f,
            "{sign}{}.{:0width$}",
            abs / 100,
            abs % 100,
            width = FIAT_DIGITS as usize
        )
    }
}

impl TryFrom<Decimal> for UsdCents {
    type Error = ConvertAmountError;

    /// Rounds to cents with banker's rounding.
    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        let mut rounded =
            value.round_dp_with_strategy(FIAT_DIGITS, RoundingStrategy::MidpointNearestEven);
        rounded.rescale(FIAT_DIGITS);

        i64::try_from(rounded.mantissa())
            .map(Self)
            .map_err(|_| ConvertAmountError::OutOfRange(value))
    }
}

impl From<UsdCents> for Decimal {
    fn from(value: UsdCents) -> Self {
        Decimal::new(value.0, FIAT_DIGITS)
    }
}

impl FromStr for UsdCents {
    type Err = ConvertAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(Decimal::from_str(s.trim())?)
    }
}

impl Serialize for UsdCents {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UsdCents {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sats_display() {
        assert_eq!(Sats::from_sat(0).to_string(), "0.00000000");
        assert_eq!(Sats::from_sat(100_000).to_string(), "0.00100000");
        assert_eq!(Sats::from_sat(2_100_000_000_000_000).to_string(), "21000000.00000000");
        assert_eq!(Sats::from_sat(123_456_789).to_string(), "1.23456789");
    }

    #[test]
    fn test_usd_display() {
        assert_eq!(UsdCents::from_cents(0).to_string(), "0.00");
        assert_eq!(UsdCents::from_cents(5).to_string(), "0.05");
        assert_eq!(UsdCents::from_cents(-5).to_string(), "-0.05");
        assert_eq!(UsdCents::from_cents(-1_234).to_string(), "-12.34");
        assert_eq!(UsdCents::from_cents(i64::MIN).to_string(), "-92233720368547758.08");
    }

    #[test]
    fn test_usd_parse_rounds_half_even() {
        assert_eq!("20000".parse::<UsdCents>().unwrap(), UsdCents::from_cents(2_000_000));
        assert_eq!("0.125".parse::<UsdCents>().unwrap(), UsdCents::from_cents(12));
        assert_eq!("0.135".parse::<UsdCents>().unwrap(), UsdCents::from_cents(14));
        assert_eq!("-0.125".parse::<UsdCents>().unwrap(), UsdCents::from_cents(-12));
        assert_eq!(" 1.5 ".parse::<UsdCents>().unwrap(), UsdCents::from_cents(150));
        assert!("abc".parse::<UsdCents>().is_err());
        assert!(matches!(
            "100000000000000000000".parse::<UsdCents>(),
            Err(ConvertAmountError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_serde_boundary() {
        let json = serde_json::to_string(&(Sats::from_sat(42), UsdCents::from_cents(1_000))).unwrap();
        assert_eq!(json, r#"[42,"10.00"]"#);

        let (sats, usd): (Sats, UsdCents) = serde_json::from_str(&json).unwrap();
        assert_eq!(sats, Sats::from_sat(42));
        assert_eq!(usd, UsdCents::from_cents(1_000));
    }

    #[test]
    fn test_value_at() {
        let price = UsdCents::from_cents(3_000_000);
        assert_eq!(
            Sats::from_sat(70_000).value_at(price),
            Ok(UsdCents::from_cents(2_100))
        );

        // Half a cent rounds to even.
        assert_eq!(
            Sats::from_sat(1).value_at(UsdCents::from_cents(50_000_000)),
            Ok(UsdCents::from_cents(0))
        );
        assert_eq!(
            Sats::from_sat(3).value_at(UsdCents::from_cents(50_000_000)),
            Ok(UsdCents::from_cents(2))
        );
    }

    #[test]
    fn test_checked_ops() {
        let sum = UsdCents::try_sum([1, 2, 3].map(UsdCents::from_cents));
        assert_eq!(sum, Ok(UsdCents::from_cents(6)));
        assert!(UsdCents::from_cents(i64::MAX)
            .checked_add(UsdCents::from_cents(1))
            .is_err());
        assert!(Sats::ZERO.checked_sub(Sats::from_sat(1)).is_err());
    }
}
