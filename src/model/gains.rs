use crate::basis::LotId;
use crate::model::amount::{Sats, UsdCents};
use crate::util::{fixed::OverflowError, year_ext::GetYear};
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Copy, Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GainTerm {
    Short,
    Long,
}

impl fmt::Display for GainTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Short => write!(f, "Short-term"),
            Self::Long => write!(f, "Long-term"),
        }
    }
}

/// How the short/long boundary is decided.
#[derive(Copy, Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldingPeriodRule {
    /// Long-term when held for more than 365 whole days.
    #[default]
    Days365,

    /// Long-term when disposed strictly after the first anniversary of the acquisition. An
    /// acquisition on Feb 29 has its anniversary on Feb 28.
    CalendarYear,
}

impl HoldingPeriodRule {
    /// Whole UTC calendar days between acquisition and disposal, and the resulting term.
    pub fn classify(self, acquired: DateTime<Utc>, disposed: DateTime<Utc>) -> (i64, GainTerm) {
        let acquired = acquired.date_naive();
        let disposed = disposed.date_naive();
        let holding_days = (disposed - acquired).num_days();

        let is_long = match self {
            Self::Days365 => holding_days > 365,
            Self::CalendarYear => acquired
                .checked_add_months(Months::new(12))
                .is_some_and(|anniversary| disposed > anniversary),
        };

        let term = if is_long {
            GainTerm::Long
        } else {
            GainTerm::Short
        };

        (holding_days, term)
    }
}

/// One realized consumption of a lot by a disposal.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GainLossRecord {
    pub lot_id: LotId,
    pub disposal_id: String,
    pub quantity_consumed_sat: Sats,
    pub acquisition_date: DateTime<Utc>,
    pub disposal_date: DateTime<Utc>,
    #[serde(rename = "cost_basis_usd")]
    pub cost_basis_usd_cents: UsdCents,
    #[serde(rename = "proceeds_usd")]
    pub proceeds_usd_cents: UsdCents,
    /// The share of the disposal fee subtracted from proceeds.
    #[serde(rename = "fee_usd")]
    pub fee_usd_cents: UsdCents,
    #[serde(rename = "gain_usd")]
    pub gain_usd_cents: UsdCents,
    pub holding_days: i64,
    pub term: GainTerm,
    /// Either price involved was estimated.
    pub estimated: bool,
}

impl GetYear for GainLossRecord {
    /// Records belong to the tax year of their disposal.
    fn get_year(&self) -> i32 {
        self.disposal_date.get_year()
    }
}

/// Sums over a set of gain records.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct GainTotals {
    pub short_term: UsdCents,
    pub long_term: UsdCents,
    pub total: UsdCents,
    pub proceeds: UsdCents,
    pub cost_basis: UsdCents,
    pub quantity: Sats,
}

impl GainTotals {
    pub fn from_records<'a, I>(records: I) -> Result<Self, OverflowError>
    where
        I: IntoIterator<Item = &'a GainLossRecord>,
    {
        records.into_iter().try_fold(Self::default(), |mut acc, record| {
            match record.term {
                GainTerm::Short => {
                    acc.short_term = acc.short_term.checked_add(record.gain_usd_cents)?
                }
                GainTerm::Long => acc.long_term = acc.long_term.checked_add(record.gain_usd_cents)?,
            }
            acc.total = acc.total.checked_add(record.gain_usd_cents)?;
            acc.proceeds = acc.proceeds.checked_add(record.proceeds_usd_cents)?;
            acc.cost_basis = acc.cost_basis.checked_add(record.cost_basis_usd_cents)?;
            acc.quantity = acc.quantity.checked_add(record.quantity_consumed_sat)?;

            Ok(acc)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_days_365_boundary() {
        let rule = HoldingPeriodRule::Days365;

        assert_eq!(
            rule.classify(day(2023, 1, 1), day(2024, 1, 1)),
            (365, GainTerm::Short)
        );
        assert_eq!(
            rule.classify(day(2023, 1, 1), day(2024, 1, 2)),
            (366, GainTerm::Long)
        );
        assert_eq!(
            rule.classify(day(2023, 1, 1), day(2024, 6, 1)),
            (517, GainTerm::Long)
        );
    }

    #[test]
    fn test_days_ignore_time_of_day() {
        let rule = HoldingPeriodRule::Days365;
        let acquired = Utc.with_ymd_and_hms(2023, 1, 1, 23, 59, 59).unwrap();
        let disposed = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 1).unwrap();

        assert_eq!(rule.classify(acquired, disposed), (1, GainTerm::Short));
    }

    #[test]
    fn test_calendar_year_boundary() {
        let rule = HoldingPeriodRule::CalendarYear;

        // Exactly one calendar year is not "more than one year".
        assert_eq!(
            rule.classify(day(2023, 3, 1), day(2024, 3, 1)).1,
            GainTerm::Short
        );
        assert_eq!(
            rule.classify(day(2023, 3, 1), day(2024, 3, 2)).1,
            GainTerm::Long
        );

        // Leap year: the anniversary is Feb 28, so Feb 29 is one day past it.
        assert_eq!(
            rule.classify(day(2023, 2, 28), day(2024, 2, 28)),
            (365, GainTerm::Short)
        );
        assert_eq!(
            rule.classify(day(2023, 2, 28), day(2024, 2, 29)),
            (366, GainTerm::Long)
        );
        assert_eq!(
            rule.classify(day(2023, 3, 1), day(2024, 2, 29)),
            (365, GainTerm::Short)
        );
        assert_eq!(
            HoldingPeriodRule::Days365.classify(day(2023, 2, 28), day(2024, 2, 29)),
            (366, GainTerm::Long)
        );

        // Acquired on a leap day.
        assert_eq!(
            rule.classify(day(2024, 2, 29), day(2025, 2, 28)).1,
            GainTerm::Short
        );
        assert_eq!(
            rule.classify(day(2024, 2, 29), day(2025, 3, 1)).1,
            GainTerm::Long
        );
    }
}
