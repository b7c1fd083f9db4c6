use chrono::{DateTime, Datelike as _, NaiveDate, Utc};
use std::collections::BTreeSet;

pub(crate) trait GetYear {
    fn get_year(&self) -> i32;
}

impl GetYear for DateTime<Utc> {
    fn get_year(&self) -> i32 {
        self.year()
    }
}

pub trait YearsExt {
    /// Every distinct tax year present, ascending.
    fn years(&self) -> BTreeSet<i32>;
}

/// Blanket implementation for every slice whose items implement `GetYear`.
impl<T> YearsExt for [T]
where
    T: GetYear,
{
    fn years(&self) -> BTreeSet<i32> {
        self.iter().map(GetYear::get_year).collect()
    }
}

/// Keep only the items that fall in a given tax year.
pub(crate) fn in_year<'a, T>(items: &'a [T], year: i32) -> impl Iterator<Item = &'a T> + 'a
where
    T: GetYear,
{
    items.iter().filter(move |item| item.get_year() == year)
}

/// The last representable instant of `year`, in UTC.
pub fn end_of_year(year: i32) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, 12, 31)?
        .and_hms_nano_opt(23, 59, 59, 999_999_999)
        .map(|datetime| datetime.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn test_end_of_year() {
        let end = end_of_year(2023).unwrap();
        let next = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(end.year(), 2023);
        assert!(end < next);
        assert_eq!((next - end).num_nanoseconds(), Some(1));
        assert!(end_of_year(i32::MAX).is_none());
    }

    #[test]
    fn test_years() {
        let dates = [
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        ];

        assert_eq!(dates.years(), BTreeSet::from([2023, 2024]));
        assert_eq!(in_year(&dates, 2024).count(), 2);
    }
}
