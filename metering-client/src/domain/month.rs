use std::{fmt, str::FromStr};

use time::{Date, Month};

/// Calendar month key, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u8,
}

impl YearMonth {
    pub fn new(year: i32, month: u8) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: Date) -> Self {
        Self {
            year: date.year(),
            month: date.month() as u8,
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u8 {
        self.month
    }

    pub fn first_day(self) -> Option<Date> {
        let month = Month::try_from(self.month).ok()?;
        Date::from_calendar_date(self.year, month, 1).ok()
    }
}

impl From<Date> for YearMonth {
    fn from(date: Date) -> Self {
        Self::from_date(date)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("invalid year-month '{0}', expected YYYY-MM or YYYY-MM-DD")]
pub struct ParseYearMonthError(String);

/// Accepts `YYYY-MM` and full `YYYY-MM-DD` dates (the day is discarded).
impl FromStr for YearMonth {
    type Err = ParseYearMonthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseYearMonthError(s.to_string());
        let mut parts = s.trim().splitn(3, '-');

        let year: i32 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let month: u8 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        if let Some(day) = parts.next() {
            day.parse::<u8>().map_err(|_| err())?;
        }

        Self::new(year, month).ok_or_else(err)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for YearMonth {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn formats_with_zero_padding() {
        let m = YearMonth::from_date(date!(2024 - 03 - 17));
        assert_eq!(m.to_string(), "2024-03");
    }

    #[test]
    fn parses_month_and_full_date() {
        assert_eq!("2024-01".parse::<YearMonth>(), Ok(YearMonth::new(2024, 1).unwrap()));
        assert_eq!("2024-11-01".parse::<YearMonth>(), Ok(YearMonth::new(2024, 11).unwrap()));
        assert!("2024-13".parse::<YearMonth>().is_err());
        assert!("January".parse::<YearMonth>().is_err());
    }

    #[test]
    fn orders_chronologically() {
        let dec = YearMonth::new(2023, 12).unwrap();
        let jan = YearMonth::new(2024, 1).unwrap();
        assert!(dec < jan);
        assert_eq!(jan.first_day(), Some(date!(2024 - 01 - 01)));
    }
}
