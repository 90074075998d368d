//! Year-less calendar day used for program start dates.
//!
//! A [`Day`] is a `(day, month)` pair validated against a fixed non-leap-year
//! month table. Days are ordered by their position in the year, and the
//! difference between two days is a signed number of days. February 29 is not
//! representable.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Sub;

use crate::constants::DAYS_PER_MONTH;

/// Errors produced when constructing a [`Day`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DayError {
    #[error("month {0} is out of range (1-12)")]
    MonthOutOfRange(u32),

    #[error("day {day} is out of range for month {month} (1-{max})")]
    DayOutOfRange { day: u32, month: u32, max: u8 },
}

/// A calendar day without a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDay", into = "RawDay")]
pub struct Day {
    day: u8,
    month: u8,
}

#[derive(Serialize, Deserialize)]
struct RawDay {
    day: u32,
    month: u32,
}

impl Day {
    /// Create a day, rejecting months outside 1-12 and days past the end of
    /// the month (February always has 28 days).
    pub fn new(day: u32, month: u32) -> Result<Self, DayError> {
        if !(1..=12).contains(&month) {
            return Err(DayError::MonthOutOfRange(month));
        }
        let max = DAYS_PER_MONTH[(month - 1) as usize];
        if day < 1 || day > u32::from(max) {
            return Err(DayError::DayOutOfRange { day, month, max });
        }
        Ok(Self {
            day: day as u8,
            month: month as u8,
        })
    }

    /// Reduce a full calendar date to its day and month.
    ///
    /// Fails for February 29.
    pub fn from_date(date: NaiveDate) -> Result<Self, DayError> {
        Self::new(date.day(), date.month())
    }

    pub fn day(&self) -> u32 {
        u32::from(self.day)
    }

    pub fn month(&self) -> u32 {
        u32::from(self.month)
    }

    /// 1-based position in the fixed 365-day year (1 January is 1, 31 December is 365).
    pub fn day_of_year(&self) -> i32 {
        let preceding: i32 = DAYS_PER_MONTH[..usize::from(self.month - 1)]
            .iter()
            .map(|&d| i32::from(d))
            .sum();
        preceding + i32::from(self.day)
    }
}

impl Ord for Day {
    fn cmp(&self, other: &Self) -> Ordering {
        self.day_of_year().cmp(&other.day_of_year())
    }
}

impl PartialOrd for Day {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Sub for Day {
    type Output = i32;

    fn sub(self, rhs: Self) -> i32 {
        self.day_of_year() - rhs.day_of_year()
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}.{:02}.", self.day, self.month)
    }
}

impl TryFrom<RawDay> for Day {
    type Error = DayError;

    fn try_from(raw: RawDay) -> Result<Self, Self::Error> {
        Day::new(raw.day, raw.month)
    }
}

impl From<Day> for RawDay {
    fn from(day: Day) -> Self {
        RawDay {
            day: day.day(),
            month: day.month(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_days() {
        assert!(Day::new(1, 1).is_ok());
        assert!(Day::new(28, 2).is_ok());
        assert!(Day::new(31, 12).is_ok());
        assert!(Day::new(30, 4).is_ok());
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(Day::new(1, 0), Err(DayError::MonthOutOfRange(0)));
        assert_eq!(Day::new(1, 13), Err(DayError::MonthOutOfRange(13)));
        assert_eq!(
            Day::new(29, 2),
            Err(DayError::DayOutOfRange {
                day: 29,
                month: 2,
                max: 28
            })
        );
        assert!(Day::new(31, 4).is_err());
        assert!(Day::new(0, 5).is_err());
    }

    #[test]
    fn test_day_of_year() {
        assert_eq!(Day::new(1, 1).unwrap().day_of_year(), 1);
        assert_eq!(Day::new(1, 3).unwrap().day_of_year(), 60);
        assert_eq!(Day::new(1, 10).unwrap().day_of_year(), 274);
        assert_eq!(Day::new(31, 12).unwrap().day_of_year(), 365);
    }

    #[test]
    fn test_subtraction_and_ordering() {
        let first = Day::new(1, 1).unwrap();
        let last = Day::new(31, 12).unwrap();
        assert_eq!(last - first, 364);
        assert_eq!(first - last, -364);
        assert_eq!(first - first, 0);
        assert!(first < last);
        assert!(Day::new(15, 3).unwrap() > Day::new(28, 2).unwrap());
    }

    #[test]
    fn test_from_date() {
        let date = NaiveDate::from_ymd_opt(2025, 10, 15).unwrap();
        assert_eq!(Day::from_date(date).unwrap(), Day::new(15, 10).unwrap());

        let leap_day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert!(Day::from_date(leap_day).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Day::new(3, 9).unwrap().to_string(), "03.09.");
    }

    #[test]
    fn test_deserialize_validates() {
        #[derive(Deserialize)]
        struct Wrapper {
            start: Day,
        }

        let ok: Wrapper = toml::from_str("start = { day = 1, month = 10 }").unwrap();
        assert_eq!(ok.start, Day::new(1, 10).unwrap());

        let err = toml::from_str::<Wrapper>("start = { day = 31, month = 11 }");
        assert!(err.is_err());
    }
}
