//! Date math: partial birth dates and their next occurrence.
//!
//! Feb 29 birthdays are observed on Feb 28 in common years. Everything here is
//! a pure function of the birth date and the reference day passed in.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{CakedayError, Result};

/// Month/day with an optional year, as address books store birthdays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawBirthDate")]
pub struct PartialBirthDate {
    month: u32,
    day: u32,
    year: Option<i32>,
}

/// Unchecked wire form; stored dates go back through `PartialBirthDate::new`.
#[derive(Deserialize)]
struct RawBirthDate {
    month: u32,
    day: u32,
    #[serde(default)]
    year: Option<i32>,
}

impl TryFrom<RawBirthDate> for PartialBirthDate {
    type Error = CakedayError;

    fn try_from(raw: RawBirthDate) -> Result<Self> {
        PartialBirthDate::new(raw.month, raw.day, raw.year)
    }
}

/// Next calendar date (today or later) a birthday falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextOccurrence {
    pub date: NaiveDate,
    pub days_from_today: i64,
}

impl PartialBirthDate {
    /// Validates month 1-12 and the day against the month, allowing Feb 29.
    pub fn new(month: u32, day: u32, year: Option<i32>) -> Result<Self> {
        if !(1..=12).contains(&month) || day == 0 || day > max_day_in_month(month) {
            return Err(CakedayError::InvalidBirthDate { month, day });
        }
        Ok(Self { month, day, year })
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn is_leap_day(&self) -> bool {
        self.month == 2 && self.day == 29
    }

    pub fn matches_month_day(&self, date: NaiveDate) -> bool {
        self.month == date.month() && self.day == date.day()
    }

    /// The date this birthday is celebrated on in `year`.
    pub fn observed_in(&self, year: i32) -> Option<NaiveDate> {
        let day = self.day.min(days_in_month(year, self.month)?);
        NaiveDate::from_ymd_opt(year, self.month, day)
    }

    /// Age turned on `date`, when the birth year is known and not in the future.
    pub fn age_on(&self, date: NaiveDate) -> Option<u32> {
        let year = self.year?;
        u32::try_from(date.year() - year).ok()
    }
}

/// Next occurrence on or after `today`. A birthday equal to today is 0 days away.
pub fn next_occurrence(birth: &PartialBirthDate, today: NaiveDate) -> NextOccurrence {
    let date = match birth.observed_in(today.year()) {
        Some(d) if d >= today => Some(d),
        _ => birth.observed_in(today.year() + 1),
    }
    // only unreachable at chrono's year limits
    .unwrap_or(today);

    NextOccurrence {
        date,
        days_from_today: days_between(today, date),
    }
}

/// Whole days from `today` to `date`; negative only if `date` is in the past.
pub fn days_between(today: NaiveDate, date: NaiveDate) -> i64 {
    (date - today).num_days()
}

/// Interpret a raw number that may be an age or a birth year.
///
/// `0..=130` is taken as an age; `1900..=current_year` as a birth year.
pub fn normalized_age(raw: i32, current_year: i32) -> Option<u32> {
    if (0..=130).contains(&raw) {
        return u32::try_from(raw).ok();
    }
    if (1900..=current_year).contains(&raw) {
        let computed = current_year - raw;
        if (0..=130).contains(&computed) {
            return u32::try_from(computed).ok();
        }
    }
    None
}

fn max_day_in_month(month: u32) -> u32 {
    match month {
        2 => 29,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    u32::try_from((next - first).num_days()).ok()
}
