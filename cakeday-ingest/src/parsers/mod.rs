//! Export parsers. Each returns an `ImportReport` of normalized contacts.

pub mod csv_contacts;
pub mod vcard;

use anyhow::Result;
use cakeday_core::PartialBirthDate;
use regex::Regex;

/// Apple Contacts writes this year when the user left the year out.
const APPLE_OMITTED_YEAR: i32 = 1604;

/// Reads the birthday spellings address books actually emit:
///
///   1990-05-01   19900501   --05-01   --0501   1990-05-01T00:00:00
///   05/01/1990   5/1        05-01
pub struct BirthdayParser {
    iso: Regex,
    slashed: Regex,
    dashed: Regex,
}

impl BirthdayParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            iso: Regex::new(r"^(?:(?P<y>\d{4})-?|--)(?P<m>\d{2})-?(?P<d>\d{2})(?:T.*)?$")?,
            slashed: Regex::new(r"^(?P<m>\d{1,2})/(?P<d>\d{1,2})(?:/(?P<y>\d{4}))?$")?,
            dashed: Regex::new(r"^(?P<m>\d{1,2})-(?P<d>\d{1,2})$")?,
        })
    }

    /// `None` for anything unreadable or impossible (Feb 30, month 13, ...).
    pub fn parse(&self, raw: &str) -> Option<PartialBirthDate> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }
        let caps = self
            .iso
            .captures(s)
            .or_else(|| self.slashed.captures(s))
            .or_else(|| self.dashed.captures(s))?;

        let month: u32 = caps.name("m")?.as_str().parse().ok()?;
        let day: u32 = caps.name("d")?.as_str().parse().ok()?;
        let year = caps
            .name("y")
            .and_then(|y| y.as_str().parse::<i32>().ok())
            .filter(|y| *y != APPLE_OMITTED_YEAR && *y > 0);

        PartialBirthDate::new(month, day, year).ok()
    }
}

/// Fallback id for entries exported without one. Changes if name or phone change.
pub(crate) fn derived_id(name: &str, phone: Option<&str>) -> String {
    let digits: String = phone
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    format!("derived:{}|{}", name.trim().to_lowercase(), digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_common_birthday_spellings() {
        let p = BirthdayParser::new().unwrap();
        let full = PartialBirthDate::new(5, 1, Some(1990)).unwrap();
        let no_year = PartialBirthDate::new(5, 1, None).unwrap();

        assert_eq!(p.parse("1990-05-01"), Some(full));
        assert_eq!(p.parse("19900501"), Some(full));
        assert_eq!(p.parse("1990-05-01T00:00:00Z"), Some(full));
        assert_eq!(p.parse("05/01/1990"), Some(full));
        assert_eq!(p.parse("--05-01"), Some(no_year));
        assert_eq!(p.parse("--0501"), Some(no_year));
        assert_eq!(p.parse("5/1"), Some(no_year));
        assert_eq!(p.parse("05-01"), Some(no_year));
        assert_eq!(p.parse("1604-05-01"), Some(no_year));
    }

    #[test]
    fn rejects_garbage_and_impossible_dates() {
        let p = BirthdayParser::new().unwrap();
        assert_eq!(p.parse(""), None);
        assert_eq!(p.parse("next tuesday"), None);
        assert_eq!(p.parse("1990-02-30"), None);
        assert_eq!(p.parse("13/01"), None);
    }
}
