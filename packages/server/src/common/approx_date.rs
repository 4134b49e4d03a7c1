//! Approximate dates for biographical fields.
//!
//! Birth and death dates are frequently known only down to a year or a
//! month ("1947", "1947-09"). They are stored as strings in the
//! `YYYY[-MM[-DD]]` shape and parsed on demand.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

lazy_static! {
    static ref APPROX_DATE_RE: Regex =
        Regex::new(r"^(?P<year>[0-9]{4})(?:-(?P<month>[0-9]{2})(?:-(?P<day>[0-9]{2}))?)?$")
            .expect("approximate date pattern is valid");
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ApproximateDateError {
    #[error("approximate dates must follow the pattern YYYY[-MM[-DD]], got {0:?}")]
    Malformed(String),
    #[error("{0:?} is not a calendar date")]
    OutOfRange(String),
}

/// A date known to year, month, or day precision.
///
/// Month and day are zero when unknown, matching the convention of the
/// upstream data this register imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproximateDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl ApproximateDate {
    /// Parse an approximate date, accepting `YYYY`, `YYYY-MM`, or
    /// `YYYY-MM-DD`. An empty string is not a date; callers treat that as
    /// "unknown" before getting here.
    pub fn parse(value: &str) -> Result<Self, ApproximateDateError> {
        let caps = APPROX_DATE_RE
            .captures(value)
            .ok_or_else(|| ApproximateDateError::Malformed(value.to_string()))?;

        let year: i32 = caps["year"].parse().unwrap();
        let month: u32 = caps
            .name("month")
            .map(|m| m.as_str().parse().unwrap())
            .unwrap_or(0);
        let day: u32 = caps
            .name("day")
            .map(|d| d.as_str().parse().unwrap())
            .unwrap_or(0);

        if month > 12 || (month == 0 && day != 0) {
            return Err(ApproximateDateError::OutOfRange(value.to_string()));
        }
        if day != 0 && chrono::NaiveDate::from_ymd_opt(year, month, day).is_none() {
            return Err(ApproximateDateError::OutOfRange(value.to_string()));
        }

        Ok(Self { year, month, day })
    }

    /// True when the day (and therefore the full date) is known.
    pub fn is_exact(&self) -> bool {
        self.month != 0 && self.day != 0
    }
}

impl fmt::Display for ApproximateDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.month, self.day) {
            (0, _) => write!(f, "{:04}", self.year),
            (m, 0) => write!(f, "{:04}-{:02}", self.year, m),
            (m, d) => write!(f, "{:04}-{:02}-{:02}", self.year, m, d),
        }
    }
}

impl FromStr for ApproximateDate {
    type Err = ApproximateDateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Validate a stored date field: empty means unknown and is fine, anything
/// else must parse.
pub fn validate_date_field(value: &str) -> Result<(), ApproximateDateError> {
    if value.is_empty() {
        return Ok(());
    }
    ApproximateDate::parse(value).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_year_only() {
        let d = ApproximateDate::parse("1947").unwrap();
        assert_eq!((d.year, d.month, d.day), (1947, 0, 0));
        assert!(!d.is_exact());
    }

    #[test]
    fn parses_year_and_month() {
        let d = ApproximateDate::parse("1947-09").unwrap();
        assert_eq!((d.year, d.month, d.day), (1947, 9, 0));
    }

    #[test]
    fn parses_full_date() {
        let d = ApproximateDate::parse("1947-09-17").unwrap();
        assert!(d.is_exact());
        assert_eq!(d.to_string(), "1947-09-17");
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["17/09/1947", "1947-9", "september 1947", "194"] {
            assert_eq!(
                ApproximateDate::parse(bad),
                Err(ApproximateDateError::Malformed(bad.to_string())),
                "{bad:?} should be malformed"
            );
        }
    }

    #[test]
    fn rejects_impossible_dates() {
        assert!(matches!(
            ApproximateDate::parse("2001-02-29"),
            Err(ApproximateDateError::OutOfRange(_))
        ));
        assert!(matches!(
            ApproximateDate::parse("2001-13"),
            Err(ApproximateDateError::OutOfRange(_))
        ));
    }

    #[test]
    fn display_roundtrips() {
        for s in ["1947", "1947-09", "1947-09-17"] {
            assert_eq!(ApproximateDate::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn empty_field_is_valid() {
        assert!(validate_date_field("").is_ok());
        assert!(validate_date_field("1962").is_ok());
        assert!(validate_date_field("soon").is_err());
    }
}
