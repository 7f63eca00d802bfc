//! Size and date limit predicates (`sizemin=10M`, `datemax=7D`, ...)
//!
//! A set of limits is a conjunction: a file is kept only when every limit
//! holds, so `sizemin=1K sizemax=1M` is a range rather than "either bound".

use crate::types::SyncError;
use chrono::{DateTime, Duration, Months, Utc};
use std::fmt;

const KB: u64 = 1024;

/// One parsed `key=value` limit.
///
/// Thresholds are inclusive: `sizemin=1K` keeps a 1024-byte file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeDateLimit {
    SizeMin(u64),
    SizeMax(u64),
    DateMin(DateTime<Utc>),
    DateMax(DateTime<Utc>),
}

impl SizeDateLimit {
    /// Parse a limit token, resolving relative dates against `now`
    pub fn parse(token: &str, now: DateTime<Utc>) -> Result<Self, SyncError> {
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| invalid(token, "expected key=value"))?;
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim().to_ascii_uppercase();

        if value.is_empty() {
            return Err(invalid(token, "missing value"));
        }

        match key.as_str() {
            "sizemin" => Ok(SizeDateLimit::SizeMin(parse_size(token, &value)?)),
            "sizemax" => Ok(SizeDateLimit::SizeMax(parse_size(token, &value)?)),
            "datemin" => Ok(SizeDateLimit::DateMin(parse_date(token, &value, now)?)),
            "datemax" => Ok(SizeDateLimit::DateMax(parse_date(token, &value, now)?)),
            other => Err(invalid(token, &format!("unknown limit '{}'", other))),
        }
    }

    /// Check a file's size and modification time against this limit
    pub fn matches(&self, size: u64, modified: DateTime<Utc>) -> bool {
        match *self {
            SizeDateLimit::SizeMin(min) => size >= min,
            SizeDateLimit::SizeMax(max) => size <= max,
            SizeDateLimit::DateMin(min) => modified >= min,
            SizeDateLimit::DateMax(max) => modified <= max,
        }
    }
}

impl fmt::Display for SizeDateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeDateLimit::SizeMin(v) => write!(f, "sizemin={}", v),
            SizeDateLimit::SizeMax(v) => write!(f, "sizemax={}", v),
            SizeDateLimit::DateMin(v) => write!(f, "datemin={}", v.to_rfc3339()),
            SizeDateLimit::DateMax(v) => write!(f, "datemax={}", v.to_rfc3339()),
        }
    }
}

fn invalid(token: &str, reason: &str) -> SyncError {
    SyncError::Validation(format!("Invalid limit '{}': {}", token, reason))
}

fn parse_size(token: &str, value: &str) -> Result<u64, SyncError> {
    let (digits, factor) = match value.chars().last() {
        Some('K') => (&value[..value.len() - 1], KB),
        Some('M') => (&value[..value.len() - 1], KB * KB),
        Some('G') => (&value[..value.len() - 1], KB * KB * KB),
        _ => (value, 1),
    };

    let amount: u64 = digits
        .parse()
        .map_err(|_| invalid(token, "size must be a whole number"))?;

    amount
        .checked_mul(factor)
        .ok_or_else(|| invalid(token, "size is too large"))
}

fn parse_date(token: &str, value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, SyncError> {
    let unit = value
        .chars()
        .last()
        .ok_or_else(|| invalid(token, "missing value"))?;
    let amount: u32 = value[..value.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| invalid(token, "offset must be a whole number followed by Y/M/W/D/H/N/S"))?;

    let shifted = match unit {
        'Y' => now.checked_sub_months(Months::new(amount.saturating_mul(12))),
        'M' => now.checked_sub_months(Months::new(amount)),
        'W' => now.checked_sub_signed(Duration::weeks(i64::from(amount))),
        'D' => now.checked_sub_signed(Duration::days(i64::from(amount))),
        'H' => now.checked_sub_signed(Duration::hours(i64::from(amount))),
        'N' => now.checked_sub_signed(Duration::minutes(i64::from(amount))),
        'S' => now.checked_sub_signed(Duration::seconds(i64::from(amount))),
        other => return Err(invalid(token, &format!("unknown date unit '{}'", other))),
    };

    shifted.ok_or_else(|| invalid(token, "date offset is out of range"))
}

/// All limits of a task; a file passes only if every limit holds
#[derive(Debug, Clone, Default)]
pub struct LimitSet {
    limits: Vec<SizeDateLimit>,
}

impl LimitSet {
    pub fn parse(tokens: &[String], now: DateTime<Utc>) -> Result<Self, SyncError> {
        let limits = tokens
            .iter()
            .filter(|t| !t.trim().is_empty())
            .map(|t| SizeDateLimit::parse(t, now))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { limits })
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }

    pub fn matches(&self, size: u64, modified: DateTime<Utc>) -> bool {
        self.limits.iter().all(|l| l.matches(size, modified))
    }

    pub fn limits(&self) -> &[SizeDateLimit] {
        &self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0)
            .single()
            .expect("valid date")
    }

    #[test]
    fn test_size_units() {
        assert_eq!(
            SizeDateLimit::parse("sizemin=10M", now()).expect("parse"),
            SizeDateLimit::SizeMin(10 * 1024 * 1024)
        );
        assert_eq!(
            SizeDateLimit::parse("sizemax=2k", now()).expect("parse"),
            SizeDateLimit::SizeMax(2048)
        );
        assert_eq!(
            SizeDateLimit::parse("SizeMax=1G", now()).expect("parse"),
            SizeDateLimit::SizeMax(1024 * 1024 * 1024)
        );
        assert_eq!(
            SizeDateLimit::parse("sizemin=512", now()).expect("parse"),
            SizeDateLimit::SizeMin(512)
        );
    }

    #[test]
    fn test_date_offsets_are_relative_to_now() {
        let base = now();
        assert_eq!(
            SizeDateLimit::parse("datemax=7D", base).expect("parse"),
            SizeDateLimit::DateMax(base - Duration::days(7))
        );
        assert_eq!(
            SizeDateLimit::parse("datemin=2W", base).expect("parse"),
            SizeDateLimit::DateMin(base - Duration::days(14))
        );
        assert_eq!(
            SizeDateLimit::parse("datemin=30N", base).expect("parse"),
            SizeDateLimit::DateMin(base - Duration::minutes(30))
        );
        assert_eq!(
            SizeDateLimit::parse("datemin=15s", base).expect("parse"),
            SizeDateLimit::DateMin(base - Duration::seconds(15))
        );
    }

    #[test]
    fn test_month_and_year_offsets_use_calendar_arithmetic() {
        let base = now();
        let month = SizeDateLimit::parse("datemin=1M", base).expect("parse");
        // March 31st minus one month clamps to the end of February
        assert_eq!(
            month,
            SizeDateLimit::DateMin(
                Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0)
                    .single()
                    .expect("valid date")
            )
        );

        let year = SizeDateLimit::parse("datemin=1Y", base).expect("parse");
        assert_eq!(
            year,
            SizeDateLimit::DateMin(
                Utc.with_ymd_and_hms(2023, 3, 31, 12, 0, 0)
                    .single()
                    .expect("valid date")
            )
        );
    }

    #[test]
    fn test_malformed_limits_are_rejected() {
        for token in ["sizemin", "sizemin=", "sizemin=abc", "datemax=7X", "dateafter=1D", "datemin=D"] {
            let err = SizeDateLimit::parse(token, now()).unwrap_err();
            assert!(err.is_validation_error(), "{} should be rejected", token);
        }
    }

    #[test]
    fn test_limits_are_inclusive() {
        let min = SizeDateLimit::SizeMin(100);
        assert!(min.matches(100, now()));
        assert!(!min.matches(99, now()));

        let max = SizeDateLimit::DateMax(now());
        assert!(max.matches(0, now()));
        assert!(!max.matches(0, now() + Duration::seconds(1)));
    }

    #[test]
    fn test_limit_set_requires_every_limit() {
        let tokens = vec!["sizemin=1K".to_string(), "sizemax=1M".to_string()];
        let set = LimitSet::parse(&tokens, now()).expect("parse");

        assert!(set.matches(4096, now()));
        assert!(!set.matches(10, now()));
        assert!(!set.matches(2 * 1024 * 1024, now()));
    }

    #[test]
    fn test_empty_limit_set_matches_everything() {
        let set = LimitSet::parse(&[], now()).expect("parse");
        assert!(set.is_empty());
        assert!(set.matches(0, now()));
    }
}
