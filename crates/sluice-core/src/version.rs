use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use sluice_config::VersionScheme;
use thiserror::Error;

/// Ordering key of a migration.
///
/// A project uses a single [`VersionScheme`], so values of different
/// variants never meet in one candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Version {
    Integer(u64),
    Timestamp(NaiveDateTime),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("empty version tag")]
    Empty,
    #[error("version tag '{0}' is not a number")]
    NotNumeric(String),
    #[error("version tag '{0}' must be strictly positive")]
    Zero(String),
    #[error("version tag '{0}' is out of range")]
    Overflow(String),
    #[error("timestamp tag '{0}' must be YYYYMMDDHHMMSS or YYYYMMDDHHMMSSmmm")]
    TimestampLength(String),
    #[error("timestamp tag '{0}' is not a valid calendar instant")]
    InvalidTimestamp(String),
}

impl Version {
    /// Parse a tag under the given scheme.
    pub fn parse(tag: &str, scheme: VersionScheme) -> Result<Self, VersionError> {
        if tag.is_empty() {
            return Err(VersionError::Empty);
        }
        if !tag.bytes().all(|b| b.is_ascii_digit()) {
            return Err(VersionError::NotNumeric(tag.to_string()));
        }

        match scheme {
            VersionScheme::Integer => {
                let value: u64 = tag
                    .parse()
                    .map_err(|_| VersionError::Overflow(tag.to_string()))?;
                if value == 0 {
                    return Err(VersionError::Zero(tag.to_string()));
                }
                Ok(Version::Integer(value))
            }
            VersionScheme::Timestamp => parse_timestamp(tag).map(Version::Timestamp),
        }
    }

    pub fn scheme(&self) -> VersionScheme {
        match self {
            Version::Integer(_) => VersionScheme::Integer,
            Version::Timestamp(_) => VersionScheme::Timestamp,
        }
    }

    pub fn as_integer(&self) -> Option<u64> {
        match self {
            Version::Integer(v) => Some(*v),
            Version::Timestamp(_) => None,
        }
    }

    /// True when both are timestamps within the same wall-clock second.
    pub fn same_second(&self, other: &Version) -> bool {
        match (self, other) {
            (Version::Timestamp(a), Version::Timestamp(b)) => {
                a.and_utc().timestamp() == b.and_utc().timestamp()
            }
            _ => false,
        }
    }

    /// Next integer version, used when generating a new script.
    pub fn next_integer(current: Option<&Version>) -> Version {
        let max = current.and_then(Version::as_integer).unwrap_or(0);
        Version::Integer(max.saturating_add(1))
    }

    /// Timestamp version for the given instant, truncated to whole seconds.
    pub fn timestamp_at(instant: NaiveDateTime) -> Version {
        Version::Timestamp(instant.with_nanosecond(0).unwrap_or(instant))
    }
}

fn digits(tag: &str, range: std::ops::Range<usize>) -> u32 {
    tag[range]
        .bytes()
        .fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0'))
}

fn parse_timestamp(tag: &str) -> Result<NaiveDateTime, VersionError> {
    let millis = match tag.len() {
        14 => 0,
        17 => digits(tag, 14..17),
        _ => return Err(VersionError::TimestampLength(tag.to_string())),
    };

    let year = digits(tag, 0..4) as i32;
    NaiveDate::from_ymd_opt(year, digits(tag, 4..6), digits(tag, 6..8))
        .and_then(|date| {
            date.and_hms_milli_opt(
                digits(tag, 8..10),
                digits(tag, 10..12),
                digits(tag, 12..14),
                millis,
            )
        })
        .ok_or_else(|| VersionError::InvalidTimestamp(tag.to_string()))
}

impl fmt::Display for Version {
    /// Canonical text, as stored in the bookkeeping table.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Integer(v) => write!(f, "{v}"),
            Version::Timestamp(ts) => {
                write!(
                    f,
                    "{:04}{:02}{:02}{:02}{:02}{:02}",
                    ts.year(),
                    ts.month(),
                    ts.day(),
                    ts.hour(),
                    ts.minute(),
                    ts.second()
                )?;
                let millis = ts.nanosecond() / 1_000_000;
                if millis > 0 {
                    write!(f, "{millis:03}")?;
                }
                Ok(())
            }
        }
    }
}
