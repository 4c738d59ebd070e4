//! Fixed-window bucketing of timestamps.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Datelike, Months, NaiveDate, SecondsFormat, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Persisted state never lives shorter than this.
pub const MIN_TTL: Duration = Duration::from_secs(60);

/// Calendar unit a quota window is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl IntervalUnit {
    /// Nominal length of one unit. Months count as 31 days and years as 365.
    pub fn seconds(&self) -> u64 {
        match self {
            IntervalUnit::Second => 1,
            IntervalUnit::Minute => 60,
            IntervalUnit::Hour => 60 * 60,
            IntervalUnit::Day => 60 * 60 * 24,
            IntervalUnit::Month => 60 * 60 * 24 * 31,
            IntervalUnit::Year => 60 * 60 * 24 * 365,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalUnit::Second => "second",
            IntervalUnit::Minute => "minute",
            IntervalUnit::Hour => "hour",
            IntervalUnit::Day => "day",
            IntervalUnit::Month => "month",
            IntervalUnit::Year => "year",
        }
    }

    /// The next coarser unit, whose boundaries every bucket of this unit
    /// respects.
    fn parent(&self) -> Option<IntervalUnit> {
        match self {
            IntervalUnit::Second => Some(IntervalUnit::Minute),
            IntervalUnit::Minute => Some(IntervalUnit::Hour),
            IntervalUnit::Hour => Some(IntervalUnit::Day),
            IntervalUnit::Day => Some(IntervalUnit::Month),
            IntervalUnit::Month => Some(IntervalUnit::Year),
            IntervalUnit::Year => None,
        }
    }
}

impl fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an interval unit name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid interval unit: {0}")]
pub struct InvalidIntervalUnit(pub String);

impl FromStr for IntervalUnit {
    type Err = InvalidIntervalUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "second" => Ok(IntervalUnit::Second),
            "minute" => Ok(IntervalUnit::Minute),
            "hour" => Ok(IntervalUnit::Hour),
            "day" => Ok(IntervalUnit::Day),
            "month" => Ok(IntervalUnit::Month),
            "year" => Ok(IntervalUnit::Year),
            other => Err(InvalidIntervalUnit(other.to_string())),
        }
    }
}

/// A quota window: `multiple` consecutive `unit`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowSpec {
    unit: IntervalUnit,
    multiple: u32,
}

impl WindowSpec {
    /// Returns `None` for a zero multiple.
    pub fn new(unit: IntervalUnit, multiple: u32) -> Option<Self> {
        (multiple > 0).then_some(Self { unit, multiple })
    }

    /// Nominal window length in seconds.
    pub fn window_seconds(&self) -> u64 {
        self.unit.seconds() * u64::from(self.multiple)
    }

    /// How long a record for this window must be retained.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.window_seconds()).max(MIN_TTL)
    }

    /// TTL for a record written at `now`: at least `ttl()`, and long enough
    /// to outlive the bucket containing `now`. Calendar buckets can be longer
    /// than their nominal length, e.g. a leap year.
    pub fn record_ttl(&self, now: DateTime<Utc>) -> Duration {
        let remaining = self
            .bucket_end(now)
            .and_then(|end| (end - now).to_std().ok())
            .unwrap_or_default();
        self.ttl().max(remaining)
    }

    /// Start of the bucket containing `now`.
    pub fn truncate(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        truncate(now, self.unit, self.multiple)
    }

    /// Canonical key of the bucket containing `now`, e.g.
    /// `2024-01-01T00:02:00.000Z`.
    pub fn window_key(&self, now: DateTime<Utc>) -> String {
        self.truncate(now).to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// First instant after the bucket containing `now`.
    ///
    /// A bucket spans `multiple` units but is cut short at the next boundary
    /// of the coarser unit, since truncation restarts there.
    pub fn bucket_end(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = self.truncate(now);
        let end = advance(start, self.unit, self.multiple)?;
        match self.unit.parent() {
            Some(parent) => {
                let parent_end = advance(truncate(start, parent, 1), parent, 1)?;
                Some(end.min(parent_end))
            }
            None => Some(end),
        }
    }
}

/// Truncate `now` to the start of its bucket of `multiple` × `unit`.
///
/// Every field finer than `unit` is reset, then the unit's own field is
/// floored to a multiple of `multiple`. Day-of-month and month are floored
/// zero-based so that day 1 always opens a bucket.
pub fn truncate(now: DateTime<Utc>, unit: IntervalUnit, multiple: u32) -> DateTime<Utc> {
    let k = multiple.max(1);
    let floor = |value: u32| value / k * k;

    let (year, month0, day0) = (now.year(), now.month0(), now.day0());
    let (hour, minute, second) = (now.hour(), now.minute(), now.second());

    let fields = match unit {
        IntervalUnit::Second => (year, month0, day0, hour, minute, floor(second)),
        IntervalUnit::Minute => (year, month0, day0, hour, floor(minute), 0),
        IntervalUnit::Hour => (year, month0, day0, floor(hour), 0, 0),
        IntervalUnit::Day => (year, month0, floor(day0), 0, 0, 0),
        IntervalUnit::Month => (year, floor(month0), 0, 0, 0, 0),
        IntervalUnit::Year => {
            let k = i32::try_from(k).unwrap_or(i32::MAX);
            (year.div_euclid(k) * k, 0, 0, 0, 0, 0)
        }
    };

    let (year, month0, day0, hour, minute, second) = fields;
    // Floored fields never exceed the originals, so the date is always valid.
    NaiveDate::from_ymd_opt(year, month0 + 1, day0 + 1)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .map(|naive| naive.and_utc())
        .unwrap_or(now)
}

fn advance(start: DateTime<Utc>, unit: IntervalUnit, count: u32) -> Option<DateTime<Utc>> {
    match unit {
        IntervalUnit::Second | IntervalUnit::Minute | IntervalUnit::Hour | IntervalUnit::Day => {
            let secs = i64::try_from(unit.seconds() * u64::from(count)).ok()?;
            start.checked_add_signed(TimeDelta::try_seconds(secs)?)
        }
        IntervalUnit::Month => start.checked_add_months(Months::new(count)),
        IntervalUnit::Year => start.checked_add_months(Months::new(count.checked_mul(12)?)),
    }
}
