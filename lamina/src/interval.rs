//! Time-unit model for lamina.
//!
//! All layer and collector arithmetic happens in integer MTU (minimum time
//! unit). An [`Interval`] is a configured instance describing one MTU class:
//! how many MTU make up a second, and which unit suffixes may be used in
//! interval strings. Three instances are predefined:
//!
//! | Instance                   | MTU          | Units                          |
//! |----------------------------|--------------|--------------------------------|
//! | [`Interval::SECONDS`]      | 1 second     | `s m h d w mon y`              |
//! | [`Interval::MILLISECONDS`] | 1 millisecond| `mcs ms s m h d w mon y`       |
//! | [`Interval::MICROSECONDS`] | 1 microsecond| `mcs ms s m h d w mon y`       |
//!
//! `mon` is 30 days and `y` is 365 days.
//!
//! # Grammar
//!
//! ```text
//! INTERVAL  = DIGITS UNIT                       e.g. 10s, 15m, 2000mcs
//! RETENTION = INTERVAL ":" INTERVAL ("," INTERVAL ":" INTERVAL)*
//! PERIOD    = PART ":" PART
//! PART      = TERM (("+" | "-") TERM)*
//! TERM      = "now" | "start" | "end" | INTERVAL
//! ```
//!
//! Whitespace is ignored everywhere.

use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{IntervalError, Result};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Upper bound on the number of timestamps a single range may expand to.
pub const MAX_POINTS: usize = 10_000_000;

static INTERVAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)([a-zA-Z]+)$").expect("interval pattern is a valid regex")
});

/// A named unit and its length in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Unit {
    name: &'static str,
    nanos: i64,
}

const fn unit(name: &'static str, nanos: i64) -> Unit {
    Unit { name, nanos }
}

const SECOND: i64 = NANOS_PER_SECOND;
const MINUTE: i64 = 60 * SECOND;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

const SECOND_UNITS: &[Unit] = &[
    unit("s", SECOND),
    unit("m", MINUTE),
    unit("h", HOUR),
    unit("d", DAY),
    unit("w", 7 * DAY),
    unit("mon", 30 * DAY),
    unit("y", 365 * DAY),
];

const SUBSECOND_UNITS: &[Unit] = &[
    unit("mcs", 1_000),
    unit("ms", 1_000_000),
    unit("s", SECOND),
    unit("m", MINUTE),
    unit("h", HOUR),
    unit("d", DAY),
    unit("w", 7 * DAY),
    unit("mon", 30 * DAY),
    unit("y", 365 * DAY),
];

/// Selects one of the predefined [`Interval`] instances.
///
/// Used in configuration files, where the interval itself is not
/// serializable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// One MTU is one second.
    #[default]
    Second,
    /// One MTU is one millisecond.
    Millisecond,
    /// One MTU is one microsecond.
    Microsecond,
}

impl TimeUnit {
    /// Returns the interval configured for this unit.
    pub fn interval(self) -> Interval {
        match self {
            Self::Second => Interval::SECONDS,
            Self::Millisecond => Interval::MILLISECONDS,
            Self::Microsecond => Interval::MICROSECONDS,
        }
    }
}

/// One parsed `interval:period` retention clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retention {
    /// Cell width in MTU.
    pub interval: i64,
    /// Total span in MTU.
    pub period: i64,
    /// The clause as written, whitespace removed.
    pub retention: String,
}

/// A resolved `start:end` pair in MTU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    /// Beginning of the period.
    pub start: i64,
    /// End of the period.
    pub end: i64,
}

/// Values substituted for the symbolic terms of a period string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodContext {
    /// Value of `now`.
    pub now: i64,
    /// Value of `start`, if the caller knows a metric extent.
    pub start: Option<i64>,
    /// Value of `end`, if the caller knows a metric extent.
    pub end: Option<i64>,
}

impl PeriodContext {
    /// A context where only `now` is defined.
    pub fn at(now: i64) -> Self {
        Self {
            now,
            start: None,
            end: None,
        }
    }

    /// A context where `start` and `end` resolve to the given extent.
    pub fn with_extent(now: i64, start: i64, end: i64) -> Self {
        Self {
            now,
            start: Some(start),
            end: Some(end),
        }
    }
}

/// A configured MTU class: conversion from wall-clock time plus the table of
/// unit suffixes accepted by the string parsers.
///
/// # Examples
///
/// ```rust
/// use lamina::interval::Interval;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// assert_eq!(Interval::SECONDS.parse_interval("15m")?, 900);
/// assert_eq!(Interval::MILLISECONDS.parse_interval("2s")?, 2000);
///
/// let layers = Interval::SECONDS.retentions("10s:1m, 1m:1d")?;
/// assert_eq!(layers[1].interval, 60);
/// assert_eq!(layers[1].period, 86_400);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    /// Length of one MTU in nanoseconds.
    mtu_nanos: i64,
    units: &'static [Unit],
}

impl Default for Interval {
    fn default() -> Self {
        Self::SECONDS
    }
}

impl Interval {
    /// MTU is one second.
    pub const SECONDS: Self = Self {
        mtu_nanos: NANOS_PER_SECOND,
        units: SECOND_UNITS,
    };

    /// MTU is one millisecond.
    pub const MILLISECONDS: Self = Self {
        mtu_nanos: 1_000_000,
        units: SUBSECOND_UNITS,
    };

    /// MTU is one microsecond.
    pub const MICROSECONDS: Self = Self {
        mtu_nanos: 1_000,
        units: SUBSECOND_UNITS,
    };

    /// Number of MTU in one second.
    pub const fn mtu_per_second(&self) -> i64 {
        NANOS_PER_SECOND / self.mtu_nanos
    }

    /// Returns the unit suffixes this instance accepts.
    pub fn unit_names(&self) -> impl Iterator<Item = &'static str> {
        self.units.iter().map(|u| u.name)
    }

    /// Converts a wall-clock instant into MTU, rounding down.
    ///
    /// Instants before the Unix epoch map to negative MTU.
    #[allow(clippy::cast_possible_truncation)] // i64 nanos cover ±292 years around the epoch
    pub fn from_system_time(&self, time: SystemTime) -> i64 {
        match time.duration_since(UNIX_EPOCH) {
            Ok(since) => (since.as_nanos() as i64).div_euclid(self.mtu_nanos),
            Err(before) => (-(before.duration().as_nanos() as i64)).div_euclid(self.mtu_nanos),
        }
    }

    /// Returns the current wall-clock time in MTU.
    pub fn now(&self) -> i64 {
        self.from_system_time(SystemTime::now())
    }

    /// Rounds `time` to a multiple of `precision`, truncating toward zero.
    ///
    /// # Errors
    ///
    /// Returns [`IntervalError::Precision`] if `precision` is not positive.
    pub fn round_time(time: i64, precision: i64) -> Result<i64> {
        if precision <= 0 {
            return Err(IntervalError::Precision { precision }.into());
        }
        Ok(time - time % precision)
    }

    /// Returns the inclusive list `[start, start + precision, ..., end]`
    /// after rounding both ends to `precision`.
    ///
    /// # Errors
    ///
    /// Returns [`IntervalError::Section`] if `start > end`,
    /// [`IntervalError::Precision`] if `precision` is not positive, and
    /// [`IntervalError::TooManyPoints`] if the list would exceed
    /// [`MAX_POINTS`] entries.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lamina::interval::Interval;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// assert_eq!(Interval::get_intervals(1, 9, 4)?, vec![0, 4, 8]);
    /// assert_eq!(Interval::get_intervals(7, 7, 5)?, vec![5]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn get_intervals(start: i64, end: i64, precision: i64) -> Result<Vec<i64>> {
        if start > end {
            return Err(IntervalError::Section { start, end }.into());
        }
        let start = Self::round_time(start, precision)?;
        let end = Self::round_time(end, precision)?;

        let steps = end
            .checked_sub(start)
            .map(|span| span / precision)
            .and_then(|steps| usize::try_from(steps).ok())
            .filter(|&steps| steps < MAX_POINTS)
            .ok_or(IntervalError::TooManyPoints { start, end, precision })?;
        let mut result = Vec::with_capacity(steps + 1);
        let mut time = start;
        while time < end {
            result.push(time);
            time += precision;
        }
        result.push(end);
        Ok(result)
    }

    /// Returns the precision that splits `start..end` into roughly `count`
    /// points. Never less than one MTU.
    pub fn get_interval_of_fixed_count(start: i64, end: i64, count: u64) -> i64 {
        let span = start.abs_diff(end) / count.max(1);
        i64::try_from(span).unwrap_or(i64::MAX).max(1)
    }

    /// Parses an interval string such as `10s` or `1mon` into MTU.
    ///
    /// # Errors
    ///
    /// Returns [`IntervalError::Parse`] if the string is malformed, uses a
    /// unit this instance does not know, does not land on a whole number of
    /// MTU, or overflows.
    pub fn parse_interval(&self, interval: &str) -> Result<i64> {
        let parse_error = || IntervalError::Parse {
            interval: interval.to_string(),
        };

        let captures = INTERVAL_PATTERN.captures(interval).ok_or_else(parse_error)?;
        let count: i64 = captures[1].parse().map_err(|_| parse_error())?;
        let unit = self
            .units
            .iter()
            .find(|u| u.name == &captures[2])
            .ok_or_else(parse_error)?;

        let nanos = count.checked_mul(unit.nanos).ok_or_else(parse_error)?;
        if nanos % self.mtu_nanos != 0 {
            return Err(parse_error().into());
        }
        Ok(nanos / self.mtu_nanos)
    }

    /// Resolves a period string like `now-1h:now` using the current time.
    ///
    /// # Errors
    ///
    /// See [`Interval::period_at`].
    pub fn period(&self, period: &str) -> Result<Period> {
        self.period_at(period, PeriodContext::at(self.now()))
    }

    /// Resolves a period string against an explicit context.
    ///
    /// # Errors
    ///
    /// Returns [`IntervalError::Period`] if the string is not two parts
    /// separated by `:` or refers to `start`/`end` without an extent, and
    /// [`IntervalError::Parse`] if a term is not a valid interval.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lamina::interval::{Interval, PeriodContext};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let p = Interval::SECONDS.period_at("now-1h:now", PeriodContext::at(10_000))?;
    /// assert_eq!((p.start, p.end), (6_400, 10_000));
    /// # Ok(())
    /// # }
    /// ```
    pub fn period_at(&self, period: &str, context: PeriodContext) -> Result<Period> {
        let compact: String = period.chars().filter(|c| !c.is_whitespace()).collect();
        let parts: Vec<&str> = compact.split(':').collect();
        if parts.len() != 2 {
            return Err(IntervalError::Period {
                period: period.to_string(),
            }
            .into());
        }

        Ok(Period {
            start: self.part_of_period(parts[0], context)?,
            end: self.part_of_period(parts[1], context)?,
        })
    }

    /// Evaluates one side of a period: a chain of terms joined by `+` or `-`.
    ///
    /// # Errors
    ///
    /// Returns [`IntervalError::Parse`] for malformed terms or overflow and
    /// [`IntervalError::Period`] for `start`/`end` without an extent.
    pub fn part_of_period(&self, part: &str, context: PeriodContext) -> Result<i64> {
        let compact: String = part.chars().filter(|c| !c.is_whitespace()).collect();

        let mut total: i64 = 0;
        let mut negate = false;
        let mut term_start = 0;
        for (index, ch) in compact.char_indices() {
            if ch == '+' || ch == '-' {
                let value = self.term(&compact[term_start..index], context)?;
                total = Self::accumulate(total, value, negate, &compact)?;
                negate = ch == '-';
                term_start = index + 1;
            }
        }
        let value = self.term(&compact[term_start..], context)?;
        Self::accumulate(total, value, negate, &compact)
    }

    /// Parses a retention string into one [`Retention`] per clause.
    ///
    /// Only the syntax is checked; whether the layers make sense together is
    /// left to layer construction.
    ///
    /// # Errors
    ///
    /// Returns [`IntervalError::Retention`] if a clause is not exactly two
    /// parts, or [`IntervalError::Parse`] if a part is not a valid interval.
    pub fn retentions(&self, retentions: &str) -> Result<Vec<Retention>> {
        let compact: String = retentions.chars().filter(|c| !c.is_whitespace()).collect();
        compact
            .split(',')
            .map(|clause| self.retention(clause))
            .collect()
    }

    fn retention(&self, clause: &str) -> Result<Retention> {
        let acts: Vec<&str> = clause.split(':').collect();
        if acts.len() != 2 {
            return Err(IntervalError::Retention {
                retention: clause.to_string(),
            }
            .into());
        }
        Ok(Retention {
            interval: self.parse_interval(acts[0])?,
            period: self.parse_interval(acts[1])?,
            retention: clause.to_string(),
        })
    }

    fn term(&self, term: &str, context: PeriodContext) -> Result<i64> {
        let missing = || IntervalError::Period {
            period: term.to_string(),
        };
        match term {
            "now" => Ok(context.now),
            "start" => Ok(context.start.ok_or_else(missing)?),
            "end" => Ok(context.end.ok_or_else(missing)?),
            _ => self.parse_interval(term),
        }
    }

    fn accumulate(total: i64, value: i64, negate: bool, part: &str) -> Result<i64> {
        let next = if negate {
            total.checked_sub(value)
        } else {
            total.checked_add(value)
        };
        next.ok_or_else(|| {
            IntervalError::Parse {
                interval: part.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LaminaError;

    #[test]
    fn test_round_time() {
        assert_eq!(Interval::round_time(17, 5).unwrap(), 15);
        assert_eq!(Interval::round_time(15, 5).unwrap(), 15);
        // Truncates toward zero for negative times
        assert_eq!(Interval::round_time(-17, 5).unwrap(), -15);
        assert!(matches!(
            Interval::round_time(10, 0),
            Err(LaminaError::Interval(IntervalError::Precision { precision: 0 }))
        ));
    }

    #[test]
    fn test_get_intervals() {
        assert_eq!(Interval::get_intervals(1, 5, 1).unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(Interval::get_intervals(3, 21, 10).unwrap(), vec![0, 10, 20]);
        assert_eq!(Interval::get_intervals(4, 4, 1).unwrap(), vec![4]);
        assert!(matches!(
            Interval::get_intervals(5, 1, 1),
            Err(LaminaError::Interval(IntervalError::Section { start: 5, end: 1 }))
        ));
        assert!(matches!(
            Interval::get_intervals(1, 5, -2),
            Err(LaminaError::Interval(IntervalError::Precision { .. }))
        ));
    }

    #[test]
    fn test_get_intervals_extreme_ranges() {
        // Span does not fit in an i64
        assert!(matches!(
            Interval::get_intervals(i64::MIN, i64::MAX, i64::MAX),
            Err(LaminaError::Interval(IntervalError::TooManyPoints { .. }))
        ));
        assert!(matches!(
            Interval::get_intervals(0, i64::MAX, 1),
            Err(LaminaError::Interval(IntervalError::TooManyPoints { .. }))
        ));

        let max = i64::try_from(MAX_POINTS).unwrap();
        assert!(Interval::get_intervals(0, max * 10, 10).is_err());
        assert_eq!(Interval::get_intervals(0, max * 10, max).unwrap().len(), 11);

        // Far from zero but few points
        let near_max = Interval::get_intervals(i64::MAX - 20, i64::MAX, 10).unwrap();
        assert_eq!(near_max.len(), 3);
        assert_eq!(near_max.last(), Some(&(i64::MAX - i64::MAX % 10)));
    }

    #[test]
    fn test_parse_interval_seconds() {
        let i = Interval::SECONDS;
        assert_eq!(i.parse_interval("10s").unwrap(), 10);
        assert_eq!(i.parse_interval("1m").unwrap(), 60);
        assert_eq!(i.parse_interval("2h").unwrap(), 7_200);
        assert_eq!(i.parse_interval("1d").unwrap(), 86_400);
        assert_eq!(i.parse_interval("1w").unwrap(), 604_800);
        assert_eq!(i.parse_interval("1mon").unwrap(), 2_592_000);
        assert_eq!(i.parse_interval("1y").unwrap(), 31_536_000);

        for bad in ["", "s", "10", "10x", "1.5s", "-1s", "10 s", "10ms"] {
            assert!(
                matches!(i.parse_interval(bad), Err(LaminaError::Interval(IntervalError::Parse { .. }))),
                "expected parse error for {bad:?}"
            );
        }
    }

    #[test]
    fn test_parse_interval_subsecond() {
        let ms = Interval::MILLISECONDS;
        assert_eq!(ms.parse_interval("250ms").unwrap(), 250);
        assert_eq!(ms.parse_interval("1s").unwrap(), 1_000);
        assert_eq!(ms.parse_interval("2000mcs").unwrap(), 2);
        // Not a whole number of milliseconds
        assert!(ms.parse_interval("1500mcs").is_err());

        let us = Interval::MICROSECONDS;
        assert_eq!(us.parse_interval("1mcs").unwrap(), 1);
        assert_eq!(us.parse_interval("3ms").unwrap(), 3_000);
        assert_eq!(us.parse_interval("1m").unwrap(), 60_000_000);
    }

    #[test]
    fn test_parse_interval_overflow() {
        assert!(Interval::MICROSECONDS.parse_interval("99999999y").is_err());
    }

    #[test]
    fn test_mtu_per_second() {
        assert_eq!(Interval::SECONDS.mtu_per_second(), 1);
        assert_eq!(Interval::MILLISECONDS.mtu_per_second(), 1_000);
        assert_eq!(Interval::MICROSECONDS.mtu_per_second(), 1_000_000);
        assert_eq!(TimeUnit::Millisecond.interval(), Interval::MILLISECONDS);
    }

    #[test]
    fn test_from_system_time() {
        let t = UNIX_EPOCH + std::time::Duration::from_millis(1_500);
        assert_eq!(Interval::SECONDS.from_system_time(t), 1);
        assert_eq!(Interval::MILLISECONDS.from_system_time(t), 1_500);
        assert_eq!(Interval::MICROSECONDS.from_system_time(t), 1_500_000);
    }

    #[test]
    fn test_period() {
        let i = Interval::SECONDS;
        let ctx = PeriodContext::at(1_000);

        assert_eq!(i.period_at("now-1h:now", ctx).unwrap(), Period { start: -2_600, end: 1_000 });
        assert_eq!(i.period_at("now - 10m : now + 1m", ctx).unwrap(), Period { start: 400, end: 1_060 });
        assert_eq!(i.period_at("now-1m-30s:now", ctx).unwrap().start, 910);
        assert_eq!(i.period_at("now-1m+30s:now", ctx).unwrap().start, 970);
        assert_eq!(i.period_at("10s:1m", ctx).unwrap(), Period { start: 10, end: 60 });

        assert!(matches!(
            i.period_at("now2s", ctx),
            Err(LaminaError::Interval(IntervalError::Period { .. }))
        ));
        assert!(matches!(
            i.period_at("a:b:c", ctx),
            Err(LaminaError::Interval(IntervalError::Period { .. }))
        ));
        assert!(matches!(
            i.period_at("noww:now-2s", ctx),
            Err(LaminaError::Interval(IntervalError::Parse { .. }))
        ));
        assert!(matches!(
            i.period_at("-1h:now", ctx),
            Err(LaminaError::Interval(IntervalError::Parse { .. }))
        ));
    }

    #[test]
    fn test_period_extent_terms() {
        let i = Interval::SECONDS;
        let ctx = PeriodContext::with_extent(1_000, 100, 900);
        assert_eq!(i.period_at("start:end", ctx).unwrap(), Period { start: 100, end: 900 });
        assert_eq!(i.period_at("end-1m:end", ctx).unwrap(), Period { start: 840, end: 900 });

        // Without an extent the symbolic terms are rejected
        assert!(matches!(
            i.period_at("start:now", PeriodContext::at(1_000)),
            Err(LaminaError::Interval(IntervalError::Period { .. }))
        ));
    }

    #[test]
    fn test_retentions() {
        let r = Interval::SECONDS.retentions("10s:1m,1m:1d").unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!((r[0].interval, r[0].period), (10, 60));
        assert_eq!((r[1].interval, r[1].period), (60, 86_400));
        assert_eq!(r[0].retention, "10s:1m");

        let r = Interval::SECONDS
            .retentions("5s:10m, 1m:2h, 15m:1d, 1h:1w, 6h:1mon, 1d:1y")
            .unwrap();
        assert_eq!(r.len(), 6);
        assert_eq!(r[5].retention, "1d:1y");

        assert!(matches!(
            Interval::SECONDS.retentions("10s:1h, 1m1d"),
            Err(LaminaError::Interval(IntervalError::Retention { .. }))
        ));
        assert!(matches!(
            Interval::SECONDS.retentions("10s:1h,"),
            Err(LaminaError::Interval(IntervalError::Retention { .. }))
        ));
        assert!(matches!(
            Interval::SECONDS.retentions("10s:1q"),
            Err(LaminaError::Interval(IntervalError::Parse { .. }))
        ));
    }

    #[test]
    fn test_interval_of_fixed_count() {
        assert_eq!(Interval::get_interval_of_fixed_count(0, 3_600, 60), 60);
        assert_eq!(Interval::get_interval_of_fixed_count(3_600, 0, 60), 60);
        assert_eq!(Interval::get_interval_of_fixed_count(0, 10, 100), 1);
        assert_eq!(Interval::get_interval_of_fixed_count(0, 10, 0), 10);
    }
}
