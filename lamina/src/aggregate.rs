//! Aggregate and write-modify functions.
//!
//! [`AggregateFn`] collapses a run of rows into one value when a read is
//! coarser than the layer it comes from. [`ModifyFn`] merges a new sample
//! into a slot that already holds a valid value.
//!
//! Both parse from and display as their lowercase names (`last`, `first`,
//! `max`, `min`, `sum`, `avg`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FunctionError, LaminaError};

const NAMES: [&str; 6] = ["last", "first", "max", "min", "sum", "avg"];

/// Collapses a list of optional values into one. Nulls are skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    /// Rightmost non-null value.
    #[default]
    Last,
    /// Leftmost non-null value.
    First,
    /// Largest non-null value.
    Max,
    /// Smallest non-null value.
    Min,
    /// Sum of non-null values.
    Sum,
    /// Arithmetic mean of non-null values.
    Avg,
}

impl AggregateFn {
    /// Applies the function. Returns `None` when there is no non-null value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lamina::aggregate::AggregateFn;
    ///
    /// let values = [Some(1.0), None, Some(4.0), Some(1.0)];
    /// assert_eq!(AggregateFn::Avg.apply(values), Some(2.0));
    /// assert_eq!(AggregateFn::Last.apply(values), Some(1.0));
    /// assert_eq!(AggregateFn::Sum.apply([None::<f64>, None]), None);
    /// ```
    #[allow(clippy::cast_precision_loss)] // row counts are far below 2^52
    pub fn apply<I>(self, values: I) -> Option<f64>
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let mut present = values.into_iter().flatten();
        let first = present.next()?;

        let value = match self {
            Self::Last => present.last().unwrap_or(first),
            Self::First => first,
            Self::Max => present.fold(first, |acc, v| if v > acc { v } else { acc }),
            Self::Min => present.fold(first, |acc, v| if v < acc { v } else { acc }),
            Self::Sum => present.fold(first, |acc, v| acc + v),
            Self::Avg => {
                let (sum, count) = present.fold((first, 1usize), |(sum, count), v| (sum + v, count + 1));
                sum / count as f64
            }
        };
        Some(value)
    }

    /// The lowercase function name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Last => NAMES[0],
            Self::First => NAMES[1],
            Self::Max => NAMES[2],
            Self::Min => NAMES[3],
            Self::Sum => NAMES[4],
            Self::Avg => NAMES[5],
        }
    }
}

impl fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggregateFn {
    type Err = LaminaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last" => Ok(Self::Last),
            "first" => Ok(Self::First),
            "max" => Ok(Self::Max),
            "min" => Ok(Self::Min),
            "sum" => Ok(Self::Sum),
            "avg" => Ok(Self::Avg),
            _ => Err(FunctionError::AggregateType { func: s.to_string() }.into()),
        }
    }
}

/// Merges the value already stored in a slot (`old`) with an incoming one
/// (`new`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifyFn {
    /// Keep the incoming value.
    #[default]
    Last,
    /// Keep the stored value.
    First,
    /// Keep the larger value.
    Max,
    /// Keep the smaller value.
    Min,
    /// Add the incoming value to the stored one.
    Sum,
    /// `old + new / 2`.
    ///
    /// This is a one-step blend, not a running mean: repeated writes are
    /// order-sensitive and weighted toward the stored value.
    Avg,
}

impl ModifyFn {
    /// Combines `old` and `new`.
    pub fn apply(self, old: f64, new: f64) -> f64 {
        match self {
            Self::Last => new,
            Self::First => old,
            Self::Max => {
                if new > old {
                    new
                } else {
                    old
                }
            }
            Self::Min => {
                if new < old {
                    new
                } else {
                    old
                }
            }
            Self::Sum => old + new,
            Self::Avg => old + new / 2.0,
        }
    }

    /// The lowercase function name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Last => NAMES[0],
            Self::First => NAMES[1],
            Self::Max => NAMES[2],
            Self::Min => NAMES[3],
            Self::Sum => NAMES[4],
            Self::Avg => NAMES[5],
        }
    }
}

impl fmt::Display for ModifyFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModifyFn {
    type Err = LaminaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last" => Ok(Self::Last),
            "first" => Ok(Self::First),
            "max" => Ok(Self::Max),
            "min" => Ok(Self::Min),
            "sum" => Ok(Self::Sum),
            "avg" => Ok(Self::Avg),
            _ => Err(FunctionError::ModifyType { func: s.to_string() }.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROWS: [Option<f64>; 5] = [None, Some(3.0), Some(-1.0), None, Some(4.0)];

    #[test]
    fn test_aggregate_functions() {
        assert_eq!(AggregateFn::Last.apply(ROWS), Some(4.0));
        assert_eq!(AggregateFn::First.apply(ROWS), Some(3.0));
        assert_eq!(AggregateFn::Max.apply(ROWS), Some(4.0));
        assert_eq!(AggregateFn::Min.apply(ROWS), Some(-1.0));
        assert_eq!(AggregateFn::Sum.apply(ROWS), Some(6.0));
        assert_eq!(AggregateFn::Avg.apply(ROWS), Some(2.0));
    }

    #[test]
    fn test_aggregate_single_and_empty() {
        assert_eq!(AggregateFn::Last.apply([Some(7.5)]), Some(7.5));
        assert_eq!(AggregateFn::Sum.apply(Vec::<Option<f64>>::new()), None);
        assert_eq!(AggregateFn::Avg.apply([None::<f64>, None, None]), None);
        assert_eq!(AggregateFn::Max.apply([None::<f64>]), None);
    }

    #[test]
    fn test_modify_functions() {
        assert_eq!(ModifyFn::Last.apply(2.0, 5.0), 5.0);
        assert_eq!(ModifyFn::First.apply(2.0, 5.0), 2.0);
        assert_eq!(ModifyFn::Max.apply(2.0, 5.0), 5.0);
        assert_eq!(ModifyFn::Min.apply(2.0, 5.0), 2.0);
        assert_eq!(ModifyFn::Sum.apply(2.0, 5.0), 7.0);
        assert_eq!(ModifyFn::Avg.apply(2.0, 5.0), 4.5);
        // Order matters
        assert_eq!(ModifyFn::Avg.apply(5.0, 2.0), 6.0);
    }

    #[test]
    fn test_parse_names() {
        for name in NAMES {
            assert_eq!(name.parse::<AggregateFn>().unwrap().to_string(), name);
            assert_eq!(name.parse::<ModifyFn>().unwrap().to_string(), name);
        }

        match "median".parse::<AggregateFn>().unwrap_err() {
            LaminaError::Function(FunctionError::AggregateType { func }) => assert_eq!(func, "median"),
            other => panic!("unexpected error: {other:?}"),
        }
        match "avgg".parse::<ModifyFn>().unwrap_err() {
            LaminaError::Function(FunctionError::ModifyType { func }) => assert_eq!(func, "avgg"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&AggregateFn::Avg).unwrap(), "\"avg\"");
        let f: ModifyFn = serde_json::from_str("\"max\"").unwrap();
        assert_eq!(f, ModifyFn::Max);
    }
}
