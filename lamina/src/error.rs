//! Error types for the lamina time-series storage engine.

use thiserror::Error;

/// The main error type for all lamina operations.
///
/// Every variant is a validation failure raised at the entry of the operation
/// that detected it. None of them are transient: retrying the same call with
/// the same arguments fails the same way.
#[derive(Error, Debug)]
pub enum LaminaError {
    /// Error constructing, writing or reading a layer.
    #[error("layer error: {0}")]
    Layer(#[from] LayerError),

    /// Error in time arithmetic or in parsing an interval, period or retention string.
    #[error("interval error: {0}")]
    Interval(#[from] IntervalError),

    /// Error selecting a storage codec.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Error during metric lifecycle or lookup.
    #[error("collector error: {0}")]
    Collector(#[from] CollectorError),

    /// Unknown aggregate or write-modify function name.
    #[error("function error: {0}")]
    Function(#[from] FunctionError),
}

/// Errors raised by a single [`Layer`](crate::layer::Layer).
#[derive(Error, Debug, PartialEq)]
pub enum LayerError {
    /// The interval is not strictly smaller than the period.
    #[error("incorrect size of layer: interval {interval} must be less than period {period}")]
    Size {
        /// Requested cell width in MTU.
        interval: i64,
        /// Requested total span in MTU.
        period: i64,
    },

    /// Interval or period is not a positive integer.
    #[error("incorrect layer dimensions: interval {interval} and period {period} must be greater than zero")]
    InitialData {
        /// Requested cell width in MTU.
        interval: i64,
        /// Requested total span in MTU.
        period: i64,
    },

    /// The value cannot be stored.
    #[error("invalid value {value}: {reason}")]
    Value {
        /// The rejected value.
        value: f64,
        /// Why it was rejected.
        reason: String,
    },

    /// The time cannot be stored by the layer's time codec.
    #[error("invalid time {time}: {reason}")]
    Time {
        /// The rejected time in MTU.
        time: i64,
        /// Why it was rejected.
        reason: String,
    },

    /// The read precision is not a positive integer.
    #[error("incorrect precision {precision}: must be greater than zero")]
    Precision {
        /// The rejected precision in MTU.
        precision: i64,
    },

    /// The requested section starts after it ends.
    #[error("incorrect section: start {start} is greater than end {end}")]
    Section {
        /// Section start in MTU.
        start: i64,
        /// Section end in MTU.
        end: i64,
    },
}

/// Errors raised by [`Interval`](crate::interval::Interval) arithmetic and parsing.
#[derive(Error, Debug, PartialEq)]
pub enum IntervalError {
    /// Precision is not a positive integer.
    #[error("incorrect precision {precision}: must be greater than zero")]
    Precision {
        /// The rejected precision.
        precision: i64,
    },

    /// The section starts after it ends.
    #[error("incorrect section: start {start} is greater than end {end}")]
    Section {
        /// Section start.
        start: i64,
        /// Section end.
        end: i64,
    },

    /// The range expands to more timestamps than a single read may produce.
    #[error("range {start}..{end} at precision {precision} has too many points")]
    TooManyPoints {
        /// Range start.
        start: i64,
        /// Range end.
        end: i64,
        /// Step between points.
        precision: i64,
    },

    /// Malformed period string.
    #[error("incorrect period string '{period}', use e.g. `now-1d:now-1h`")]
    Period {
        /// The rejected period string.
        period: String,
    },

    /// Malformed interval string or unknown unit.
    #[error("incorrect interval string '{interval}', use e.g. `10s` `1m` `1h`")]
    Parse {
        /// The rejected interval string.
        interval: String,
    },

    /// Malformed retention clause.
    #[error("incorrect retention string '{retention}', use e.g. `10s:1m` `1m:15h` `1h:1y`")]
    Retention {
        /// The rejected retention clause.
        retention: String,
    },
}

/// Errors raised when selecting a layer storage codec.
#[derive(Error, Debug, PartialEq)]
pub enum StorageError {
    /// The storage tag does not name a supported codec.
    #[error("unknown storage type '{name}'")]
    UnknownType {
        /// The rejected tag.
        name: String,
    },
}

/// Errors raised by the [`Collector`](crate::collector::Collector).
#[derive(Error, Debug, PartialEq)]
pub enum CollectorError {
    /// The metric name contains characters outside `[a-zA-Z0-9._]`.
    #[error("incorrect metric name '{name}': use latin letters, digits and dots")]
    MetricName {
        /// The rejected name.
        name: String,
    },

    /// No metric with this name has been initialised.
    #[error("metric '{name}' not found, init the metric first")]
    NotFound {
        /// The missing name.
        name: String,
    },

    /// A metric with this name already exists.
    #[error("metric '{name}' already exists")]
    Duplicate {
        /// The conflicting name.
        name: String,
    },

    /// The retention string produced no layers.
    #[error("metric '{name}' needs at least one retention clause")]
    NoRetentions {
        /// The metric being initialised.
        name: String,
    },
}

/// Errors raised when parsing function names.
#[derive(Error, Debug, PartialEq)]
pub enum FunctionError {
    /// Unknown aggregate function.
    #[error("unknown aggregation type '{func}'")]
    AggregateType {
        /// The rejected name.
        func: String,
    },

    /// Unknown write-modify function.
    #[error("unknown modify type '{func}'")]
    ModifyType {
        /// The rejected name.
        func: String,
    },
}

/// Type alias for `Result<T, LaminaError>`.
pub type Result<T> = std::result::Result<T, LaminaError>;
