//! Configuration types for lamina metrics and databases.
//!
//! A [`MetricConfig`] describes one metric: its name, retention string and
//! codecs. A [`DatabaseConfig`] carries the defaults used when a
//! [`Database`](crate::db::Database) creates a metric on first write.
//!
//! Both deserialize from JSON:
//!
//! ```json
//! {
//!   "retentions": "10s:1h, 1m:1d",
//!   "value_storage": "double",
//!   "time_unit": "millisecond"
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::collector::is_valid_name;
use crate::error::{CollectorError, Result};
use crate::interval::{Retention, TimeUnit};
use crate::layer::{Layer, LayerOptions};
use crate::storage::StorageType;

/// Retentions applied to metrics created without explicit configuration.
pub const DEFAULT_RETENTIONS: &str = "5s:10m, 1m:2h, 15m:1d, 1h:1w, 6h:1mon, 1d:1y";

/// Configuration for a single metric.
///
/// # Examples
///
/// ```rust
/// use lamina::interval::TimeUnit;
/// use lamina::schema::MetricConfig;
/// use lamina::storage::StorageType;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = MetricConfig::new("net.eth0.rx", "1s:10m, 1m:1d")?
///     .with_value_storage(StorageType::Uint32)
///     .with_time_unit(TimeUnit::Millisecond);
/// assert_eq!(config.parse_retentions()?.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricConfig {
    /// Metric name, `[a-zA-Z0-9._]+`.
    pub name: String,

    /// Comma-separated `interval:period` clauses, one layer each.
    pub retentions: String,

    /// Value codec; float when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_storage: Option<StorageType>,

    /// Time codec; uint64 when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_storage: Option<StorageType>,

    /// MTU class for the metric's times.
    #[serde(default)]
    pub time_unit: TimeUnit,
}

impl MetricConfig {
    /// Creates a validated configuration with default codecs, in seconds.
    ///
    /// # Errors
    ///
    /// See [`MetricConfig::validate`].
    pub fn new(name: impl Into<String>, retentions: impl Into<String>) -> Result<Self> {
        let config = Self {
            name: name.into(),
            retentions: retentions.into(),
            value_storage: None,
            time_storage: None,
            time_unit: TimeUnit::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the value codec.
    #[must_use]
    pub fn with_value_storage(mut self, kind: StorageType) -> Self {
        self.value_storage = Some(kind);
        self
    }

    /// Sets the time codec.
    #[must_use]
    pub fn with_time_storage(mut self, kind: StorageType) -> Self {
        self.time_storage = Some(kind);
        self
    }

    /// Sets the MTU class. Retentions are re-read in the new unit.
    #[must_use]
    pub fn with_time_unit(mut self, unit: TimeUnit) -> Self {
        self.time_unit = unit;
        self
    }

    /// Validates the name, the retention syntax and each layer's shape.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::MetricName`] or
    /// [`CollectorError::NoRetentions`], or the interval or layer error for
    /// the first bad clause.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_name(&self.name) {
            return Err(CollectorError::MetricName {
                name: self.name.clone(),
            }
            .into());
        }
        self.parse_retentions()?;
        Ok(())
    }

    /// Parses the retention string in this metric's time unit and checks
    /// each layer's shape.
    ///
    /// # Errors
    ///
    /// See [`MetricConfig::validate`].
    pub fn parse_retentions(&self) -> Result<Vec<Retention>> {
        checked_retentions(&self.name, &self.retentions, self.time_unit)
    }

    /// Layer options matching this configuration.
    pub fn layer_options(&self) -> LayerOptions {
        LayerOptions {
            value_storage: self.value_storage,
            time_storage: self.time_storage,
            clock: self.time_unit.interval(),
        }
    }
}

/// Defaults for metrics a database creates on first write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Retention string for new metrics.
    pub retentions: String,

    /// Value codec for new metrics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_storage: Option<StorageType>,

    /// Time codec for new metrics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_storage: Option<StorageType>,

    /// MTU class for new metrics.
    pub time_unit: TimeUnit,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            retentions: DEFAULT_RETENTIONS.to_string(),
            value_storage: None,
            time_storage: None,
            time_unit: TimeUnit::Second,
        }
    }
}

impl DatabaseConfig {
    /// Validates the default retention string.
    ///
    /// # Errors
    ///
    /// Returns the interval or layer error for the first bad clause.
    pub fn validate(&self) -> Result<()> {
        checked_retentions("default", &self.retentions, self.time_unit)?;
        Ok(())
    }

    /// The configuration a metric named `name` gets when created implicitly.
    pub fn metric(&self, name: &str) -> MetricConfig {
        MetricConfig {
            name: name.to_string(),
            retentions: self.retentions.clone(),
            value_storage: self.value_storage,
            time_storage: self.time_storage,
            time_unit: self.time_unit,
        }
    }
}

fn checked_retentions(name: &str, retentions: &str, unit: TimeUnit) -> Result<Vec<Retention>> {
    if retentions.trim().is_empty() {
        return Err(CollectorError::NoRetentions { name: name.to_string() }.into());
    }
    let parsed = unit.interval().retentions(retentions)?;
    for retention in &parsed {
        Layer::check_dimensions(retention.interval, retention.period)?;
    }
    Ok(parsed)
}
