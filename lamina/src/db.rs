//! Database facade over a [`Collector`].
//!
//! [`Database`] adds the conveniences an application wants on top of the raw
//! collector: metrics are created with configured defaults on first write,
//! reads take period strings such as `now-1h:now`, precision may be given as
//! an interval string or as a point count, and reads of unknown metrics
//! return a synthetic null result instead of failing.

use tracing::debug;

use crate::aggregate::{AggregateFn, ModifyFn};
use crate::collector::Collector;
use crate::error::Result;
use crate::interval::{Interval, PeriodContext};
use crate::query::ReadResult;
use crate::schema::{DatabaseConfig, MetricConfig};

/// How finely a read is resampled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precision {
    /// A fixed step such as `15s`, in the metric's units.
    Interval(String),
    /// Roughly this many points over the requested range.
    Count(u64),
}

impl Precision {
    /// Resolves to a step in MTU for the range `start..end`.
    ///
    /// # Errors
    ///
    /// Returns a parse error for a malformed interval string.
    pub fn resolve(&self, clock: Interval, start: i64, end: i64) -> Result<i64> {
        match self {
            Self::Interval(interval) => clock.parse_interval(interval),
            Self::Count(count) => Ok(Interval::get_interval_of_fixed_count(start, end, *count)),
        }
    }
}

/// A single in-memory database of metrics.
///
/// # Examples
///
/// ```rust
/// use lamina::aggregate::{AggregateFn, ModifyFn};
/// use lamina::db::{Database, Precision};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut db = Database::new();
///
/// // Unknown metrics are created with the default retentions
/// db.write("room.temperature", 21.5, None, ModifyFn::Last)?;
/// assert!(db.has("room.temperature"));
///
/// let result = db.read("room.temperature", "now-1m:now", &Precision::Interval("5s".into()), AggregateFn::Avg)?;
/// assert!(result.relevant);
///
/// let missing = db.read("room.humidity", "now-1m:now", &Precision::Count(6), AggregateFn::Avg)?;
/// assert!(!missing.relevant);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct Database {
    config: DatabaseConfig,
    collector: Collector,
}

impl Database {
    /// Creates a database with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a database whose implicit metrics use `config`.
    ///
    /// # Errors
    ///
    /// Returns the validation error of `config`.
    pub fn with_config(config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            collector: Collector::new(),
        })
    }

    /// Defaults for implicitly created metrics.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// The underlying collector.
    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Mutable access to the underlying collector.
    pub fn collector_mut(&mut self) -> &mut Collector {
        &mut self.collector
    }

    /// Creates a metric explicitly.
    ///
    /// # Errors
    ///
    /// Returns the validation error of `config`, or
    /// [`CollectorError::Duplicate`](crate::error::CollectorError::Duplicate)
    /// if the metric exists.
    pub fn metric(&mut self, config: &MetricConfig) -> Result<()> {
        let now = config.time_unit.interval().now();
        self.metric_with_time(config, now)
    }

    /// Creates a metric with layer windows ending at `now`.
    ///
    /// # Errors
    ///
    /// See [`Database::metric`].
    pub fn metric_with_time(&mut self, config: &MetricConfig, now: i64) -> Result<()> {
        config.validate()?;
        self.collector
            .init_with_time(&config.name, &config.retentions, config.layer_options(), now)
    }

    /// Writes a sample, creating the metric with the configured defaults if
    /// needed. `time` defaults to now.
    ///
    /// # Errors
    ///
    /// Returns a name error for an invalid new metric name, or any layer
    /// write error.
    pub fn write(&mut self, name: &str, value: f64, time: Option<i64>, func: ModifyFn) -> Result<()> {
        if !self.collector.has(name) {
            debug!(metric = name, "creating metric on first write");
            let config = self.config.metric(name);
            self.metric(&config)?;
        }
        self.collector.write(name, value, time, func)
    }

    /// Reads a period such as `now-1h:now` or `start:end`.
    ///
    /// # Errors
    ///
    /// See [`Database::read_at`].
    pub fn read(&self, name: &str, period: &str, precision: &Precision, func: AggregateFn) -> Result<ReadResult> {
        let now = self.clock(name).now();
        self.read_at(name, period, precision, func, now)
    }

    /// Reads a period with `now` fixed. `start` and `end` in the period
    /// resolve to the metric's extent; for an unknown metric they resolve to
    /// `now` and the result is a null placeholder.
    ///
    /// # Errors
    ///
    /// Returns period or precision parse errors and the errors of
    /// [`Collector::read`].
    pub fn read_at(
        &self,
        name: &str,
        period: &str,
        precision: &Precision,
        func: AggregateFn,
        now: i64,
    ) -> Result<ReadResult> {
        let clock = self.clock(name);
        let context = if self.collector.has(name) {
            PeriodContext::with_extent(now, self.collector.start(name)?, self.collector.end(name)?)
        } else {
            PeriodContext::with_extent(now, now, now)
        };
        let range = clock.period_at(period, context)?;
        self.read_custom_range(name, range.start, range.end, precision, func)
    }

    /// Reads an explicit `start..=end` range.
    ///
    /// # Errors
    ///
    /// Returns precision parse errors and the errors of [`Collector::read`].
    pub fn read_custom_range(
        &self,
        name: &str,
        start: i64,
        end: i64,
        precision: &Precision,
        func: AggregateFn,
    ) -> Result<ReadResult> {
        let step = precision.resolve(self.clock(name), start, end)?;
        if !self.collector.has(name) {
            return Collector::read_fake(start, end, step);
        }
        self.collector.read(name, start, end, step, func)
    }

    /// Reads the whole known extent of `name`.
    ///
    /// An unknown metric, or one without a usable extent, yields a single
    /// null row.
    ///
    /// # Errors
    ///
    /// See [`Database::read_custom_range`].
    pub fn read_all(&self, name: &str, precision: &Precision, func: AggregateFn) -> Result<ReadResult> {
        if !self.collector.has(name) {
            let now = self.clock(name).now();
            return Collector::read_fake(now, now, 1);
        }
        let start = self.collector.start(name)?;
        let end = self.collector.end(name)?;
        if start == 0 || start > end {
            return Collector::read_fake(start, start, 1);
        }
        self.read_custom_range(name, start, end, precision, func)
    }

    /// Whether `name` exists.
    pub fn has(&self, name: &str) -> bool {
        self.collector.has(name)
    }

    /// Drops `name`. Returns whether it existed.
    pub fn destroy(&mut self, name: &str) -> bool {
        self.collector.destroy(name)
    }

    /// Buffer bytes of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::NotFound`](crate::error::CollectorError::NotFound)
    /// for an unknown metric.
    pub fn size(&self, name: &str) -> Result<usize> {
        self.collector.size(name)
    }

    /// Estimated start of `name`'s data.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::NotFound`](crate::error::CollectorError::NotFound)
    /// for an unknown metric.
    pub fn start(&self, name: &str) -> Result<i64> {
        self.collector.start(name)
    }

    /// Estimated end of `name`'s data.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::NotFound`](crate::error::CollectorError::NotFound)
    /// for an unknown metric.
    pub fn end(&self, name: &str) -> Result<i64> {
        self.collector.end(name)
    }

    /// The metric's MTU class, or the configured default for unknown names.
    fn clock(&self, name: &str) -> Interval {
        self.collector
            .interval(name)
            .unwrap_or_else(|_| self.config.time_unit.interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CollectorError, IntervalError, LaminaError};

    fn small_db() -> Database {
        let config = DatabaseConfig {
            retentions: "1s:10s, 2s:20s".to_string(),
            ..DatabaseConfig::default()
        };
        let mut db = Database::with_config(config).unwrap();
        for t in 1_001..=1_009 {
            db.write("m", (t - 1_000) as f64, Some(t), ModifyFn::Last).unwrap();
        }
        db
    }

    fn secs(s: &str) -> Precision {
        Precision::Interval(s.to_string())
    }

    #[test]
    fn test_write_creates_metric() {
        let db = small_db();
        assert!(db.has("m"));
        assert_eq!(db.collector().write_count("m").unwrap(), 9);
        assert_eq!(db.collector().layers("m").unwrap().len(), 2);
        assert_eq!(db.size("m").unwrap(), 240);
    }

    #[test]
    fn test_write_rejects_bad_name() {
        let mut db = Database::new();
        assert!(matches!(
            db.write("bad name", 1.0, Some(10), ModifyFn::Last),
            Err(LaminaError::Collector(CollectorError::MetricName { .. }))
        ));
    }

    #[test]
    fn test_explicit_metric() {
        let mut db = Database::new();
        let config = MetricConfig::new("disk.used", "1m:1h").unwrap();
        db.metric_with_time(&config, 36_000).unwrap();
        assert_eq!(db.start("disk.used").unwrap(), 36_000 - 59 * 60);
        assert!(matches!(
            db.metric(&config),
            Err(LaminaError::Collector(CollectorError::Duplicate { .. }))
        ));
    }

    #[test]
    fn test_read_relative_period() {
        let db = small_db();
        let result = db
            .read_at("m", "now-5s:now", &secs("1s"), AggregateFn::Last, 1_009)
            .unwrap();
        assert_eq!((result.start, result.end), (1_004, 1_009));
        let values: Vec<_> = result.values().collect();
        assert_eq!(values, (4..=9).map(|v| Some(f64::from(v))).collect::<Vec<_>>());
    }

    #[test]
    fn test_read_extent_period() {
        let db = small_db();
        assert_eq!((db.start("m").unwrap(), db.end("m").unwrap()), (990, 1_008));

        let result = db
            .read_at("m", "start:end", &secs("1s"), AggregateFn::Last, 0)
            .unwrap();
        // 990..=1000 from the coarse layer, 1000..=1008 from the fine one
        assert_eq!(result.len(), 11 + 9);
        assert_eq!(result.rows[10].value, Some(1.0));
        assert_eq!(result.rows.last().unwrap().value, Some(8.0));
    }

    #[test]
    fn test_read_point_count() {
        let db = small_db();
        let result = db
            .read_custom_range("m", 1_000, 1_008, &Precision::Count(4), AggregateFn::Avg)
            .unwrap();
        let values: Vec<_> = result.values().collect();
        assert_eq!(values, vec![Some(1.0), Some(2.5), Some(4.5), Some(6.5), Some(8.5)]);
    }

    #[test]
    fn test_read_unknown_metric() {
        let db = small_db();
        let result = db
            .read_at("ghost", "now-10s:now", &secs("5s"), AggregateFn::Last, 1_000)
            .unwrap();
        assert!(!result.relevant);
        assert_eq!(result.rows.iter().map(|r| r.time).collect::<Vec<_>>(), vec![990, 995, 1_000]);
        assert!(result.values().all(|v| v.is_none()));

        let all = db.read_all("ghost", &secs("1s"), AggregateFn::Last).unwrap();
        assert!(!all.relevant);
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_read_all() {
        let db = small_db();
        let result = db.read_all("m", &secs("2s"), AggregateFn::Max).unwrap();
        assert!(result.relevant);
        assert_eq!((result.start, result.end), (990, 1_008));
        assert_eq!(result.rows.last().unwrap().value, Some(9.0));
    }

    #[test]
    fn test_read_errors() {
        let db = small_db();
        assert!(matches!(
            db.read_at("m", "now-5s:now", &secs("5q"), AggregateFn::Last, 1_009),
            Err(LaminaError::Interval(IntervalError::Parse { .. }))
        ));
        assert!(matches!(
            db.read_at("m", "now-5s", &secs("1s"), AggregateFn::Last, 1_009),
            Err(LaminaError::Interval(IntervalError::Period { .. }))
        ));
    }

    #[test]
    fn test_destroy() {
        let mut db = small_db();
        assert!(db.destroy("m"));
        assert!(!db.has("m"));
        assert!(db.size("m").is_err());
    }
}
