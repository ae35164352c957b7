//! Per-metric set of retention layers.
//!
//! The [`Collector`] owns every metric by name. Each metric is a list of
//! [`Layer`]s, one per retention clause, ordered by period with the longest
//! first. Writes fan out to every layer; reads are stitched together from
//! the best layer for each part of the range (see [`crate::query`]).
//!
//! # Example Usage
//!
//! ```rust
//! use lamina::aggregate::{AggregateFn, ModifyFn};
//! use lamina::collector::Collector;
//! use lamina::layer::LayerOptions;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut collector = Collector::new();
//! collector.init_with_time("cpu.load", "1s:10s, 2s:20s", LayerOptions::default(), 5_000)?;
//!
//! for t in 1_001..=1_009 {
//!     collector.write("cpu.load", (t - 1_000) as f64, Some(t), ModifyFn::Last)?;
//! }
//!
//! let result = collector.read("cpu.load", 1_001, 1_009, 1, AggregateFn::Last)?;
//! assert_eq!(result.rows.len(), 9);
//! assert_eq!(result.rows[8].value, Some(9.0));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::aggregate::{AggregateFn, ModifyFn};
use crate::error::{CollectorError, IntervalError, Result};
use crate::interval::Interval;
use crate::layer::{Layer, LayerOptions};
use crate::query::{self, LayerWindow, ReadResult, Row};
use crate::storage::StorageType;

static METRIC_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._]+$").expect("metric name pattern is a valid regex"));

/// Returns whether `name` is a valid metric name (`[a-zA-Z0-9._]+`).
pub fn is_valid_name(name: &str) -> bool {
    METRIC_NAME.is_match(name)
}

/// A snapshot of one layer's settings and window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerInfo {
    /// Cell width in MTU.
    pub interval: i64,
    /// Configured span in MTU.
    pub period: i64,
    /// Number of slots.
    pub cells: usize,
    /// The retention clause this layer was built from.
    pub retention: String,
    /// First valid time.
    pub start_time: i64,
    /// Last valid time.
    pub end_time: i64,
    /// Value codec.
    pub value_storage: StorageType,
    /// Time codec.
    pub time_storage: StorageType,
    /// Buffer bytes.
    pub size: usize,
}

/// Bookkeeping for one metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricInfo {
    /// Earliest time ever written, if any.
    pub first_time: Option<i64>,
    /// Number of successful writes.
    pub write_count: u64,
    /// Total buffer bytes across layers.
    pub size: usize,
    /// Layers, longest period first.
    pub layers: Vec<LayerInfo>,
}

#[derive(Debug)]
struct RetentionLayer {
    layer: Layer,
    retention: String,
}

#[derive(Debug)]
struct Metric {
    clock: Interval,
    layers: Vec<RetentionLayer>,
    first_time: Option<i64>,
    write_count: u64,
    size: usize,
}

impl Metric {
    fn windows(&self) -> Vec<LayerWindow> {
        self.layers.iter().map(|l| l.layer.window()).collect()
    }

    fn coarsest(&self) -> &Layer {
        // Never empty: init rejects metrics without layers
        &self.layers[0].layer
    }
}

/// Registry of metrics and their retention layers.
///
/// Single-threaded; wrap in a lock for shared use.
#[derive(Debug, Default)]
pub struct Collector {
    metrics: HashMap<String, Metric>,
}

impl Collector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialises `name` with one layer per clause of `retentions`, windows
    /// ending at the current time of `options.clock`.
    ///
    /// # Errors
    ///
    /// See [`Collector::init_with_time`].
    pub fn init(&mut self, name: &str, retentions: &str, options: LayerOptions) -> Result<()> {
        self.init_with_time(name, retentions, options, options.clock.now())
    }

    /// Initialises `name` with layer windows ending at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::MetricName`] for names outside
    /// `[a-zA-Z0-9._]+`, [`CollectorError::Duplicate`] if the metric exists,
    /// [`CollectorError::NoRetentions`] for an empty retention string, and
    /// any retention parse or layer construction error.
    pub fn init_with_time(&mut self, name: &str, retentions: &str, options: LayerOptions, now: i64) -> Result<()> {
        if !is_valid_name(name) {
            return Err(CollectorError::MetricName { name: name.to_string() }.into());
        }
        if self.metrics.contains_key(name) {
            return Err(CollectorError::Duplicate { name: name.to_string() }.into());
        }
        if retentions.trim().is_empty() {
            return Err(CollectorError::NoRetentions { name: name.to_string() }.into());
        }

        let mut layers = options
            .clock
            .retentions(retentions)?
            .into_iter()
            .map(|r| {
                Ok(RetentionLayer {
                    layer: Layer::with_time(r.interval, r.period, options, now)?,
                    retention: r.retention,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        layers.sort_by(|a, b| b.layer.period().cmp(&a.layer.period()));

        let size = layers.iter().map(|l| l.layer.size()).sum();
        debug!(metric = name, layers = layers.len(), size, "initialised metric");

        self.metrics.insert(
            name.to_string(),
            Metric {
                clock: options.clock,
                layers,
                first_time: None,
                write_count: 0,
                size,
            },
        );
        Ok(())
    }

    /// Whether `name` has been initialised.
    pub fn has(&self, name: &str) -> bool {
        self.metrics.contains_key(name)
    }

    /// Like [`Collector::has`], but a missing metric is an error.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::NotFound`] if the metric does not exist.
    pub fn require(&self, name: &str) -> Result<()> {
        self.metric(name).map(|_| ())
    }

    /// Drops the metric and its layers. Returns whether it existed.
    pub fn destroy(&mut self, name: &str) -> bool {
        let removed = self.metrics.remove(name).is_some();
        if removed {
            debug!(metric = name, "destroyed metric");
        }
        removed
    }

    /// Names of all metrics, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.metrics.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Writes `value` to every layer of `name`. `time` defaults to now.
    ///
    /// Every layer validates the write before any of them changes, so a
    /// rejected write leaves all layers as they were.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::NotFound`] for an unknown metric and the
    /// first layer write error.
    pub fn write(&mut self, name: &str, value: f64, time: Option<i64>, func: ModifyFn) -> Result<()> {
        let metric = self.metric_mut(name)?;
        let time = time.unwrap_or_else(|| metric.clock.now());

        let pending = metric
            .layers
            .iter()
            .map(|entry| entry.layer.prepare_write(time, value, func))
            .collect::<Result<Vec<_>>>()?;
        for (entry, write) in metric.layers.iter_mut().zip(pending) {
            entry.layer.commit_write(write);
        }

        metric.first_time = Some(metric.first_time.map_or(time, |first| first.min(time)));
        metric.write_count += 1;
        Ok(())
    }

    /// Reads `start..=end` at `precision`, stitching rows from the best layer
    /// for each part of the range. Parts no layer covers come back as null
    /// rows.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::NotFound`] for an unknown metric, and
    /// precision or section errors for a malformed range.
    pub fn read(&self, name: &str, start: i64, end: i64, precision: i64, func: AggregateFn) -> Result<ReadResult> {
        let metric = self.metric(name)?;

        let start = Interval::round_time(start, precision)?;
        let end = Interval::round_time(end, precision)?;
        if start > end {
            return Err(IntervalError::Section { start, end }.into());
        }

        let mut result = ReadResult::new(start, end);
        for segment in query::plan_segments(&metric.windows(), start, end) {
            trace!(metric = name, start = segment.start, end = segment.end, layer = ?segment.layer, "read segment");
            match segment.layer {
                None => {
                    let times = Interval::get_intervals(segment.start, segment.end, precision)?;
                    result.rows.extend(times.into_iter().map(Row::null));
                }
                Some(index) => {
                    let layer = &metric.layers[index].layer;
                    let part = layer.read_custom_interval(segment.start, segment.end, Some(precision), func)?;
                    result.rows.extend(part.rows);
                }
            }
        }
        Ok(result)
    }

    /// A null result for a metric that does not exist.
    ///
    /// # Errors
    ///
    /// Fails if `start > end` or `precision` is not positive.
    pub fn read_fake(start: i64, end: i64, precision: i64) -> Result<ReadResult> {
        ReadResult::fake(start, end, precision)
    }

    /// Invalidates every layer of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::NotFound`] for an unknown metric.
    pub fn clear(&mut self, name: &str) -> Result<()> {
        let metric = self.metric_mut(name)?;
        for entry in &mut metric.layers {
            entry.layer.clear();
        }
        debug!(metric = name, "cleared metric");
        Ok(())
    }

    /// Total buffer bytes of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::NotFound`] for an unknown metric.
    pub fn size(&self, name: &str) -> Result<usize> {
        Ok(self.metric(name)?.size)
    }

    /// Estimated start of the metric's data: the earlier of the first write
    /// and the coarsest layer's window start.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::NotFound`] for an unknown metric.
    pub fn start(&self, name: &str) -> Result<i64> {
        let metric = self.metric(name)?;
        let layer_start = metric.coarsest().start_time();
        Ok(metric.first_time.map_or(layer_start, |first| first.min(layer_start)))
    }

    /// Estimated end of the metric's data: the coarsest layer's window end.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::NotFound`] for an unknown metric.
    pub fn end(&self, name: &str) -> Result<i64> {
        Ok(self.metric(name)?.coarsest().end_time())
    }

    /// Number of successful writes to `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::NotFound`] for an unknown metric.
    pub fn write_count(&self, name: &str) -> Result<u64> {
        Ok(self.metric(name)?.write_count)
    }

    /// The MTU class of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::NotFound`] for an unknown metric.
    pub fn interval(&self, name: &str) -> Result<Interval> {
        Ok(self.metric(name)?.clock)
    }

    /// Layer settings of `name`, longest period first.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::NotFound`] for an unknown metric.
    pub fn layers(&self, name: &str) -> Result<Vec<LayerInfo>> {
        let metric = self.metric(name)?;
        Ok(metric
            .layers
            .iter()
            .map(|entry| LayerInfo {
                interval: entry.layer.interval(),
                period: entry.layer.period(),
                cells: entry.layer.cells(),
                retention: entry.retention.clone(),
                start_time: entry.layer.start_time(),
                end_time: entry.layer.end_time(),
                value_storage: entry.layer.value_storage(),
                time_storage: entry.layer.time_storage(),
                size: entry.layer.size(),
            })
            .collect())
    }

    /// Bookkeeping and layer settings of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::NotFound`] for an unknown metric.
    pub fn info(&self, name: &str) -> Result<MetricInfo> {
        let metric = self.metric(name)?;
        Ok(MetricInfo {
            first_time: metric.first_time,
            write_count: metric.write_count,
            size: metric.size,
            layers: self.layers(name)?,
        })
    }

    fn metric(&self, name: &str) -> Result<&Metric> {
        self.metrics
            .get(name)
            .ok_or_else(|| CollectorError::NotFound { name: name.to_string() }.into())
    }

    fn metric_mut(&mut self, name: &str) -> Result<&mut Metric> {
        self.metrics
            .get_mut(name)
            .ok_or_else(|| CollectorError::NotFound { name: name.to_string() }.into())
    }
}
