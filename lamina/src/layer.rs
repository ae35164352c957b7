//! Single-resolution circular buffer.
//!
//! A [`Layer`] keeps `cells = period / interval` slots, each holding the
//! time it was last written and a value. The layer also tracks a window
//! `[start_time, end_time]` of `cells` consecutive intervals. A slot is only
//! meaningful while its stored time lies inside the window; anything else
//! reads as null. Writes move the window, never the slot contents, so
//! invalidation is lazy.
//!
//! # Window maintenance
//!
//! A write at time `t` (rounded down to the interval) first adjusts the
//! window, in order:
//!
//! 1. `t` more than a whole buffer past `end_time`: rebase, `start_time = t`.
//! 2. `t < start_time`: the window is rebuilt backwards to end at `t`.
//! 3. `t > end_time`: slide forward to end at `t`.
//!
//! Steps 2 and 3 compute the same window, `[t - interval * (cells - 1), t]`.
//! Arithmetic saturates at the `i64` bounds.
//!
//! Then the slot for `t` is merged with the [`ModifyFn`] if it still holds a
//! value inside the adjusted window, or overwritten otherwise.
//!
//! Slot index is `floor(t / interval) mod cells`, with Euclidean division so
//! negative times map into range.

use tracing::{debug, trace};

use crate::aggregate::{AggregateFn, ModifyFn};
use crate::error::{LayerError, Result};
use crate::interval::Interval;
use crate::query::{LayerWindow, ReadResult, Row};
use crate::storage::{LayerStorage, StorageType};

/// Codec and clock choices for a new layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerOptions {
    /// Value codec, [`StorageType::DEFAULT_VALUE`] when `None`.
    pub value_storage: Option<StorageType>,
    /// Time codec, [`StorageType::DEFAULT_TIME`] when `None`.
    pub time_storage: Option<StorageType>,
    /// MTU class used to read the wall clock.
    pub clock: Interval,
}

/// A validated write, ready to be applied to the layer that prepared it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PendingWrite {
    start_time: i64,
    end_time: i64,
    index: usize,
    time: i64,
    value: f64,
}

/// One fixed-capacity ring of `(time, value)` slots at a single interval.
///
/// # Examples
///
/// ```rust
/// use lamina::aggregate::{AggregateFn, ModifyFn};
/// use lamina::layer::{Layer, LayerOptions};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // 10 one-second cells, clock fixed at t=1000
/// let mut layer = Layer::with_time(1, 10, LayerOptions::default(), 1_000)?;
///
/// layer.write(998, 4.0, ModifyFn::Last)?;
/// layer.write(999, 6.0, ModifyFn::Last)?;
///
/// let rows = layer.read_custom_interval(998, 999, Some(2), AggregateFn::Avg)?;
/// assert_eq!(rows.rows[0].value, Some(5.0));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Layer {
    interval: i64,
    period: i64,
    cells: usize,
    start_time: i64,
    end_time: i64,
    values: LayerStorage,
    times: LayerStorage,
}

impl Layer {
    /// Creates a layer whose window ends at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Size`] if `interval >= period` and
    /// [`LayerError::InitialData`] if either is not positive.
    pub fn new(interval: i64, period: i64, options: LayerOptions) -> Result<Self> {
        Self::with_time(interval, period, options, options.clock.now())
    }

    /// Creates a layer whose window ends at `now` (in MTU).
    ///
    /// # Errors
    ///
    /// See [`Layer::new`].
    pub fn with_time(interval: i64, period: i64, options: LayerOptions, now: i64) -> Result<Self> {
        Self::check_dimensions(interval, period)?;

        let cells = usize::try_from(period / interval)
            .map_err(|_| LayerError::InitialData { interval, period })?;
        let value_kind = StorageType::resolve(options.value_storage, StorageType::DEFAULT_VALUE);
        let time_kind = StorageType::resolve(options.time_storage, StorageType::DEFAULT_TIME);

        let mut layer = Self {
            interval,
            period,
            cells,
            start_time: 0,
            end_time: 0,
            values: LayerStorage::new(value_kind, cells),
            times: LayerStorage::new(time_kind, cells),
        };
        layer.start_time = layer.round(now.saturating_sub(layer.span()));
        layer.end_time = layer.round(now);

        debug!(
            interval,
            period,
            cells,
            value_storage = %value_kind,
            time_storage = %time_kind,
            "created layer"
        );
        Ok(layer)
    }

    /// Checks that a layer of this shape can be built.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Size`] if `interval >= period` and
    /// [`LayerError::InitialData`] if either is not positive.
    pub fn check_dimensions(interval: i64, period: i64) -> Result<()> {
        if interval >= period {
            return Err(LayerError::Size { interval, period }.into());
        }
        if interval <= 0 || period <= 0 {
            return Err(LayerError::InitialData { interval, period }.into());
        }
        Ok(())
    }

    /// Cell width in MTU.
    pub fn interval(&self) -> i64 {
        self.interval
    }

    /// Total span in MTU, as configured.
    pub fn period(&self) -> i64 {
        self.period
    }

    /// Number of slots.
    pub fn cells(&self) -> usize {
        self.cells
    }

    /// First time inside the valid window.
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// Last time inside the valid window.
    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    /// Interval and current window, for segment planning.
    pub fn window(&self) -> LayerWindow {
        LayerWindow {
            interval: self.interval,
            start: self.start_time,
            end: self.end_time,
        }
    }

    /// Value codec.
    pub fn value_storage(&self) -> StorageType {
        self.values.kind()
    }

    /// Time codec.
    pub fn time_storage(&self) -> StorageType {
        self.times.kind()
    }

    /// Bytes held by the value and time buffers.
    pub fn size(&self) -> usize {
        self.values.byte_len() + self.times.byte_len()
    }

    /// Writes `value` at `time`, merging with `func` if the slot is live.
    ///
    /// The write is all-or-nothing: on error neither the window nor the
    /// slot changes.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Value`] if `value` (or the merged result) is
    /// not finite or outside the value codec, and [`LayerError::Time`] if
    /// the rounded time does not fit the time codec.
    pub fn write(&mut self, time: i64, value: f64, func: ModifyFn) -> Result<()> {
        let pending = self.prepare_write(time, value, func)?;
        self.commit_write(pending);
        Ok(())
    }

    /// Validates a write and computes its effect without applying it.
    ///
    /// # Errors
    ///
    /// See [`Layer::write`].
    pub(crate) fn prepare_write(&self, time: i64, value: f64, func: ModifyFn) -> Result<PendingWrite> {
        self.check_value(value)?;

        let o_time = self.round(time);
        if !self.times.kind().can_hold_integer(o_time) {
            return Err(LayerError::Time {
                time,
                reason: format!("does not fit {} time storage", self.times.kind()),
            }
            .into());
        }

        let mut start_time = self.start_time;
        let mut end_time = self.end_time;

        if end_time < o_time.saturating_sub(self.interval.saturating_mul(self.cells_i64())) {
            trace!(from = end_time, to = o_time, "layer buffer stale, rebasing");
            start_time = o_time;
        }
        let behind = o_time < start_time;
        if behind {
            trace!(start_time, to = o_time, "write before window, rebuilding backwards");
        }
        if behind || end_time < o_time {
            start_time = self.round(o_time.saturating_sub(self.span()));
            end_time = o_time;
        }

        let index = self.index(o_time);
        let stored = self.times.read_integer(index);
        let merged = if stored >= start_time && stored <= end_time {
            func.apply(self.values.read(index), value)
        } else {
            value
        };
        self.check_value(merged)?;

        Ok(PendingWrite {
            start_time,
            end_time,
            index,
            time: o_time,
            value: merged,
        })
    }

    /// Applies a write produced by [`Layer::prepare_write`] on this layer.
    pub(crate) fn commit_write(&mut self, pending: PendingWrite) {
        self.start_time = pending.start_time;
        self.end_time = pending.end_time;
        self.times.write_integer(pending.index, pending.time);
        self.values.write(pending.index, pending.value);
    }

    /// Reads one row per interval between `start` and `end`, clamped to the
    /// window.
    ///
    /// # Errors
    ///
    /// Returns a section error if `start` lies after the window.
    pub fn read_interval(&self, start: i64, end: i64) -> Result<ReadResult> {
        let start = start.max(self.start_time);
        let mut end = end.min(self.end_time);
        if start > end {
            end = self.end_time;
        }

        let mut result = ReadResult::new(start, end);
        result.rows = Interval::get_intervals(start, end, self.interval)?
            .into_iter()
            .map(|time| self.read_one(time))
            .collect();
        Ok(result)
    }

    /// Resamples `start..=end` at `precision`, collapsing each bucket with
    /// `func`. `None` means the layer's own interval.
    ///
    /// Buckets coarser than the interval aggregate every cell they cover;
    /// finer buckets each read the single cell they fall in.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Precision`] for a non-positive precision and
    /// [`LayerError::Section`] if the clamped range is empty.
    pub fn read_custom_interval(
        &self,
        start: i64,
        end: i64,
        precision: Option<i64>,
        func: AggregateFn,
    ) -> Result<ReadResult> {
        let precision = match precision {
            Some(p) if p <= 0 => return Err(LayerError::Precision { precision: p }.into()),
            Some(p) => p,
            None => self.interval,
        };

        let start = start.max(self.start_time);
        let end = end.min(self.end_time);
        if start > end {
            return Err(LayerError::Section { start, end }.into());
        }

        let mut result = ReadResult::new(start, end);
        for time in Interval::get_intervals(start, end, precision)? {
            if time < self.start_time {
                continue;
            }
            let to = if precision <= self.interval {
                time
            } else {
                time.saturating_add(precision - self.interval)
            };
            let bucket = self.read_interval(time, to)?;
            result.rows.push(Row {
                time,
                value: bucket.aggregate(func),
            });
        }
        Ok(result)
    }

    /// Every slot in index order, with its stored time and value (null when
    /// stale).
    pub fn dump(&self) -> Vec<Row> {
        (0..self.cells).map(|index| self.read_slot(index)).collect()
    }

    /// Invalidates every slot by zeroing stored times. Values stay in place.
    pub fn clear(&mut self) {
        self.times.clear();
    }

    fn read_one(&self, time: i64) -> Row {
        Row {
            time,
            value: self.read_slot(self.index(time)).value,
        }
    }

    fn read_slot(&self, index: usize) -> Row {
        let time = self.times.read_integer(index);
        let value = (time >= self.start_time && time <= self.end_time).then(|| self.values.read(index));
        Row { time, value }
    }

    fn check_value(&self, value: f64) -> Result<()> {
        if self.values.kind().can_hold(value) {
            return Ok(());
        }
        let reason = if value.is_finite() {
            format!("does not fit {} value storage", self.values.kind())
        } else {
            "value must be finite".to_string()
        };
        Err(LayerError::Value { value, reason }.into())
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // bounded by cells
    fn index(&self, time: i64) -> usize {
        time.div_euclid(self.interval).rem_euclid(self.cells_i64()) as usize
    }

    #[inline]
    fn round(&self, time: i64) -> i64 {
        time - time % self.interval
    }

    #[inline]
    fn cells_i64(&self) -> i64 {
        self.period / self.interval
    }

    /// Distance from the first to the last cell of the window.
    #[inline]
    fn span(&self) -> i64 {
        self.interval * (self.cells_i64() - 1)
    }
}
