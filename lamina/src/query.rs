//! Read results and cross-layer segment planning.
//!
//! A metric with several retention layers answers a read by splitting the
//! requested range into segments, each served by at most one layer. This
//! module holds the result types shared by [`Layer`](crate::layer::Layer)
//! and [`Collector`](crate::collector::Collector), and the pure planning
//! routine that chooses the segments.
//!
//! # Layer selection
//!
//! Layers are listed by period, longest first. For a cursor `start`:
//!
//! 1. Walk the list from its end (finest first) and take the first layer
//!    whose window contains `start` (`start_time <= start < end_time`).
//! 2. If one is found, walk the list from its front for a layer with a
//!    smaller interval whose window begins before `end`. When there is one,
//!    the segment stops where that finer layer begins; otherwise it runs to
//!    `min(end, end_time)`.
//! 3. If none contains `start`, the segment is a gap that ends where the
//!    first layer still ahead of `start` begins, or at `end` if nothing is.
//!
//! Segments share their boundary time, so a stitched read repeats the row at
//! each boundary.

use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateFn;
use crate::error::Result;
use crate::interval::Interval;

/// One sample: a time in MTU and its value, `None` when no valid data exists.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Time in MTU.
    pub time: i64,
    /// Stored value, or `None` for a gap.
    pub value: Option<f64>,
}

impl Row {
    /// A row with no value.
    pub const fn null(time: i64) -> Self {
        Self { time, value: None }
    }
}

/// The result of a read.
///
/// `relevant` is `false` when the metric does not exist; the rows are then
/// null placeholders spanning the requested range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResult {
    /// Whether the rows come from real storage.
    pub relevant: bool,
    /// Start of the range actually read.
    pub start: i64,
    /// End of the range actually read.
    pub end: i64,
    /// Rows in time order.
    pub rows: Vec<Row>,
}

impl ReadResult {
    /// An empty, relevant result for `start..=end`.
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            relevant: true,
            start,
            end,
            rows: Vec::new(),
        }
    }

    /// A synthetic result of null rows spaced `precision` apart.
    ///
    /// # Errors
    ///
    /// Fails if `start > end` or `precision` is not positive.
    pub fn fake(start: i64, end: i64, precision: i64) -> Result<Self> {
        let rows = Interval::get_intervals(start, end, precision)?
            .into_iter()
            .map(Row::null)
            .collect();
        Ok(Self {
            relevant: false,
            start,
            end,
            rows,
        })
    }

    /// Values of all rows, in order.
    pub fn values(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.rows.iter().map(|row| row.value)
    }

    /// Collapses all rows into one value.
    pub fn aggregate(&self, func: AggregateFn) -> Option<f64> {
        func.apply(self.values())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The shape of one layer as seen by segment planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerWindow {
    /// Cell width in MTU.
    pub interval: i64,
    /// First valid time.
    pub start: i64,
    /// Last valid time.
    pub end: i64,
}

/// A sub-range of a read and the layer that serves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Segment start in MTU.
    pub start: i64,
    /// Segment end in MTU.
    pub end: i64,
    /// Index into the layer list, or `None` for a gap.
    pub layer: Option<usize>,
}

/// Picks the single segment that begins at `start`.
///
/// `windows` must be ordered by period, longest first.
pub fn find_segment(windows: &[LayerWindow], start: i64, end: i64) -> Segment {
    let found = windows.iter().enumerate().rev().find(|(_, w)| {
        !(end < w.start || start > w.end) && start >= w.start && start < w.end
    });

    if let Some((index, layer)) = found {
        // A finer layer that begins later takes over from where it begins
        let finer = windows
            .iter()
            .find(|w| w.interval < layer.interval && end > w.start && w.start > start);
        if let Some(finer) = finer {
            return Segment {
                start,
                end: finer.start,
                layer: Some(index),
            };
        }
        return Segment {
            start,
            end: end.min(layer.end),
            layer: Some(index),
        };
    }

    for w in windows {
        if start >= w.end {
            continue;
        }
        if end >= w.start {
            return Segment {
                start,
                end: w.start,
                layer: None,
            };
        }
    }

    Segment {
        start,
        end,
        layer: None,
    }
}

/// Splits `start..=end` into consecutive segments.
///
/// Stops once a segment reaches `end`, or after `windows.len() + 2`
/// segments.
pub fn plan_segments(windows: &[LayerWindow], start: i64, end: i64) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = start;
    for _ in 0..windows.len() + 2 {
        let segment = find_segment(windows, cursor, end);
        segments.push(segment);
        cursor = segment.end;
        if segment.end >= end {
            break;
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    // Coarse layer first, as a collector stores them
    const COARSE: LayerWindow = LayerWindow { interval: 2, start: 990, end: 1008 };
    const FINE: LayerWindow = LayerWindow { interval: 1, start: 1000, end: 1009 };

    #[test]
    fn test_fine_layer_preferred() {
        let windows = [COARSE, FINE];
        let segments = plan_segments(&windows, 1001, 1009);
        assert_eq!(segments, vec![Segment { start: 1001, end: 1009, layer: Some(1) }]);
    }

    #[test]
    fn test_switch_from_coarse_to_fine() {
        let windows = [COARSE, FINE];
        let segments = plan_segments(&windows, 994, 1009);
        assert_eq!(segments, vec![
            Segment { start: 994, end: 1000, layer: Some(0) },
            Segment { start: 1000, end: 1009, layer: Some(1) },
        ]);
    }

    #[test]
    fn test_leading_gap() {
        let windows = [COARSE, FINE];
        let segments = plan_segments(&windows, 985, 1009);
        assert_eq!(segments, vec![
            Segment { start: 985, end: 990, layer: None },
            Segment { start: 990, end: 1000, layer: Some(0) },
            Segment { start: 1000, end: 1009, layer: Some(1) },
        ]);
    }

    #[test]
    fn test_trailing_gap() {
        let windows = [COARSE, FINE];
        let segments = plan_segments(&windows, 1005, 1020);
        assert_eq!(segments, vec![
            Segment { start: 1005, end: 1009, layer: Some(1) },
            Segment { start: 1009, end: 1020, layer: None },
        ]);
    }

    #[test]
    fn test_nothing_covers_range() {
        let windows = [COARSE, FINE];
        assert_eq!(find_segment(&windows, 100, 200), Segment { start: 100, end: 200, layer: None });
        assert_eq!(find_segment(&[], 100, 200), Segment { start: 100, end: 200, layer: None });
    }

    #[test]
    fn test_finer_layer_behind_cursor_is_ignored() {
        // Coarse window extends past the fine one; the fine layer starts
        // before the cursor so it must not produce an inverted segment
        let coarse = LayerWindow { interval: 2, start: 990, end: 1020 };
        let windows = [coarse, FINE];
        let segment = find_segment(&windows, 1009, 1015);
        assert_eq!(segment, Segment { start: 1009, end: 1015, layer: Some(0) });
    }

    #[test]
    fn test_plan_is_bounded() {
        let windows = [COARSE, FINE];
        assert!(plan_segments(&windows, 0, 5_000).len() <= windows.len() + 2);
    }

    #[test]
    fn test_fake_result() {
        let result = ReadResult::fake(10, 40, 10).unwrap();
        assert!(!result.relevant);
        assert_eq!(result.len(), 4);
        assert!(result.values().all(|v| v.is_none()));
        assert!(ReadResult::fake(40, 10, 10).is_err());
    }

    #[test]
    fn test_result_aggregate() {
        let mut result = ReadResult::new(0, 2);
        result.rows = vec![
            Row { time: 0, value: Some(1.0) },
            Row::null(1),
            Row { time: 2, value: Some(5.0) },
        ];
        assert_eq!(result.aggregate(AggregateFn::Avg), Some(3.0));
        assert_eq!(result.aggregate(AggregateFn::First), Some(1.0));
    }
}
