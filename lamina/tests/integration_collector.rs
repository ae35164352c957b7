//! Integration tests for multi-layer collectors.

use lamina::aggregate::{AggregateFn, ModifyFn};
use lamina::collector::Collector;
use lamina::error::{FunctionError, LaminaError, LayerError};
use lamina::interval::Interval;
use lamina::layer::{Layer, LayerOptions};
use lamina::query::Row;
use lamina::storage::StorageType;

#[test]
fn test_layer_selection_end_to_end() {
    let mut collector = Collector::new();
    collector
        .init_with_time("test.metric", "1s:10s, 2s:20s", LayerOptions::default(), 5_000)
        .unwrap();

    for t in 1_001..=1_009_i64 {
        collector
            .write("test.metric", (t - 1_000) as f64, Some(t), ModifyFn::Last)
            .unwrap();
    }

    // Both layers cover the range, the finer one answers
    let result = collector.read("test.metric", 1, 1_009, 1, AggregateFn::Avg).unwrap();
    let tail: Vec<_> = result.rows.iter().rev().take(9).rev().copied().collect();
    let expected: Vec<_> = (1_001..=1_009)
        .map(|t| Row { time: t, value: Some((t - 1_000) as f64) })
        .collect();
    assert_eq!(tail, expected);

    // Everything before the coarse window is a null gap
    assert!(result.rows.iter().filter(|r| r.time < 990).all(|r| r.value.is_none()));

    collector.clear("test.metric").unwrap();
    let cleared = collector.read("test.metric", 1_001, 1_009, 1, AggregateFn::Avg).unwrap();
    assert!(cleared.values().all(|v| v.is_none()));
}

/// Layers initialised on the wall clock, then values 1..=9 written at t=1..=9.
fn written_near_epoch(retentions: &str) -> Collector {
    let mut collector = Collector::new();
    collector.init("m", retentions, LayerOptions::default()).unwrap();
    for t in 1..=9_i64 {
        collector.write("m", t as f64, Some(t), ModifyFn::Last).unwrap();
    }
    collector
}

fn rows(values: &[(i64, Option<f64>)]) -> Vec<Row> {
    values.iter().map(|&(time, value)| Row { time, value }).collect()
}

#[test]
fn test_writes_near_epoch() {
    let mut collector = written_near_epoch("1s:10s, 2s:20s");

    // Writes far behind the clock pull both windows back
    let layers = collector.layers("m").unwrap();
    assert_eq!((layers[0].start_time, layers[0].end_time), (-10, 8));
    assert_eq!((layers[1].start_time, layers[1].end_time), (0, 9));

    let expected: Vec<_> = (1..=9).map(|t| Row { time: t, value: Some(t as f64) }).collect();
    let result = collector.read("m", 1, 9, 1, AggregateFn::Avg).unwrap();
    assert_eq!(result.rows, expected);

    // Clearing zeroes stored times, and time 0 is inside the fine window
    collector.clear("m").unwrap();
    let result = collector.read("m", 1, 9, 1, AggregateFn::Avg).unwrap();
    assert_eq!(result.rows, expected);
}

#[test]
fn test_clear_near_epoch_with_short_fine_layer() {
    let mut collector = written_near_epoch("1s:5s, 2s:20s");

    let layers = collector.layers("m").unwrap();
    assert_eq!((layers[0].start_time, layers[0].end_time), (-10, 8));
    assert_eq!((layers[1].start_time, layers[1].end_time), (5, 9));

    let result = collector.read("m", 1, 9, 1, AggregateFn::Avg).unwrap();
    assert_eq!(result.rows, rows(&[
        (1, Some(1.0)),
        (2, Some(3.0)),
        (3, Some(3.0)),
        (4, Some(5.0)),
        (5, Some(5.0)),
        (5, Some(5.0)),
        (6, Some(6.0)),
        (7, Some(7.0)),
        (8, Some(8.0)),
        (9, Some(9.0)),
    ]));

    // The coarse window still holds time 0, the fine one starts at 5
    collector.clear("m").unwrap();
    let result = collector.read("m", 1, 9, 1, AggregateFn::Avg).unwrap();
    assert_eq!(result.rows, rows(&[
        (1, Some(1.0)),
        (2, Some(3.0)),
        (3, Some(3.0)),
        (4, Some(5.0)),
        (5, Some(5.0)),
        (5, None),
        (6, None),
        (7, None),
        (8, None),
        (9, None),
    ]));
}

#[test]
fn test_long_history_uses_coarse_layer() {
    let mut collector = Collector::new();
    collector
        .init_with_time("load", "1s:1m, 10s:1h", LayerOptions::default(), 10_000)
        .unwrap();

    // One hour of samples, one per second
    for t in 6_401..=10_000_i64 {
        collector.write("load", 1.0, Some(t), ModifyFn::Last).unwrap();
    }

    let layers = collector.layers("load").unwrap();
    assert_eq!((layers[0].start_time, layers[0].end_time), (6_410, 10_000));
    assert_eq!((layers[1].start_time, layers[1].end_time), (9_941, 10_000));

    // Ten-second buckets over the whole hour: coarse up to 9941, fine after
    let result = collector.read("load", 6_410, 10_000, 10, AggregateFn::Sum).unwrap();
    assert!(result.relevant);
    let old = result.rows.iter().find(|r| r.time == 7_000).unwrap();
    assert_eq!(old.value, Some(1.0));
    let recent = result.rows.iter().find(|r| r.time == 9_950).unwrap();
    assert_eq!(recent.value, Some(10.0));
}

#[test]
fn test_window_slide_keeps_previous_cells() {
    let mut layer = Layer::with_time(5, 50, LayerOptions::default(), 0).unwrap();
    for step in 1..=30_i64 {
        let time = step * 5;
        layer.write(time, (step * 2) as f64, ModifyFn::Last).unwrap();

        // The previous cells - 1 writes are still readable
        let from = (step - 9).max(1) * 5;
        let result = layer.read_interval(from, time).unwrap();
        assert!(result.values().all(|v| v.is_some()), "gap after write at {time}");
    }
}

#[test]
fn test_codecs_per_metric() {
    let mut collector = Collector::new();
    let options = LayerOptions {
        value_storage: Some(StorageType::Int16),
        time_storage: Some(StorageType::Uint32),
        clock: Interval::SECONDS,
    };
    collector.init_with_time("counts", "1m:1h", options, 3_600).unwrap();

    let layers = collector.layers("counts").unwrap();
    let info = &layers[0];
    assert_eq!(info.value_storage, StorageType::Int16);
    assert_eq!(info.time_storage, StorageType::Uint32);
    assert_eq!(info.size, 60 * 2 + 60 * 4);

    collector.write("counts", 12.7, Some(3_590), ModifyFn::Sum).unwrap();
    collector.write("counts", 3.0, Some(3_595), ModifyFn::Sum).unwrap();
    let result = collector.read("counts", 3_540, 3_540, 60, AggregateFn::Last).unwrap();
    assert_eq!(result.rows[0].value, Some(15.0));

    assert!(matches!(
        collector.write("counts", 40_000.0, Some(3_590), ModifyFn::Last),
        Err(LaminaError::Layer(LayerError::Value { .. }))
    ));
}

#[test]
fn test_function_names_from_strings() {
    let aggregate: AggregateFn = "max".parse().unwrap();
    let modify: ModifyFn = "sum".parse().unwrap();
    assert_eq!(aggregate, AggregateFn::Max);
    assert_eq!(modify, ModifyFn::Sum);

    match "p99".parse::<AggregateFn>() {
        Err(LaminaError::Function(FunctionError::AggregateType { func })) => assert_eq!(func, "p99"),
        other => panic!("unexpected result: {other:?}"),
    }
}
