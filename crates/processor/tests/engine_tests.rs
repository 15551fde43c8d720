//! Multi-threaded query runs through the public engine API

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slicestream_processor::aggregation::AggregateSpec;
use slicestream_processor::config::{ProcessorConfig, WindowConfig};
use slicestream_processor::error::Result;
use slicestream_processor::pipeline::{Engine, QueryBuilder, QueryId, QueryLifecycle, QueryStatus};
use slicestream_processor::sink::{ChannelSink, CollectingSink};
use slicestream_types::{
    GroupKey, OriginId, Record, RecordBatch, Timestamp, Value, WindowResult,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn batch(origin: u64, seq: u64, wm: u64, records: Vec<Record>) -> RecordBatch {
    RecordBatch::new(
        OriginId(origin),
        seq,
        Timestamp::new(wm),
        records,
    )
}

fn at(ts: u64) -> Record {
    Record::new().with("timestamp", ts)
}

fn builder(sink: &CollectingSink) -> QueryBuilder {
    QueryBuilder::new()
        .with_allowed_lateness(0)
        .with_idle_tick(Duration::from_millis(2))
        .with_sink(Arc::new(sink.clone()))
}

fn window_counts(results: &[WindowResult]) -> Vec<(u64, u64, Value)> {
    results
        .iter()
        .map(|row| {
            (
                row.window_start.millis(),
                row.window_end.millis(),
                row.get("count").cloned().unwrap_or(Value::Null),
            )
        })
        .collect()
}

#[derive(Debug, Default)]
struct RecordingLifecycle {
    events: Mutex<Vec<String>>,
}

impl RecordingLifecycle {
    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl QueryLifecycle for RecordingLifecycle {
    fn on_setup(&self, _query: QueryId) -> Result<()> {
        self.events.lock().push("setup".to_string());
        Ok(())
    }

    fn on_close(&self, _query: QueryId) {
        self.events.lock().push("close".to_string());
    }

    fn on_failure(&self, _query: QueryId, origin: Option<OriginId>, _reason: &str) {
        let origin = origin.map(|o| o.to_string()).unwrap_or_default();
        self.events.lock().push(format!("failure {}", origin));
    }
}

#[test]
fn tumbling_counts_across_workers() {
    let sink = CollectingSink::new();
    let query = builder(&sink)
        .with_tumbling_window(10)
        .with_parallelism(4)
        .start()
        .unwrap();

    query.submit(batch(0, 1, 0, vec![at(2), at(7)])).unwrap();
    query.submit(batch(0, 2, 10, vec![at(3), at(12)])).unwrap();
    query.submit(batch(0, 3, 20, vec![at(15), at(22)])).unwrap();
    query.submit(batch(0, 4, 30, vec![at(25)])).unwrap();
    let stats = query.stop().unwrap();

    assert_eq!(
        window_counts(&sink.results()),
        vec![
            (0, 10, Value::UInt(3)),
            (10, 20, Value::UInt(2)),
            (20, 30, Value::UInt(2)),
        ]
    );
    assert_eq!(stats.records_processed, 7);
    assert_eq!(stats.windows_emitted, 3);
    assert_eq!(stats.late_records_dropped, 0);
}

#[test]
fn sliding_windows_end_to_end() {
    let sink = CollectingSink::new();
    let query = builder(&sink)
        .with_sliding_window(20, 10)
        .with_parallelism(2)
        .start()
        .unwrap();

    query
        .submit(batch(0, 1, 0, vec![at(1), at(11), at(21), at(31)]))
        .unwrap();
    query.submit(batch(0, 2, 100, vec![])).unwrap();
    query.stop().unwrap();

    assert_eq!(
        window_counts(&sink.results()),
        vec![
            (0, 20, Value::UInt(2)),
            (10, 30, Value::UInt(2)),
            (20, 40, Value::UInt(2)),
            (30, 50, Value::UInt(1)),
        ]
    );
}

#[test]
fn keyed_sum_end_to_end() {
    let sink = CollectingSink::new();
    let query = builder(&sink)
        .with_tumbling_window(10)
        .with_parallelism(2)
        .with_aggregate(AggregateSpec::sum("val", "total"))
        .with_group_by(["key"])
        .start()
        .unwrap();

    query
        .submit(batch(0, 1, 0, vec![at(1).with("key", "A").with("val", 5i64)]))
        .unwrap();
    query
        .submit(batch(0, 2, 10, vec![at(2).with("key", "B").with("val", 3i64)]))
        .unwrap();
    query.stop().unwrap();

    let rows: Vec<(Option<GroupKey>, Option<Value>)> = sink
        .results()
        .iter()
        .map(|row| (row.key.clone(), row.get("total").cloned()))
        .collect();
    assert_eq!(
        rows,
        vec![
            (Some(GroupKey::text("A")), Some(Value::Int(5))),
            (Some(GroupKey::text("B")), Some(Value::Int(3))),
        ]
    );
}

#[test]
fn stop_discards_slices_below_the_watermark() {
    let sink = CollectingSink::new();
    let query = builder(&sink)
        .with_tumbling_window(10)
        .with_parallelism(1)
        .start()
        .unwrap();

    query.submit(batch(0, 1, 5, vec![at(1), at(12)])).unwrap();
    let stats = query.stop().unwrap();

    assert!(sink.is_empty());
    assert_eq!(stats.records_processed, 2);
    assert_eq!(stats.slices_discarded, 2);
    assert_eq!(stats.windows_emitted, 0);
}

#[test]
fn windows_wait_for_every_origin() {
    let sink = CollectingSink::new();
    let query = builder(&sink)
        .with_tumbling_window(10)
        .with_parallelism(2)
        .with_origins([OriginId(0), OriginId(1)])
        .start()
        .unwrap();

    query.submit(batch(0, 1, 100, vec![at(1)])).unwrap();
    query.submit(batch(1, 1, 5, vec![at(2)])).unwrap();
    query.submit(batch(1, 2, 100, vec![at(7)])).unwrap();
    query.stop().unwrap();

    assert_eq!(
        window_counts(&sink.results()),
        vec![(0, 10, Value::UInt(3))]
    );
}

#[test]
fn lagging_origin_holds_results_back() {
    let sink = CollectingSink::new();
    let query = builder(&sink)
        .with_tumbling_window(10)
        .with_parallelism(2)
        .with_origins([OriginId(0), OriginId(1)])
        .start()
        .unwrap();

    query.submit(batch(0, 1, 100, vec![at(1)])).unwrap();
    query.submit(batch(1, 1, 5, vec![at(2)])).unwrap();
    let stats = query.stop().unwrap();

    assert!(sink.is_empty());
    assert_eq!(stats.global_watermark, 5);
}

#[test]
fn random_stream_matches_sequential_reference() {
    let sink = CollectingSink::new();
    let query = builder(&sink)
        .with_tumbling_window(50)
        .with_parallelism(4)
        .with_slice_capacity(512)
        .with_tracking_window(512)
        .start()
        .unwrap();

    let mut rng = StdRng::seed_from_u64(99);
    let mut expected: BTreeMap<u64, u64> = BTreeMap::new();
    let mut watermark = 0u64;
    let mut seq = 0u64;

    for _ in 0..200 {
        seq += 1;
        let records: Vec<Record> = (0..rng.gen_range(0..10))
            .map(|_| {
                let ts = watermark + rng.gen_range(0..30);
                *expected.entry(ts / 50 * 50).or_default() += 1;
                at(ts)
            })
            .collect();
        watermark += rng.gen_range(0..10);
        query.submit(batch(0, seq, watermark, records)).unwrap();
    }
    query.submit(batch(0, seq + 1, 1_000_000, vec![])).unwrap();
    let stats = query.stop().unwrap();

    let actual: BTreeMap<u64, u64> = sink
        .results()
        .iter()
        .map(|row| match row.get("count") {
            Some(Value::UInt(count)) => (row.window_start.millis(), *count),
            other => panic!("unexpected count {:?}", other),
        })
        .collect();

    assert_eq!(actual, expected);
    assert_eq!(stats.late_records_dropped, 0);
    assert_eq!(stats.slices_discarded, 0);
}

#[test]
fn lifecycle_hooks_run_in_order() {
    let lifecycle = Arc::new(RecordingLifecycle::default());
    let sink = CollectingSink::new();
    let query = builder(&sink)
        .with_tumbling_window(10)
        .with_parallelism(1)
        .with_lifecycle(lifecycle.clone())
        .start()
        .unwrap();

    query.submit(batch(0, 1, 10, vec![at(1)])).unwrap();
    query.stop().unwrap();

    assert_eq!(lifecycle.events(), vec!["setup", "close"]);
}

#[test]
fn capacity_violation_fails_the_query() {
    let lifecycle = Arc::new(RecordingLifecycle::default());
    let sink = CollectingSink::new();
    let query = builder(&sink)
        .with_tumbling_window(10)
        .with_parallelism(1)
        .with_slice_capacity(4)
        .with_lifecycle(lifecycle.clone())
        .start()
        .unwrap();

    query.submit(batch(0, 1, 0, vec![at(1), at(1_000)])).unwrap();
    let err = query.stop().unwrap_err();

    assert!(err.to_string().contains("capacity exceeded"));
    assert_eq!(lifecycle.events(), vec!["setup", "failure origin-0", "close"]);
    assert!(sink.is_empty());
}

#[test]
fn submit_after_failure_is_rejected() {
    let sink = CollectingSink::new();
    let query = builder(&sink)
        .with_tumbling_window(10)
        .with_parallelism(1)
        .with_slice_capacity(4)
        .start()
        .unwrap();

    query.submit(batch(0, 1, 0, vec![at(1), at(1_000)])).unwrap();
    let mut rejected = false;
    for _ in 0..200 {
        if query.status() == QueryStatus::Failed {
            rejected = query.submit(batch(0, 2, 0, vec![])).is_err();
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(rejected);
    assert!(query.stop().is_err());
}

#[test]
fn redelivered_batch_is_skipped() {
    let sink = CollectingSink::new();
    let query = builder(&sink)
        .with_tumbling_window(10)
        .with_parallelism(1)
        .start()
        .unwrap();

    query.submit(batch(0, 1, 0, vec![at(1), at(2)])).unwrap();
    query.submit(batch(0, 1, 0, vec![at(1), at(2)])).unwrap();
    query.submit(batch(0, 2, 10, vec![])).unwrap();
    let stats = query.stop().unwrap();

    assert_eq!(window_counts(&sink.results()), vec![(0, 10, Value::UInt(2))]);
    assert_eq!(stats.records_processed, 2);
}

#[test]
fn redelivery_above_a_gap_is_skipped_on_any_worker() {
    let sink = CollectingSink::new();
    let query = builder(&sink)
        .with_tumbling_window(10)
        .with_parallelism(2)
        .start()
        .unwrap();

    query.submit(batch(0, 2, 5, vec![at(3), at(4)])).unwrap();
    query.submit(batch(0, 2, 5, vec![at(3), at(4)])).unwrap();
    query.submit(batch(0, 1, 10, vec![at(1)])).unwrap();
    let stats = query.stop().unwrap();

    assert_eq!(window_counts(&sink.results()), vec![(0, 10, Value::UInt(3))]);
    assert_eq!(stats.records_processed, 3);
}

#[test]
fn metrics_are_labelled_with_the_query() {
    let sink = CollectingSink::new();
    let query = builder(&sink)
        .with_tumbling_window(10)
        .with_parallelism(1)
        .with_metrics(true)
        .start()
        .unwrap();

    query.submit(batch(0, 1, 10, vec![at(1), at(2), at(3)])).unwrap();
    let id = query.id().to_string();
    let registry = query.metrics().registry();
    query.stop().unwrap();

    let mut encoded = String::new();
    prometheus_client::encoding::text::encode(&mut encoded, &registry.read()).unwrap();
    assert!(encoded.contains("slicestream_records_processed_total"));
    assert!(encoded.contains(&id));
}

#[test]
fn engine_rejects_invalid_config() {
    let mut config = ProcessorConfig::default();
    config.window = WindowConfig::sliding(100, 0);
    assert!(Engine::new(config).is_err());
}

#[tokio::test]
async fn channel_sink_delivers_buffers() {
    let (sink, mut receiver) = ChannelSink::new();
    let engine = Engine::new(ProcessorConfig {
        window: WindowConfig::tumbling(10),
        parallelism: 2,
        ..ProcessorConfig::default()
    })
    .unwrap();
    let query = engine
        .start(
            Arc::new(sink),
            Arc::new(slicestream_processor::pipeline::LoggingLifecycle),
        )
        .unwrap();

    query.submit(batch(0, 1, 0, vec![at(4), at(5)])).unwrap();
    query.submit(batch(0, 2, 20, vec![at(14)])).unwrap();
    query.stop().unwrap();

    let mut rows = Vec::new();
    while let Some(buffer) = receiver.recv().await {
        rows.extend(buffer.decode().unwrap());
    }
    assert_eq!(
        window_counts(&rows),
        vec![(0, 10, Value::UInt(2)), (10, 20, Value::UInt(1))]
    );
}
