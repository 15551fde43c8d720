//! Benchmarks for the per-record hot path
//!
//! Covers slice lookup in the thread-local store, lifting into slice state,
//! and the full operator path including key extraction.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use slicestream_processor::aggregation::AggregateSpec;
use slicestream_processor::config::{
    AggregationConfig, ProcessorConfig, SliceStoreConfig, WindowConfig,
};
use slicestream_processor::pipeline::{PreAggregationOperator, QueryContext};
use slicestream_processor::slice::{SliceState, ThreadLocalSliceStore};
use slicestream_processor::window::SliceAssigner;
use slicestream_types::{OriginId, Record, RecordBatch, Timestamp, WorkerId};
use std::sync::Arc;

fn specs() -> Vec<AggregateSpec> {
    vec![
        AggregateSpec::count("count"),
        AggregateSpec::sum("value", "sum"),
        AggregateSpec::max("value", "max"),
        AggregateSpec::avg("value", "avg"),
    ]
}

fn bench_slice_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("slice_lookup");
    group.throughput(Throughput::Elements(1));

    let assigner = SliceAssigner::tumbling(1_000).unwrap();
    let mut store = ThreadLocalSliceStore::new(
        WorkerId(0),
        assigner,
        64,
        SliceState::new(&specs(), false),
    );

    group.bench_function("same_slice", |b| {
        b.iter(|| {
            let slice = store
                .find_or_create_slice_for(black_box(Timestamp::new(500)))
                .unwrap();
            black_box(slice.index());
        });
    });

    group.bench_function("within_live_range", |b| {
        let mut ts = 0u64;
        b.iter(|| {
            ts = (ts + 137) % 60_000;
            let slice = store
                .find_or_create_slice_for(black_box(Timestamp::new(ts)))
                .unwrap();
            black_box(slice.index());
        });
    });

    group.finish();
}

fn bench_lift(c: &mut Criterion) {
    let mut group = c.benchmark_group("lift");
    group.throughput(Throughput::Elements(1));

    let specs = specs();
    let record = Record::new().with("value", 42i64);

    group.bench_function("global", |b| {
        let mut state = SliceState::new(&specs, false);
        b.iter(|| state.lift(black_box(&record), None, &specs).unwrap());
    });

    group.finish();
}

fn context(group_by: Vec<String>) -> Arc<QueryContext> {
    let config = ProcessorConfig {
        window: WindowConfig::tumbling(1_000),
        slice_store: SliceStoreConfig {
            number_of_slices: 256,
        },
        aggregation: AggregationConfig {
            aggregates: specs(),
            group_by,
        },
        ..ProcessorConfig::default()
    };
    Arc::new(QueryContext::from_config(&config).unwrap())
}

fn bench_operator(c: &mut Criterion) {
    let mut group = c.benchmark_group("operator_batch");

    for &size in &[100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size as u64));

        for (name, group_by) in [("global", vec![]), ("keyed", vec!["key".to_string()])] {
            let records: Vec<Record> = (0..size)
                .map(|i| {
                    Record::new()
                        .with("timestamp", (i as u64 * 7) % 1_000)
                        .with("key", format!("k{}", i % 16))
                        .with("value", i as i64)
                })
                .collect();

            group.bench_with_input(BenchmarkId::new(name, size), &records, |b, records| {
                b.iter_batched(
                    || {
                        let ctx = context(group_by.clone());
                        let operator = PreAggregationOperator::new(WorkerId(0), ctx);
                        let batch = RecordBatch::new(
                            OriginId(0),
                            1,
                            Timestamp::new(1_000),
                            records.clone(),
                        );
                        (operator, batch)
                    },
                    |(mut operator, batch)| black_box(operator.process_batch(&batch).unwrap()),
                    criterion::BatchSize::LargeInput,
                );
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_slice_lookup, bench_lift, bench_operator);
criterion_main!(benches);
