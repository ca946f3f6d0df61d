//! Benchmarks for seatable-mysync operations.

use bigdecimal::BigDecimal;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use seatable_mysync::config::MergeRule;
use seatable_mysync::transform::{Record, format_amount};
use seatable_mysync::merge;
use serde_json::json;
use std::str::FromStr;

fn record(value: serde_json::Value) -> Record {
    match value {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// Benchmark decimal amount formatting.
fn bench_format_amount(c: &mut Criterion) {
    let values: Vec<BigDecimal> = ["0", "999.95", "1234567.5", "-98765432.1", "1000000000"]
        .iter()
        .map(|s| BigDecimal::from_str(s).unwrap())
        .collect();

    c.bench_function("format_amount", |b| {
        b.iter(|| {
            for v in &values {
                black_box(format_amount(v));
            }
        })
    });
}

/// Benchmark merging an auxiliary dataset into a primary set.
fn bench_merge(c: &mut Criterion) {
    let primary_template: Vec<Record> = (0..1000)
        .map(|i| record(json!({ "id": i, "amt": "100.00" })))
        .collect();
    let auxiliary: Vec<Record> = (0..500)
        .map(|i| record(json!({ "id": i * 2, "paid": "Y" })))
        .collect();
    let rule = MergeRule {
        on_field: "id".into(),
        target_field: "paid".into(),
    };

    c.bench_function("merge_1000x500", |b| {
        b.iter(|| {
            let mut primary = primary_template.clone();
            merge::apply(&mut primary, &auxiliary, &rule);
            black_box(primary)
        })
    });
}

/// Benchmark chunk partitioning of a record set.
fn bench_chunking(c: &mut Criterion) {
    let records: Vec<Record> = (0..10_000).map(|i| record(json!({ "id": i }))).collect();

    c.bench_function("chunk_10000_by_100", |b| {
        b.iter(|| {
            let chunks: Vec<&[Record]> = records.chunks(100).collect();
            black_box(chunks.len())
        })
    });
}

criterion_group!(benches, bench_format_amount, bench_merge, bench_chunking);
criterion_main!(benches);
