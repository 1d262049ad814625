//! Benchmarks for multi-vector retrieval.
//!
//! Measures:
//! - RRF fusion of three ranked lists at growing list lengths
//! - The full search path: query embedding, one query per named vector,
//!   payload filtering and fusion

// Criterion macros generate items without docs - this is expected for benchmarks
// Benchmarks use expect/unwrap for simplicity - panics are acceptable in benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::json;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use cardsmith::embedding::HashEmbedder;
use cardsmith::models::{PointFilter, PointType};
use cardsmith::services::{MultiVectorRetriever, PointTexts, RankedList, RrfFusion};
use cardsmith::storage::{InMemoryVectorStore, Point, VectorStore};

const WIDGETS: &[&str] = &[
    "button", "image", "grid", "divider", "header", "paragraph", "columns", "icon", "chip",
    "carousel",
];

fn ranked_lists(len: usize) -> Vec<RankedList> {
    let ids: Vec<String> = (0..len).map(|i| format!("cmp_card.W{i}")).collect();
    let forward: Vec<&str> = ids.iter().map(String::as_str).collect();
    let mut reversed = forward.clone();
    reversed.reverse();
    let interleaved: Vec<&str> = forward
        .iter()
        .step_by(2)
        .chain(forward.iter().skip(1).step_by(2))
        .copied()
        .collect();
    vec![
        RankedList::from_ids("identity", &forward),
        RankedList::from_ids("content", &reversed),
        RankedList::from_ids("structure", &interleaved),
    ]
}

fn populated_retriever(count: usize) -> MultiVectorRetriever {
    let retriever = MultiVectorRetriever::new(
        Arc::new(InMemoryVectorStore::new()),
        Arc::new(HashEmbedder::new()),
    );
    let points: Vec<Point> = (0..count)
        .map(|i| {
            let widget = WIDGETS[i % WIDGETS.len()];
            let path = format!("card.widgets.{widget}{i}");
            let texts = PointTexts {
                identity: format!("{widget}{i} {widget}"),
                content: format!("A {widget} widget number {i} for chat cards."),
                structure: format!("card.widgets {widget}"),
            };
            let mut point = Point::new(
                format!("cmp_{path}"),
                json!({"type": "component", "full_path": path, "name": format!("{widget}{i}")}),
            );
            point.vectors = retriever.embed_point(&texts).unwrap();
            point
        })
        .collect();
    retriever.store().upsert(&points).unwrap();
    retriever
}

fn bench_fusion(c: &mut Criterion) {
    let mut group = c.benchmark_group("rrf_fusion");
    let fusion = RrfFusion::new();

    for len in &[10usize, 100, 1_000] {
        let lists = ranked_lists(*len);
        group.bench_with_input(BenchmarkId::new("three_lists", len), len, |b, _| {
            b.iter(|| black_box(fusion.fuse(black_box(&lists))));
        });
    }

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("component_search");
    group.measurement_time(Duration::from_secs(10));
    let filter = PointFilter::new().with_type(PointType::Component);

    for count in &[100usize, 1_000] {
        let retriever = populated_retriever(*count);
        group.bench_with_input(BenchmarkId::new("search_text", count), count, |b, _| {
            b.iter(|| {
                black_box(
                    retriever
                        .search_text(black_box("clickable image button"), &filter, 10)
                        .unwrap(),
                )
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fusion, bench_search);
criterion_main!(benches);
