//! Benchmarks for the notation codec.
//!
//! Measures parsing, canonical printing, building notation from a flat
//! component list and validating against the demo card library.

// Criterion macros generate items without docs - this is expected for benchmarks
// Benchmarks use expect/unwrap for simplicity - panics are acceptable in benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::path::PathBuf;

use cardsmith::dsl;
use cardsmith::{ComponentLibrary, ComponentRegistry, Indexer, LibraryIndex};

fn demo_index() -> LibraryIndex {
    let manifest = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/card_library.json");
    let registry = ComponentRegistry::load_manifest(manifest).expect("demo library loads");
    let descriptors = registry.describe().unwrap();
    let (index, _) = Indexer::build(&descriptors, &registry.overrides()).unwrap();
    index
}

/// A card with `sections` sections of text, an image and a button row.
fn wide_card(sections: usize) -> String {
    let section = "§[δ×2, ǐ, Ƀ[ᵬ×3]]";
    format!("ℂ[{}]", vec![section; sections].join(", "))
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("notation_parse");

    for sections in &[1usize, 10, 100] {
        let text = wide_card(*sections);
        group.bench_with_input(BenchmarkId::new("parse", sections), &text, |b, text| {
            b.iter(|| black_box(dsl::parse(black_box(text)).unwrap()));
        });

        let tree = dsl::parse(&text).unwrap();
        group.bench_with_input(BenchmarkId::new("print", sections), &tree, |b, tree| {
            b.iter(|| black_box(black_box(tree).to_string()));
        });
    }

    group.finish();
}

fn bench_index_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("notation_index");
    let index = demo_index();

    let items = [
        "Card",
        "Section",
        "DecoratedText",
        "DecoratedText",
        "Image",
        "ButtonList",
        "Button",
        "Button",
    ];
    group.bench_function("build", |b| {
        b.iter(|| black_box(dsl::build(&index, black_box(&items)).unwrap()));
    });

    for sections in &[1usize, 10] {
        let tree = dsl::parse(&wide_card(*sections)).unwrap();
        group.bench_with_input(BenchmarkId::new("validate", sections), &tree, |b, tree| {
            b.iter(|| black_box(dsl::validate(black_box(tree), &index)));
        });
        group.bench_with_input(BenchmarkId::new("expand", sections), &tree, |b, tree| {
            b.iter(|| black_box(dsl::expand(black_box(tree), &index).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_index_ops);
criterion_main!(benches);
