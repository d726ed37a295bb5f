//! Benchmarks for filter compilation, SQL rendering and in-memory estimation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use houm_insight::predicate::sql::render_predicate;
use houm_insight::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn catalog() -> FieldCatalog {
    FieldCatalog::from_config(CatalogConfig::listings(), &BTreeSet::new()).unwrap()
}

fn wide_filters() -> FilterSpec {
    FilterSpec::new()
        .with("min_price", 2_000_000)
        .with("max_price", "5000000")
        .with("min_rooms", 2)
        .with("max_year", 2010)
        .with("municipalities", json!(["Stockholm", "Solna", "Nacka", "Sundbyberg"]))
        .with("districts", json!(["Vasastan", "Södermalm", "Kungsholmen"]))
        .with("housing_forms", "Lägenhet")
        .with("bbox", json!([17.9, 59.2, 18.2, 59.4]))
        .with("prefer_new_construction", true)
}

fn bench_compile(c: &mut Criterion) {
    let catalog = catalog();
    let mut group = c.benchmark_group("compile");

    let cases = [
        ("empty", FilterSpec::new()),
        ("price_range", FilterSpec::new().with("min_price", 1).with("max_price", 2)),
        ("wide", wide_filters()),
    ];
    for (name, spec) in cases {
        group.bench_with_input(BenchmarkId::new("compile", name), &spec, |b, spec| {
            b.iter(|| compile(black_box(spec), black_box(&catalog)));
        });
        let predicate = compile(&spec, &catalog);
        group.bench_with_input(BenchmarkId::new("render", name), &predicate, |b, p| {
            b.iter(|| render_predicate(black_box(p)).unwrap());
        });
    }
    group.finish();
}

fn listings(n: usize) -> Vec<Value> {
    let municipalities = ["Stockholm", "Solna", "Uppsala", "Nacka"];
    (0..n)
        .map(|i| {
            json!({
                "hemnet_id": i,
                "price": 1_000_000 + (i % 97) * 75_000,
                "number_of_rooms": 1 + i % 6,
                "construction_year": (1900 + i % 120).to_string(),
                "municipality_name": municipalities[i % municipalities.len()],
                "districts": [format!("District {}", i % 13)],
            })
        })
        .collect()
}

fn bench_estimate(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("estimate_in_memory");

    for size in [1_000usize, 10_000] {
        let executor =
            InMemoryExecutor::new("listings", listings(size)).with_id_column("hemnet_id");
        let engine = rt
            .block_on(Engine::bootstrap(
                Arc::new(executor),
                CatalogConfig::listings(),
                EngineConfig::default(),
            ))
            .unwrap();
        let request = EstimateRequest::new(
            FilterSpec::new()
                .with("min_price", 2_000_000)
                .with("municipalities", json!(["Stockholm", "Solna"])),
        );

        group.bench_with_input(BenchmarkId::from_parameter(size), &request, |b, request| {
            b.iter(|| rt.block_on(engine.estimate(black_box(request.clone()))).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile, bench_estimate);
criterion_main!(benches);
