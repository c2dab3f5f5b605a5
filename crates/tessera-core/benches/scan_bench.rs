//! # Scan Benchmarks
//!
//! Performance benchmarks for discovery and full lifecycle batches.
//!
//! Run with: `cargo bench -p tessera-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use tessera_core::{
    BatchId, Component, DescriptorTable, Document, Manager, ManagerConfig, NodeId, Registry,
    Scanner, async_trait,
};
use tokio::task::LocalSet;

struct Noop;

#[async_trait(?Send)]
impl Component for Noop {}

fn registry() -> Registry {
    let mut registry = Registry::new();
    registry.register("w", || Noop, None).expect("register");
    registry
}

/// `size` sibling markers, each wrapping a plain element.
fn create_flat_document(size: usize) -> Document {
    let mut document = Document::new();
    let root = document.root();
    for _ in 0..size {
        let marker = document.create_element("div");
        document.append_child(root, marker).expect("append");
        document
            .set_attribute(marker, "data-component", "w")
            .expect("marker");
        let filler = document.create_element("span");
        document.append_child(marker, filler).expect("append");
    }
    document
}

/// A chain of `size` markers, each nested in the previous one.
fn create_nested_document(size: usize) -> Document {
    let mut document = Document::new();
    let mut parent: NodeId = document.root();
    for _ in 0..size {
        let marker = document.create_element("section");
        document.append_child(parent, marker).expect("append");
        document
            .set_attribute(marker, "data-component", "w")
            .expect("marker");
        parent = marker;
    }
    document
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    let registry = registry();
    let config = ManagerConfig::default();

    for size in [100, 500, 1000].iter() {
        let flat = create_flat_document(*size);
        group.bench_with_input(BenchmarkId::new("flat", size), &flat, |b, document| {
            b.iter(|| {
                let mut table = DescriptorTable::default();
                let discovery = Scanner::new(
                    document,
                    document.root(),
                    &registry,
                    &mut table,
                    &config,
                    BatchId(0),
                )
                .into_discovery();
                black_box(discovery.descriptors.len())
            });
        });

        let nested = create_nested_document(*size);
        group.bench_with_input(BenchmarkId::new("nested", size), &nested, |b, document| {
            b.iter(|| {
                let mut table = DescriptorTable::default();
                let discovery = Scanner::new(
                    document,
                    document.root(),
                    &registry,
                    &mut table,
                    &config,
                    BatchId(0),
                )
                .into_discovery();
                black_box(discovery.descriptors.len())
            });
        });
    }

    group.finish();
}

fn bench_rescan(c: &mut Criterion) {
    let mut group = c.benchmark_group("rescan");
    let registry = registry();
    let config = ManagerConfig::default();

    for size in [100, 500, 1000].iter() {
        let document = create_flat_document(*size);
        let mut table = DescriptorTable::default();
        let _ = Scanner::new(
            &document,
            document.root(),
            &registry,
            &mut table,
            &config,
            BatchId(0),
        )
        .into_discovery();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let discovery = Scanner::new(
                    &document,
                    document.root(),
                    &registry,
                    &mut table,
                    &config,
                    BatchId(1),
                )
                .into_discovery();
                black_box(discovery.descriptors.is_empty())
            });
        });
    }

    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");

    for size in [100, 500].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let manager = Manager::new(
                    create_flat_document(size),
                    registry(),
                    ManagerConfig::default(),
                );
                let report = LocalSet::new().block_on(&runtime, manager.update(None));
                black_box(report.entered.len())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_scan, bench_rescan, bench_batch);
criterion_main!(benches);
