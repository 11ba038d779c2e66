//! Benchmarks for dependency tracking and cache invalidation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use polyweave_incremental::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct BenchError;

impl From<TaskAborted> for BenchError {
    fn from(_: TaskAborted) -> Self {
        BenchError
    }
}

struct BenchStages;

impl Pipeline for BenchStages {
    type Parsed = Arc<String>;
    type Scanned = Arc<Vec<DocPath>>;
    type Analyzed = Arc<String>;
    type Error = BenchError;
}

fn doc(i: usize) -> DocPath {
    DocPath::new(format!("doc-{i}.html"))
}

/// A chain doc-0 -> doc-1 -> ... -> doc-(n-1), closed into a cycle
fn chain_graph(n: usize) -> DependencyGraph {
    let graph = DependencyGraph::new();
    for i in 0..n {
        graph.add_document(doc(i), [doc((i + 1) % n)]);
    }
    graph
}

/// A fully analyzed cache over the same chain
fn analyzed_cache(n: usize) -> AnalysisCache<BenchStages> {
    let cache = AnalysisCache::<BenchStages>::new();
    for i in 0..n {
        let imports = Arc::new(vec![doc((i + 1) % n)]);
        cache.parsed().set(doc(i), Arc::new(format!("source {i}")));
        cache.scanned().set(doc(i), imports.clone());
        cache.scanned_documents().insert(doc(i), imports);
        cache.dependencies_scanned().set(doc(i), ());
        let analyzed = Arc::new(format!("analysis {i}"));
        cache.analyzed().set(doc(i), analyzed.clone());
        cache.analyzed_documents().insert(doc(i), analyzed);
        cache.dependency_graph().add_document(doc(i), [doc((i + 1) % n)]);
    }
    cache
}

fn bench_dependants(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_all_dependants_of");
    for size in [10, 100, 1000] {
        let graph = chain_graph(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(graph.get_all_dependants_of(&doc(0))))
        });
    }
    group.finish();
}

fn bench_readiness(c: &mut Criterion) {
    let mut group = c.benchmark_group("is_ready");
    for size in [10, 100, 1000] {
        let graph = chain_graph(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(graph.is_ready(&doc(0))))
        });
    }
    group.finish();
}

fn bench_invalidate(c: &mut Criterion) {
    let mut group = c.benchmark_group("invalidate");
    for size in [10, 100, 1000] {
        let cache = analyzed_cache(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(cache.invalidate(&[doc(size / 2)])))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_dependants, bench_readiness, bench_invalidate);
criterion_main!(benches);
