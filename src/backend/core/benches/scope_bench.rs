//! Benchmarks for scope resolution, filter building and in-memory pagination.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use civica_core::identity::{AccessLevel, SedeId, SubsedeId};
use civica_core::pagination::{Paginator, QueryWindow};
use civica_core::persistence::MemoryRepository;
use civica_core::query::{build, parse_sort, CallerFilters, EntityKind};
use civica_core::scope::resolve_scope;
use serde_json::json;

fn bench_resolve_scope(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_scope");
    group.bench_function("super_admin", |b| { b.iter(|| black_box(resolve_scope(AccessLevel::Subsede, None, None, &[], &[], true))); });
    group.bench_function("sede_no_grants", |b| { b.iter(|| black_box(resolve_scope(AccessLevel::Sede, Some(SedeId(1)), None, &[], &[], false))); });
    for grants in [1usize, 10, 100] {
        let subsedes: Vec<SubsedeId> = (0..grants as i64).map(SubsedeId).collect();
        group.throughput(Throughput::Elements(grants as u64));
        group.bench_with_input(BenchmarkId::new("subsede_grants", grants), &subsedes, |b, s| { b.iter(|| black_box(resolve_scope(AccessLevel::Subsede, None, Some(SubsedeId(7)), &[], s, false))); });
    }
    group.finish();
}

fn bench_build_filters(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_filters");
    let scope = resolve_scope(AccessLevel::Subsede, None, Some(SubsedeId(7)), &[], &[SubsedeId(9)], false);
    let empty = CallerFilters::default();
    let full = CallerFilters::default().with_search("abc-123").with_exact("status", "open").with_exact("paid", "false").with_exact("unknownKey", "x").with_range(Some("2024-01-01"), Some("2024-12-31"));
    group.bench_function("scope_only", |b| { b.iter(|| black_box(build(EntityKind::Fines, &scope, &empty))); });
    group.bench_function("search_exact_range", |b| { b.iter(|| black_box(build(EntityKind::Fines, &scope, &full))); });
    group.bench_function("parse_sort", |b| { b.iter(|| black_box(parse_sort(EntityKind::Fines.schema(), Some("amount:desc,-issued_at,bogus")))); });
    group.finish();
}

fn bench_memory_pagination(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_pagination");
    let rt = tokio::runtime::Runtime::new().unwrap();
    for rows in [100i64, 1_000, 10_000] {
        let repo = MemoryRepository::new();
        repo.extend(EntityKind::Fines, (1..=rows).map(|id| json!({"id": id, "sede_id": 1, "subsede_id": 7 + id % 3, "folio": format!("F-{id}"), "issued_at": "2024-01-01T00:00:00Z"})));
        let paginator = Paginator::new(Arc::new(repo));
        let schema = EntityKind::Fines.schema();
        let scope = resolve_scope(AccessLevel::Subsede, None, Some(SubsedeId(7)), &[], &[SubsedeId(9)], false);
        let predicate = build(EntityKind::Fines, &scope, &CallerFilters::default());
        let order = parse_sort(schema, None);
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::new("page_with_prefetch", rows), &rows, |b, _| {
            b.to_async(&rt).iter(|| async { black_box(paginator.paginate(schema, &predicate, &order, QueryWindow::new(1, 20, 3), true).await.unwrap()) });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_resolve_scope, bench_build_filters, bench_memory_pagination);
criterion_main!(benches);
