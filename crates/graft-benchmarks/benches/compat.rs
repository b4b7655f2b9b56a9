//! Version compatibility benchmarks
//!
//! Range parsing, satisfaction checks and strategy resolution.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use graft_benchmarks::criterion_config;
use graft_core::types::{MergeStrategy, Version, VersionReq};
use graft_resolver::{analyze_compatibility, resolve_conflict, satisfies};

const RANGES: &[&str] = &[
    "^18.2.0",
    "~5.1.3",
    ">=16.8.0 <19.0.0",
    "1.2.x",
    "^14.0.0 || ^16.0.0 || >=18.0.0",
    "1.0.0 - 2.9999.9999",
    "=4.17.21",
    "*",
];

fn bench_range_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_parsing");
    group.throughput(Throughput::Elements(RANGES.len() as u64));
    group.bench_function("parse_all", |b| {
        b.iter(|| {
            for range in RANGES {
                black_box(VersionReq::parse(black_box(range)).ok());
            }
        })
    });
    group.finish();
}

fn bench_satisfies(c: &mut Criterion) {
    let mut group = c.benchmark_group("satisfies");
    let versions: Vec<String> = (0..100).map(|i| format!("{}.{}.{}", i % 20, i % 7, i % 3)).collect();

    for range in ["^18.2.0", ">=16.8.0 <19.0.0", "^14.0.0 || ^16.0.0 || >=18.0.0"] {
        group.throughput(Throughput::Elements(versions.len() as u64));
        group.bench_with_input(BenchmarkId::new("string", range), &range, |b, range| {
            b.iter(|| versions.iter().filter(|version| satisfies(version, range)).count())
        });

        let req = VersionReq::parse(range).expect("benchmark range parses");
        let parsed: Vec<Version> = versions.iter().filter_map(|v| Version::parse(v).ok()).collect();
        group.bench_with_input(BenchmarkId::new("parsed", range), &req, |b, req| {
            b.iter(|| parsed.iter().filter(|version| req.matches(version)).count())
        });
    }
    group.finish();
}

fn bench_conflict_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("conflict_resolution");
    let pairs = [
        ("^17.0.0", "^18.0.0"),
        ("~5.1.0", "^5.0.0"),
        ("^16.8.0", "^18.2.0"),
        ("4.17.21", "^4.17.0"),
    ];

    for strategy in [MergeStrategy::Highest, MergeStrategy::Compatible, MergeStrategy::Smart] {
        group.bench_with_input(BenchmarkId::new("strategy", strategy), &strategy, |b, &strategy| {
            b.iter(|| {
                for (left, right) in pairs {
                    black_box(resolve_conflict(black_box(left), black_box(right), strategy));
                }
            })
        });
    }

    group.bench_function("analyze_compatibility", |b| {
        b.iter(|| {
            for (left, right) in pairs {
                black_box(analyze_compatibility(left, right));
            }
        })
    });
    group.finish();
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_range_parsing, bench_satisfies, bench_conflict_resolution
}
criterion_main!(benches);
