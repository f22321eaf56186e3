//! Benchmarks for level resolution
//!
//! Measures performance of:
//! - Haversine distance
//! - Smallest-containing-level lookup at each ring of the ladder

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use outbreak_geo::{GeoPoint, LevelLadder};

const ORIGIN: GeoPoint = GeoPoint::new(35.6762, 139.6503);

fn bench_distance(c: &mut Criterion) {
    let other = ORIGIN.offset_north_km(12.0);
    c.bench_function("distance_km", |b| {
        b.iter(|| black_box(ORIGIN).distance_km(black_box(&other)))
    });
}

fn bench_resolve(c: &mut Criterion) {
    let ladder = LevelLadder::default();
    let mut group = c.benchmark_group("resolve");

    for &km in &[0.2f64, 2.0, 8.0, 40.0, 400.0] {
        let point = ORIGIN.offset_north_km(km);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(km), &point, |b, p| {
            b.iter(|| ladder.resolve(black_box(&ORIGIN), black_box(p)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_distance, bench_resolve);
criterion_main!(benches);
