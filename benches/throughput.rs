//! Scalar hashing and pattern enumeration throughput benchmarks.
//!
//! The GPU path is measured end to end by the binary itself; these
//! benches pin down the two host-side hot loops that feed it.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use jenhash::candidate::Candidate;
use jenhash::lookup3;
use jenhash::pattern::Pattern;

/// Synthetic candidate corpus: path-like keys of mixed lengths.
fn test_lines() -> Vec<Vec<u8>> {
    (0..4096)
        .map(|i| format!("CREATURE\\KOBOLD\\KOBOLD{i:04}.M2").into_bytes())
        .collect()
}

fn bench_hashlittle(c: &mut Criterion) {
    let lines = test_lines();
    let total_bytes: usize = lines.iter().map(Vec::len).sum();

    let mut group = c.benchmark_group("hashlittle");
    group.throughput(Throughput::Bytes(total_bytes as u64));
    group.bench_function("corpus", |b| {
        b.iter(|| {
            let mut acc = 0u32;
            for line in &lines {
                acc ^= lookup3::hashlittle(line, 0);
            }
            black_box(acc)
        })
    });
    group.finish();
}

fn bench_pattern_enumeration(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern");

    for (id, expr) in [
        ("class_fixed", "[alnum]{4}"),
        ("class_varying", "[hex]{1,5}"),
        ("mixed", "ITEM/[a-f]{2}/(IDLE|WALK|RUN)[0-9]{2}.M2"),
    ] {
        let count = Pattern::new(expr).unwrap().count();
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::new("enumerate", id), expr, |b, expr| {
            b.iter(|| {
                let mut pattern = Pattern::new(expr).unwrap();
                let mut candidate = Candidate::default();
                let mut produced = 0u64;
                while pattern.write(&mut candidate) {
                    produced += 1;
                }
                black_box(produced)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_hashlittle, bench_pattern_enumeration);
criterion_main!(benches);
