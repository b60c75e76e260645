//! NUL-terminated length scanning benchmarks.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use slicealias::str_len;
use slicealias_bench::{SIZES, c_string};

fn bench_strlen(c: &mut Criterion) {
    let mut group = c.benchmark_group("strlen");

    for &size in SIZES {
        let s = c_string(size);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("slicealias", size), &s, |b, s| {
            // SAFETY: `s` is NUL-terminated.
            b.iter(|| black_box(unsafe { str_len(black_box(s.as_ptr())) }));
        });
        group.bench_with_input(BenchmarkId::new("libc", size), &s, |b, s| {
            // SAFETY: `s` is NUL-terminated.
            b.iter(|| black_box(unsafe { libc::strlen(black_box(s.as_ptr()).cast()) }));
        });
        group.bench_with_input(BenchmarkId::new("safe_rust", size), &s, |b, s| {
            b.iter(|| black_box(s.iter().position(|&c| c == 0)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_strlen);
criterion_main!(benches);
