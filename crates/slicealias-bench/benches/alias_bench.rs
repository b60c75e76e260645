//! Aliasing overhead benchmarks.
//!
//! Compares zero-copy aliasing with and without checksum monitoring against
//! an owned copy of the same bytes.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use slicealias::{MonitorConfig, MonitorContext, RawView, SafetyMode, as_str, convert_view, of_str};
use slicealias_bench::{SIZES, leaked_text};

fn context(mode: SafetyMode) -> MonitorContext {
    let ctx = MonitorContext::new(MonitorConfig::default().with_mode(mode));
    ctx.set_violation_handler(|v| panic!("unexpected violation: {v}"));
    ctx
}

fn bench_of_str(c: &mut Criterion) {
    let disabled = context(SafetyMode::Disabled);
    let best_effort = context(SafetyMode::BestEffort);
    let mut group = c.benchmark_group("of_str");

    for &size in SIZES {
        let text = leaked_text(size);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("disabled", size), &text, |b, &t| {
            b.iter(|| black_box(of_str(&disabled, black_box(t))));
        });
        group.bench_with_input(BenchmarkId::new("best_effort", size), &text, |b, &t| {
            b.iter(|| {
                black_box(of_str(&best_effort, black_box(t)));
                best_effort.flush_pending()
            });
        });
        group.bench_with_input(BenchmarkId::new("copy", size), &text, |b, &t| {
            b.iter(|| black_box(black_box(t).as_bytes().to_vec()));
        });
    }
    group.finish();
}

fn bench_as_str(c: &mut Criterion) {
    let disabled = context(SafetyMode::Disabled);
    let mut group = c.benchmark_group("as_str");

    for &size in SIZES {
        let bytes = leaked_text(size).as_bytes();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("disabled", size), &bytes, |b, &raw| {
            b.iter(|| black_box(as_str(&disabled, black_box(raw))));
        });
        group.bench_with_input(BenchmarkId::new("string_copy", size), &bytes, |b, &raw| {
            b.iter(|| black_box(String::from_utf8(black_box(raw).to_vec())));
        });
    }
    group.finish();
}

fn bench_convert_view(c: &mut Criterion) {
    let mut words = vec![0u64; 512];
    let src = RawView::from_vec(&mut words);
    c.bench_function("convert_view_u64_to_u8", |b| {
        b.iter(|| black_box(convert_view::<u8, u64>(black_box(&src))));
    });
}

criterion_group!(benches, bench_of_str, bench_as_str, bench_convert_view);
criterion_main!(benches);
