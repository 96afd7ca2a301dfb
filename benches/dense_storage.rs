use std::hint::black_box;
use std::thread;

use criterion::{criterion_group, criterion_main, Bencher, BenchmarkId, Criterion};
use densecsv::byte_slice::ByteSlice;
use densecsv::storage::{channel, DEFAULT_MAX_UNOBSERVED_PAGES};

fn single_threaded_round_trip(b: &mut Bencher, cells: usize) {
    b.iter(|| {
        let (mut w, mut r) = channel(DEFAULT_MAX_UNOBSERVED_PAGES);
        for i in 0..cells {
            let s = i.to_string();
            w.append(ByteSlice::whole(s.as_bytes()));
        }
        w.finish();
        while let Some(cell) = r.try_get_next_slice().unwrap() {
            black_box(cell);
        }
    })
}

fn cross_thread_round_trip(b: &mut Bencher, cells: usize) {
    b.iter(|| {
        let (mut w, mut r) = channel(DEFAULT_MAX_UNOBSERVED_PAGES);
        thread::scope(|scope| {
            scope.spawn(move || {
                for i in 0..cells {
                    let s = i.to_string();
                    w.append(ByteSlice::whole(s.as_bytes()));
                }
                w.finish();
            });
            scope.spawn(move || {
                while let Some(cell) = r.try_get_next_slice().unwrap() {
                    black_box(cell);
                }
            });
        });
    })
}

fn bench_dense_storage(c: &mut Criterion) {
    let mut group = c.benchmark_group("dense_storage");
    for i in [1_000, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::new("single_thread", i), &i, |b, i| {
            single_threaded_round_trip(b, *i)
        });
        group.bench_with_input(BenchmarkId::new("cross_thread", i), &i, |b, i| {
            cross_thread_round_trip(b, *i)
        });
    }
    group.finish();
}

criterion_group!(benches, bench_dense_storage);
criterion_main!(benches);
