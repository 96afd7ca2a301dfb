use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Bencher, BenchmarkId, Criterion};
use densecsv::config::ReaderConfig;
use densecsv::sink::VecSinkFactory;
use densecsv::tokenizer::StdDoubleParser;
use densecsv::{read, ReadOptions};

fn prepare(rows: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(rows * 24);
    buf.extend_from_slice(b"id,name,score\n");
    for i in 0..rows {
        buf.extend_from_slice(format!("{},user{},{}.5\n", i, i % 4096, i % 100).as_bytes());
    }
    buf
}

fn read_sequential(b: &mut Bencher, slice: &[u8]) {
    let config = ReaderConfig::default();
    let sink_factory = VecSinkFactory;
    let double_parser = StdDoubleParser;
    let opts = ReadOptions::new(&config, &sink_factory, &double_parser);
    b.iter(|| {
        let result = read(black_box(slice), &opts).unwrap();
        black_box(result.rows);
    })
}

fn read_concurrent(b: &mut Bencher, slice: &[u8]) {
    let config = ReaderConfig { concurrent: true, ..Default::default() };
    let sink_factory = VecSinkFactory;
    let double_parser = StdDoubleParser;
    let opts = ReadOptions::new(&config, &sink_factory, &double_parser);
    b.iter(|| {
        let result = read(black_box(slice), &opts).unwrap();
        black_box(result.rows);
    })
}

fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");
    for i in [1_000, 10_000, 50_000, 100_000] {
        let data = prepare(i);
        group.bench_with_input(BenchmarkId::new("sequential", i), &data, |b, data| {
            read_sequential(b, data)
        });
        group.bench_with_input(BenchmarkId::new("concurrent", i), &data, |b, data| {
            read_concurrent(b, data)
        });
    }
    group.finish();
}

criterion_group!(benches, bench_read);
criterion_main!(benches);
