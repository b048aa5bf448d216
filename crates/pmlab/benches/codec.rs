// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Frame Codec Benchmark
//!
//! Measures the per-client cost of one generation:
//! - channel subset copy out of the published block
//! - data message encoding (what each sender does per frame)
//! - payload decoding (what each client does per frame)

#![allow(clippy::cast_possible_truncation)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pmlab::protocol::{decode_payload, encode_data_message_into, encode_payload, Frame};

fn block(channels: u32, points: u32) -> Frame {
    let len = channels as usize * points as usize;
    let analog: Vec<f64> = (0..len).map(|i| (i % 10) as f64 / 10.0).collect();
    let digital: Vec<bool> = (0..len).map(|i| i % 7 == 0).collect();
    Frame::new(1_000_000, channels, points, analog, digital).expect("valid block")
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_data_message");
    for points in [10u32, 1024, 8192] {
        let frame = block(8, points);
        group.throughput(Throughput::Elements(frame.sample_count() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(points), &frame, |b, frame| {
            let mut scratch = Vec::new();
            b.iter(|| {
                scratch.clear();
                encode_data_message_into(black_box(frame), &mut scratch);
                black_box(scratch.len())
            });
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_payload");
    for points in [10u32, 1024, 8192] {
        let payload = encode_payload(&block(8, points));
        group.throughput(Throughput::Bytes(payload.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(points), &payload, |b, payload| {
            b.iter(|| decode_payload(black_box(payload)).expect("decode"));
        });
    }
    group.finish();
}

fn bench_select(c: &mut Criterion) {
    let frame = block(32, 1024);
    c.bench_function("select_4_of_32_channels", |b| {
        b.iter(|| frame.select(black_box(&[3, 17, 0, 31])).expect("in range"));
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_select);
criterion_main!(benches);
