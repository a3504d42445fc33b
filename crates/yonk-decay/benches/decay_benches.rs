//! Criterion benchmarks for yonk-decay.
//!
//! Covers: value evaluation mid-life and the default claim split.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use yonk_core::traits::DecayCalculator;
use yonk_core::types::{Amount, DecayParams};
use yonk_decay::engine::LinearDecay;

fn params() -> DecayParams {
    DecayParams {
        start_value: Amount::pow2(200).unwrap(),
        end_value: Amount::from_u64(1_000),
        life_seconds: 86_400,
        start_timestamp: 1_700_000_000,
    }
}

fn bench_value_at(c: &mut Criterion) {
    let engine = LinearDecay::new();
    let p = params();
    let now = p.start_timestamp + 43_200;

    c.bench_function("value_at", |b| {
        b.iter(|| engine.value_at(black_box(&p), black_box(now)))
    });
}

fn bench_claim_split(c: &mut Criterion) {
    let engine = LinearDecay::new();
    let p = params();
    let now = p.start_timestamp + 43_200;

    c.bench_function("claim_split", |b| {
        b.iter(|| engine.claim_split(black_box(&p), black_box(now)))
    });
}

criterion_group!(benches, bench_value_at, bench_claim_split);
criterion_main!(benches);
