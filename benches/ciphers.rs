//! Benchmarks for the program stream layers.
//!
//! Measures the throughput of the XOR layer, scrambled primitive reads through
//! it, and the chain cipher including its key derivation.

extern crate eazdevirt;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use eazdevirt::{
    crypto::{xor_transform, ChainKey, CounterSeed, CryptoContext, StreamSpec},
    decoder::{PermutationProfile, PrimitiveReader, ProfileKind, ScrambledProfiles},
    metadata::Token,
};
use std::{hint::black_box, sync::Arc};

const SIZE: usize = 64 * 1024;

fn payload() -> Vec<u8> {
    (0..SIZE).map(|i| (i * 31 % 251) as u8).collect()
}

/// Benchmark the raw XOR transform over 64 KiB.
fn bench_xor_transform(c: &mut Criterion) {
    let data = payload();
    let mut group = c.benchmark_group("xor");
    group.throughput(Throughput::Bytes(SIZE as u64));
    group.bench_function("xor_transform", |b| {
        b.iter(|| {
            let mut buffer = data.clone();
            xor_transform(black_box(&mut buffer), 0xDEAD_BEEF, 0);
            black_box(buffer)
        });
    });
    group.finish();
}

/// Benchmark reading scrambled `u32` values through an XOR layered stream.
fn bench_scrambled_reads(c: &mut Criterion) {
    let spec = StreamSpec::new(Arc::from(payload()), vec![CryptoContext::Xor(0xDEAD_BEEF)]);
    let stream = spec.open().unwrap();
    let general =
        PermutationProfile::from_orders(&[1, 0], &[2, 3, 0, 1], &[7, 6, 5, 4, 3, 2, 1, 0])
            .unwrap();

    let profiles = Arc::new(ScrambledProfiles::new(general, PermutationProfile::identity()));

    let mut group = c.benchmark_group("reader");
    group.throughput(Throughput::Bytes(SIZE as u64));
    group.bench_function("read_u32", |b| {
        b.iter(|| {
            let cursor = stream.cursor(CounterSeed::Position).unwrap();
            let mut reader = PrimitiveReader::new(cursor, profiles.clone());
            reader.set_profile(ProfileKind::General);
            let mut sum = 0u32;
            for _ in 0..SIZE / 4 {
                sum = sum.wrapping_add(reader.read_u32().unwrap());
            }
            black_box(sum)
        });
    });
    group.finish();
}

/// Benchmark the chain cipher: key derivation alone, and a 4 KiB range.
fn bench_chain(c: &mut Criterion) {
    let token = Token(0x0600_0012);
    c.bench_function("chain_key_derivation", |b| {
        b.iter(|| black_box(ChainKey::for_range(black_box("hunter2"), token, 0)));
    });

    let key = ChainKey::for_range("hunter2", token, 0);
    let range = &payload()[..4096];
    let cipher = key.encrypt(range);
    let mut group = c.benchmark_group("chain");
    group.throughput(Throughput::Bytes(cipher.len() as u64));
    group.bench_function("decrypt_4k", |b| {
        b.iter(|| black_box(key.decrypt(black_box(&cipher))));
    });
    group.finish();
}

criterion_group!(benches, bench_xor_transform, bench_scrambled_reads, bench_chain);
criterion_main!(benches);
