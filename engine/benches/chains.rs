//! Performance benchmarks for the chain pipeline.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use rtcrack_commons::{generate_word_into, HashAlgorithm, Reducer, ASCII};
use rtcrack_engine::{simd_hash, SimdHashBuffer, MAX_HASH_SIZE, SIMD_LANES};

fn bench_word_generation(c: &mut Criterion) {
    let mut buffer = [0u8; 16];
    let base = rtcrack_commons::word_length_index(8, ASCII).unwrap();

    c.bench_function("generate_word_into", |b| {
        let mut counter = base;
        b.iter(|| {
            counter += 1;
            generate_word_into(black_box(&mut buffer), counter, ASCII)
        })
    });
}

fn bench_reducers(c: &mut Criterion) {
    let digest = HashAlgorithm::Sha1.hash(b"benchmark");
    let mut dest = [0u8; 8];

    let bytewise = Reducer::new(8, 8, 20, ASCII);
    c.bench_function("reduce_bytewise", |b| {
        let mut column = 0;
        b.iter(|| {
            column += 1;
            bytewise.reduce(black_box(&mut dest), &digest, column)
        })
    });

    let modulo = Reducer::new(1, 8, 20, ASCII);
    c.bench_function("reduce_modulo", |b| {
        let mut column = 0;
        b.iter(|| {
            column += 1;
            modulo.reduce(black_box(&mut dest), &digest, column)
        })
    });
}

fn bench_hash_reduce_cycle(c: &mut Criterion) {
    let algorithm = HashAlgorithm::Sha1;
    let hash_width = algorithm.digest_size();
    let reducer = Reducer::new(8, 8, hash_width, ASCII);

    let mut words = SimdHashBuffer::new(8, SIMD_LANES);
    let mut hashes = [0u8; MAX_HASH_SIZE * SIMD_LANES];
    for lane in 0..SIMD_LANES {
        let length = generate_word_into(
            words.lane_mut(lane),
            rtcrack_commons::word_length_index(8, ASCII).unwrap() + lane as u128,
            ASCII,
        )
        .unwrap();
        words.set_length(lane, length);
    }

    // one full column across all lanes, the inner loop of a build block
    c.bench_function("hash_reduce_column", |b| {
        let mut column = 0;
        b.iter(|| {
            column += 1;
            simd_hash(algorithm, &words, &mut hashes);
            for lane in 0..SIMD_LANES {
                let digest = &hashes[lane * hash_width..(lane + 1) * hash_width];
                let length = reducer.reduce(words.lane_mut(lane), digest, column);
                words.set_length(lane, length);
            }
        })
    });
}

criterion_group!(
    benches,
    bench_word_generation,
    bench_reducers,
    bench_hash_reduce_cycle
);
criterion_main!(benches);
