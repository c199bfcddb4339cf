use std::time::Instant;

use anyhow::{Context, Result};
use fallwatch::hme::{decode_full, encode_full, plaintext_bounds};
use fallwatch::pose::{EncodedFeatures, RawFeatureValues};
use num_bigint::{BigInt, RandBigInt};

fn main() -> Result<()> {
    // Usage: bench_hme [iterations]
    let iterations: u32 = match std::env::args().nth(1) {
        Some(s) => s.parse().with_context(|| format!("invalid iteration count: {}", s))?,
        None => 1000,
    };
    let iterations = iterations.max(1);

    let raw = RawFeatureValues {
        torso_angle: 8500,
        thigh_uprightness: 7000,
        thigh_length: 10000,
        calf_length: 10000,
        torso_height: 12000,
        leg_length: 20000,
    };

    // 6特徴量の暗号化
    let start = Instant::now();
    let mut encoded = EncodedFeatures::encode(&raw);
    for _ in 1..iterations {
        encoded = EncodedFeatures::encode(&raw);
    }
    let encode_ms = start.elapsed().as_secs_f64() * 1000.0 / iterations as f64;

    // 6比較
    let start = Instant::now();
    let mut comparisons = encoded.compare();
    for _ in 1..iterations {
        comparisons = encoded.compare();
    }
    let compare_ms = start.elapsed().as_secs_f64() * 1000.0 / iterations as f64;

    // ラベル復元
    let start = Instant::now();
    let mut label = comparisons.decode().label();
    for _ in 1..iterations {
        label = comparisons.decode().label();
    }
    let decode_ms = start.elapsed().as_secs_f64() * 1000.0 / iterations as f64;

    // フル暗号文の往復 (平文域全体から一様に)
    let (lo, hi) = plaintext_bounds();
    let hi = hi + 1;
    let mut rng = rand::thread_rng();
    let plaintexts: Vec<BigInt> = (0..iterations).map(|_| rng.gen_bigint_range(&lo, &hi)).collect();
    let start = Instant::now();
    let mut mismatches = 0u32;
    for m in &plaintexts {
        if &decode_full(&encode_full(m.clone())) != m {
            mismatches += 1;
        }
    }
    let full_ms = start.elapsed().as_secs_f64() * 1000.0 / iterations as f64;

    println!("=== HME bench ({}) ===", env!("GIT_VERSION"));
    println!("iterations: {}", iterations);
    println!("encode 6 features:  {:.4}ms", encode_ms);
    println!("6 comparisons:      {:.4}ms", compare_ms);
    println!("decode label:       {:.4}ms  -> {}", decode_ms, label);
    println!("full round trip:    {:.4}ms  ({} mismatches)", full_ms, mismatches);

    Ok(())
}
