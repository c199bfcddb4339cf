//! Blinded comparison gadget over simple ciphertexts.
//!
//! The evaluator never sees the encoded value. It multiplies the encoded
//! difference `value - threshold` by a random even factor `2*r1` and adds a
//! random offset `r2`. The decoder reconstructs mod `p*q`, reduces mod `u`,
//! and only looks at the bit length of what is left:
//!
//! - a non-negative difference stays small, so the bit length is below `gu`;
//! - a negative difference wraps to just under `u`, so the bit length is above `gu`.
//!
//! So a decoded `1` means the encoded quantity is *below* the threshold.

use num_bigint::BigInt;
use num_integer::Integer;
use rand::Rng;

use super::cipher::Ciphertext2;
use super::ring::ring;

/// Exclusive upper bound of the multiplicative blinding factor `r1`.
pub const R1_MAX: u64 = 1 << 22;
/// Exclusive upper bound of the additive blinding factor `r2`.
pub const R2_MAX: u64 = 1 << 10;

/// Decoded comparison outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Difference stayed small: encoded value >= threshold.
    NotBelow,
    /// Difference wrapped: encoded value < threshold.
    Below,
    /// Bit length landed exactly on `gu`; callers treat this as false.
    Indeterminate,
}

impl Comparison {
    /// Wire value: `0`, `1` or `-1`.
    pub fn code(self) -> i8 {
        match self {
            Comparison::NotBelow => 0,
            Comparison::Below => 1,
            Comparison::Indeterminate => -1,
        }
    }

    pub fn is_below(self) -> bool {
        self == Comparison::Below
    }
}

#[derive(Debug, Clone, Copy)]
struct Blinding {
    r1: u64,
    r2: u64,
}

impl Blinding {
    fn draw<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            r1: rng.gen_range(1..R1_MAX),
            r2: rng.gen_range(1..R2_MAX),
        }
    }

    /// `r2 + 2*r1*diff mod m`
    fn apply(&self, diff: BigInt, m: &BigInt) -> BigInt {
        (BigInt::from(self.r2) + BigInt::from(2 * self.r1) * diff).mod_floor(m)
    }
}

pub fn blind_compare_with<R: Rng + ?Sized>(
    rng: &mut R,
    c: &Ciphertext2,
    threshold: i64,
    scale: i64,
) -> Ciphertext2 {
    let blinding = Blinding::draw(rng);
    let moduli = ring().simple_moduli();
    Ciphertext2(std::array::from_fn(|i| {
        let diff = &c.0[i] * scale - BigInt::from(scale) * threshold;
        blinding.apply(diff, &moduli[i])
    }))
}

/// Blind `scale*value - scale*threshold` for an encoded `value` and a plaintext threshold.
pub fn blind_compare(c: &Ciphertext2, threshold: i64, scale: i64) -> Ciphertext2 {
    blind_compare_with(&mut rand::thread_rng(), c, threshold, scale)
}

pub fn blind_compare_pair_with<R: Rng + ?Sized>(
    rng: &mut R,
    a: &Ciphertext2,
    scale_a: i64,
    b: &Ciphertext2,
    scale_b: i64,
) -> Ciphertext2 {
    let blinding = Blinding::draw(rng);
    let moduli = ring().simple_moduli();
    Ciphertext2(std::array::from_fn(|i| {
        let diff = &a.0[i] * scale_a - &b.0[i] * scale_b;
        blinding.apply(diff, &moduli[i])
    }))
}

/// Blind `scale_a*a - scale_b*b` for two encoded values.
pub fn blind_compare_pair(a: &Ciphertext2, scale_a: i64, b: &Ciphertext2, scale_b: i64) -> Ciphertext2 {
    blind_compare_pair_with(&mut rand::thread_rng(), a, scale_a, b, scale_b)
}

pub fn decode_comparison(c: &Ciphertext2) -> Comparison {
    let ring = ring();
    let x = ring.simple.reconstruct_centered(c.residues());
    let bits = ring.reduce_u(&x).bits();
    match bits.cmp(&ring.gu) {
        std::cmp::Ordering::Less => Comparison::NotBelow,
        std::cmp::Ordering::Greater => Comparison::Below,
        std::cmp::Ordering::Equal => Comparison::Indeterminate,
    }
}
