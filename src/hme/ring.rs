//! Fixed modulus ring for the additive blinding scheme.
//!
//! Six pairwise-coprime moduli `{p, q, r, s, t, w}` back the full ciphertext,
//! the first two (`p`, `q`) back the simple ciphertext used for comparisons.
//! `u` is the plaintext modulus. All derived CRT constants are computed once on
//! first access and never change afterwards.

use std::sync::OnceLock;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Zero};

const P: &str = "234406548094233827948571379965547188853";
const Q: &str = "583457592311129510314141861330330044443";
const R: &str = "696522972436164062959242838052087531431";
const S: &str = "374670603170509799404699393785831797599";
const T: &str = "443137959904584298054176676987615849169";
const W: &str = "391475886865055383118586393345880578361";
const U: &str = "2355788435550222327802749264573303139783";

/// Number of residues in a full ciphertext.
pub const FULL_ARITY: usize = 6;
/// Number of residues in a simple ciphertext.
pub const SIMPLE_ARITY: usize = 2;

/// CRT basis over a set of moduli.
///
/// `partial[i] = product / moduli[i]` and `inverse[i] = partial[i]^-1 mod moduli[i]`.
#[derive(Debug, Clone)]
pub struct CrtBasis {
    pub moduli: Vec<BigInt>,
    pub product: BigInt,
    pub partial: Vec<BigInt>,
    pub inverse: Vec<BigInt>,
}

impl CrtBasis {
    fn new(moduli: Vec<BigInt>) -> Self {
        let product = moduli.iter().fold(BigInt::one(), |acc, m| acc * m);
        let partial: Vec<BigInt> = moduli.iter().map(|m| &product / m).collect();
        let inverse = partial
            .iter()
            .zip(&moduli)
            .map(|(n, m)| mod_inverse(n, m))
            .collect();
        Self {
            moduli,
            product,
            partial,
            inverse,
        }
    }

    /// Reconstruct `x mod product` from residues and center it into `(-product/2, product/2]`.
    ///
    /// Residues are reduced mod their own modulus first, so callers may pass
    /// unreduced values.
    pub fn reconstruct_centered(&self, residues: &[BigInt]) -> BigInt {
        let mut acc = BigInt::zero();
        for (i, c) in residues.iter().enumerate() {
            let m = &self.moduli[i];
            acc += c.mod_floor(m) * &self.inverse[i] * &self.partial[i];
        }
        let x = acc.mod_floor(&self.product);
        if x > &self.product / 2 {
            x - &self.product
        } else {
            x
        }
    }
}

/// Process-wide ring parameters.
#[derive(Debug, Clone)]
pub struct Ring {
    /// Basis over all six moduli (`N`).
    pub full: CrtBasis,
    /// Basis over `p, q` only (`N2`).
    pub simple: CrtBasis,
    /// Plaintext modulus.
    pub u: BigInt,
    /// `floor(u / 2)`
    pub half_u: BigInt,
    /// Bit-length threshold used by the comparison decoder: `floor(bits(u) / 2)`.
    pub gu: u64,
}

impl Ring {
    fn build() -> Self {
        let moduli: Vec<BigInt> = [P, Q, R, S, T, W].iter().map(|s| parse(s)).collect();
        let simple = CrtBasis::new(moduli[..SIMPLE_ARITY].to_vec());
        let full = CrtBasis::new(moduli);
        let u = parse(U);
        let half_u = &u / 2;
        let gu = u.bits() / 2;
        Self {
            full,
            simple,
            u,
            half_u,
            gu,
        }
    }

    /// `p` and `q`, the moduli behind a simple ciphertext.
    pub fn simple_moduli(&self) -> &[BigInt] {
        &self.simple.moduli
    }

    pub fn full_moduli(&self) -> &[BigInt] {
        &self.full.moduli
    }

    /// Reduce mod `u` into `[0, u)`.
    pub fn reduce_u(&self, x: &BigInt) -> BigInt {
        x.mod_floor(&self.u)
    }

    /// Reduce mod `u` and center into the signed plaintext range.
    pub fn center_u(&self, x: &BigInt) -> BigInt {
        let v = self.reduce_u(x);
        if v > self.half_u {
            v - &self.u
        } else {
            v
        }
    }
}

pub fn ring() -> &'static Ring {
    static RING: OnceLock<Ring> = OnceLock::new();
    RING.get_or_init(Ring::build)
}

fn parse(s: &str) -> BigInt {
    // 定数文字列は固定なので失敗しない
    s.parse().unwrap_or_else(|_| unreachable!("invalid ring constant {s}"))
}

/// `a^-1 mod m` via the extended Euclidean algorithm.
fn mod_inverse(a: &BigInt, m: &BigInt) -> BigInt {
    let e = a.mod_floor(m).extended_gcd(m);
    e.x.mod_floor(m)
}
