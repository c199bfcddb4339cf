//! Ciphertext types and the encode/decode halves of the scheme.
//!
//! A value `m` is blinded as `g*u + m` with a fresh `g` per call, then split into
//! residues over the ring moduli. Residues are kept as non-negative big integers
//! and travel over the wire as decimal strings.

use std::fmt;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::Zero;
use rand::Rng;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ring::{ring, FULL_ARITY, SIMPLE_ARITY};
use crate::error::AnalyticsError;

/// Upper bound (exclusive) of the encoding blinding factor `g`.
pub const G_MAX: u64 = (1 << 32) - 1;

/// Full ciphertext: one residue per ring modulus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext6(pub [BigInt; FULL_ARITY]);

/// Simple ciphertext: residues mod `p` and `q` only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext2(pub [BigInt; SIMPLE_ARITY]);

impl Ciphertext2 {
    /// All-zero ciphertext, the stand-in for a missing wire entry.
    pub fn zero() -> Self {
        Self([BigInt::zero(), BigInt::zero()])
    }

    pub fn residues(&self) -> &[BigInt] {
        &self.0
    }
}

impl Default for Ciphertext2 {
    fn default() -> Self {
        Self::zero()
    }
}

impl Ciphertext6 {
    pub fn residues(&self) -> &[BigInt] {
        &self.0
    }
}

impl TryFrom<Vec<BigInt>> for Ciphertext2 {
    type Error = AnalyticsError;

    fn try_from(v: Vec<BigInt>) -> Result<Self, Self::Error> {
        let got = v.len();
        <[BigInt; SIMPLE_ARITY]>::try_from(v)
            .map(Self)
            .map_err(|_| AnalyticsError::CiphertextArity { expected: SIMPLE_ARITY, got })
    }
}

impl TryFrom<Vec<BigInt>> for Ciphertext6 {
    type Error = AnalyticsError;

    fn try_from(v: Vec<BigInt>) -> Result<Self, Self::Error> {
        let got = v.len();
        <[BigInt; FULL_ARITY]>::try_from(v)
            .map(Self)
            .map_err(|_| AnalyticsError::CiphertextArity { expected: FULL_ARITY, got })
    }
}

fn blind(g: u64, m: BigInt) -> BigInt {
    BigInt::from(g) * &ring().u + m
}

fn residues_of<const K: usize>(x: &BigInt, moduli: &[BigInt]) -> [BigInt; K] {
    std::array::from_fn(|i| x.mod_floor(&moduli[i]))
}

/// Signed plaintext range `[-floor(u/2), floor(u/2)]` that survives a full round trip.
pub fn plaintext_bounds() -> (BigInt, BigInt) {
    let half = &ring().half_u;
    (-half, half.clone())
}

pub fn encode_full_with<R: Rng + ?Sized>(rng: &mut R, m: impl Into<BigInt>) -> Ciphertext6 {
    let g = rng.gen_range(1..G_MAX);
    let x = blind(g, m.into());
    Ciphertext6(residues_of(&x, ring().full_moduli()))
}

/// Encode `m` over all six moduli with a fresh blinding factor.
pub fn encode_full(m: impl Into<BigInt>) -> Ciphertext6 {
    encode_full_with(&mut rand::thread_rng(), m)
}

pub fn encode_simple_with<R: Rng + ?Sized>(rng: &mut R, m: impl Into<BigInt>) -> Ciphertext2 {
    let g = rng.gen_range(1..G_MAX);
    let x = blind(g, m.into());
    Ciphertext2(residues_of(&x, ring().simple_moduli()))
}

/// Encode `m` mod `p, q` with a fresh blinding factor. Only meaningful as input
/// to the comparison gadget.
pub fn encode_simple(m: impl Into<BigInt>) -> Ciphertext2 {
    encode_simple_with(&mut rand::thread_rng(), m)
}

/// CRT-reconstruct a full ciphertext and recover the signed plaintext.
pub fn decode_full(c: &Ciphertext6) -> BigInt {
    decode_full_residues(c.residues())
}

/// Decode from raw wire residues. Any arity other than six decodes to `0`.
pub fn decode_full_residues(residues: &[BigInt]) -> BigInt {
    if residues.len() != FULL_ARITY {
        tracing::debug!(got = residues.len(), "full ciphertext with wrong arity");
        return BigInt::zero();
    }
    let ring = ring();
    let x = ring.full.reconstruct_centered(residues);
    ring.center_u(&x)
}

// --- serde: residues as decimal strings ---

fn serialize_residues<S: Serializer>(residues: &[BigInt], serializer: S) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(residues.len()))?;
    for r in residues {
        seq.serialize_element(&r.to_string())?;
    }
    seq.end()
}

struct ResidueVisitor;

impl<'de> Visitor<'de> for ResidueVisitor {
    type Value = Vec<BigInt>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a sequence of decimal residues")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(FULL_ARITY));
        while let Some(item) = seq.next_element::<Residue>()? {
            out.push(item.0);
        }
        Ok(out)
    }
}

/// A residue accepts either a JSON string or an integer on input.
struct Residue(BigInt);

impl<'de> Deserialize<'de> for Residue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct V;
        impl<'de> Visitor<'de> for V {
            type Value = Residue;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a decimal string or integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Residue, E> {
                v.parse::<BigInt>().map(Residue).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Residue, E> {
                Ok(Residue(BigInt::from(v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Residue, E> {
                Ok(Residue(BigInt::from(v)))
            }
        }
        deserializer.deserialize_any(V)
    }
}

/// Read a wire ciphertext of any length.
pub fn deserialize_residues<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<BigInt>, D::Error> {
    deserializer.deserialize_seq(ResidueVisitor)
}

impl Serialize for Ciphertext2 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_residues(&self.0, serializer)
    }
}

impl Serialize for Ciphertext6 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_residues(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Ciphertext2 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = deserialize_residues(deserializer)?;
        Ciphertext2::try_from(v).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Ciphertext6 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = deserialize_residues(deserializer)?;
        Ciphertext6::try_from(v).map_err(de::Error::custom)
    }
}
