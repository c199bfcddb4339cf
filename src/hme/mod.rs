//! Lightweight homomorphic-style encoding: additive blinding over a fixed
//! composite modulus with CRT reconstruction.
//!
//! This supports exactly the additions and threshold comparisons the pose
//! classifier needs. It is not a general HE library.

pub mod cipher;
pub mod compare;
pub mod ring;

pub use cipher::{
    decode_full, decode_full_residues, encode_full, encode_full_with, encode_simple, encode_simple_with, plaintext_bounds,
    Ciphertext2, Ciphertext6,
};
pub use compare::{
    blind_compare, blind_compare_pair, blind_compare_pair_with, blind_compare_with, decode_comparison,
    Comparison,
};
pub use ring::{ring, Ring};
