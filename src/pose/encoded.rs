//! Encoded-mode classification.
//!
//! The client encodes six scaled features as simple ciphertexts. The server
//! runs six blinded comparisons on them without decoding anything, and the
//! holder of the ring recovers a 2-bit pose code from the comparison bits
//! through a boolean circuit equivalent to [`classify_plain`].
//!
//! [`classify_plain`]: super::classifier::classify_plain

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::classifier::{
    PoseLabel, THIGH_CALF_RATIO, TORSO_HIGH_DEG, TORSO_LEG_RATIO, TORSO_LOW_DEG, UPRIGHT_HIGH_DEG,
    UPRIGHT_LOW_DEG,
};
use super::features::PoseFeatures;
use crate::hme::{blind_compare_pair_with, blind_compare_with, decode_comparison, encode_simple_with, Ciphertext2};

/// Fixed-point scale applied to every feature before encoding.
pub const FEATURE_SCALE: f64 = 100.0;

/// `thigh*10 < calf*7` stands for `thigh/calf < 0.7`.
pub const THIGH_CALF_MUL: (i64, i64) = (10, 7);
/// `torso*10 < leg*5` stands for `torso/leg < 0.5`.
pub const TORSO_LEG_MUL: (i64, i64) = (10, 5);

fn scaled_threshold(deg: f64) -> i64 {
    (deg * FEATURE_SCALE) as i64
}

fn truncate(x: f64) -> i64 {
    (x * FEATURE_SCALE).trunc() as i64
}

/// Scaled, truncated integer features (`x * 100`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFeatureValues {
    #[serde(alias = "Tra")]
    pub torso_angle: i64,
    #[serde(alias = "Tha")]
    pub thigh_uprightness: i64,
    #[serde(alias = "Thl")]
    pub thigh_length: i64,
    #[serde(alias = "cl")]
    pub calf_length: i64,
    #[serde(alias = "Trl")]
    pub torso_height: i64,
    #[serde(alias = "ll")]
    pub leg_length: i64,
}

impl RawFeatureValues {
    pub fn from_features(f: &PoseFeatures) -> Self {
        Self {
            torso_angle: truncate(f.torso_angle),
            thigh_uprightness: truncate(f.thigh_uprightness),
            thigh_length: truncate(f.thigh_length),
            calf_length: truncate(f.calf_length),
            torso_height: truncate(f.torso_height),
            leg_length: truncate(f.leg_length),
        }
    }
}

/// Wire names of the encoded features, with the short names older clients send.
const FEATURE_NAMES: [(&str, &str); 6] = [
    ("torso_angle", "Tra"),
    ("thigh_uprightness", "Tha"),
    ("thigh_length", "Thl"),
    ("calf_length", "cl"),
    ("torso_height", "Trl"),
    ("leg_length", "ll"),
];

const COMPARISON_NAMES: [(&str, &str); 6] = [
    ("t30", "T30"),
    ("t40", "T40"),
    ("t80", "T80"),
    ("t60", "T60"),
    ("tc", "TC"),
    ("tl", "TL"),
];

fn lookup(map: &BTreeMap<String, Ciphertext2>, (name, legacy): (&str, &str)) -> Ciphertext2 {
    map.get(name)
        .or_else(|| map.get(legacy))
        .cloned()
        .unwrap_or_default()
}

/// Six named simple ciphertexts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodedFeatures {
    #[serde(alias = "Tra")]
    pub torso_angle: Ciphertext2,
    #[serde(alias = "Tha")]
    pub thigh_uprightness: Ciphertext2,
    #[serde(alias = "Thl")]
    pub thigh_length: Ciphertext2,
    #[serde(alias = "cl")]
    pub calf_length: Ciphertext2,
    #[serde(alias = "Trl")]
    pub torso_height: Ciphertext2,
    #[serde(alias = "ll")]
    pub leg_length: Ciphertext2,
}

impl EncodedFeatures {
    pub fn encode_with<R: Rng + ?Sized>(rng: &mut R, raw: &RawFeatureValues) -> Self {
        Self {
            torso_angle: encode_simple_with(rng, raw.torso_angle),
            thigh_uprightness: encode_simple_with(rng, raw.thigh_uprightness),
            thigh_length: encode_simple_with(rng, raw.thigh_length),
            calf_length: encode_simple_with(rng, raw.calf_length),
            torso_height: encode_simple_with(rng, raw.torso_height),
            leg_length: encode_simple_with(rng, raw.leg_length),
        }
    }

    pub fn encode(raw: &RawFeatureValues) -> Self {
        Self::encode_with(&mut rand::thread_rng(), raw)
    }

    /// Missing names fall back to an all-zero ciphertext.
    pub fn from_map(map: &BTreeMap<String, Ciphertext2>) -> Self {
        let [a, b, c, d, e, f] = FEATURE_NAMES.map(|n| lookup(map, n));
        Self {
            torso_angle: a,
            thigh_uprightness: b,
            thigh_length: c,
            calf_length: d,
            torso_height: e,
            leg_length: f,
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, Ciphertext2> {
        let values = [
            &self.torso_angle,
            &self.thigh_uprightness,
            &self.thigh_length,
            &self.calf_length,
            &self.torso_height,
            &self.leg_length,
        ];
        FEATURE_NAMES
            .iter()
            .zip(values)
            .map(|((name, _), c)| (name.to_string(), c.clone()))
            .collect()
    }

    /// Run the six blinded comparisons. Each draws its own blinding factors.
    pub fn compare_with<R: Rng + ?Sized>(&self, rng: &mut R) -> ComparisonSet {
        let (thigh_mul, calf_mul) = THIGH_CALF_MUL;
        let (torso_mul, leg_mul) = TORSO_LEG_MUL;
        ComparisonSet {
            t30: blind_compare_with(rng, &self.torso_angle, scaled_threshold(TORSO_LOW_DEG), 1),
            t40: blind_compare_with(rng, &self.thigh_uprightness, scaled_threshold(UPRIGHT_LOW_DEG), 1),
            t80: blind_compare_with(rng, &self.torso_angle, scaled_threshold(TORSO_HIGH_DEG), 1),
            t60: blind_compare_with(rng, &self.thigh_uprightness, scaled_threshold(UPRIGHT_HIGH_DEG), 1),
            tc: blind_compare_pair_with(rng, &self.thigh_length, thigh_mul, &self.calf_length, calf_mul),
            tl: blind_compare_pair_with(rng, &self.torso_height, torso_mul, &self.leg_length, leg_mul),
        }
    }

    pub fn compare(&self) -> ComparisonSet {
        self.compare_with(&mut rand::thread_rng())
    }
}

/// Blinded comparison results, one per classifier threshold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonSet {
    /// torso angle vs 30°
    #[serde(alias = "T30")]
    pub t30: Ciphertext2,
    /// thigh uprightness vs 40°
    #[serde(alias = "T40")]
    pub t40: Ciphertext2,
    /// torso angle vs 80°
    #[serde(alias = "T80")]
    pub t80: Ciphertext2,
    /// thigh uprightness vs 60°
    #[serde(alias = "T60")]
    pub t60: Ciphertext2,
    /// thigh*10 vs calf*7
    #[serde(alias = "TC")]
    pub tc: Ciphertext2,
    /// torso*10 vs leg*5
    #[serde(alias = "TL")]
    pub tl: Ciphertext2,
}

impl ComparisonSet {
    pub fn from_map(map: &BTreeMap<String, Ciphertext2>) -> Self {
        let [t30, t40, t80, t60, tc, tl] = COMPARISON_NAMES.map(|n| lookup(map, n));
        Self { t30, t40, t80, t60, tc, tl }
    }

    pub fn to_map(&self) -> BTreeMap<String, Ciphertext2> {
        let values = [&self.t30, &self.t40, &self.t80, &self.t60, &self.tc, &self.tl];
        COMPARISON_NAMES
            .iter()
            .zip(values)
            .map(|((name, _), c)| (name.to_string(), c.clone()))
            .collect()
    }

    /// Decode every comparison. An indeterminate outcome counts as false.
    pub fn decode(&self) -> ComparisonBits {
        let below = |c: &Ciphertext2| decode_comparison(c).is_below();
        ComparisonBits {
            torso_below_30: below(&self.t30),
            upright_below_40: below(&self.t40),
            torso_below_80: below(&self.t80),
            thigh_calf_below: below(&self.tc),
            torso_leg_below: below(&self.tl),
            upright_below_60: below(&self.t60),
        }
    }
}

/// The six predicate bits `a..f` the circuit runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComparisonBits {
    /// a: torso < 30°
    pub torso_below_30: bool,
    /// b: uprightness < 40°
    pub upright_below_40: bool,
    /// c: torso < 80°
    pub torso_below_80: bool,
    /// d: thigh/calf < 0.7
    pub thigh_calf_below: bool,
    /// e: torso/leg < 0.5
    pub torso_leg_below: bool,
    /// f: uprightness < 60°
    pub upright_below_60: bool,
}

impl ComparisonBits {
    /// The same predicates computed directly on plaintext features.
    pub fn from_features(f: &PoseFeatures) -> Self {
        Self {
            torso_below_30: f.torso_angle < TORSO_LOW_DEG,
            upright_below_40: f.thigh_uprightness < UPRIGHT_LOW_DEG,
            torso_below_80: f.torso_angle < TORSO_HIGH_DEG,
            thigh_calf_below: f.thigh_calf_ratio < THIGH_CALF_RATIO,
            torso_leg_below: f.torso_leg_ratio < TORSO_LEG_RATIO,
            upright_below_60: f.thigh_uprightness < UPRIGHT_HIGH_DEG,
        }
    }

    /// 2-bit pose code: `msb*2 + lsb`.
    pub fn pose_code(&self) -> u8 {
        let a = self.torso_below_30;
        let b = self.upright_below_40;
        let c = self.torso_below_80;
        let d = self.thigh_calf_below;
        let e = self.torso_leg_below;
        let f = self.upright_below_60;

        let lsb = (a && b && d) || (a && !b) || (!a && !(c && f));
        let msb = (a && b && !d && e) || !a;
        (u8::from(msb) << 1) | u8::from(lsb)
    }

    pub fn label(&self) -> PoseLabel {
        PoseLabel::from_code(self.pose_code())
    }
}

/// Map form of the evaluation step: feature ciphertexts in, comparison ciphertexts out.
pub fn evaluate_comparisons(features: &BTreeMap<String, Ciphertext2>) -> BTreeMap<String, Ciphertext2> {
    EncodedFeatures::from_map(features).compare().to_map()
}

/// Map form of label recovery.
pub fn decode_label(comparisons: &BTreeMap<String, Ciphertext2>) -> PoseLabel {
    ComparisonSet::from_map(comparisons).decode().label()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::classifier::classify_plain;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn raw(torso: i64, upright: i64, thigh: i64, calf: i64, trunk: i64, leg: i64) -> RawFeatureValues {
        RawFeatureValues {
            torso_angle: torso,
            thigh_uprightness: upright,
            thigh_length: thigh,
            calf_length: calf,
            torso_height: trunk,
            leg_length: leg,
        }
    }

    /// Plain features whose float values sit exactly on the integer grid.
    fn plain_of(r: &RawFeatureValues) -> PoseFeatures {
        let s = |v: i64| v as f64 / FEATURE_SCALE;
        let ratio = |n: i64, d: i64| if d > 0 { n as f64 / d as f64 } else { 1.0 };
        PoseFeatures {
            torso_angle: s(r.torso_angle),
            thigh_uprightness: s(r.thigh_uprightness),
            thigh_length: s(r.thigh_length),
            calf_length: s(r.calf_length),
            torso_height: s(r.torso_height),
            leg_length: s(r.leg_length),
            thigh_calf_ratio: ratio(r.thigh_length, r.calf_length),
            torso_leg_ratio: ratio(r.torso_height, r.leg_length),
            ..Default::default()
        }
    }

    /// Decision tree over predicate bits, written branch for branch like `classify_plain`.
    fn tree_over_bits(b: &ComparisonBits) -> PoseLabel {
        if b.torso_below_30 && b.upright_below_40 {
            if b.thigh_calf_below {
                PoseLabel::Sitting
            } else if b.torso_leg_below {
                PoseLabel::BendingDown
            } else {
                PoseLabel::Standing
            }
        } else if b.torso_below_30 {
            PoseLabel::Sitting
        } else if b.torso_below_80 && b.upright_below_60 {
            PoseLabel::BendingDown
        } else {
            PoseLabel::LyingDown
        }
    }

    #[test]
    fn test_circuit_matches_tree_on_all_reachable_bits() {
        for mask in 0u8..64 {
            let bit = |i: u8| mask & (1 << i) != 0;
            let bits = ComparisonBits {
                torso_below_30: bit(0),
                upright_below_40: bit(1),
                torso_below_80: bit(2),
                thigh_calf_below: bit(3),
                torso_leg_below: bit(4),
                upright_below_60: bit(5),
            };
            // torso<30 ⇒ torso<80, upright<40 ⇒ upright<60
            if (bits.torso_below_30 && !bits.torso_below_80) || (bits.upright_below_40 && !bits.upright_below_60) {
                continue;
            }
            assert_eq!(bits.label(), tree_over_bits(&bits), "mask={:06b}", mask);
        }
    }

    #[test]
    fn test_circuit_lying_when_only_torso_high() {
        // torso ≥ 80 but uprightness < 60: the tree says lying_down
        let bits = ComparisonBits {
            torso_below_30: false,
            upright_below_40: true,
            torso_below_80: false,
            thigh_calf_below: false,
            torso_leg_below: false,
            upright_below_60: true,
        };
        assert_eq!(bits.label(), PoseLabel::LyingDown);
    }

    #[test]
    fn test_encoded_labels_each_class() {
        let mut rng = StdRng::seed_from_u64(11);
        let cases = [
            (raw(500, 1000, 10000, 10000, 12000, 20000), PoseLabel::Standing),
            (raw(500, 1000, 5000, 10000, 12000, 20000), PoseLabel::Sitting),
            (raw(500, 1000, 10000, 10000, 8000, 20000), PoseLabel::BendingDown),
            (raw(1000, 5000, 10000, 10000, 12000, 20000), PoseLabel::Sitting),
            (raw(5000, 2000, 10000, 10000, 12000, 20000), PoseLabel::BendingDown),
            (raw(8500, 7000, 10000, 10000, 12000, 20000), PoseLabel::LyingDown),
        ];
        for (r, expected) in cases {
            let enc = EncodedFeatures::encode_with(&mut rng, &r);
            assert_eq!(enc.compare_with(&mut rng).decode().label(), expected, "{:?}", r);
            assert_eq!(classify_plain(&plain_of(&r)), expected);
        }
    }

    #[test]
    fn test_indeterminate_comparison_counts_as_false() {
        let ring = crate::hme::ring();
        // 2^64: ビット長がちょうど gu
        let x = num_bigint::BigInt::from(1) << (ring.gu - 1);
        let boundary = Ciphertext2(std::array::from_fn(|i| {
            num_integer::Integer::mod_floor(&x, &ring.simple_moduli()[i])
        }));
        assert_eq!(decode_comparison(&boundary), crate::hme::Comparison::Indeterminate);

        let mut rng = StdRng::seed_from_u64(5);
        let enc = EncodedFeatures::encode_with(&mut rng, &raw(500, 1000, 10000, 10000, 12000, 20000));
        let mut set = enc.compare_with(&mut rng);
        assert!(set.decode().torso_below_30);
        assert_eq!(set.decode().label(), PoseLabel::Standing);

        set.t30 = boundary;
        let bits = set.decode();
        assert!(!bits.torso_below_30);
        assert!(bits.torso_below_80);
        assert_eq!(bits.label(), PoseLabel::BendingDown);
    }

    #[test]
    fn test_raw_values_truncate() {
        let f = PoseFeatures {
            torso_angle: 29.999,
            thigh_uprightness: 40.0,
            thigh_length: 12.3456,
            ..Default::default()
        };
        let r = RawFeatureValues::from_features(&f);
        assert_eq!(r.torso_angle, 2999);
        assert_eq!(r.thigh_uprightness, 4000);
        assert_eq!(r.thigh_length, 1234);
    }

    #[test]
    fn test_raw_values_missing_keys_are_zero() {
        let r: RawFeatureValues = serde_json::from_str(r#"{"Tra": 8500, "thigh_uprightness": 7000}"#).unwrap();
        assert_eq!(r, RawFeatureValues { torso_angle: 8500, thigh_uprightness: 7000, ..Default::default() });
        let r: RawFeatureValues = serde_json::from_str("{}").unwrap();
        assert_eq!(r, RawFeatureValues::default());
    }

    #[test]
    fn test_map_round_trip_and_defaults() {
        let enc = EncodedFeatures::encode(&raw(1, 2, 3, 4, 5, 6));
        let map = enc.to_map();
        assert_eq!(map.len(), 6);
        assert_eq!(EncodedFeatures::from_map(&map), enc);

        let empty = EncodedFeatures::from_map(&BTreeMap::new());
        assert_eq!(empty.torso_angle, Ciphertext2::zero());
    }

    #[test]
    fn test_map_accepts_legacy_names() {
        let enc = EncodedFeatures::encode(&raw(8500, 7000, 10000, 10000, 12000, 20000));
        let mut map = BTreeMap::new();
        map.insert("Tra".to_string(), enc.torso_angle.clone());
        map.insert("Tha".to_string(), enc.thigh_uprightness.clone());
        assert_eq!(EncodedFeatures::from_map(&map).torso_angle, enc.torso_angle);
    }

    #[test]
    fn test_evaluate_and_decode_maps() {
        let enc = EncodedFeatures::encode(&raw(8500, 7000, 10000, 10000, 12000, 20000));
        let comparisons = evaluate_comparisons(&enc.to_map());
        assert_eq!(comparisons.len(), 6);
        assert!(comparisons.contains_key("tc"));
        assert_eq!(decode_label(&comparisons), PoseLabel::LyingDown);
    }

    #[test]
    fn test_json_accepts_legacy_comparison_names() {
        let set = EncodedFeatures::encode(&raw(500, 1000, 10000, 10000, 12000, 20000)).compare();
        let json = serde_json::to_value(&set).unwrap();
        let legacy = serde_json::json!({
            "T30": json["t30"], "T40": json["t40"], "T80": json["t80"],
            "T60": json["t60"], "TC": json["tc"], "TL": json["tl"],
        });
        let back: ComparisonSet = serde_json::from_value(legacy).unwrap();
        assert_eq!(back, set);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_encoded_label_matches_plain(
            torso in 0i64..18_000,
            upright in 0i64..18_000,
            thigh in 1i64..40_000,
            calf in 1i64..40_000,
            trunk in 1i64..40_000,
            leg in 1i64..40_000,
            seed in any::<u64>(),
        ) {
            // 比がちょうど閾値に乗るケースは浮動小数の丸めで決まるので除外
            prop_assume!(thigh * 10 != calf * 7 && trunk * 10 != leg * 5);
            let r = raw(torso, upright, thigh, calf, trunk, leg);
            let mut rng = StdRng::seed_from_u64(seed);
            let enc = EncodedFeatures::encode_with(&mut rng, &r);
            let encoded_label = enc.compare_with(&mut rng).decode().label();
            let plain = plain_of(&r);
            prop_assert_eq!(encoded_label, classify_plain(&plain));
            prop_assert_eq!(ComparisonBits::from_features(&plain).label(), classify_plain(&plain));
        }
    }
}
