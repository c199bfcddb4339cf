//! Hysteresis-based fall detection.
//!
//! Three signals run side by side on every call:
//! 1. bbox motion alone,
//! 2. bbox motion and strict pose evidence (either one alone still counts),
//! 3. the larger of the two counters, gated by flexible pose evidence.
//!
//! Counters are kept per (camera, track) and clamped to `[0, count_threshold]`.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::FallConfig;
use crate::pose::{PoseLabel, PoseResult};
use crate::tracker::{BBox, TrackHistoryStore, TrackKey};

/// Strict lying thresholds in degrees.
const STRICT_TORSO_DEG: f64 = 80.0;
const STRICT_UPRIGHT_DEG: f64 = 60.0;
/// Flexible evidence lower torso bound in plain mode.
const FLEXIBLE_TORSO_LOW_DEG: f64 = 30.0;
/// Angles assumed for an encoded lying pose that carries no raw values.
const FALLBACK_TORSO_DEG: f64 = 85.0;
const FALLBACK_UPRIGHT_DEG: f64 = 70.0;

/// Per-key hysteresis counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FallCounters {
    pub bbox_motion: u8,
    pub motion_and_pose: u8,
}

impl FallCounters {
    /// Advance all three algorithms by one sample.
    pub fn step(&mut self, motion: bool, pose: PoseEvidence, threshold: u8) -> FallResult {
        self.bbox_motion = if motion {
            self.bbox_motion.saturating_add(1).min(threshold)
        } else {
            self.bbox_motion.saturating_sub(1)
        };

        self.motion_and_pose = match (motion, pose.strict) {
            (true, true) => self.motion_and_pose.saturating_add(2).min(threshold),
            (true, false) | (false, true) => self.motion_and_pose.saturating_add(1).min(threshold),
            (false, false) => self.motion_and_pose.saturating_sub(1),
        };

        let combined = self.bbox_motion.max(self.motion_and_pose);
        let flexible = pose.flexible && combined >= threshold;

        FallResult {
            fall_detected_method1: self.bbox_motion >= threshold,
            fall_detected_method2: self.motion_and_pose >= threshold,
            fall_detected_method3: flexible,
            counter_method1: self.bbox_motion,
            counter_method2: self.motion_and_pose,
            counter_method3: combined,
            algorithm3_counter: combined,
            primary_alert: flexible,
        }
    }

    pub fn decay(&mut self) {
        self.bbox_motion = self.bbox_motion.saturating_sub(1);
        self.motion_and_pose = self.motion_and_pose.saturating_sub(1);
    }
}

/// Pose-derived evidence for a lying/fallen body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoseEvidence {
    pub strict: bool,
    pub flexible: bool,
}

impl PoseEvidence {
    pub fn from_pose(pose: &PoseResult, use_encoded: bool) -> Self {
        if use_encoded {
            Self::encoded(pose)
        } else {
            Self::plain(pose.features.torso_angle, pose.features.thigh_uprightness)
        }
    }

    /// Encoded mode only sees the recovered label, plus the raw integers when the client sent them.
    fn encoded(pose: &PoseResult) -> Self {
        if pose.label != Some(PoseLabel::LyingDown) {
            return Self::default();
        }
        let (torso, upright) = match &pose.raw_int_values {
            Some(raw) => (raw.torso_angle as f64 / 100.0, raw.thigh_uprightness as f64 / 100.0),
            None => (FALLBACK_TORSO_DEG, FALLBACK_UPRIGHT_DEG),
        };
        Self {
            strict: torso > STRICT_TORSO_DEG && upright > STRICT_UPRIGHT_DEG,
            flexible: true,
        }
    }

    fn plain(torso: f64, upright: f64) -> Self {
        if !(torso > 0.0 && upright > 0.0) {
            return Self::default();
        }
        let strict = torso > STRICT_TORSO_DEG && upright > STRICT_UPRIGHT_DEG;
        let flexible = torso > STRICT_TORSO_DEG
            || (FLEXIBLE_TORSO_LOW_DEG < torso && torso < STRICT_TORSO_DEG && upright > STRICT_UPRIGHT_DEG);
        Self { strict, flexible }
    }
}

/// Outcome of one fall-detection call. All-false/zero is the "no signal" result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallResult {
    pub fall_detected_method1: bool,
    pub fall_detected_method2: bool,
    pub fall_detected_method3: bool,
    pub counter_method1: u8,
    pub counter_method2: u8,
    pub counter_method3: u8,
    pub algorithm3_counter: u8,
    pub primary_alert: bool,
}

impl FallResult {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Counters of a key live until `reset` removes them.
pub struct FallDetector {
    config: FallConfig,
    history: Arc<TrackHistoryStore>,
    counters: DashMap<TrackKey, FallCounters>,
}

impl FallDetector {
    pub fn new(config: FallConfig, history: Arc<TrackHistoryStore>) -> Self {
        Self {
            config,
            history,
            counters: DashMap::new(),
        }
    }

    #[cfg(test)]
    fn history(&self) -> &Arc<TrackHistoryStore> {
        &self.history
    }

    /// Top edge moving down or height shrinking faster than the configured velocity.
    pub fn motion_evidence(&self, current: &BBox, previous: &BBox, elapsed_ms: f64) -> bool {
        if !(elapsed_ms > 0.0 && elapsed_ms.is_finite()) {
            tracing::debug!(elapsed_ms, "non-positive elapsed time, no motion evidence");
            return false;
        }
        let v_top = current.top_velocity(previous, elapsed_ms);
        let v_height = current.shrink_velocity(previous, elapsed_ms);
        v_top > self.config.motion_velocity || v_height > self.config.motion_velocity
    }

    /// Evaluate against an explicit baseline bbox.
    pub fn evaluate(
        &self,
        key: &TrackKey,
        current: &BBox,
        previous: &BBox,
        elapsed_ms: f64,
        pose: &PoseResult,
        use_encoded: bool,
    ) -> FallResult {
        let motion = self.motion_evidence(current, previous, elapsed_ms);
        let evidence = PoseEvidence::from_pose(pose, use_encoded);

        let result = self
            .counters
            .entry(key.clone())
            .or_default()
            .step(motion, evidence, self.config.count_threshold);

        if result.primary_alert {
            tracing::info!(
                camera_id = %key.camera_id,
                track_id = key.track_id,
                counter1 = result.counter_method1,
                counter2 = result.counter_method2,
                "fall detected"
            );
        } else {
            tracing::trace!(
                camera_id = %key.camera_id,
                track_id = key.track_id,
                motion,
                strict = evidence.strict,
                flexible = evidence.flexible,
                "fall step"
            );
        }
        result
    }

    /// Evaluate against the oldest sample of the track history.
    ///
    /// Returns the empty result until the history window is full.
    pub fn detect(
        &self,
        key: &TrackKey,
        current: &BBox,
        pose: &PoseResult,
        elapsed_ms: f64,
        use_encoded: bool,
    ) -> FallResult {
        if !self.history.ready(key) {
            return FallResult::empty();
        }
        match self.history.previous(key) {
            Some(baseline) => self.evaluate(key, current, &baseline.bbox, elapsed_ms, pose, use_encoded),
            None => FallResult::empty(),
        }
    }

    /// Record `current` in the track history, then evaluate against the oldest sample.
    ///
    /// The history entry stays locked while the counters step, so concurrent
    /// frames of one track are recorded and evaluated one at a time. Lock order is
    /// history then counters; nothing here takes them the other way round.
    pub fn record_and_detect(
        &self,
        key: &TrackKey,
        current: BBox,
        keypoints: Vec<f32>,
        pose: &PoseResult,
        elapsed_ms: f64,
        use_encoded: bool,
    ) -> FallResult {
        self.history.record_then(key, current, keypoints, |baseline| match baseline {
            Some(b) => self.evaluate(key, &current, &b.bbox, elapsed_ms, pose, use_encoded),
            None => FallResult::empty(),
        })
    }

    /// Step every counter of `key` one toward zero.
    pub fn decay(&self, key: &TrackKey) {
        if let Some(mut c) = self.counters.get_mut(key) {
            c.decay();
        }
    }

    pub fn reset(&self, key: &TrackKey) {
        self.counters.remove(key);
    }

    pub fn counters(&self, key: &TrackKey) -> FallCounters {
        self.counters.get(key).map(|c| *c).unwrap_or_default()
    }
}
