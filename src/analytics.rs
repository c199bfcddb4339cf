//! Public entry points.
//!
//! Every method here returns a plain value. Malformed input and degenerate
//! geometry are logged and turned into the "no pose" or empty fall result, so
//! callers only branch on the shape of what comes back.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::fall::{FallCounters, FallDetector, FallResult};
use crate::hme::Ciphertext2;
use crate::pose::{self, default_subject, PoseEstimator, PoseLabel, PoseResult};
use crate::tracker::{BBox, TrackHistoryStore, TrackKey};

/// Pose and fall outcome of one composed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub pose_result: PoseResult,
    pub fall_result: FallResult,
}

impl AnalysisResult {
    fn without_fall(pose_result: PoseResult) -> Self {
        Self {
            pose_result,
            fall_result: FallResult::empty(),
        }
    }
}

pub struct Analytics {
    config: Config,
    estimator: PoseEstimator,
    history: Arc<TrackHistoryStore>,
    detector: FallDetector,
}

impl Analytics {
    pub fn new(config: Config) -> Self {
        let history = Arc::new(TrackHistoryStore::new(config.history.window));
        let detector = FallDetector::new(config.fall.clone(), history.clone());
        Self {
            estimator: PoseEstimator::new(config.history.window),
            history,
            detector,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Classify one keypoint frame, averaged with the default subject's window.
    pub fn analyze_pose(&self, keypoints: &[f32], use_encoded: bool) -> PoseResult {
        self.analyze_subject(&default_subject(), keypoints, use_encoded)
    }

    /// Classify one keypoint frame, averaged with this track's window.
    pub fn analyze_pose_for(&self, camera_id: &str, track_id: i64, keypoints: &[f32], use_encoded: bool) -> PoseResult {
        self.analyze_subject(&TrackKey::new(camera_id, track_id), keypoints, use_encoded)
    }

    fn analyze_subject(&self, subject: &TrackKey, keypoints: &[f32], use_encoded: bool) -> PoseResult {
        match self.estimator.estimate(subject, keypoints, use_encoded) {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(subject = %subject, error = %e, "frame rejected");
                PoseResult::no_pose()
            }
        }
    }

    /// Run the six blinded comparisons on named feature ciphertexts.
    pub fn evaluate_comparisons(&self, features: &BTreeMap<String, Ciphertext2>) -> BTreeMap<String, Ciphertext2> {
        pose::evaluate_comparisons(features)
    }

    pub fn decode_label(&self, comparisons: &BTreeMap<String, Ciphertext2>) -> PoseLabel {
        pose::decode_label(comparisons)
    }

    /// Fall detection against the oldest sample in the track history.
    ///
    /// Does not record `current_bbox`; returns the empty result until the
    /// track's history window is full.
    pub fn detect_fall(
        &self,
        camera_id: &str,
        track_id: i64,
        current_bbox: &[f32],
        pose_result: &PoseResult,
        use_encoded: bool,
    ) -> FallResult {
        let key = TrackKey::new(camera_id, track_id);
        let current = match self.parse_bbox(&key, current_bbox) {
            Some(b) => b,
            None => return FallResult::empty(),
        };
        let pose_result = resolve_if_pending(pose_result, use_encoded);
        self.detector
            .detect(&key, &current, &pose_result, self.config.history.elapsed_ms(), use_encoded)
    }

    /// Fall detection against an explicit baseline bbox and elapsed time.
    #[allow(clippy::too_many_arguments)]
    pub fn detect_fall_with(
        &self,
        camera_id: &str,
        track_id: i64,
        pose_result: &PoseResult,
        current_bbox: &[f32],
        previous_bbox: &[f32],
        elapsed_ms: f64,
        use_encoded: bool,
    ) -> FallResult {
        let key = TrackKey::new(camera_id, track_id);
        let (Some(current), Some(previous)) = (self.parse_bbox(&key, current_bbox), self.parse_bbox(&key, previous_bbox))
        else {
            return FallResult::empty();
        };
        let pose_result = resolve_if_pending(pose_result, use_encoded);
        self.detector
            .evaluate(&key, &current, &previous, elapsed_ms, &pose_result, use_encoded)
    }

    /// Pose analysis, history update and fall detection in one call.
    ///
    /// Frames of one track are recorded and evaluated one at a time even when
    /// called concurrently. Their order is whatever order the calls reach the
    /// history store in.
    pub fn analyze_and_detect(
        &self,
        camera_id: &str,
        track_id: i64,
        keypoints: &[f32],
        bbox: &[f32],
        use_encoded: bool,
    ) -> AnalysisResult {
        let key = TrackKey::new(camera_id, track_id);

        let mut pose_result = self.analyze_subject(&key, keypoints, use_encoded);
        if pose_result.is_no_pose() {
            self.detector.decay(&key);
            return AnalysisResult::without_fall(pose_result);
        }

        // 暗号化モードのラベルは転倒判定の前に確定させる
        if use_encoded {
            pose_result.resolve_encoded();
        }

        let Some(current) = self.parse_bbox(&key, bbox) else {
            return AnalysisResult::without_fall(pose_result);
        };
        let fall_result = self.detector.record_and_detect(
            &key,
            current,
            keypoints.to_vec(),
            &pose_result,
            self.config.history.elapsed_ms(),
            use_encoded,
        );
        AnalysisResult {
            pose_result,
            fall_result,
        }
    }

    pub fn reset_counters(&self, camera_id: &str, track_id: i64) {
        self.detector.reset(&TrackKey::new(camera_id, track_id));
    }

    /// Drop history, counters and the averaging window of a track.
    ///
    /// Per-track state is never evicted on its own. Long-running callers must
    /// call this when a track ends, or the maps grow with every track id seen.
    pub fn forget_track(&self, camera_id: &str, track_id: i64) {
        let key = TrackKey::new(camera_id, track_id);
        self.history.forget(&key);
        self.detector.reset(&key);
        self.estimator.forget(&key);
        tracing::debug!(camera_id, track_id, "track forgotten");
    }

    pub fn fall_counters(&self, camera_id: &str, track_id: i64) -> FallCounters {
        self.detector.counters(&TrackKey::new(camera_id, track_id))
    }

    pub fn history_len(&self, camera_id: &str, track_id: i64) -> usize {
        self.history.len(&TrackKey::new(camera_id, track_id))
    }

    /// Tracks that currently hold history.
    pub fn track_count(&self) -> usize {
        self.history.track_count()
    }

    fn parse_bbox(&self, key: &TrackKey, values: &[f32]) -> Option<BBox> {
        match BBox::from_slice(values) {
            Ok(b) => Some(b),
            Err(e) => {
                tracing::warn!(camera_id = %key.camera_id, track_id = key.track_id, error = %e, "bbox rejected");
                None
            }
        }
    }
}

impl Default for Analytics {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

/// An encoded result whose label is still pending gets its comparisons evaluated first.
fn resolve_if_pending(pose_result: &PoseResult, use_encoded: bool) -> PoseResult {
    let mut pose_result = pose_result.clone();
    if use_encoded && pose_result.label.is_none() {
        pose_result.resolve_encoded();
    }
    pose_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::fixtures::{lying_keypoints, standing_keypoints};

    const CAM: &str = "cam-1";

    fn bbox_at(y: f32) -> Vec<f32> {
        vec![100.0, y, 80.0, 200.0]
    }

    #[test]
    fn test_standing_scenario_no_fall() {
        let a = Analytics::default();
        let pose = a.analyze_pose(&standing_keypoints(), false);
        assert_eq!(pose.label, Some(PoseLabel::Standing));

        for _ in 0..5 {
            let r = a.analyze_and_detect(CAM, 1, &standing_keypoints(), &bbox_at(100.0), false);
            assert_eq!(r.pose_result.label, Some(PoseLabel::Standing));
            assert_eq!(r.fall_result, FallResult::empty());
        }
        assert_eq!(a.history_len(CAM, 1), 5);
        assert_eq!(a.fall_counters(CAM, 1), FallCounters::default());
    }

    fn run_falling(a: &Analytics, use_encoded: bool) -> Vec<AnalysisResult> {
        (0..6)
            .map(|i| a.analyze_and_detect(CAM, 2, &lying_keypoints(), &bbox_at(100.0 + 50.0 * i as f32), use_encoded))
            .collect()
    }

    #[test]
    fn test_lying_with_motion_scenario() {
        let a = Analytics::default();
        let results = run_falling(&a, false);

        for r in &results[..4] {
            assert_eq!(r.pose_result.label, Some(PoseLabel::LyingDown));
            assert_eq!(r.fall_result, FallResult::empty());
        }
        // 最初の判定で motion∧strict により +2
        let first = &results[4].fall_result;
        assert_eq!(first.counter_method2, 2);
        assert!(first.fall_detected_method2);
        assert!(first.primary_alert);

        let second = &results[5].fall_result;
        assert_eq!(second.counter_method1, 2);
        assert!(second.fall_detected_method1 && second.fall_detected_method3);
        assert!(second.primary_alert);
    }

    #[test]
    fn test_lying_with_motion_scenario_encoded() {
        let a = Analytics::default();
        let results = run_falling(&a, true);

        for r in &results {
            assert_eq!(r.pose_result.label, Some(PoseLabel::LyingDown));
            assert_eq!(r.pose_result.pose_code, Some(3));
            let flags = r.pose_result.comparison_flags.as_ref().unwrap();
            assert!(flags.hme_processed);
        }
        assert_eq!(results[4].fall_result.counter_method2, 2);
        assert!(results[4].fall_result.primary_alert);
        assert!(results[5].fall_result.primary_alert);
    }

    #[test]
    fn test_no_pose_decays_counters() {
        let a = Analytics::default();
        run_falling(&a, false);
        assert_eq!(a.fall_counters(CAM, 2), FallCounters { bbox_motion: 2, motion_and_pose: 2 });

        let r = a.analyze_and_detect(CAM, 2, &[0.0; 12], &bbox_at(500.0), false);
        assert!(r.pose_result.is_no_pose());
        assert_eq!(r.fall_result, FallResult::empty());
        assert_eq!(a.fall_counters(CAM, 2), FallCounters { bbox_motion: 1, motion_and_pose: 1 });
        // 履歴には記録しない
        assert_eq!(a.history_len(CAM, 2), 5);
    }

    #[test]
    fn test_missing_keypoint_is_no_pose() {
        let a = Analytics::default();
        let mut flat = standing_keypoints();
        flat[10] = -1.0;
        let r = a.analyze_pose(&flat, true);
        assert!(r.is_no_pose());
        assert_eq!(r.features.torso_angle, 0.0);
        assert!(r.encrypted_features.is_none());
    }

    #[test]
    fn test_encoded_round_trip_through_maps() {
        let a = Analytics::default();
        let pose = a.analyze_pose(&lying_keypoints(), true);
        assert_eq!(pose.label, None);
        let features = pose.encrypted_features.unwrap().to_map();
        let comparisons = a.evaluate_comparisons(&features);
        assert_eq!(a.decode_label(&comparisons), PoseLabel::LyingDown);
    }

    #[test]
    fn test_empty_maps_decode_to_a_label() {
        let a = Analytics::default();
        let comparisons = a.evaluate_comparisons(&BTreeMap::new());
        assert_eq!(comparisons.len(), 6);
        // 全ゼロ入力でもラベルは返る
        assert_ne!(a.decode_label(&comparisons), PoseLabel::NoPose);
        assert_ne!(a.decode_label(&BTreeMap::new()), PoseLabel::NoPose);
    }

    #[test]
    fn test_bad_bbox_skips_detection() {
        let a = Analytics::default();
        let r = a.analyze_and_detect(CAM, 3, &standing_keypoints(), &[1.0, 2.0], false);
        assert_eq!(r.pose_result.label, Some(PoseLabel::Standing));
        assert_eq!(r.fall_result, FallResult::empty());
        assert_eq!(a.history_len(CAM, 3), 0);
    }

    #[test]
    fn test_detect_fall_with_explicit_baseline() {
        let a = Analytics::default();
        let pose = a.analyze_pose_for(CAM, 4, &lying_keypoints(), false);
        let r = a.detect_fall_with(CAM, 4, &pose, &bbox_at(300.0), &bbox_at(100.0), 166.7, false);
        assert_eq!(r.counter_method2, 2);
        assert!(r.primary_alert);

        let r = a.detect_fall_with(CAM, 4, &pose, &bbox_at(300.0), &[1.0], 166.7, false);
        assert_eq!(r, FallResult::empty());
        // 拒否された呼び出しはカウンタに触れない
        assert_eq!(a.fall_counters(CAM, 4).motion_and_pose, 2);
    }

    #[test]
    fn test_detect_fall_resolves_pending_encoded_label() {
        let a = Analytics::default();
        let pose = a.analyze_pose_for(CAM, 5, &lying_keypoints(), true);
        assert_eq!(pose.label, None);
        let r = a.detect_fall_with(CAM, 5, &pose, &bbox_at(300.0), &bbox_at(100.0), 166.7, true);
        assert!(r.primary_alert);
    }

    #[test]
    fn test_detect_fall_uses_history() {
        let a = Analytics::default();
        for i in 0..5 {
            a.analyze_and_detect(CAM, 6, &standing_keypoints(), &bbox_at(100.0 + i as f32), false);
        }
        let pose = a.analyze_pose_for(CAM, 6, &lying_keypoints(), false);
        let r = a.detect_fall(CAM, 6, &bbox_at(400.0), &pose, false);
        assert_eq!(r.counter_method1, 1);
        assert_eq!(a.history_len(CAM, 6), 5);
    }

    #[test]
    fn test_reset_and_forget() {
        let a = Analytics::default();
        run_falling(&a, false);
        a.reset_counters(CAM, 2);
        assert_eq!(a.fall_counters(CAM, 2), FallCounters::default());
        assert_eq!(a.history_len(CAM, 2), 5);
        assert_eq!(a.track_count(), 1);

        a.forget_track(CAM, 2);
        assert_eq!(a.history_len(CAM, 2), 0);
        assert_eq!(a.track_count(), 0);
        let r = a.analyze_and_detect(CAM, 2, &lying_keypoints(), &bbox_at(100.0), false);
        assert_eq!(r.fall_result, FallResult::empty());
    }

    #[test]
    fn test_tracks_are_isolated_across_threads() {
        let a = Arc::new(Analytics::default());
        let handles: Vec<_> = (0..4)
            .map(|track| {
                let a = a.clone();
                std::thread::spawn(move || {
                    let falling = track % 2 == 0;
                    let mut last = FallResult::empty();
                    for i in 0..6 {
                        let (kp, y) = if falling {
                            (lying_keypoints(), 100.0 + 50.0 * i as f32)
                        } else {
                            (standing_keypoints(), 100.0)
                        };
                        last = a.analyze_and_detect(CAM, track, &kp, &bbox_at(y), false).fall_result;
                    }
                    (falling, last)
                })
            })
            .collect();
        for h in handles {
            let (falling, last) = h.join().unwrap();
            assert_eq!(last.primary_alert, falling);
        }
    }
}
