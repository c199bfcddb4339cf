use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::classifier::{classify_plain, PoseLabel};
use super::encoded::{ComparisonSet, EncodedFeatures, RawFeatureValues};
use super::features::{BodyFrame, KeypointWindow, PoseFeatures};
use super::keypoint::Pose;
use crate::error::Result;
use crate::tracker::TrackKey;

/// カメラ/トラック指定なしの呼び出しが使う平均化ウィンドウのキー
pub const DEFAULT_CAMERA: &str = "default";

pub fn default_subject() -> TrackKey {
    TrackKey::new(DEFAULT_CAMERA, 0)
}

/// 暗号化比較を評価済みであることを示すフラグ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonFlags {
    pub hme_processed: bool,
    pub comparison_results: ComparisonSet,
}

/// 姿勢解析の結果
///
/// `label` が `None` なのは暗号化モードで比較評価前の状態。
/// 抽出失敗は `Some(PoseLabel::NoPose)` と特徴量ゼロで表す。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseResult {
    pub label: Option<PoseLabel>,
    #[serde(flatten)]
    pub features: PoseFeatures,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_features: Option<EncodedFeatures>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_int_values: Option<RawFeatureValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison_flags: Option<ComparisonFlags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose_code: Option<u8>,
}

impl PoseResult {
    pub fn no_pose() -> Self {
        Self {
            label: Some(PoseLabel::NoPose),
            features: PoseFeatures::default(),
            encrypted_features: None,
            raw_int_values: None,
            comparison_flags: None,
            pose_code: None,
        }
    }

    pub fn is_no_pose(&self) -> bool {
        self.label == Some(PoseLabel::NoPose)
    }

    fn plain(features: PoseFeatures) -> Self {
        let label = classify_plain(&features);
        Self {
            label: Some(label),
            features,
            encrypted_features: None,
            raw_int_values: None,
            comparison_flags: None,
            pose_code: label.code(),
        }
    }

    fn encoded<R: Rng + ?Sized>(rng: &mut R, features: PoseFeatures) -> Self {
        let raw = RawFeatureValues::from_features(&features);
        Self {
            label: None,
            features,
            encrypted_features: Some(EncodedFeatures::encode_with(rng, &raw)),
            raw_int_values: Some(raw),
            comparison_flags: None,
            pose_code: None,
        }
    }

    /// 暗号化特徴量があれば比較を評価し、ラベルとコードを確定させる
    pub fn resolve_encoded_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let Some(encrypted) = &self.encrypted_features else {
            return;
        };
        let comparisons = encrypted.compare_with(rng);
        let label = comparisons.decode().label();
        self.label = Some(label);
        self.pose_code = label.code();
        self.comparison_flags = Some(ComparisonFlags {
            hme_processed: true,
            comparison_results: comparisons,
        });
    }

    pub fn resolve_encoded(&mut self) {
        self.resolve_encoded_with(&mut rand::thread_rng());
    }
}

/// 被写体ごとの移動平均を持つ姿勢推定器
///
/// ウィンドウは `forget` されるまで残る。
pub struct PoseEstimator {
    window: usize,
    windows: DashMap<TrackKey, KeypointWindow>,
}

impl PoseEstimator {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            windows: DashMap::new(),
        }
    }

    pub fn estimate_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        subject: &TrackKey,
        keypoints: &[f32],
        use_encoded: bool,
    ) -> Result<PoseResult> {
        let pose = Pose::from_flat(keypoints)?;
        let frame = BodyFrame::from_pose(&pose)?;
        // ガードは特徴量計算前に落とす
        let averaged = self
            .windows
            .entry(subject.clone())
            .or_insert_with(|| KeypointWindow::new(self.window))
            .push(frame);
        let features = PoseFeatures::from_frame(&averaged)?;

        Ok(if use_encoded {
            PoseResult::encoded(rng, features)
        } else {
            PoseResult::plain(features)
        })
    }

    pub fn estimate(&self, subject: &TrackKey, keypoints: &[f32], use_encoded: bool) -> Result<PoseResult> {
        self.estimate_with(&mut rand::thread_rng(), subject, keypoints, use_encoded)
    }

    pub fn forget(&self, subject: &TrackKey) {
        self.windows.remove(subject);
    }

    #[cfg(test)]
    fn window_len(&self, subject: &TrackKey) -> usize {
        self.windows.get(subject).map(|w| w.len()).unwrap_or(0)
    }
}
