use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};

/// COCO 17 キーポイントインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl KeypointIndex {
    pub const COUNT: usize = 17;

    /// フラット配列の長さ (x, y) * 17
    pub const FLAT_LEN: usize = Self::COUNT * 2;
}

/// 欠損キーポイントを表す座標値
pub const MISSING: f32 = -1.0;

/// 単一キーポイント（ピクセル座標）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn missing() -> Self {
        Self::new(MISSING, MISSING)
    }

    /// どちらかの座標が欠損値か
    pub fn is_missing(&self) -> bool {
        self.x == MISSING || self.y == MISSING
    }

    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.x as f64, self.y as f64)
    }
}

impl Default for Keypoint {
    fn default() -> Self {
        Self::missing()
    }
}

/// 17キーポイントからなる姿勢
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub keypoints: [Keypoint; KeypointIndex::COUNT],
}

impl Pose {
    pub fn new(keypoints: [Keypoint; KeypointIndex::COUNT]) -> Self {
        Self { keypoints }
    }

    /// `[x0, y0, x1, y1, ...]` 形式のフラット配列から生成
    pub fn from_flat(values: &[f32]) -> Result<Self> {
        if values.len() != KeypointIndex::FLAT_LEN {
            return Err(AnalyticsError::KeypointCount { got: values.len() });
        }
        let keypoints = std::array::from_fn(|i| Keypoint::new(values[2 * i], values[2 * i + 1]));
        Ok(Self { keypoints })
    }

    /// インデックスでキーポイントを取得
    pub fn get(&self, index: KeypointIndex) -> &Keypoint {
        &self.keypoints[index as usize]
    }

    /// 指定キーポイントがすべて揃っているか。最初の欠損を返す
    pub fn require(&self, indices: &[KeypointIndex]) -> Result<()> {
        match indices.iter().find(|&&i| self.get(i).is_missing()) {
            Some(&i) => Err(AnalyticsError::MissingKeypoint { index: i as usize }),
            None => Ok(()),
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            keypoints: [Keypoint::default(); KeypointIndex::COUNT],
        }
    }
}
