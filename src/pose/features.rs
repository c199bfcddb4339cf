use std::collections::VecDeque;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use super::keypoint::{KeypointIndex, Pose};
use crate::error::{AnalyticsError, Result};

/// 特徴量計算に使う8キーポイント
pub const TRACKED: [KeypointIndex; 8] = [
    KeypointIndex::LeftShoulder,
    KeypointIndex::RightShoulder,
    KeypointIndex::LeftHip,
    KeypointIndex::RightHip,
    KeypointIndex::LeftKnee,
    KeypointIndex::RightKnee,
    KeypointIndex::LeftAnkle,
    KeypointIndex::RightAnkle,
];

const L_SHOULDER: usize = 0;
const R_SHOULDER: usize = 1;
const L_HIP: usize = 2;
const R_HIP: usize = 3;
const L_KNEE: usize = 4;
const R_KNEE: usize = 5;
const L_ANKLE: usize = 6;
const R_ANKLE: usize = 7;

/// 下半身＋肩の8点サンプル
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyFrame {
    pub points: [Vector2<f64>; TRACKED.len()],
}

impl BodyFrame {
    /// 8点が揃っていれば抽出
    pub fn from_pose(pose: &Pose) -> Result<Self> {
        pose.require(&TRACKED)?;
        Ok(Self {
            points: std::array::from_fn(|i| pose.get(TRACKED[i]).to_vector()),
        })
    }

    fn center(&self, left: usize, right: usize) -> Vector2<f64> {
        (self.points[left] + self.points[right]) / 2.0
    }

    /// 左右の距離の平均
    fn bilateral(&self, (la, lb): (usize, usize), (ra, rb): (usize, usize)) -> f64 {
        let left = (self.points[la] - self.points[lb]).norm();
        let right = (self.points[ra] - self.points[rb]).norm();
        (left + right) / 2.0
    }
}

/// 直近Nフレームの移動平均ウィンドウ
#[derive(Debug, Clone)]
pub struct KeypointWindow {
    capacity: usize,
    frames: VecDeque<BodyFrame>,
}

impl KeypointWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            frames: VecDeque::with_capacity(capacity),
        }
    }

    /// フレームを追加し、ウィンドウ内の平均を返す
    pub fn push(&mut self, frame: BodyFrame) -> BodyFrame {
        if self.frames.len() >= self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
        self.mean()
    }

    fn mean(&self) -> BodyFrame {
        let n = self.frames.len() as f64;
        let mut points = [Vector2::zeros(); TRACKED.len()];
        for frame in &self.frames {
            for (acc, p) in points.iter_mut().zip(frame.points.iter()) {
                *acc += p;
            }
        }
        for p in &mut points {
            *p /= n;
        }
        BodyFrame { points }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn reset(&mut self) {
        self.frames.clear();
    }
}

/// 姿勢分類用の幾何特徴量（角度は度）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseFeatures {
    pub torso_angle: f64,
    pub thigh_angle: f64,
    pub thigh_uprightness: f64,
    pub thigh_length: f64,
    pub calf_length: f64,
    pub torso_height: f64,
    pub leg_length: f64,
    pub thigh_calf_ratio: f64,
    pub torso_leg_ratio: f64,
}

impl PoseFeatures {
    /// 平均化済みフレームから特徴量を計算
    pub fn from_frame(frame: &BodyFrame) -> Result<Self> {
        let shoulder = frame.center(L_SHOULDER, R_SHOULDER);
        let hip = frame.center(L_HIP, R_HIP);
        let knee = frame.center(L_KNEE, R_KNEE);

        let torso = shoulder - hip;
        let thigh = knee - hip;
        if torso.norm() == 0.0 || thigh.norm() == 0.0 {
            return Err(AnalyticsError::DegenerateGeometry);
        }

        let torso_angle = angle_from_up(&torso);
        let thigh_angle = angle_from_up(&thigh);

        let thigh_length = frame.bilateral((L_HIP, L_KNEE), (R_HIP, R_KNEE));
        let calf_length = frame.bilateral((L_KNEE, L_ANKLE), (R_KNEE, R_ANKLE));
        let torso_height = frame.bilateral((L_SHOULDER, L_HIP), (R_SHOULDER, R_HIP));
        let leg_length = frame.bilateral((L_HIP, L_ANKLE), (R_HIP, R_ANKLE));

        Ok(Self {
            torso_angle,
            thigh_angle,
            thigh_uprightness: (thigh_angle - 180.0).abs(),
            thigh_length,
            calf_length,
            torso_height,
            leg_length,
            thigh_calf_ratio: ratio_or_one(thigh_length, calf_length),
            torso_leg_ratio: ratio_or_one(torso_height, leg_length),
        })
    }
}

/// 上方向ベクトルとの角度 [0, 180]
fn angle_from_up(v: &Vector2<f64>) -> f64 {
    // 画像座標のy軸は下向き
    let up = Vector2::new(0.0, -1.0);
    let cos = v.dot(&up) / v.norm();
    cos.clamp(-1.0, 1.0).acos().to_degrees()
}

fn ratio_or_one(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        1.0
    }
}
