//! テスト用キーポイント生成

use super::keypoint::KeypointIndex;

const HIP_X: f64 = 200.0;
const HIP_Y: f64 = 300.0;
/// 左右の横オフセット（ピクセル）
const HALF_WIDTH: f64 = 10.0;

/// 指定した胴体角・大腿の直立度・各長さを持つ34要素のフラット配列を作る
///
/// 胴体は上方向から `torso_deg` 傾け、大腿は下方向から `upright_deg` 傾ける。
/// 下腿は常に真下。
pub fn keypoints_for(torso_deg: f64, upright_deg: f64, thigh: f64, calf: f64, torso: f64) -> Vec<f32> {
    let t = torso_deg.to_radians();
    let shoulder = (HIP_X + torso * t.sin(), HIP_Y - torso * t.cos());

    let phi = (180.0 - upright_deg).to_radians();
    let knee = (HIP_X + thigh * phi.sin(), HIP_Y - thigh * phi.cos());
    let ankle = (knee.0, knee.1 + calf);

    let mut flat = vec![0.0f32; KeypointIndex::FLAT_LEN];
    let mut put = |idx: KeypointIndex, (x, y): (f64, f64)| {
        flat[2 * idx as usize] = x as f32;
        flat[2 * idx as usize + 1] = y as f32;
    };

    // 顔・腕は肩中心に置く（分類には使わない）
    for idx in [
        KeypointIndex::Nose,
        KeypointIndex::LeftEye,
        KeypointIndex::RightEye,
        KeypointIndex::LeftEar,
        KeypointIndex::RightEar,
        KeypointIndex::LeftElbow,
        KeypointIndex::RightElbow,
        KeypointIndex::LeftWrist,
        KeypointIndex::RightWrist,
    ] {
        put(idx, shoulder);
    }

    let left = |(x, y): (f64, f64)| (x - HALF_WIDTH, y);
    let right = |(x, y): (f64, f64)| (x + HALF_WIDTH, y);
    let hip = (HIP_X, HIP_Y);

    put(KeypointIndex::LeftShoulder, left(shoulder));
    put(KeypointIndex::RightShoulder, right(shoulder));
    put(KeypointIndex::LeftHip, left(hip));
    put(KeypointIndex::RightHip, right(hip));
    put(KeypointIndex::LeftKnee, left(knee));
    put(KeypointIndex::RightKnee, right(knee));
    put(KeypointIndex::LeftAnkle, left(ankle));
    put(KeypointIndex::RightAnkle, right(ankle));
    flat
}

/// 直立姿勢（胴体5°、大腿直立度10°）
pub fn standing_keypoints() -> Vec<f32> {
    keypoints_for(5.0, 10.0, 100.0, 100.0, 120.0)
}

/// 横たわった姿勢（胴体85°、大腿直立度70°）
pub fn lying_keypoints() -> Vec<f32> {
    keypoints_for(85.0, 70.0, 100.0, 100.0, 120.0)
}
