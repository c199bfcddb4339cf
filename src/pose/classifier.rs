use std::fmt;

use serde::{Deserialize, Serialize};

use super::features::PoseFeatures;

/// 胴体角の閾値（度）
pub const TORSO_LOW_DEG: f64 = 30.0;
pub const TORSO_HIGH_DEG: f64 = 80.0;
/// 大腿直立度の閾値（度）
pub const UPRIGHT_LOW_DEG: f64 = 40.0;
pub const UPRIGHT_HIGH_DEG: f64 = 60.0;
/// 大腿/下腿 比の閾値
pub const THIGH_CALF_RATIO: f64 = 0.7;
/// 胴体/脚 比の閾値
pub const TORSO_LEG_RATIO: f64 = 0.5;

/// 姿勢ラベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseLabel {
    Standing,
    Sitting,
    BendingDown,
    LyingDown,
    /// 姿勢を抽出できなかった
    #[serde(rename = "None")]
    NoPose,
}

impl PoseLabel {
    /// 2ビットの姿勢コード
    pub fn code(self) -> Option<u8> {
        match self {
            PoseLabel::Standing => Some(0),
            PoseLabel::Sitting => Some(1),
            PoseLabel::BendingDown => Some(2),
            PoseLabel::LyingDown => Some(3),
            PoseLabel::NoPose => None,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => PoseLabel::Standing,
            1 => PoseLabel::Sitting,
            2 => PoseLabel::BendingDown,
            3 => PoseLabel::LyingDown,
            _ => PoseLabel::NoPose,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PoseLabel::Standing => "standing",
            PoseLabel::Sitting => "sitting",
            PoseLabel::BendingDown => "bending_down",
            PoseLabel::LyingDown => "lying_down",
            PoseLabel::NoPose => "None",
        }
    }
}

impl fmt::Display for PoseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 平文モードの決定木
pub fn classify_plain(f: &PoseFeatures) -> PoseLabel {
    let torso = f.torso_angle;
    let upright = f.thigh_uprightness;

    if torso < TORSO_LOW_DEG && upright < UPRIGHT_LOW_DEG {
        if f.thigh_calf_ratio < THIGH_CALF_RATIO {
            PoseLabel::Sitting
        } else if f.torso_leg_ratio < TORSO_LEG_RATIO {
            PoseLabel::BendingDown
        } else {
            PoseLabel::Standing
        }
    } else if torso < TORSO_LOW_DEG {
        PoseLabel::Sitting
    } else if torso < TORSO_HIGH_DEG && upright < UPRIGHT_HIGH_DEG {
        PoseLabel::BendingDown
    } else {
        PoseLabel::LyingDown
    }
}
