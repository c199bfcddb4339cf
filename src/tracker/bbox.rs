use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};

/// BBox（ピクセル座標、左上原点）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// `[x, y, width, height, ...]` から生成。5要素目以降は無視
    pub fn from_slice(values: &[f32]) -> Result<Self> {
        match values {
            [x, y, w, h, ..] => Ok(Self::new(*x, *y, *w, *h)),
            _ => Err(AnalyticsError::BBoxArity { got: values.len() }),
        }
    }

    pub fn to_vec(&self) -> Vec<f32> {
        vec![self.x, self.y, self.width, self.height]
    }

    /// 上端の下向き速度 (px/ms)
    pub fn top_velocity(&self, previous: &BBox, elapsed_ms: f64) -> f64 {
        (self.y as f64 - previous.y as f64) / elapsed_ms
    }

    /// 高さの縮み速度 (px/ms)
    pub fn shrink_velocity(&self, previous: &BBox, elapsed_ms: f64) -> f64 {
        (previous.height as f64 - self.height as f64) / elapsed_ms
    }
}
