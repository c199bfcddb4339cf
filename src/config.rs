use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fall: FallConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FallConfig {
    /// bbox上端・高さの速度閾値 (px/ms)
    #[serde(default = "default_motion_velocity")]
    pub motion_velocity: f64,
    /// カウンタ上限かつ判定閾値
    #[serde(default = "default_count_threshold")]
    pub count_threshold: u8,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    /// キーポイント平均化・トラック履歴のフレーム数
    #[serde(default = "default_window")]
    pub window: usize,
    /// カメラのフレームレート
    #[serde(default = "default_fps")]
    pub fps: f64,
}

fn default_motion_velocity() -> f64 { 0.43 }
fn default_count_threshold() -> u8 { 2 }
fn default_window() -> usize { 5 }
fn default_fps() -> f64 { 30.0 }

impl Default for FallConfig {
    fn default() -> Self {
        Self {
            motion_velocity: default_motion_velocity(),
            count_threshold: default_count_threshold(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            fps: default_fps(),
        }
    }
}

impl HistoryConfig {
    /// 最古サンプルから現フレームまでの想定経過時間 (ms)
    pub fn elapsed_ms(&self) -> f64 {
        self.window as f64 * 1000.0 / self.fps
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Config = toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// 読めなければデフォルト
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config not found, using defaults");
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %format!("{:#}", e), "invalid config, using defaults");
                Self::default()
            }
        }
    }
}
