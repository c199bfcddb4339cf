use std::collections::VecDeque;
use std::fmt;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::bbox::BBox;

/// (カメラID, トラックID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackKey {
    pub camera_id: String,
    pub track_id: i64,
}

impl TrackKey {
    pub fn new(camera_id: impl Into<String>, track_id: i64) -> Self {
        Self {
            camera_id: camera_id.into(),
            track_id,
        }
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.camera_id, self.track_id)
    }
}

/// 1フレーム分の観測
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSample {
    pub bbox: BBox,
    pub keypoints: Vec<f32>,
}

/// トラックごとの固定長FIFO
///
/// 満杯になると最古のサンプルを捨てる。速度計算の基準には最古のサンプルを使うので、
/// 現フレームとの差は常に (容量-1) フレーム分になる。
/// エントリは `forget` されるまで残る。
pub struct TrackHistoryStore {
    capacity: usize,
    tracks: DashMap<TrackKey, VecDeque<TrackSample>>,
}

impl TrackHistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tracks: DashMap::new(),
        }
    }

    /// サンプルを追加（初回はウィンドウを作成）
    pub fn record(&self, key: &TrackKey, bbox: BBox, keypoints: Vec<f32>) {
        self.record_then(key, bbox, keypoints, |_| ());
    }

    /// サンプルを追加し、満杯なら最古のサンプルを渡して `f` を呼ぶ
    ///
    /// `f` はトラックのエントリロックを保持したまま実行されるので、同じキーへの
    /// 追加と基準サンプルの読み出しは1フレームずつ直列化される。
    /// `f` の中からこのストアに触れるとデッドロックする。
    pub fn record_then<T>(
        &self,
        key: &TrackKey,
        bbox: BBox,
        keypoints: Vec<f32>,
        f: impl FnOnce(Option<&TrackSample>) -> T,
    ) -> T {
        let mut window = self
            .tracks
            .entry(key.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        if window.len() >= self.capacity {
            window.pop_front();
        }
        window.push_back(TrackSample { bbox, keypoints });
        let baseline = if window.len() == self.capacity { window.front() } else { None };
        f(baseline)
    }

    /// ウィンドウが満杯か
    pub fn ready(&self, key: &TrackKey) -> bool {
        self.len(key) == self.capacity
    }

    /// 最古のサンプル
    pub fn previous(&self, key: &TrackKey) -> Option<TrackSample> {
        self.tracks.get(key).and_then(|w| w.front().cloned())
    }

    pub fn len(&self, key: &TrackKey) -> usize {
        self.tracks.get(key).map(|w| w.len()).unwrap_or(0)
    }

    pub fn forget(&self, key: &TrackKey) {
        self.tracks.remove(key);
    }

    /// 追跡中のトラック数
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}
