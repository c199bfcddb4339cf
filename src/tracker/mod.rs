pub mod bbox;
pub mod history;

pub use bbox::BBox;
pub use history::{TrackHistoryStore, TrackKey, TrackSample};
