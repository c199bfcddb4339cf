pub mod analytics;
pub mod config;
pub mod error;
pub mod fall;
pub mod hme;
pub mod pose;
pub mod tracker;

pub use analytics::{AnalysisResult, Analytics};
pub use error::AnalyticsError;
pub use fall::FallResult;
pub use pose::{PoseLabel, PoseResult};
