pub mod classifier;
pub mod encoded;
pub mod estimator;
pub mod features;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod keypoint;

pub use classifier::{classify_plain, PoseLabel};
pub use encoded::{
    decode_label, evaluate_comparisons, ComparisonBits, ComparisonSet, EncodedFeatures, RawFeatureValues,
};
pub use estimator::{default_subject, ComparisonFlags, PoseEstimator, PoseResult};
pub use features::{BodyFrame, KeypointWindow, PoseFeatures};
pub use keypoint::{Keypoint, KeypointIndex, Pose};
