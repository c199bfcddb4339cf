use thiserror::Error;

/// Recoverable input and geometry faults.
///
/// These never leave the public `Analytics` surface: each entry point turns them
/// into the matching "no signal" result after logging.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalyticsError {
    #[error("expected 34 keypoint values, got {got}")]
    KeypointCount { got: usize },

    #[error("keypoint {index} is missing")]
    MissingKeypoint { index: usize },

    #[error("degenerate geometry: zero-length torso or thigh vector")]
    DegenerateGeometry,

    #[error("ciphertext must have {expected} residues, got {got}")]
    CiphertextArity { expected: usize, got: usize },

    #[error("bbox must have at least 4 values, got {got}")]
    BBoxArity { got: usize },
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
