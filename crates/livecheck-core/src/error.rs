//! Error taxonomy.
//!
//! Only [`LivenessError`] ever leaves the engine. [`MlError`] is absorbed by
//! the ML adapter and [`EvidenceError`] by the session orchestrator; both
//! degrade into neutral scores or soft warnings on the decision.

use thiserror::Error;

use crate::config::ConfigError;

/// Result type for engine operations
pub type LivenessResult<T> = Result<T, LivenessError>;

/// Fatal input-validation and caller errors
#[derive(Debug, Error)]
pub enum LivenessError {
    #[error("insufficient frames: got {got}, need at least {required}")]
    InsufficientFrames { got: usize, required: usize },

    #[error("frame timestamps must be strictly increasing (violated at frame {index})")]
    NonMonotonicTimestamps { index: usize },

    #[error("model shape mismatch: model expects {expected}, called with {got}")]
    ShapeMismatch {
        expected: &'static str,
        got: &'static str,
    },

    #[error("unknown policy: {0}")]
    UnknownPolicy(String),

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("calibration error: {0}")]
    Calibration(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<livecheck_signals::SequenceError> for LivenessError {
    fn from(e: livecheck_signals::SequenceError) -> Self {
        use livecheck_signals::SequenceError;
        match e {
            SequenceError::TooFewFrames { got, required } => {
                Self::InsufficientFrames { got, required }
            }
            SequenceError::NonMonotonic { index } => Self::NonMonotonicTimestamps { index },
        }
    }
}

/// Local or remote inference failures
#[derive(Debug, Clone, Error)]
pub enum MlError {
    #[error("model not loaded")]
    NotLoaded,

    #[error("model load failed: {0}")]
    LoadFailed(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("invalid model output: {0}")]
    InvalidOutput(String),

    #[error("remote verification not configured")]
    RemoteUnavailable,

    #[error("remote verification failed: {0}")]
    Remote(String),

    #[error("timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

/// Evidence store failures
#[derive(Debug, Clone, Error)]
pub enum EvidenceError {
    #[error("audit token rejected")]
    Unauthorized,

    #[error("evidence not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("retention of {0} days runs past the supported date range")]
    Retention(u32),
}

impl From<serde_json::Error> for EvidenceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
