//! Liveness decision engine.
//!
//! Turns a short burst of landmark frames into a calibrated live/spoof
//! decision: behavioral signals from `livecheck-signals`, a pluggable ML
//! classifier with remote fallback, weighted fusion under a named policy,
//! and consent-gated evidence capture.

pub mod config;
pub mod error;
pub mod evidence;
pub mod fusion;
pub mod ml;
pub mod policy;
pub mod session;
pub mod tuning;
pub mod weights;

#[cfg(test)]
pub mod tests_proptest;

// ============================================================================
// CURATED PUBLIC API EXPORTS
// ============================================================================

// Configuration and errors
pub use config::{ConfigError, EngineConfig};
pub use error::{EvidenceError, LivenessError, LivenessResult, MlError};

// Fusion
pub use fusion::{
    fuse, ComponentScores, DecisionWarning, FusionInputs, FusionOptions, LivenessDecision,
    ReasonCode,
};
pub use weights::{
    recommend_weights, DeviceQuality, EnvironmentProfile, FusionWeights, Lighting, SecurityLevel,
};
pub use tuning::{tune_weights, LabeledSample, TuningGrid, TuningOutcome};

// Policies
pub use policy::{Policy, PolicyRegistry};

// ML adapter
pub use ml::{
    HeuristicMotionModel, InferenceContext, LivenessModel, MlAdapterConfig, MlLivenessAdapter,
    MlResult, MlSource, ModelShape, RawPrediction, RemoteVerifier,
};

// Evidence
pub use evidence::{
    AuditAccess, ConsentStatus, ConsentToken, EvidenceMetadata, EvidenceRecord, EvidenceStore,
    MemoryEvidenceStore, RetentionPolicy, StorageConfig,
};

// Orchestration
pub use session::{LivenessEngine, SessionOutcome, SessionPhase, SessionRequest};

// Signal layer
pub use livecheck_signals as signals;
