//! Motion signal extractors for liveness detection.
//!
//! Pure, deterministic functions over a burst of [`LandmarkFrame`]s:
//! - `blink`: eye-openness blink counting
//! - `head_turn`: yaw excursions from nose/eye-line geometry
//! - `mouth`: open/close mouth movements
//! - `stability`: frame-to-frame pixel variance (replay check)
//! - `motion`: policy-driven aggregation of the behavioral signals

pub mod blink;
pub mod frame;
pub mod head_turn;
pub mod motion;
pub mod mouth;
pub mod signal;
pub mod stability;

#[cfg(test)]
pub mod tests_proptest;

pub use blink::{detect_blinks, BlinkConfig};
pub use frame::{
    validate_sequence, LandmarkFrame, PixelSample, Point, SequenceError, MIN_FRAMES,
};
pub use head_turn::{detect_head_turns, estimate_yaw, HeadTurnConfig};
pub use motion::{
    aggregate_motion, extract_all, extract_motion, ExtractedSignals, ExtractorConfig,
    MotionSummary, MotionWeights, RequiredSignals,
};
pub use mouth::{detect_mouth_movement, MouthConfig};
pub use signal::{SignalEvidence, SignalResult, NEUTRAL_SCORE};
pub use stability::{check_stability, StabilityConfig, STABILITY_NEUTRAL};
