//! Frame Stability / Replay Check
//!
//! A played-back photo or frozen video produces frame-to-frame pixel
//! differences at sensor-noise level. Each consecutive pair whose mean
//! squared luma difference falls below a floor counts as a static frame;
//! more static frames than the tolerance flags `possible_replay`.

use serde::{Deserialize, Serialize};

use crate::frame::LandmarkFrame;
use crate::signal::{SignalEvidence, SignalResult};

/// Neutral stability when no pixel data is available
pub const STABILITY_NEUTRAL: f32 = 0.8;
/// Upper bound on the score of a flagged sequence
pub const REPLAY_SCORE_CAP: f32 = 0.25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityConfig {
    /// Mean squared luma difference under which a frame pair is static
    pub variance_floor: f32,
    /// Static frames tolerated before flagging a replay
    pub static_frame_tolerance: u32,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            variance_floor: 2.0,
            static_frame_tolerance: 2,
        }
    }
}

/// Check frame-to-frame pixel variance for replay signatures
pub fn check_stability(frames: &[LandmarkFrame], config: &StabilityConfig) -> SignalResult {
    let mut static_frames = 0u32;
    let mut compared_pairs = 0u32;
    let mut total_variance = 0.0f32;

    for pair in frames.windows(2) {
        let (Some(prev), Some(curr)) = (pair[0].pixels.as_ref(), pair[1].pixels.as_ref()) else {
            continue;
        };
        let Some(variance) = prev.mean_squared_diff(curr) else {
            continue;
        };
        compared_pairs += 1;
        total_variance += variance;
        if variance < config.variance_floor {
            static_frames += 1;
        }
    }

    if compared_pairs == 0 {
        return SignalResult::absent(
            STABILITY_NEUTRAL,
            SignalEvidence::Stability {
                static_frames: 0,
                compared_pairs: 0,
                mean_variance: 0.0,
                possible_replay: false,
            },
        );
    }

    let possible_replay = static_frames > config.static_frame_tolerance;
    let static_ratio = static_frames as f32 / compared_pairs as f32;
    let mut score = 1.0 - static_ratio;
    if possible_replay {
        score = score.min(REPLAY_SCORE_CAP);
        log::debug!(
            "stability: {}/{} static frame pairs, flagged possible_replay",
            static_frames,
            compared_pairs
        );
    }

    SignalResult::measured(
        score,
        SignalEvidence::Stability {
            static_frames,
            compared_pairs,
            mean_variance: total_variance / compared_pairs as f32,
            possible_replay,
        },
    )
}
