//! Mouth Movement Detection
//!
//! Mouth Aspect Ratio (MAR) over the eight-point mouth contour; each
//! open-then-close transition counts as one movement event.

use serde::{Deserialize, Serialize};

use crate::frame::LandmarkFrame;
use crate::signal::{saturating_event_score, SignalEvidence, SignalResult, NEUTRAL_SCORE};

/// Score when the mouth was tracked but never moved
pub const NO_MOVEMENT_SCORE: f32 = 0.15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MouthConfig {
    /// MAR above which the mouth counts as open
    pub open_threshold: f32,
    /// MAR below which an open mouth counts as closed again
    pub closed_threshold: f32,
    /// Movement count at which the score saturates
    pub saturation: u32,
}

impl Default for MouthConfig {
    fn default() -> Self {
        Self {
            open_threshold: 0.5,
            closed_threshold: 0.3,
            saturation: 2,
        }
    }
}

/// Count open/close mouth movements and score them
pub fn detect_mouth_movement(frames: &[LandmarkFrame], config: &MouthConfig) -> SignalResult {
    let mut movement_count = 0u32;
    let mut max_openness = 0.0f32;
    let mut measured = 0usize;
    let mut is_open = false;

    for mar in frames.iter().filter_map(LandmarkFrame::mouth_openness) {
        measured += 1;
        max_openness = max_openness.max(mar);

        if !is_open && mar > config.open_threshold {
            is_open = true;
        } else if is_open && mar < config.closed_threshold {
            is_open = false;
            movement_count += 1;
        }
    }

    let evidence = SignalEvidence::Mouth {
        movement_count,
        max_openness,
    };

    if measured == 0 {
        return SignalResult::absent(NEUTRAL_SCORE, evidence);
    }

    let score = saturating_event_score(movement_count, config.saturation, NO_MOVEMENT_SCORE);
    SignalResult::measured(score, evidence)
}
