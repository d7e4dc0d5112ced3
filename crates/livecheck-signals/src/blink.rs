//! Blink Detection
//!
//! Counts blinks over a frame burst from the six-point eye contour:
//! - Eye Aspect Ratio (EAR) per frame, averaged over the visible eyes
//! - Hysteresis between a closed and an open threshold
//! - Closures shorter than a minimum dwell are rejected as sensor noise

use serde::{Deserialize, Serialize};

use crate::frame::LandmarkFrame;
use crate::signal::{saturating_event_score, SignalEvidence, SignalResult, NEUTRAL_SCORE};

/// Score when eyes were tracked but never blinked
pub const NO_BLINK_SCORE: f32 = 0.1;

/// Blink detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlinkConfig {
    /// EAR below which the eye counts as closed
    pub closed_threshold: f32,
    /// EAR above which a closed eye counts as reopened
    pub open_threshold: f32,
    /// Closures shorter than this are faster than an eyelid can move
    pub min_dwell_ms: i64,
    /// Closures longer than this are deliberate eye shutting, not blinks
    pub max_blink_ms: i64,
    /// Blink count at which the score saturates
    pub saturation: u32,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            closed_threshold: 0.20,
            open_threshold: 0.25,
            min_dwell_ms: 50,
            max_blink_ms: 500,
            saturation: 2,
        }
    }
}

/// Count blinks over the sequence and score them
pub fn detect_blinks(frames: &[LandmarkFrame], config: &BlinkConfig) -> SignalResult {
    let mut blink_count = 0u32;
    let mut rejected_fast = 0u32;
    let mut min_openness = f32::MAX;
    let mut measured = 0usize;
    let mut closed_since: Option<i64> = None;

    for frame in frames {
        let Some(ear) = frame.eye_openness() else {
            continue;
        };
        measured += 1;
        min_openness = min_openness.min(ear);

        match closed_since {
            None => {
                if ear < config.closed_threshold {
                    closed_since = Some(frame.timestamp_ms);
                }
            }
            Some(start) => {
                if ear > config.open_threshold {
                    let duration_ms = frame.timestamp_ms - start;
                    if duration_ms < config.min_dwell_ms {
                        rejected_fast += 1;
                    } else if duration_ms <= config.max_blink_ms {
                        blink_count += 1;
                    }
                    closed_since = None;
                }
            }
        }
    }

    if measured == 0 {
        return SignalResult::absent(
            NEUTRAL_SCORE,
            SignalEvidence::Blink {
                blink_count: 0,
                rejected_fast: 0,
                min_openness: 0.0,
            },
        );
    }

    if rejected_fast > 0 {
        log::debug!("blink: rejected {} sub-dwell closures", rejected_fast);
    }

    let score = saturating_event_score(blink_count, config.saturation, NO_BLINK_SCORE);
    SignalResult::measured(
        score,
        SignalEvidence::Blink {
            blink_count,
            rejected_fast,
            min_openness,
        },
    )
}
