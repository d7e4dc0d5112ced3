//! Aggregated Motion Score
//!
//! Runs the behavioral extractors a policy requires and combines the
//! sub-signals that were actually computed, normalized by the weights
//! present. Mouth is optional and under-weighted.

use serde::{Deserialize, Serialize};

use crate::blink::{detect_blinks, BlinkConfig};
use crate::frame::LandmarkFrame;
use crate::head_turn::{detect_head_turns, HeadTurnConfig};
use crate::mouth::{detect_mouth_movement, MouthConfig};
use crate::signal::{SignalResult, NEUTRAL_SCORE};
use crate::stability::{check_stability, StabilityConfig};

/// Relative weights of the behavioral sub-signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionWeights {
    pub blink: f32,
    pub head_turn: f32,
    pub mouth: f32,
}

impl Default for MotionWeights {
    fn default() -> Self {
        Self {
            blink: 1.0,
            head_turn: 0.9,
            mouth: 0.5,
        }
    }
}

/// Behavioral signals a policy requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredSignals {
    pub blink: bool,
    pub head_turn: bool,
    pub mouth: bool,
}

impl RequiredSignals {
    pub const fn blink_and_turn() -> Self {
        Self {
            blink: true,
            head_turn: true,
            mouth: false,
        }
    }

    pub const fn all() -> Self {
        Self {
            blink: true,
            head_turn: true,
            mouth: true,
        }
    }

    pub const fn blink_only() -> Self {
        Self {
            blink: true,
            head_turn: false,
            mouth: false,
        }
    }
}

impl Default for RequiredSignals {
    fn default() -> Self {
        Self::blink_and_turn()
    }
}

/// Thresholds for every extractor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    #[serde(default)]
    pub blink: BlinkConfig,
    #[serde(default)]
    pub head_turn: HeadTurnConfig,
    #[serde(default)]
    pub mouth: MouthConfig,
    #[serde(default)]
    pub stability: StabilityConfig,
    #[serde(default)]
    pub motion_weights: MotionWeights,
}

/// Behavioral sub-signals and their aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionSummary {
    pub blink: Option<SignalResult>,
    pub head_turn: Option<SignalResult>,
    pub mouth: Option<SignalResult>,
    /// Weighted aggregate over the present sub-signals
    pub score: f32,
}

impl MotionSummary {
    pub fn blink_count(&self) -> u32 {
        self.blink.as_ref().map_or(0, SignalResult::event_count)
    }

    pub fn turn_count(&self) -> u32 {
        self.head_turn.as_ref().map_or(0, SignalResult::event_count)
    }

    /// Raw blink sub-score if the blink signal was computed
    pub fn blink_score(&self) -> Option<f32> {
        present_score(&self.blink)
    }

    /// Raw head-turn sub-score if the head-turn signal was computed
    pub fn head_turn_score(&self) -> Option<f32> {
        present_score(&self.head_turn)
    }
}

fn present_score(signal: &Option<SignalResult>) -> Option<f32> {
    signal.as_ref().filter(|s| s.present).map(|s| s.score)
}

/// Everything the extractors produce for one burst
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSignals {
    pub motion: MotionSummary,
    pub stability: SignalResult,
}

/// Weighted combination of the present sub-signals
///
/// Neutral when none of them was computed.
pub fn aggregate_motion(
    blink: Option<&SignalResult>,
    head_turn: Option<&SignalResult>,
    mouth: Option<&SignalResult>,
    weights: &MotionWeights,
) -> f32 {
    let parts = [
        (blink, weights.blink),
        (head_turn, weights.head_turn),
        (mouth, weights.mouth),
    ];

    let (weighted, total) = parts
        .iter()
        .filter_map(|(signal, w)| signal.filter(|s| s.present).map(|s| (s.score, *w)))
        .filter(|(_, w)| *w > 0.0)
        .fold((0.0f32, 0.0f32), |(acc, tot), (score, w)| (acc + score * w, tot + w));

    if total <= 0.0 {
        return NEUTRAL_SCORE;
    }
    (weighted / total).clamp(0.0, 1.0)
}

/// Run the required behavioral extractors and aggregate them
pub fn extract_motion(
    frames: &[LandmarkFrame],
    required: &RequiredSignals,
    config: &ExtractorConfig,
) -> MotionSummary {
    let blink = required.blink.then(|| detect_blinks(frames, &config.blink));
    let head_turn = required
        .head_turn
        .then(|| detect_head_turns(frames, &config.head_turn));
    let mouth = required
        .mouth
        .then(|| detect_mouth_movement(frames, &config.mouth));

    let score = aggregate_motion(
        blink.as_ref(),
        head_turn.as_ref(),
        mouth.as_ref(),
        &config.motion_weights,
    );

    MotionSummary {
        blink,
        head_turn,
        mouth,
        score,
    }
}

/// Run every extractor for a burst
pub fn extract_all(
    frames: &[LandmarkFrame],
    required: &RequiredSignals,
    config: &ExtractorConfig,
) -> ExtractedSignals {
    ExtractedSignals {
        motion: extract_motion(frames, required, config),
        stability: check_stability(frames, &config.stability),
    }
}
