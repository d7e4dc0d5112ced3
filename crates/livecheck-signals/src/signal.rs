//! Per-extractor signal results.

use serde::{Deserialize, Serialize};

/// Score used when the underlying signal is absent
pub const NEUTRAL_SCORE: f32 = 0.5;

/// Extractor-specific evidence counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalEvidence {
    Blink {
        blink_count: u32,
        /// Closures rejected as faster than a physical blink
        rejected_fast: u32,
        min_openness: f32,
    },
    HeadTurn {
        turn_count: u32,
        left_turns: u32,
        right_turns: u32,
        max_abs_yaw_deg: f32,
    },
    Mouth {
        movement_count: u32,
        max_openness: f32,
    },
    Stability {
        static_frames: u32,
        compared_pairs: u32,
        mean_variance: f32,
        possible_replay: bool,
    },
}

/// Output of one motion signal extractor
///
/// `score` is always defined. When the landmarks the extractor needs are
/// missing, `present` is false and the score is the neutral default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalResult {
    pub score: f32,
    /// The signal was computed from real landmarks/pixels
    pub present: bool,
    /// The raw score fell outside [0, 1] and was clamped
    pub normalized: bool,
    pub evidence: SignalEvidence,
}

impl SignalResult {
    pub(crate) fn measured(raw_score: f32, evidence: SignalEvidence) -> Self {
        let score = raw_score.clamp(0.0, 1.0);
        Self {
            score,
            present: true,
            normalized: score != raw_score,
            evidence,
        }
    }

    pub(crate) fn absent(neutral: f32, evidence: SignalEvidence) -> Self {
        Self {
            score: neutral,
            present: false,
            normalized: false,
            evidence,
        }
    }

    /// Event count carried by the evidence (blinks, turns, movements, static frames)
    pub fn event_count(&self) -> u32 {
        match self.evidence {
            SignalEvidence::Blink { blink_count, .. } => blink_count,
            SignalEvidence::HeadTurn { turn_count, .. } => turn_count,
            SignalEvidence::Mouth { movement_count, .. } => movement_count,
            SignalEvidence::Stability { static_frames, .. } => static_frames,
        }
    }
}

/// Saturating event score: `zero_score` for no events, rising from 0.5 to 1.0
pub(crate) fn saturating_event_score(events: u32, saturation: u32, zero_score: f32) -> f32 {
    if events == 0 {
        return zero_score;
    }
    let sat = saturation.max(1);
    0.5 + 0.5 * events.min(sat) as f32 / sat as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturating_score() {
        assert!((saturating_event_score(0, 2, 0.1) - 0.1).abs() < 1e-6);
        assert!((saturating_event_score(1, 2, 0.1) - 0.75).abs() < 1e-6);
        assert!((saturating_event_score(2, 2, 0.1) - 1.0).abs() < 1e-6);
        assert!((saturating_event_score(9, 2, 0.1) - 1.0).abs() < 1e-6);
        // saturation of 0 is treated as 1
        assert!((saturating_event_score(1, 0, 0.1) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_measured_clamps() {
        let ev = SignalEvidence::Mouth {
            movement_count: 0,
            max_openness: 0.0,
        };
        let r = SignalResult::measured(1.4, ev.clone());
        assert_eq!(r.score, 1.0);
        assert!(r.normalized);
        let r = SignalResult::measured(0.4, ev);
        assert!(!r.normalized);
    }
}
