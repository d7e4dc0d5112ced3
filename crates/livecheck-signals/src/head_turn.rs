//! Head Turn Detection
//!
//! Yaw is estimated from the lateral displacement of the nose tip relative
//! to the eye-line midpoint, scaled by inter-ocular distance. A turn event
//! needs the yaw to cross an outward threshold and then come back toward
//! center within the burst.

use serde::{Deserialize, Serialize};

use crate::frame::{distance, LandmarkFrame};
use crate::signal::{SignalEvidence, SignalResult, NEUTRAL_SCORE};

/// Score for a purely frontal burst
pub const FRONTAL_SCORE: f32 = 0.1;
/// Score when the head went outward but never came back
pub const UNRETURNED_SCORE: f32 = 0.35;
/// Score for excursions on one side only
pub const ONE_SIDED_SCORE: f32 = 0.6;

/// Head turn configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadTurnConfig {
    /// Yaw (degrees) that must be exceeded for an excursion
    pub outward_deg: f32,
    /// Yaw (degrees) under which the head counts as back at center
    pub return_deg: f32,
    /// Degrees per inter-ocular unit of nose displacement
    pub yaw_scale_deg: f32,
}

impl Default for HeadTurnConfig {
    fn default() -> Self {
        Self {
            outward_deg: 15.0,
            return_deg: 7.0,
            yaw_scale_deg: 90.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Estimated yaw in degrees (positive = nose toward image right)
pub fn estimate_yaw(frame: &LandmarkFrame, config: &HeadTurnConfig) -> Option<f32> {
    let nose = frame.nose?;
    let (left, right) = frame.eye_centers()?;
    let iod = distance(left, right);
    if iod < 0.001 {
        return None;
    }
    let mid_x = (left[0] + right[0]) / 2.0;
    let offset = (nose[0] - mid_x) / iod;
    Some((offset * config.yaw_scale_deg).clamp(-90.0, 90.0))
}

/// Count head turn excursions and score them
pub fn detect_head_turns(frames: &[LandmarkFrame], config: &HeadTurnConfig) -> SignalResult {
    let mut left_turns = 0u32;
    let mut right_turns = 0u32;
    let mut max_abs_yaw = 0.0f32;
    let mut went_outward = false;
    let mut measured = 0usize;
    let mut excursion: Option<Side> = None;

    let outward_side = |yaw: f32| {
        if yaw > config.outward_deg {
            Some(Side::Right)
        } else if yaw < -config.outward_deg {
            Some(Side::Left)
        } else {
            None
        }
    };

    for frame in frames {
        let Some(yaw) = estimate_yaw(frame, config) else {
            continue;
        };
        measured += 1;
        max_abs_yaw = max_abs_yaw.max(yaw.abs());

        match excursion {
            None => {
                excursion = outward_side(yaw);
                went_outward |= excursion.is_some();
            }
            Some(side) => {
                let crossed_center = match side {
                    Side::Right => yaw < 0.0,
                    Side::Left => yaw > 0.0,
                };
                if yaw.abs() < config.return_deg || crossed_center {
                    match side {
                        Side::Left => left_turns += 1,
                        Side::Right => right_turns += 1,
                    }
                    // swinging straight through to the other side opens a new excursion
                    excursion = outward_side(yaw);
                }
            }
        }
    }

    let turn_count = left_turns + right_turns;
    let evidence = SignalEvidence::HeadTurn {
        turn_count,
        left_turns,
        right_turns,
        max_abs_yaw_deg: max_abs_yaw,
    };

    if measured == 0 {
        return SignalResult::absent(NEUTRAL_SCORE, evidence);
    }

    let score = if left_turns > 0 && right_turns > 0 {
        1.0
    } else if turn_count > 0 {
        ONE_SIDED_SCORE
    } else if went_outward {
        UNRETURNED_SCORE
    } else {
        FRONTAL_SCORE
    };

    SignalResult::measured(score, evidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::synth;

    fn burst(nose_dx: &[f32]) -> Vec<LandmarkFrame> {
        nose_dx
            .iter()
            .enumerate()
            .map(|(i, &dx)| synth::face(i as i64 * 33, 0.3, 0.2, dx))
            .collect()
    }

    fn turns(r: &SignalResult) -> (u32, u32) {
        match r.evidence {
            SignalEvidence::HeadTurn {
                left_turns,
                right_turns,
                ..
            } => (left_turns, right_turns),
            _ => panic!("wrong evidence"),
        }
    }

    #[test]
    fn test_yaw_scaling() {
        let cfg = HeadTurnConfig::default();
        let f = synth::face(0, 0.3, 0.2, 0.25);
        let yaw = estimate_yaw(&f, &cfg).unwrap();
        assert!((yaw - 22.5).abs() < 0.1);
    }

    #[test]
    fn test_left_and_right_excursions() {
        let r = detect_head_turns(
            &burst(&[0.0, 0.3, 0.3, 0.0, -0.3, -0.3, 0.0]),
            &HeadTurnConfig::default(),
        );
        assert_eq!(turns(&r), (1, 1));
        assert!((r.score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_one_sided() {
        let r = detect_head_turns(&burst(&[0.0, 0.3, 0.0, 0.3, 0.0]), &HeadTurnConfig::default());
        assert_eq!(turns(&r), (0, 2));
        assert!((r.score - ONE_SIDED_SCORE).abs() < 1e-6);
    }

    #[test]
    fn test_swing_through_center() {
        let r = detect_head_turns(&burst(&[0.0, 0.3, -0.3, 0.0]), &HeadTurnConfig::default());
        assert_eq!(turns(&r), (1, 1));
    }

    #[test]
    fn test_unreturned_excursion() {
        let r = detect_head_turns(&burst(&[0.0, 0.3, 0.3, 0.3]), &HeadTurnConfig::default());
        assert_eq!(r.event_count(), 0);
        assert!((r.score - UNRETURNED_SCORE).abs() < 1e-6);
    }

    #[test]
    fn test_frontal_scores_low() {
        let r = detect_head_turns(&burst(&[0.0, 0.01, -0.01, 0.0]), &HeadTurnConfig::default());
        assert!(r.present);
        assert_eq!(r.event_count(), 0);
        assert!(r.score < 0.3);
    }

    #[test]
    fn test_missing_nose_neutral() {
        let mut frames = burst(&[0.0, 0.3, 0.0]);
        for f in &mut frames {
            f.nose = None;
        }
        let r = detect_head_turns(&frames, &HeadTurnConfig::default());
        assert!(!r.present);
        assert!((r.score - NEUTRAL_SCORE).abs() < 1e-6);
    }
}
