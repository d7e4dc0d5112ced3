use proptest::prelude::*;

// Property-based checks of the extractor score ranges

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blink::{detect_blinks, BlinkConfig};
    use crate::frame::{synth, LandmarkFrame};
    use crate::motion::{aggregate_motion, MotionWeights};
    use crate::mouth::{detect_mouth_movement, MouthConfig};
    use crate::signal::{SignalEvidence, SignalResult, NEUTRAL_SCORE};
    use crate::stability::{check_stability, StabilityConfig, REPLAY_SCORE_CAP};

    fn burst(ears: &[f32], mars: &[f32]) -> Vec<LandmarkFrame> {
        ears.iter()
            .zip(mars.iter().cycle())
            .enumerate()
            .map(|(i, (&ear, &mar))| synth::face(i as i64 * 33, ear, mar, 0.0))
            .collect()
    }

    fn sub_signal() -> impl Strategy<Value = Option<SignalResult>> {
        let evidence = SignalEvidence::Mouth {
            movement_count: 0,
            max_openness: 0.0,
        };
        let absent = SignalResult::absent(NEUTRAL_SCORE, evidence.clone());
        prop_oneof![
            Just(None),
            Just(Some(absent)),
            (-0.5f32..1.5).prop_map(move |s| Some(SignalResult::measured(s, evidence.clone()))),
        ]
    }

    // =========================================================================
    // Event extractors
    // =========================================================================
    proptest! {
        #[test]
        fn test_blink_score_in_unit_range(ears in prop::collection::vec(0.0f32..0.5, 3..60)) {
            let frames = burst(&ears, &[0.2]);
            let r = detect_blinks(&frames, &BlinkConfig::default());
            prop_assert!(r.present);
            prop_assert!((0.0..=1.0).contains(&r.score));
            prop_assert!(r.event_count() as usize <= ears.len() / 2);
        }

        #[test]
        fn test_mouth_score_in_unit_range(mars in prop::collection::vec(0.0f32..1.0, 3..60)) {
            let ears = vec![0.3; mars.len()];
            let frames = burst(&ears, &mars);
            let r = detect_mouth_movement(&frames, &MouthConfig::default());
            prop_assert!((0.0..=1.0).contains(&r.score));
            prop_assert!(r.event_count() as usize <= mars.len() / 2);
        }
    }

    // =========================================================================
    // Aggregation stays between the present sub-signals
    // =========================================================================
    proptest! {
        #[test]
        fn test_aggregate_within_present_bounds(
            blink in sub_signal(),
            turn in sub_signal(),
            mouth in sub_signal(),
        ) {
            let score = aggregate_motion(
                blink.as_ref(),
                turn.as_ref(),
                mouth.as_ref(),
                &MotionWeights::default(),
            );
            let present: Vec<f32> = [&blink, &turn, &mouth]
                .iter()
                .filter_map(|s| s.as_ref().filter(|r| r.present).map(|r| r.score))
                .collect();

            if present.is_empty() {
                prop_assert_eq!(score, NEUTRAL_SCORE);
            } else {
                let lo = present.iter().copied().fold(f32::INFINITY, f32::min);
                let hi = present.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                prop_assert!(score >= lo - 1e-5 && score <= hi + 1e-5);
            }
        }
    }

    // =========================================================================
    // Stability
    // =========================================================================
    proptest! {
        #[test]
        fn test_stability_score_capped_on_replay(levels in prop::collection::vec(0.0f32..255.0, 2..40)) {
            let frames: Vec<LandmarkFrame> = levels
                .iter()
                .enumerate()
                .map(|(i, &level)| {
                    let mut f = synth::face(i as i64 * 33, 0.3, 0.2, 0.0);
                    f.pixels = Some(synth::pixels(level));
                    f
                })
                .collect();
            let r = check_stability(&frames, &StabilityConfig::default());
            prop_assert!((0.0..=1.0).contains(&r.score));
            if let SignalEvidence::Stability { possible_replay: true, .. } = r.evidence {
                prop_assert!(r.score <= REPLAY_SCORE_CAP);
            }
        }
    }
}
