use proptest::prelude::*;

// Property-based checks of the fusion invariants

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::{fuse, FusionInputs, FusionOptions};
    use crate::weights::FusionWeights;

    fn weight() -> impl Strategy<Value = f64> {
        prop_oneof![
            Just(0.0),
            0.0f64..1.0,
            1.0f64..1e6,
            -10.0f64..0.0,
        ]
    }

    fn weights() -> impl Strategy<Value = FusionWeights> {
        (weight(), weight(), weight(), weight(), weight())
            .prop_map(|(a, b, c, d, e)| FusionWeights::new(a, b, c, d, e))
    }

    fn component() -> impl Strategy<Value = Option<f64>> {
        prop_oneof![Just(None), (-0.5f64..1.5).prop_map(Some)]
    }

    fn inputs() -> impl Strategy<Value = FusionInputs> {
        (
            component(),
            component(),
            component(),
            component(),
            component(),
            component(),
            component(),
        )
            .prop_map(|(motion, blink, head_turn, ml, quality, device, stability)| {
                FusionInputs {
                    motion,
                    blink,
                    head_turn,
                    ml,
                    quality,
                    device,
                    stability,
                }
            })
    }

    // =========================================================================
    // Weight normalization
    // =========================================================================
    proptest! {
        #[test]
        fn test_normalized_weights_sum_to_one(w in weights()) {
            let n = w.normalized();
            prop_assert!((n.sum() - 1.0).abs() < 1e-6);
            prop_assert!(n.as_array().iter().all(|x| *x >= 0.0));
        }
    }

    // =========================================================================
    // Score clamping and exact verdict
    // =========================================================================
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn test_score_clamped_and_verdict_exact(
            i in inputs(),
            w in weights(),
            threshold in 0.01f64..0.99,
        ) {
            let d = fuse(&i, &w, &FusionOptions::with_threshold(threshold));
            prop_assert!((0.0..=1.0).contains(&d.score));
            prop_assert_eq!(d.is_live, d.score >= threshold);
            prop_assert_eq!(d.reasons.is_empty(), d.is_live);
            prop_assert!((0.0..=100.0).contains(&d.confidence));
        }
    }

    // =========================================================================
    // Idempotence
    // =========================================================================
    proptest! {
        #[test]
        fn test_fuse_idempotent(i in inputs(), w in weights()) {
            let opts = FusionOptions::default();
            let a = fuse(&i, &w, &opts);
            let b = fuse(&i, &w, &opts);
            prop_assert_eq!(a.score.to_bits(), b.score.to_bits());
            prop_assert_eq!(a.confidence.to_bits(), b.confidence.to_bits());
            prop_assert_eq!(a.is_live, b.is_live);
            prop_assert_eq!(a.components, b.components);
            prop_assert_eq!(a.weights, b.weights);
            prop_assert_eq!(a.reasons, b.reasons);
            prop_assert_eq!(a.evidence_refs, b.evidence_refs);
        }
    }

    // =========================================================================
    // Monotonicity in each component
    // =========================================================================
    proptest! {
        #[test]
        fn test_raising_a_component_never_lowers_score(
            base in prop::array::uniform5(0.0f64..1.0),
            which in 0usize..5,
            bump in 0.0f64..1.0,
            w in weights(),
        ) {
            let build = |c: [f64; 5]| FusionInputs {
                motion: Some(c[0]),
                ml: Some(c[1]),
                quality: Some(c[2]),
                device: Some(c[3]),
                stability: Some(c[4]),
                ..Default::default()
            };
            let mut raised = base;
            raised[which] += bump;

            let opts = FusionOptions::default();
            let lo = fuse(&build(base), &w, &opts);
            let hi = fuse(&build(raised), &w, &opts);
            prop_assert!(hi.score >= lo.score - 1e-12);
        }
    }
}
