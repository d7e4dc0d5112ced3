//! Offline weight tuning
//!
//! Grid search over (motion, ml) weight pairs against a labeled dataset.
//! Picks the pair with the highest true-positive rate whose false-positive
//! rate stays under a ceiling. Calibration only; never on the request path.

use serde::{Deserialize, Serialize};

use crate::error::{LivenessError, LivenessResult};
use crate::fusion::{weighted_score, FusionInputs};
use crate::policy::DEFAULT_THRESHOLD;
use crate::weights::FusionWeights;

/// One recorded attempt with its ground truth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub inputs: FusionInputs,
    pub is_live: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningGrid {
    pub motion: Vec<f64>,
    pub ml: Vec<f64>,
    /// Source of the quality/device/stability proportions
    pub base: FusionWeights,
    pub threshold: f64,
    pub fpr_ceiling: f64,
}

impl Default for TuningGrid {
    fn default() -> Self {
        Self {
            motion: grid_steps(0.10, 0.60, 0.05),
            ml: grid_steps(0.10, 0.60, 0.05),
            base: FusionWeights::default(),
            threshold: DEFAULT_THRESHOLD,
            fpr_ceiling: 0.05,
        }
    }
}

impl TuningGrid {
    pub fn with_fpr_ceiling(fpr_ceiling: f64) -> Self {
        Self {
            fpr_ceiling,
            ..Default::default()
        }
    }

    /// Full weight set for a (motion, ml) pair
    ///
    /// The remainder is shared by quality, device and stability in the
    /// proportions of `base`. `None` when the pair alone exceeds 1.0.
    pub fn candidate_weights(&self, motion: f64, ml: f64) -> Option<FusionWeights> {
        let remainder = 1.0 - motion - ml;
        if motion < 0.0 || ml < 0.0 || remainder < -1e-9 {
            return None;
        }
        let remainder = remainder.max(0.0);
        let base = self.base.normalized();
        let rest = base.quality + base.device + base.stability;
        let (q, d, s) = if rest > 0.0 {
            (base.quality / rest, base.device / rest, base.stability / rest)
        } else {
            (1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0)
        };
        Some(FusionWeights::new(
            motion,
            ml,
            remainder * q,
            remainder * d,
            remainder * s,
        ))
    }
}

/// Evenly spaced values from `from` to `to` inclusive
pub fn grid_steps(from: f64, to: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || to < from {
        return vec![from];
    }
    let n = ((to - from) / step + 1e-9).floor() as usize;
    (0..=n).map(|i| from + step * i as f64).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningCandidate {
    pub weights: FusionWeights,
    pub tpr: f64,
    pub fpr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningOutcome {
    pub best: TuningCandidate,
    /// Weight sets scored against the dataset
    pub evaluated: usize,
    /// Candidates that met the FPR ceiling
    pub admissible: usize,
}

/// Rates for one weight set over the dataset
pub fn evaluate(samples: &[LabeledSample], weights: &FusionWeights, threshold: f64) -> (f64, f64) {
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut positives = 0usize;
    let mut negatives = 0usize;

    for sample in samples {
        let live = weighted_score(&sample.inputs.resolve(), weights) >= threshold;
        if sample.is_live {
            positives += 1;
            tp += live as usize;
        } else {
            negatives += 1;
            fp += live as usize;
        }
    }

    let rate = |n: usize, d: usize| if d == 0 { 0.0 } else { n as f64 / d as f64 };
    (rate(tp, positives), rate(fp, negatives))
}

/// Grid-search the (motion, ml) weights maximizing TPR under the FPR ceiling
///
/// Ties keep the lower FPR, then the earlier grid point.
pub fn tune_weights(samples: &[LabeledSample], grid: &TuningGrid) -> LivenessResult<TuningOutcome> {
    if samples.is_empty() {
        return Err(LivenessError::Calibration("dataset is empty".to_string()));
    }
    let positives = samples.iter().filter(|s| s.is_live).count();
    if positives == 0 || positives == samples.len() {
        return Err(LivenessError::Calibration(
            "dataset needs both live and spoof samples".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&grid.fpr_ceiling) {
        return Err(LivenessError::Calibration(format!(
            "fpr ceiling must be in [0, 1], got {}",
            grid.fpr_ceiling
        )));
    }

    let mut best: Option<TuningCandidate> = None;
    let mut evaluated = 0usize;
    let mut admissible = 0usize;

    for &m in &grid.motion {
        for &l in &grid.ml {
            let Some(weights) = grid.candidate_weights(m, l) else {
                continue;
            };
            evaluated += 1;
            let (tpr, fpr) = evaluate(samples, &weights, grid.threshold);
            if fpr > grid.fpr_ceiling {
                continue;
            }
            admissible += 1;
            let better = match &best {
                None => true,
                Some(b) => tpr > b.tpr || (tpr == b.tpr && fpr < b.fpr),
            };
            if better {
                best = Some(TuningCandidate { weights, tpr, fpr });
            }
        }
    }

    let best = best.ok_or_else(|| {
        LivenessError::Calibration(format!(
            "no weight pair keeps FPR under {:.3} ({} evaluated)",
            grid.fpr_ceiling, evaluated
        ))
    })?;

    log::info!(
        "tuning: best motion={:.2} ml={:.2} tpr={:.3} fpr={:.3} ({}/{} admissible)",
        best.weights.motion,
        best.weights.ml,
        best.tpr,
        best.fpr,
        admissible,
        evaluated
    );

    Ok(TuningOutcome {
        best,
        evaluated,
        admissible,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(motion: f64, ml: f64, is_live: bool) -> LabeledSample {
        LabeledSample {
            inputs: FusionInputs {
                motion: Some(motion),
                ml: Some(ml),
                ..Default::default()
            },
            is_live,
        }
    }

    #[test]
    fn test_grid_steps_inclusive() {
        let steps = grid_steps(0.1, 0.6, 0.05);
        assert_eq!(steps.len(), 11);
        assert!((steps[10] - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_candidate_weights_sum_to_one() {
        let grid = TuningGrid::default();
        let w = grid.candidate_weights(0.4, 0.4).unwrap();
        assert!((w.sum() - 1.0).abs() < 1e-9);
        // default base splits the rest 0.10 : 0.10 : 0.15
        assert!((w.stability / w.quality - 1.5).abs() < 1e-9);
        assert!(grid.candidate_weights(0.7, 0.6).is_none());
    }

    #[test]
    fn test_empty_dataset_rejected() {
        assert!(matches!(
            tune_weights(&[], &TuningGrid::default()),
            Err(LivenessError::Calibration(_))
        ));
    }

    #[test]
    fn test_one_class_dataset_rejected() {
        let data = vec![sample(0.9, 0.9, true), sample(0.8, 0.9, true)];
        assert!(tune_weights(&data, &TuningGrid::default()).is_err());
    }

    #[test]
    fn test_prefers_discriminating_component() {
        // ml separates the classes; motion is identical noise
        let data = vec![
            sample(0.6, 0.95, true),
            sample(0.6, 0.9, true),
            sample(0.6, 0.92, true),
            sample(0.6, 0.1, false),
            sample(0.6, 0.2, false),
            sample(0.6, 0.15, false),
        ];
        let outcome = tune_weights(&data, &TuningGrid::with_fpr_ceiling(0.0)).unwrap();
        assert_eq!(outcome.best.fpr, 0.0);
        assert_eq!(outcome.best.tpr, 1.0);
        assert!(outcome.best.weights.ml >= outcome.best.weights.motion);
        assert!(outcome.evaluated > 0);
        assert!(outcome.admissible <= outcome.evaluated);
    }

    #[test]
    fn test_evaluate_rates() {
        let data = vec![sample(1.0, 1.0, true), sample(0.0, 0.0, false)];
        let (tpr, fpr) = evaluate(&data, &FusionWeights::default(), 0.7);
        assert_eq!(tpr, 1.0);
        assert_eq!(fpr, 0.0);
    }
}
