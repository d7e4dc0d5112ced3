//! Fusion Engine
//!
//! Combines the five component scores (motion, ML, quality, device trust,
//! stability) into one calibrated liveness score and verdict:
//! - weights re-normalized to sum to 1.0
//! - missing components resolve to documented neutral defaults
//! - confidence is the scaled distance from the decision threshold
//! - failing decisions carry machine-readable reason codes

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use livecheck_signals::{ExtractedSignals, NEUTRAL_SCORE, STABILITY_NEUTRAL};

use crate::ml::MlResult;
use crate::policy::DEFAULT_THRESHOLD;
use crate::weights::FusionWeights;

pub const DEFAULT_MOTION: f64 = NEUTRAL_SCORE as f64;
pub const DEFAULT_ML: f64 = 0.5;
pub const DEFAULT_QUALITY: f64 = 0.8;
pub const DEFAULT_DEVICE: f64 = 0.9;
pub const DEFAULT_STABILITY: f64 = STABILITY_NEUTRAL as f64;

/// Per-component sub-thresholds used for failure reasons
pub mod sub_thresholds {
    pub const MOTION: f64 = 0.5;
    pub const BLINK: f64 = 0.4;
    pub const HEAD_TURN: f64 = 0.4;
    pub const ML: f64 = 0.5;
    pub const QUALITY: f64 = 0.6;
    pub const STABILITY: f64 = 0.5;
    pub const DEVICE: f64 = 0.7;
}

/// Machine-readable failure reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    LowMotion,
    InsufficientBlinks,
    InsufficientHeadTurns,
    LowMl,
    LowQuality,
    PossibleReplay,
    DeviceTrustLow,
    OverallScoreLow,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowMotion => "low_motion",
            Self::InsufficientBlinks => "insufficient_blinks",
            Self::InsufficientHeadTurns => "insufficient_head_turns",
            Self::LowMl => "low_ml",
            Self::LowQuality => "low_quality",
            Self::PossibleReplay => "possible_replay",
            Self::DeviceTrustLow => "device_trust_low",
            Self::OverallScoreLow => "overall_score_low",
        }
    }

    /// Actionable hint for the person in front of the camera
    pub fn hint(&self) -> &'static str {
        match self {
            Self::LowMotion => "Move naturally while facing the camera",
            Self::InsufficientBlinks => "Blink clearly a couple of times",
            Self::InsufficientHeadTurns => "Turn your head slowly left and right",
            Self::LowMl => "Face the camera directly and remove anything covering your face",
            Self::LowQuality => "Find better lighting and hold the device steady",
            Self::PossibleReplay => "Present your own face, not a photo or screen",
            Self::DeviceTrustLow => "This device is not trusted, try a registered device",
            Self::OverallScoreLow => "Please try again",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Soft, non-fatal conditions recorded on a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum DecisionWarning {
    /// Policy wants evidence but no valid consent token was supplied
    ConsentMissing,
    /// Policy wants evidence but no store is configured
    EvidenceStoreUnavailable,
    /// Storing evidence failed; the decision stands
    EvidenceStoreFailed { message: String },
}

/// Component scores handed to the fusion step; `None` means unspecified
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusionInputs {
    pub motion: Option<f64>,
    /// Raw blink sub-signal, if it was computed
    pub blink: Option<f64>,
    /// Raw head-turn sub-signal, if it was computed
    pub head_turn: Option<f64>,
    pub ml: Option<f64>,
    pub quality: Option<f64>,
    pub device: Option<f64>,
    pub stability: Option<f64>,
}

impl FusionInputs {
    /// Inputs from extractor output, the ML result and context scores
    pub fn from_signals(
        signals: &ExtractedSignals,
        ml: &MlResult,
        quality: Option<f64>,
        device: Option<f64>,
    ) -> Self {
        Self {
            motion: Some(signals.motion.score as f64),
            blink: signals.motion.blink_score().map(f64::from),
            head_turn: signals.motion.head_turn_score().map(f64::from),
            ml: Some(ml.score),
            quality,
            device,
            stability: signals
                .stability
                .present
                .then_some(signals.stability.score as f64),
        }
    }

    /// Resolve every component, applying defaults and clamping into [0, 1]
    pub fn resolve(&self) -> ComponentScores {
        ComponentScores {
            motion: component(self.motion, DEFAULT_MOTION),
            ml: component(self.ml, DEFAULT_ML),
            quality: component(self.quality, DEFAULT_QUALITY),
            device: component(self.device, DEFAULT_DEVICE),
            stability: component(self.stability, DEFAULT_STABILITY),
        }
    }
}

fn component(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => default,
    }
}

/// Resolved component scores as applied
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub motion: f64,
    pub ml: f64,
    pub quality: f64,
    pub device: f64,
    pub stability: f64,
}

impl ComponentScores {
    pub fn as_array(&self) -> [f64; 5] {
        [self.motion, self.ml, self.quality, self.device, self.stability]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionOptions {
    /// Verdict threshold on the final score
    pub threshold: f64,
    /// Evidence-reference tokens to carry on the decision
    pub evidence_refs: Vec<String>,
}

impl Default for FusionOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            evidence_refs: Vec::new(),
        }
    }
}

impl FusionOptions {
    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }
}

/// The engine's output artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessDecision {
    pub score: f64,
    pub is_live: bool,
    /// Distance from the threshold scaled to [0, 100]
    pub confidence: f64,
    pub threshold: f64,
    pub components: ComponentScores,
    pub weights: FusionWeights,
    pub evidence_refs: Vec<String>,
    /// Empty iff `is_live`
    pub reasons: Vec<ReasonCode>,
    pub warnings: Vec<DecisionWarning>,
    pub evidence_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub processing_time_ms: f64,
}

impl LivenessDecision {
    /// Decision carrying the id of the stored evidence record
    pub fn with_evidence(mut self, evidence_id: String) -> Self {
        self.evidence_refs.push(format!("evidence:{}", evidence_id));
        self.evidence_id = Some(evidence_id);
        self
    }

    pub fn with_warning(mut self, warning: DecisionWarning) -> Self {
        self.warnings.push(warning);
        self
    }

    pub fn hints(&self) -> Vec<&'static str> {
        self.reasons.iter().map(ReasonCode::hint).collect()
    }
}

/// Weighted sum of resolved components, clamped to [0, 1]
pub fn weighted_score(components: &ComponentScores, weights: &FusionWeights) -> f64 {
    let w = weights.normalized().as_array();
    let c = components.as_array();
    let sum: f64 = c.iter().zip(w.iter()).map(|(c, w)| c * w).sum();
    sum.clamp(0.0, 1.0)
}

/// Confidence from the distance to the threshold
pub fn decision_confidence(score: f64, threshold: f64) -> f64 {
    (200.0 * (score - threshold).abs()).min(100.0)
}

/// Fuse component scores into a liveness decision
pub fn fuse(inputs: &FusionInputs, weights: &FusionWeights, options: &FusionOptions) -> LivenessDecision {
    let started = Instant::now();

    let weights = weights.normalized();
    let components = inputs.resolve();
    let score = weighted_score(&components, &weights);
    let is_live = score >= options.threshold;
    let confidence = decision_confidence(score, options.threshold);

    let reasons = if is_live {
        Vec::new()
    } else {
        failure_reasons(inputs, &components)
    };

    log::debug!(
        "fusion: score={:.3} threshold={:.2} live={} reasons={:?}",
        score,
        options.threshold,
        is_live,
        reasons
    );

    LivenessDecision {
        score,
        is_live,
        confidence,
        threshold: options.threshold,
        components,
        weights,
        evidence_refs: options.evidence_refs.clone(),
        reasons,
        warnings: Vec::new(),
        evidence_id: None,
        timestamp: Utc::now(),
        processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
    }
}

fn failure_reasons(inputs: &FusionInputs, c: &ComponentScores) -> Vec<ReasonCode> {
    use sub_thresholds as th;

    let mut reasons = Vec::new();

    if c.motion < th::MOTION {
        reasons.push(ReasonCode::LowMotion);
        if inputs.blink.is_some_and(|b| b < th::BLINK) {
            reasons.push(ReasonCode::InsufficientBlinks);
        }
        if inputs.head_turn.is_some_and(|h| h < th::HEAD_TURN) {
            reasons.push(ReasonCode::InsufficientHeadTurns);
        }
    }
    if c.ml < th::ML {
        reasons.push(ReasonCode::LowMl);
    }
    if c.quality < th::QUALITY {
        reasons.push(ReasonCode::LowQuality);
    }
    if c.stability < th::STABILITY {
        reasons.push(ReasonCode::PossibleReplay);
    }
    if c.device < th::DEVICE {
        reasons.push(ReasonCode::DeviceTrustLow);
    }

    if reasons.is_empty() {
        reasons.push(ReasonCode::OverallScoreLow);
    }
    reasons
}
