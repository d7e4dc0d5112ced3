//! ML Liveness Adapter - pluggable local model with remote fallback.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 MlLivenessAdapter                     │
//! │   try_local()  ──low confidence / error──▶ try_remote()│
//! │  ┌────────────────┐              ┌─────────────────┐  │
//! │  │ LivenessModel  │              │ RemoteVerifier  │  │
//! │  │ single / seq   │              │ frame hashes    │  │
//! │  └────────────────┘              └─────────────────┘  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The remote call runs in place of a weak local result, never as a retry
//! of a failed remote call. When neither path yields a result the adapter
//! returns [`MlResult::neutral`]; inference failures never leave it.
//!
//! # Feature Flags
//!
//! - `remote-http`: JSON-over-HTTP remote verifier (requires `ureq`)

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use livecheck_signals::LandmarkFrame;

use crate::error::{LivenessError, LivenessResult, MlError};
use crate::evidence::frame_digest;

pub mod providers;

pub use providers::heuristic::HeuristicMotionModel;
pub use providers::mock::{MockLivenessModel, MockRemoteVerifier};

#[cfg(feature = "remote-http")]
pub use providers::http::HttpRemoteVerifier;

// ============================================================================
// MODEL DESCRIPTION
// ============================================================================

/// Input shape a model accepts; fixed per model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelShape {
    SingleFrame,
    /// The last `window` frames of the burst
    Sequence { window: usize },
}

impl ModelShape {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SingleFrame => "single_frame",
            Self::Sequence { .. } => "sequence",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub version: String,
    pub shape: ModelShape,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>, version: impl Into<String>, shape: ModelShape) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            shape,
        }
    }
}

/// What a model is called with
#[derive(Debug, Clone, Copy)]
pub enum ModelInput<'a> {
    Frame(&'a LandmarkFrame),
    Sequence(&'a [LandmarkFrame]),
}

impl ModelInput<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Frame(_) => "single_frame",
            Self::Sequence(_) => "sequence",
        }
    }
}

/// Heterogeneous classifier outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawPrediction {
    /// Live probability in [0, 1]
    Probability(f64),
    /// Two-class logits
    Logits { live: f64, spoof: f64 },
    /// Live probability in [0, 100]
    Percent(f64),
    /// Hard label with a [0, 1] confidence
    Label { live: bool, confidence: f64 },
}

impl RawPrediction {
    /// Normalize to `(score in [0, 1], confidence in [0, 100])`
    ///
    /// Confidence is the distance of the score from 0.5, scaled to 100.
    pub fn normalize(&self) -> Result<(f64, f64), MlError> {
        let score = match *self {
            Self::Probability(p) => unit(p, "probability")?,
            Self::Logits { live, spoof } => {
                if !live.is_finite() || !spoof.is_finite() {
                    return Err(MlError::InvalidOutput("non-finite logits".to_string()));
                }
                1.0 / (1.0 + (spoof - live).exp())
            }
            Self::Percent(p) => unit(p / 100.0, "percent")?,
            Self::Label { live, confidence } => {
                let c = unit(confidence, "label confidence")?;
                if live {
                    0.5 + 0.5 * c
                } else {
                    0.5 - 0.5 * c
                }
            }
        };
        Ok((score, ((score - 0.5).abs() * 200.0).min(100.0)))
    }
}

fn unit(value: f64, what: &str) -> Result<f64, MlError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(MlError::InvalidOutput(format!("{} out of range: {}", what, value)))
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// Which path produced an [`MlResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MlSource {
    Local,
    Remote,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlResult {
    pub score: f64,
    /// 0 to 100
    pub confidence: f64,
    pub model_id: String,
    pub model_version: String,
    pub is_live: bool,
    pub latency_ms: f64,
    pub source: MlSource,
}

impl MlResult {
    pub const NEUTRAL_MODEL_ID: &'static str = "none";

    /// Documented outcome when no inference path produced a result
    pub fn neutral(latency_ms: f64) -> Self {
        Self {
            score: 0.5,
            confidence: 0.0,
            model_id: Self::NEUTRAL_MODEL_ID.to_string(),
            model_version: String::new(),
            is_live: false,
            latency_ms,
            source: MlSource::Neutral,
        }
    }
}

// ============================================================================
// COLLABORATOR TRAITS
// ============================================================================

/// Local liveness classifier.
///
/// `load` may be slow (weights from disk); the adapter calls it lazily and
/// at most once per successful load.
#[async_trait]
pub trait LivenessModel: Send + Sync + Debug {
    fn descriptor(&self) -> &ModelDescriptor;

    async fn load(&self) -> Result<(), MlError>;

    async fn infer(&self, input: ModelInput<'_>) -> Result<RawPrediction, MlError>;
}

/// Identifiers sent with a remote verification; never raw imagery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceContext {
    pub session_id: String,
    pub device_id: String,
    pub employee_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVerificationRequest {
    pub session_id: String,
    pub device_id: String,
    pub employee_id: Option<String>,
    /// BLAKE3 hex digests, one per frame
    pub frame_hashes: Vec<String>,
}

/// Remote answer in the same terms as a local result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteVerdict {
    pub score: f64,
    pub confidence: f64,
    pub is_live: bool,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub model_version: Option<String>,
}

#[async_trait]
pub trait RemoteVerifier: Send + Sync + Debug {
    fn name(&self) -> &str;

    async fn verify(&self, request: &RemoteVerificationRequest) -> Result<RemoteVerdict, MlError>;
}

// ============================================================================
// ADAPTER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlAdapterConfig {
    /// Local results under this confidence go to the remote verifier
    pub fallback_confidence: f64,
    /// Score at or above which a local result counts as live
    pub live_threshold: f64,
    /// Window for the default sequence model
    pub sequence_window: usize,
}

impl Default for MlAdapterConfig {
    fn default() -> Self {
        Self {
            fallback_confidence: 70.0,
            live_threshold: 0.5,
            sequence_window: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
}

/// One adapter per session; owns the model's load state
#[derive(Debug)]
pub struct MlLivenessAdapter {
    model: Arc<dyn LivenessModel>,
    remote: Option<Arc<dyn RemoteVerifier>>,
    config: MlAdapterConfig,
    state: ModelState,
}

impl MlLivenessAdapter {
    pub fn new(model: Arc<dyn LivenessModel>, config: MlAdapterConfig) -> Self {
        Self {
            model,
            remote: None,
            config,
            state: ModelState::Unloaded,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteVerifier>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        self.model.descriptor()
    }

    /// Predict from a burst, feeding the model the shape it declares
    ///
    /// Single-frame models get the best-quality frame; sequence models get
    /// the trailing window.
    pub async fn predict(
        &mut self,
        frames: &[LandmarkFrame],
        ctx: &InferenceContext,
    ) -> LivenessResult<MlResult> {
        if frames.is_empty() {
            return Err(LivenessError::InsufficientFrames {
                got: 0,
                required: 1,
            });
        }
        match self.model.descriptor().shape {
            ModelShape::SingleFrame => {
                let frame = best_frame(frames);
                Ok(self.run(ModelInput::Frame(frame), frames, ctx).await)
            }
            ModelShape::Sequence { window } => {
                let start = frames.len().saturating_sub(window.max(1));
                Ok(self
                    .run(ModelInput::Sequence(&frames[start..]), frames, ctx)
                    .await)
            }
        }
    }

    /// Single-frame entry point; fails fast on sequence models
    pub async fn predict_frame(
        &mut self,
        frame: &LandmarkFrame,
        ctx: &InferenceContext,
    ) -> LivenessResult<MlResult> {
        self.check_shape(ModelInput::Frame(frame))?;
        Ok(self
            .run(ModelInput::Frame(frame), std::slice::from_ref(frame), ctx)
            .await)
    }

    /// Sequence entry point; fails fast on single-frame models
    pub async fn predict_sequence(
        &mut self,
        frames: &[LandmarkFrame],
        ctx: &InferenceContext,
    ) -> LivenessResult<MlResult> {
        self.check_shape(ModelInput::Sequence(frames))?;
        Ok(self.run(ModelInput::Sequence(frames), frames, ctx).await)
    }

    fn check_shape(&self, input: ModelInput<'_>) -> LivenessResult<()> {
        let shape = self.model.descriptor().shape;
        let matches = matches!(
            (shape, input),
            (ModelShape::SingleFrame, ModelInput::Frame(_))
                | (ModelShape::Sequence { .. }, ModelInput::Sequence(_))
        );
        if matches {
            Ok(())
        } else {
            Err(LivenessError::ShapeMismatch {
                expected: shape.label(),
                got: input.label(),
            })
        }
    }

    async fn run(
        &mut self,
        input: ModelInput<'_>,
        frames: &[LandmarkFrame],
        ctx: &InferenceContext,
    ) -> MlResult {
        let started = Instant::now();

        let local = match self.try_local(input).await {
            Ok(result) if result.confidence >= self.config.fallback_confidence => {
                return finish(result, started);
            }
            Ok(result) => {
                log::debug!(
                    "session {}: local confidence {:.1} below {:.1}, trying remote",
                    ctx.session_id,
                    result.confidence,
                    self.config.fallback_confidence
                );
                Some(result)
            }
            Err(e) => {
                log::warn!("session {}: local inference failed: {}", ctx.session_id, e);
                None
            }
        };

        match self.try_remote(frames, ctx).await {
            Ok(result) => finish(result, started),
            Err(e) => {
                if !matches!(e, MlError::RemoteUnavailable) || local.is_none() {
                    log::warn!("session {}: remote verification failed: {}", ctx.session_id, e);
                }
                match local {
                    Some(result) => finish(result, started),
                    None => MlResult::neutral(elapsed_ms(started)),
                }
            }
        }
    }

    /// Load on first use, then run the local model
    pub async fn try_local(&mut self, input: ModelInput<'_>) -> Result<MlResult, MlError> {
        self.ensure_loaded().await?;

        let raw = self.model.infer(input).await?;
        let (score, confidence) = raw.normalize()?;
        let descriptor = self.model.descriptor();
        Ok(MlResult {
            score,
            confidence,
            model_id: descriptor.id.clone(),
            model_version: descriptor.version.clone(),
            is_live: score >= self.config.live_threshold,
            latency_ms: 0.0,
            source: MlSource::Local,
        })
    }

    /// One remote verification call keyed by frame hashes; no retry
    pub async fn try_remote(
        &self,
        frames: &[LandmarkFrame],
        ctx: &InferenceContext,
    ) -> Result<MlResult, MlError> {
        let remote = self.remote.as_ref().ok_or(MlError::RemoteUnavailable)?;

        let request = RemoteVerificationRequest {
            session_id: ctx.session_id.clone(),
            device_id: ctx.device_id.clone(),
            employee_id: ctx.employee_id.clone(),
            frame_hashes: frames.iter().map(frame_digest).collect(),
        };

        let verdict = remote.verify(&request).await?;
        let score = unit(verdict.score, "remote score")?;
        if !(0.0..=100.0).contains(&verdict.confidence) {
            return Err(MlError::InvalidOutput(format!(
                "remote confidence out of range: {}",
                verdict.confidence
            )));
        }

        Ok(MlResult {
            score,
            confidence: verdict.confidence,
            model_id: verdict
                .model_id
                .unwrap_or_else(|| remote.name().to_string()),
            model_version: verdict.model_version.unwrap_or_default(),
            is_live: verdict.is_live,
            latency_ms: 0.0,
            source: MlSource::Remote,
        })
    }

    async fn ensure_loaded(&mut self) -> Result<(), MlError> {
        if self.state == ModelState::Ready {
            return Ok(());
        }
        self.state = ModelState::Loading;
        match self.model.load().await {
            Ok(()) => {
                self.state = ModelState::Ready;
                log::debug!("model {} ready", self.model.descriptor().id);
                Ok(())
            }
            Err(e) => {
                self.state = ModelState::Unloaded;
                Err(e)
            }
        }
    }
}

fn best_frame(frames: &[LandmarkFrame]) -> &LandmarkFrame {
    let mut best = &frames[frames.len() / 2];
    for frame in frames {
        if frame.quality.unwrap_or(0.0) > best.quality.unwrap_or(0.0) {
            best = frame;
        }
    }
    best
}

fn finish(mut result: MlResult, started: Instant) -> MlResult {
    result.latency_ms = elapsed_ms(started);
    result
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

// ============================================================================
// TESTS
// ============================================================================
