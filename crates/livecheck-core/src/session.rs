//! Session Orchestrator
//!
//! One verification attempt:
//!
//! ```text
//! validating → extracting_signals ┐
//!            → inferring ─────────┴→ fusing → (storing_evidence) → complete
//! ```
//!
//! Only validation can fail the session. Inference problems degrade inside
//! the ML adapter; evidence problems become warnings on the decision.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use livecheck_signals::{extract_all, validate_sequence, ExtractedSignals, LandmarkFrame, MIN_FRAMES};

use crate::config::{ConfigError, EngineConfig};
use crate::error::LivenessResult;
use crate::evidence::{
    persist_record, ConsentStatus, ConsentToken, EvidenceRecord, EvidenceStore, EvidenceSubject,
};
use crate::fusion::{fuse, DecisionWarning, FusionInputs, FusionOptions, LivenessDecision};
use crate::ml::{InferenceContext, LivenessModel, MlLivenessAdapter, MlResult};
use crate::policy::{PolicyRegistry, DEFAULT_POLICY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Validating,
    ExtractingSignals,
    Inferring,
    Fusing,
    StoringEvidence,
    Complete,
}

/// Everything one verification attempt needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRequest {
    pub session_id: String,
    pub device_id: String,
    pub employee_id: Option<String>,
    pub policy: String,
    pub frames: Vec<LandmarkFrame>,
    pub consent_token: Option<ConsentToken>,
    /// Device-trust score in [0, 1]; fusion default when absent
    pub device_trust: Option<f64>,
}

impl SessionRequest {
    /// Request under the default policy with a fresh session id
    pub fn new(device_id: impl Into<String>, frames: Vec<LandmarkFrame>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            device_id: device_id.into(),
            employee_id: None,
            policy: DEFAULT_POLICY.to_string(),
            frames,
            consent_token: None,
            device_trust: None,
        }
    }

    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = policy.into();
        self
    }

    pub fn with_employee(mut self, employee_id: impl Into<String>) -> Self {
        self.employee_id = Some(employee_id.into());
        self
    }

    pub fn with_consent(mut self, token: ConsentToken) -> Self {
        self.consent_token = Some(token);
        self
    }

    pub fn with_device_trust(mut self, trust: f64) -> Self {
        self.device_trust = Some(trust);
        self
    }

    fn inference_context(&self) -> InferenceContext {
        InferenceContext {
            session_id: self.session_id.clone(),
            device_id: self.device_id.clone(),
            employee_id: self.employee_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub session_id: String,
    pub decision: LivenessDecision,
    /// Phases in the order they were entered
    pub phases: Vec<SessionPhase>,
    pub ml: MlResult,
    pub signals: ExtractedSignals,
    pub consent: ConsentStatus,
}

/// Shared, read-only engine state; one per process
#[derive(Debug, Clone)]
pub struct LivenessEngine {
    policies: Arc<PolicyRegistry>,
    config: Arc<EngineConfig>,
    evidence_store: Option<Arc<dyn EvidenceStore>>,
}

impl LivenessEngine {
    pub fn new(policies: Arc<PolicyRegistry>, config: Arc<EngineConfig>) -> Self {
        Self {
            policies,
            config,
            evidence_store: None,
        }
    }

    /// Engine whose registry carries the configuration's policy overrides
    pub fn from_config(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let policies = config.policy_registry()?;
        Ok(Self::new(Arc::new(policies), Arc::new(config)))
    }

    pub fn with_evidence_store(mut self, store: Arc<dyn EvidenceStore>) -> Self {
        self.evidence_store = Some(store);
        self
    }

    pub fn policies(&self) -> &PolicyRegistry {
        &self.policies
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fresh per-session adapter around a shared model
    pub fn adapter(&self, model: Arc<dyn LivenessModel>) -> MlLivenessAdapter {
        MlLivenessAdapter::new(model, self.config.ml.clone())
    }

    /// Run one verification attempt
    pub async fn verify(
        &self,
        request: &SessionRequest,
        adapter: &mut MlLivenessAdapter,
    ) -> LivenessResult<SessionOutcome> {
        let started = Instant::now();
        let sid = request.session_id.as_str();
        let mut phases = Vec::with_capacity(6);

        enter(&mut phases, SessionPhase::Validating, sid);
        validate_sequence(&request.frames, MIN_FRAMES)?;
        let policy = self.policies.get(&request.policy)?;

        enter(&mut phases, SessionPhase::ExtractingSignals, sid);
        enter(&mut phases, SessionPhase::Inferring, sid);
        let frames = request.frames.as_slice();
        let ctx = request.inference_context();
        let (signals, ml) = alongside(
            || extract_all(frames, &policy.required_signals, &self.config.extractors),
            adapter.predict(frames, &ctx),
        )
        .await;
        let ml = ml?;

        enter(&mut phases, SessionPhase::Fusing, sid);
        let inputs = FusionInputs::from_signals(
            &signals,
            &ml,
            mean_quality(frames),
            request.device_trust,
        );
        let options = FusionOptions {
            threshold: policy.threshold,
            evidence_refs: vec![
                format!("session:{}", sid),
                format!("model:{}@{}", ml.model_id, ml.model_version),
            ],
        };
        let mut decision = fuse(&inputs, &policy.weights, &options);

        let consent =
            ConsentStatus::evaluate(policy.store_evidence, request.consent_token.as_ref());
        match (consent, request.consent_token.as_ref()) {
            (ConsentStatus::NotRequired, _) => {}
            (ConsentStatus::Granted, Some(token)) => match &self.evidence_store {
                None => {
                    log::warn!("session {}: evidence required but no store configured", sid);
                    decision = decision.with_warning(DecisionWarning::EvidenceStoreUnavailable);
                }
                Some(store) => {
                    enter(&mut phases, SessionPhase::StoringEvidence, sid);
                    let record = EvidenceRecord::new(
                        EvidenceSubject {
                            session_id: request.session_id.clone(),
                            device_id: request.device_id.clone(),
                            employee_id: request.employee_id.clone(),
                            policy: policy.name.clone(),
                        },
                        frames,
                        &decision,
                        token.clone(),
                        &self.config.evidence,
                    );
                    match persist_record(store.as_ref(), &record, &self.config.evidence).await {
                        Ok(id) => decision = decision.with_evidence(id),
                        Err(e) => {
                            log::warn!("session {}: evidence storage failed: {}", sid, e);
                            decision = decision.with_warning(DecisionWarning::EvidenceStoreFailed {
                                message: e.to_string(),
                            });
                        }
                    }
                }
            },
            _ => {
                log::warn!(
                    "session {}: evidence required but consent is {:?}, not stored",
                    sid,
                    consent
                );
                decision = decision.with_warning(DecisionWarning::ConsentMissing);
            }
        }

        decision.processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        enter(&mut phases, SessionPhase::Complete, sid);

        log::info!(
            "session {}: policy={} live={} score={:.3} confidence={:.0} reasons={:?}",
            sid,
            policy.name,
            decision.is_live,
            decision.score,
            decision.confidence,
            decision.reasons
        );

        Ok(SessionOutcome {
            session_id: request.session_id.clone(),
            decision,
            phases,
            ml,
            signals,
            consent,
        })
    }
}

fn enter(phases: &mut Vec<SessionPhase>, phase: SessionPhase, session_id: &str) {
    log::debug!("session {}: {:?}", session_id, phase);
    phases.push(phase);
}

/// Mean per-frame capture quality, if the pipeline supplied any
fn mean_quality(frames: &[LandmarkFrame]) -> Option<f64> {
    let (sum, n) = frames
        .iter()
        .filter_map(|f| f.quality)
        .filter(|q| q.is_finite())
        .fold((0.0f64, 0usize), |(s, n), q| (s + q as f64, n + 1));
    (n > 0).then(|| (sum / n as f64).clamp(0.0, 1.0))
}

/// Run `extract` while `infer` is in flight.
///
/// `infer` is polled up to its first suspension before extraction starts,
/// so a remote round-trip overlaps the extractor work.
async fn alongside<T, F, Fut>(extract: F, infer: Fut) -> (T, Fut::Output)
where
    F: FnOnce() -> T,
    Fut: Future,
{
    let extraction = async move {
        tokio::task::yield_now().await;
        extract()
    };
    tokio::join!(extraction, infer)
}
