use std::sync::Arc;

use async_trait::async_trait;

use livecheck_core::evidence::{StoredEvidence, EvidenceStore};
use livecheck_core::fusion::{DecisionWarning, ReasonCode};
use livecheck_core::ml::{MockLivenessModel, MockRemoteVerifier, MlSource, RawPrediction};
use livecheck_core::{
    AuditAccess, ConsentStatus, ConsentToken, EngineConfig, EvidenceError, EvidenceMetadata,
    HeuristicMotionModel, LivenessEngine, LivenessError, MemoryEvidenceStore, PolicyRegistry,
    SessionPhase, SessionRequest, StorageConfig,
};
use livecheck_signals::frame::synth;
use livecheck_signals::LandmarkFrame;

const CONSENT: &str = "consent-7f3a9c21";
const AUDITOR: &str = "auditor-token-1";

/// Two blinks, a right and a left head turn, varying pixels
fn live_burst() -> Vec<LandmarkFrame> {
    let script: [(f32, f32); 9] = [
        (0.3, 0.0),
        (0.05, 0.0),
        (0.3, 0.0),
        (0.3, 0.3),
        (0.3, 0.0),
        (0.05, 0.0),
        (0.3, 0.0),
        (0.3, -0.3),
        (0.3, 0.0),
    ];
    script
        .iter()
        .flat_map(|&step| std::iter::repeat(step).take(3))
        .enumerate()
        .map(|(i, (ear, dx))| {
            let mut f = synth::face(i as i64 * 33, ear, 0.2, dx);
            f.pixels = Some(synth::pixels(100.0 + (i % 2) as f32 * 10.0));
            f.quality = Some(0.85);
            f
        })
        .collect()
}

/// A printed photo: nothing moves, pixels frozen
fn photo_burst() -> Vec<LandmarkFrame> {
    (0..20)
        .map(|i| {
            let mut f = synth::face(i * 33, 0.3, 0.2, 0.0);
            f.pixels = Some(synth::pixels(120.0));
            f
        })
        .collect()
}

fn confident_model(p: f64) -> Arc<MockLivenessModel> {
    Arc::new(MockLivenessModel::single_frame(RawPrediction::Probability(p)))
}

fn engine() -> LivenessEngine {
    LivenessEngine::from_config(EngineConfig::default()).unwrap()
}

#[derive(Debug)]
struct BrokenStore;

#[async_trait]
impl EvidenceStore for BrokenStore {
    async fn store(
        &self,
        _blob: &[u8],
        _metadata: &EvidenceMetadata,
        _config: &StorageConfig,
    ) -> Result<String, EvidenceError> {
        Err(EvidenceError::Backend("disk full".to_string()))
    }

    async fn get(
        &self,
        _evidence_id: &str,
        _access: &AuditAccess,
    ) -> Result<Option<StoredEvidence>, EvidenceError> {
        Ok(None)
    }

    async fn verify(&self, _evidence_id: &str) -> Result<bool, EvidenceError> {
        Ok(false)
    }
}

#[tokio::test]
async fn live_subject_passes_and_evidence_is_stored() {
    let store = Arc::new(MemoryEvidenceStore::new([AUDITOR]));
    let engine = engine().with_evidence_store(store.clone());
    let mut adapter = engine.adapter(confident_model(0.95));

    let request = SessionRequest::new("kiosk-3", live_burst())
        .with_employee("e-1001")
        .with_consent(ConsentToken::new(CONSENT));
    let outcome = engine.verify(&request, &mut adapter).await.unwrap();
    let d = &outcome.decision;

    assert!(d.is_live, "score {} reasons {:?}", d.score, d.reasons);
    assert!(d.score > 0.9);
    assert!(d.reasons.is_empty());
    assert!(d.warnings.is_empty());
    assert_eq!(outcome.signals.motion.blink_count(), 2);
    assert_eq!(outcome.signals.motion.turn_count(), 2);
    assert_eq!(outcome.consent, ConsentStatus::Granted);
    assert!(outcome.phases.contains(&SessionPhase::StoringEvidence));
    assert_eq!(outcome.phases.last(), Some(&SessionPhase::Complete));

    let id = d.evidence_id.clone().unwrap();
    assert!(d.evidence_refs.contains(&format!("evidence:{}", id)));
    assert!(store.verify(&id).await.unwrap());

    let stored = store.get(&id, &AuditAccess::new(AUDITOR)).await.unwrap().unwrap();
    let record = stored.record().unwrap();
    assert_eq!(record.session_id, request.session_id);
    assert_eq!(record.employee_id.as_deref(), Some("e-1001"));
    assert_eq!(record.frame_hashes.len(), request.frames.len());
    assert_ne!(stored.metadata.consent_digest, CONSENT);
}

#[tokio::test]
async fn photo_replay_is_rejected_with_reasons() {
    let engine = engine();
    let mut adapter = engine.adapter(confident_model(0.1));
    let request = SessionRequest::new("kiosk-3", photo_burst());

    let outcome = engine.verify(&request, &mut adapter).await.unwrap();
    let d = &outcome.decision;

    assert!(!d.is_live);
    assert!(d.score < 0.4);
    assert_eq!(outcome.signals.motion.blink_count(), 0);
    assert_eq!(outcome.signals.motion.turn_count(), 0);
    for code in [
        ReasonCode::LowMotion,
        ReasonCode::InsufficientBlinks,
        ReasonCode::InsufficientHeadTurns,
        ReasonCode::LowMl,
        ReasonCode::PossibleReplay,
    ] {
        assert!(d.reasons.contains(&code), "missing {}", code);
    }
    assert!(d.reasons.iter().position(|r| *r == ReasonCode::LowMotion)
        < d.reasons.iter().position(|r| *r == ReasonCode::LowMl));
}

#[tokio::test]
async fn missing_consent_completes_with_warning() {
    let store = Arc::new(MemoryEvidenceStore::new([AUDITOR]));
    let engine = engine().with_evidence_store(store.clone());
    let mut adapter = engine.adapter(confident_model(0.95));

    let request = SessionRequest::new("kiosk-3", live_burst());
    let outcome = engine.verify(&request, &mut adapter).await.unwrap();

    assert!(outcome.decision.is_live);
    assert!(outcome.decision.evidence_id.is_none());
    assert_eq!(outcome.decision.warnings, vec![DecisionWarning::ConsentMissing]);
    assert_eq!(outcome.consent, ConsentStatus::Missing);
    assert!(!outcome.phases.contains(&SessionPhase::StoringEvidence));
    assert!(store.is_empty());
}

#[tokio::test]
async fn malformed_consent_is_treated_as_missing() {
    let store = Arc::new(MemoryEvidenceStore::new([AUDITOR]));
    let engine = engine().with_evidence_store(store.clone());
    let mut adapter = engine.adapter(confident_model(0.95));

    let request =
        SessionRequest::new("kiosk-3", live_burst()).with_consent(ConsentToken::new("  "));
    let outcome = engine.verify(&request, &mut adapter).await.unwrap();
    assert_eq!(outcome.consent, ConsentStatus::Invalid);
    assert_eq!(outcome.decision.warnings, vec![DecisionWarning::ConsentMissing]);
    assert!(store.is_empty());
}

#[tokio::test]
async fn store_failure_does_not_invalidate_decision() {
    let engine = engine().with_evidence_store(Arc::new(BrokenStore));
    let mut adapter = engine.adapter(confident_model(0.95));

    let request =
        SessionRequest::new("kiosk-3", live_burst()).with_consent(ConsentToken::new(CONSENT));
    let outcome = engine.verify(&request, &mut adapter).await.unwrap();

    assert!(outcome.decision.is_live);
    assert!(outcome.decision.evidence_id.is_none());
    assert!(matches!(
        outcome.decision.warnings.as_slice(),
        [DecisionWarning::EvidenceStoreFailed { message }] if message.contains("disk full")
    ));
}

#[tokio::test]
async fn overflowing_retention_is_a_warning_not_a_panic() {
    let mut config = EngineConfig::default();
    config.evidence.retention.max_retention_days = 200_000_000;
    let store = Arc::new(MemoryEvidenceStore::new([AUDITOR]));
    let engine = LivenessEngine::new(Arc::new(PolicyRegistry::with_defaults()), Arc::new(config))
        .with_evidence_store(store.clone());
    let mut adapter = engine.adapter(confident_model(0.95));

    let request =
        SessionRequest::new("kiosk-3", live_burst()).with_consent(ConsentToken::new(CONSENT));
    let outcome = tokio::spawn(async move { engine.verify(&request, &mut adapter).await })
        .await
        .expect("verify must not panic")
        .unwrap();

    assert!(outcome.decision.is_live);
    assert!(outcome.decision.evidence_id.is_none());
    assert!(matches!(
        outcome.decision.warnings.as_slice(),
        [DecisionWarning::EvidenceStoreFailed { message }] if message.contains("200000000")
    ));
    assert!(store.is_empty());
}

#[tokio::test]
async fn no_store_configured_is_a_warning() {
    let engine = engine();
    let mut adapter = engine.adapter(confident_model(0.95));
    let request =
        SessionRequest::new("kiosk-3", live_burst()).with_consent(ConsentToken::new(CONSENT));
    let outcome = engine.verify(&request, &mut adapter).await.unwrap();
    assert_eq!(
        outcome.decision.warnings,
        vec![DecisionWarning::EvidenceStoreUnavailable]
    );
}

#[tokio::test]
async fn lenient_policy_never_stores() {
    let store = Arc::new(MemoryEvidenceStore::new([AUDITOR]));
    let engine = engine().with_evidence_store(store.clone());
    let mut adapter = engine.adapter(confident_model(0.95));

    let request = SessionRequest::new("kiosk-3", live_burst())
        .with_policy("lenient")
        .with_consent(ConsentToken::new(CONSENT));
    let outcome = engine.verify(&request, &mut adapter).await.unwrap();
    assert_eq!(outcome.consent, ConsentStatus::NotRequired);
    assert!(outcome.decision.evidence_id.is_none());
    assert!(outcome.signals.motion.head_turn.is_none());
    assert!(store.is_empty());
}

#[tokio::test]
async fn unknown_policy_fails_fast() {
    let engine = engine();
    let model = confident_model(0.95);
    let mut adapter = engine.adapter(model.clone());
    let request = SessionRequest::new("kiosk-3", live_burst()).with_policy("paranoid");

    let err = engine.verify(&request, &mut adapter).await.unwrap_err();
    assert!(matches!(err, LivenessError::UnknownPolicy(name) if name == "paranoid"));
    assert_eq!(model.infer_calls(), 0);
}

#[tokio::test]
async fn too_few_frames_fail_validation() {
    let engine = engine();
    let mut adapter = engine.adapter(confident_model(0.95));
    let frames = live_burst().into_iter().take(2).collect();
    let request = SessionRequest::new("kiosk-3", frames);

    let err = engine.verify(&request, &mut adapter).await.unwrap_err();
    assert!(matches!(
        err,
        LivenessError::InsufficientFrames { got: 2, required: 3 }
    ));
}

#[tokio::test]
async fn non_monotonic_timestamps_fail_validation() {
    let engine = engine();
    let mut adapter = engine.adapter(confident_model(0.95));
    let mut frames = live_burst();
    frames[4].timestamp_ms = frames[3].timestamp_ms;
    let request = SessionRequest::new("kiosk-3", frames);

    let err = engine.verify(&request, &mut adapter).await.unwrap_err();
    assert!(matches!(err, LivenessError::NonMonotonicTimestamps { index: 4 }));
}

#[tokio::test]
async fn remote_fallback_feeds_fusion() {
    let engine = engine();
    let remote = Arc::new(MockRemoteVerifier::answering(0.97, 94.0, true));
    let mut adapter = engine
        .adapter(confident_model(0.6))
        .with_remote(remote.clone());

    let request = SessionRequest::new("kiosk-3", live_burst()).with_employee("e-1001");
    let outcome = engine.verify(&request, &mut adapter).await.unwrap();

    assert_eq!(outcome.ml.source, MlSource::Remote);
    assert_eq!(remote.calls(), 1);
    assert!((outcome.decision.components.ml - 0.97).abs() < 1e-9);
    let sent = remote.last_request().unwrap();
    assert_eq!(sent.session_id, request.session_id);
    assert_eq!(sent.frame_hashes.len(), request.frames.len());
}

#[tokio::test]
async fn heuristic_model_rejects_still_photo() {
    let engine = engine();
    let mut adapter = engine.adapter(Arc::new(HeuristicMotionModel::default()));
    let request = SessionRequest::new("kiosk-3", photo_burst());

    let outcome = engine.verify(&request, &mut adapter).await.unwrap();
    assert_eq!(outcome.ml.source, MlSource::Local);
    assert!(outcome.ml.score < 0.1);
    assert!(!outcome.decision.is_live);
}

#[tokio::test]
async fn concurrent_sessions_share_policies() {
    let engine = engine();
    let mut a = engine.adapter(confident_model(0.95));
    let mut b = engine.adapter(confident_model(0.1));
    let live = SessionRequest::new("kiosk-1", live_burst());
    let spoof = SessionRequest::new("kiosk-2", photo_burst());

    let (live_out, spoof_out) =
        tokio::join!(engine.verify(&live, &mut a), engine.verify(&spoof, &mut b));
    assert!(live_out.unwrap().decision.is_live);
    assert!(!spoof_out.unwrap().decision.is_live);
    assert_eq!(engine.policies().get("default").unwrap().threshold, 0.7);
}
