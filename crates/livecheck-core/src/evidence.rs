//! Evidence Store contract
//!
//! Consent-gated persistence of verification artifacts for audit:
//! - records hold frame hashes and landmark summaries, never imagery
//! - storage requires a valid consent token
//! - retrieval requires an audit token
//! - `store` is content-addressed, so retrying it is safe

use std::collections::{HashMap, HashSet};
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use livecheck_signals::{LandmarkFrame, Point};

use crate::error::EvidenceError;
use crate::fusion::LivenessDecision;

/// Minimum length of a consent token
pub const MIN_CONSENT_TOKEN_LEN: usize = 8;

/// Opaque proof that the subject consented to evidence retention
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsentToken(String);

impl ConsentToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn is_valid(&self) -> bool {
        let t = self.0.trim();
        !t.is_empty() && t.chars().count() >= MIN_CONSENT_TOKEN_LEN
    }

    /// BLAKE3 digest, safe to log and index
    pub fn digest(&self) -> String {
        hex::encode(blake3::hash(self.0.as_bytes()).as_bytes())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ConsentToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConsentToken(<redacted>)")
    }
}

/// Consent state for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    /// Policy does not retain evidence
    NotRequired,
    Granted,
    Missing,
    Invalid,
}

impl ConsentStatus {
    pub fn evaluate(store_evidence: bool, token: Option<&ConsentToken>) -> Self {
        match (store_evidence, token) {
            (false, _) => Self::NotRequired,
            (true, None) => Self::Missing,
            (true, Some(t)) if t.is_valid() => Self::Granted,
            (true, Some(_)) => Self::Invalid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub max_retention_days: u32,
    /// Remove records once expired
    pub delete_on_expiry: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_retention_days: 90,
            delete_on_expiry: true,
        }
    }
}

impl RetentionPolicy {
    /// `None` when the window runs past the representable date range
    pub fn expires_at(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        created_at.checked_add_signed(Duration::days(i64::from(self.max_retention_days)))
    }

    pub fn is_expired(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.expires_at(created_at).is_some_and(|t| now >= t)
    }
}

/// Per-call storage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub retention: RetentionPolicy,
    /// Keep first/last frame landmark summaries in the record
    #[serde(default = "default_true")]
    pub include_landmark_summary: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            retention: RetentionPolicy::default(),
            include_landmark_summary: true,
        }
    }
}

/// BLAKE3 hex digest of a frame's timestamp, landmarks and pixel samples
pub fn frame_digest(frame: &LandmarkFrame) -> String {
    fn points(h: &mut blake3::Hasher, tag: u8, pts: Option<&[Point]>) {
        h.update(&[tag, pts.is_some() as u8]);
        for p in pts.unwrap_or(&[]) {
            h.update(&p[0].to_le_bytes());
            h.update(&p[1].to_le_bytes());
        }
    }

    let mut h = blake3::Hasher::new();
    h.update(&frame.timestamp_ms.to_le_bytes());
    points(&mut h, b'l', frame.left_eye.as_ref().map(|e| &e[..]));
    points(&mut h, b'r', frame.right_eye.as_ref().map(|e| &e[..]));
    points(&mut h, b'm', frame.mouth.as_ref().map(|m| &m[..]));
    points(&mut h, b'n', frame.nose.as_ref().map(std::slice::from_ref));
    if let Some(px) = &frame.pixels {
        h.update(b"p");
        h.update(&px.width.to_le_bytes());
        h.update(&px.height.to_le_bytes());
        for v in &px.luma {
            h.update(&v.to_le_bytes());
        }
    }
    if let Some(q) = frame.quality {
        h.update(b"q");
        h.update(&q.to_le_bytes());
    }
    h.finalize().to_hex().to_string()
}

/// Compact geometric description of one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSummary {
    pub timestamp_ms: i64,
    pub eye_openness: Option<f32>,
    pub mouth_openness: Option<f32>,
    pub nose: Option<Point>,
    pub quality: Option<f32>,
}

impl From<&LandmarkFrame> for LandmarkSummary {
    fn from(frame: &LandmarkFrame) -> Self {
        Self {
            timestamp_ms: frame.timestamp_ms,
            eye_openness: frame.eye_openness(),
            mouth_openness: frame.mouth_openness(),
            nose: frame.nose,
            quality: frame.quality,
        }
    }
}

/// The auditable artifact of one verification attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub session_id: String,
    pub device_id: String,
    pub employee_id: Option<String>,
    pub policy: String,
    pub frame_hashes: Vec<String>,
    pub first_frame: Option<LandmarkSummary>,
    pub last_frame: Option<LandmarkSummary>,
    pub decision: LivenessDecision,
    pub consent_token: ConsentToken,
    pub captured_at: DateTime<Utc>,
}

/// Identifiers an evidence record is filed under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSubject {
    pub session_id: String,
    pub device_id: String,
    pub employee_id: Option<String>,
    pub policy: String,
}

impl EvidenceRecord {
    pub fn new(
        subject: EvidenceSubject,
        frames: &[LandmarkFrame],
        decision: &LivenessDecision,
        consent_token: ConsentToken,
        config: &StorageConfig,
    ) -> Self {
        let summaries = config.include_landmark_summary;
        Self {
            session_id: subject.session_id,
            device_id: subject.device_id,
            employee_id: subject.employee_id,
            policy: subject.policy,
            frame_hashes: frames.iter().map(frame_digest).collect(),
            first_frame: frames.first().filter(|_| summaries).map(LandmarkSummary::from),
            last_frame: frames.last().filter(|_| summaries).map(LandmarkSummary::from),
            decision: decision.clone(),
            consent_token,
            captured_at: decision.timestamp,
        }
    }

    pub fn to_blob(&self) -> Result<Vec<u8>, EvidenceError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_blob(blob: &[u8]) -> Result<Self, EvidenceError> {
        Ok(serde_json::from_slice(blob)?)
    }

    pub fn metadata(
        &self,
        blob: &[u8],
        config: &StorageConfig,
    ) -> Result<EvidenceMetadata, EvidenceError> {
        let retention = &config.retention;
        let expires_at = retention
            .expires_at(self.captured_at)
            .ok_or(EvidenceError::Retention(retention.max_retention_days))?;
        Ok(EvidenceMetadata {
            session_id: self.session_id.clone(),
            device_id: self.device_id.clone(),
            consent_digest: self.consent_token.digest(),
            content_digest: content_digest(blob),
            created_at: self.captured_at,
            expires_at,
            delete_on_expiry: retention.delete_on_expiry,
        })
    }
}

/// Index data stored beside the blob; never holds the consent token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceMetadata {
    pub session_id: String,
    pub device_id: String,
    pub consent_digest: String,
    pub content_digest: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Expired records are kept when false
    #[serde(default = "default_true")]
    pub delete_on_expiry: bool,
}

/// BLAKE3 hex digest of a blob; doubles as the evidence id
pub fn content_digest(blob: &[u8]) -> String {
    blake3::hash(blob).to_hex().to_string()
}

/// Credential presented to read evidence back
#[derive(Clone, PartialEq, Eq)]
pub struct AuditAccess {
    pub audit_token: String,
}

impl AuditAccess {
    pub fn new(audit_token: impl Into<String>) -> Self {
        Self {
            audit_token: audit_token.into(),
        }
    }
}

impl fmt::Debug for AuditAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuditAccess(<redacted>)")
    }
}

/// A blob and its metadata as read back from a store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvidence {
    pub evidence_id: String,
    pub blob: Vec<u8>,
    pub metadata: EvidenceMetadata,
}

impl StoredEvidence {
    pub fn record(&self) -> Result<EvidenceRecord, EvidenceError> {
        EvidenceRecord::from_blob(&self.blob)
    }
}

/// Persistence collaborator for evidence records.
///
/// `store` must be safe to retry; `get` must refuse unknown audit tokens.
#[async_trait]
pub trait EvidenceStore: Send + Sync + fmt::Debug {
    async fn store(
        &self,
        blob: &[u8],
        metadata: &EvidenceMetadata,
        config: &StorageConfig,
    ) -> Result<String, EvidenceError>;

    async fn get(
        &self,
        evidence_id: &str,
        access: &AuditAccess,
    ) -> Result<Option<StoredEvidence>, EvidenceError>;

    async fn verify(&self, evidence_id: &str) -> Result<bool, EvidenceError>;
}

/// Serialize a record and hand it to a store
pub async fn persist_record(
    store: &dyn EvidenceStore,
    record: &EvidenceRecord,
    config: &StorageConfig,
) -> Result<String, EvidenceError> {
    if !record.consent_token.is_valid() {
        return Err(EvidenceError::Unauthorized);
    }
    let blob = record.to_blob()?;
    let metadata = record.metadata(&blob, config)?;
    store.store(&blob, &metadata, config).await
}

/// In-process store keyed by content digest
#[derive(Debug, Default)]
pub struct MemoryEvidenceStore {
    records: RwLock<HashMap<String, StoredEvidence>>,
    /// BLAKE3 digests of accepted audit tokens
    audit_digests: HashSet<String>,
}

impl MemoryEvidenceStore {
    pub fn new<I, S>(audit_tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            records: RwLock::new(HashMap::new()),
            audit_digests: audit_tokens
                .into_iter()
                .map(|t| content_digest(t.as_ref().as_bytes()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Drop records past their expiry; returns how many were removed
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, r| !r.metadata.delete_on_expiry || r.metadata.expires_at > now);
        before - records.len()
    }

    fn authorized(&self, access: &AuditAccess) -> bool {
        self.audit_digests
            .contains(&content_digest(access.audit_token.as_bytes()))
    }
}

#[async_trait]
impl EvidenceStore for MemoryEvidenceStore {
    async fn store(
        &self,
        blob: &[u8],
        metadata: &EvidenceMetadata,
        _config: &StorageConfig,
    ) -> Result<String, EvidenceError> {
        let id = content_digest(blob);
        if metadata.content_digest != id {
            return Err(EvidenceError::Backend(
                "metadata digest does not match blob".to_string(),
            ));
        }
        self.records
            .write()
            .entry(id.clone())
            .or_insert_with(|| StoredEvidence {
                evidence_id: id.clone(),
                blob: blob.to_vec(),
                metadata: metadata.clone(),
            });
        log::debug!("evidence {} stored for session {}", id, metadata.session_id);
        Ok(id)
    }

    async fn get(
        &self,
        evidence_id: &str,
        access: &AuditAccess,
    ) -> Result<Option<StoredEvidence>, EvidenceError> {
        if !self.authorized(access) {
            log::warn!("evidence {}: audit token rejected", evidence_id);
            return Err(EvidenceError::Unauthorized);
        }
        Ok(self.records.read().get(evidence_id).cloned())
    }

    async fn verify(&self, evidence_id: &str) -> Result<bool, EvidenceError> {
        let records = self.records.read();
        let stored = records
            .get(evidence_id)
            .ok_or_else(|| EvidenceError::NotFound(evidence_id.to_string()))?;
        let digest = content_digest(&stored.blob);
        Ok(digest == evidence_id && digest == stored.metadata.content_digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::{fuse, FusionInputs, FusionOptions};
    use crate::weights::FusionWeights;
    use livecheck_signals::frame::synth;

    fn record(consent: &str) -> EvidenceRecord {
        let frames: Vec<_> = (0..4).map(|i| synth::face(i * 33, 0.3, 0.2, 0.0)).collect();
        let decision = fuse(
            &FusionInputs::default(),
            &FusionWeights::default(),
            &FusionOptions::default(),
        );
        EvidenceRecord::new(
            EvidenceSubject {
                session_id: "s-1".into(),
                device_id: "kiosk-7".into(),
                employee_id: Some("e-42".into()),
                policy: "default".into(),
            },
            &frames,
            &decision,
            ConsentToken::new(consent),
            &StorageConfig::default(),
        )
    }

    #[test]
    fn test_consent_token_validity() {
        assert!(ConsentToken::new("consent-abc123").is_valid());
        assert!(!ConsentToken::new("   ").is_valid());
        assert!(!ConsentToken::new("short").is_valid());
        assert_eq!(format!("{:?}", ConsentToken::new("secret-token")), "ConsentToken(<redacted>)");
    }

    #[test]
    fn test_consent_status() {
        let good = ConsentToken::new("consent-abc123");
        let bad = ConsentToken::new("x");
        assert_eq!(ConsentStatus::evaluate(false, None), ConsentStatus::NotRequired);
        assert_eq!(ConsentStatus::evaluate(true, None), ConsentStatus::Missing);
        assert_eq!(ConsentStatus::evaluate(true, Some(&bad)), ConsentStatus::Invalid);
        assert_eq!(ConsentStatus::evaluate(true, Some(&good)), ConsentStatus::Granted);
    }

    #[test]
    fn test_frame_digest_sensitive_to_landmarks() {
        let a = synth::face(0, 0.3, 0.2, 0.0);
        let b = synth::face(0, 0.3, 0.2, 0.01);
        assert_eq!(frame_digest(&a), frame_digest(&a.clone()));
        assert_ne!(frame_digest(&a), frame_digest(&b));
        assert_eq!(frame_digest(&a).len(), 64);
    }

    #[test]
    fn test_metadata_never_holds_token() {
        let r = record("consent-abc123");
        let blob = r.to_blob().unwrap();
        let meta = r.metadata(&blob, &StorageConfig::default()).unwrap();
        let json = serde_json::to_string(&meta).unwrap();
        assert!(!json.contains("consent-abc123"));
        assert_eq!(meta.consent_digest, r.consent_token.digest());
        assert_eq!(r.frame_hashes.len(), 4);
        assert!(r.first_frame.is_some());
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip_and_idempotent() {
        let store = MemoryEvidenceStore::new(["auditor-1"]);
        let config = StorageConfig::default();
        let r = record("consent-abc123");

        let id1 = persist_record(&store, &r, &config).await.unwrap();
        let id2 = persist_record(&store, &r, &config).await.unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.len(), 1);
        assert!(store.verify(&id1).await.unwrap());

        let stored = store
            .get(&id1, &AuditAccess::new("auditor-1"))
            .await
            .unwrap()
            .unwrap();
        let back = stored.record().unwrap();
        assert_eq!(back.session_id, r.session_id);
        assert_eq!(back.frame_hashes, r.frame_hashes);
        assert_eq!(back.decision.is_live, r.decision.is_live);
        assert_eq!(stored.metadata.device_id, "kiosk-7");
    }

    #[tokio::test]
    async fn test_get_requires_audit_token() {
        let store = MemoryEvidenceStore::new(["auditor-1"]);
        let id = persist_record(&store, &record("consent-abc123"), &StorageConfig::default())
            .await
            .unwrap();
        assert!(matches!(
            store.get(&id, &AuditAccess::new("intruder")).await,
            Err(EvidenceError::Unauthorized)
        ));
        assert!(store
            .get("missing", &AuditAccess::new("auditor-1"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_invalid_consent_refused() {
        let store = MemoryEvidenceStore::new(["auditor-1"]);
        let err = persist_record(&store, &record("tiny"), &StorageConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EvidenceError::Unauthorized));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryEvidenceStore::new(["auditor-1"]);
        let r = record("consent-abc123");
        persist_record(&store, &r, &StorageConfig::default()).await.unwrap();
        assert_eq!(store.purge_expired(Utc::now()), 0);
        assert_eq!(store.purge_expired(Utc::now() + Duration::days(91)), 1);

        let mut keep = StorageConfig::default();
        keep.retention.max_retention_days = 1;
        keep.retention.delete_on_expiry = false;
        persist_record(&store, &r, &keep).await.unwrap();
        assert_eq!(store.purge_expired(Utc::now() + Duration::days(5)), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_retention_expiry() {
        let policy = RetentionPolicy::default();
        let t0 = Utc::now();
        assert!(!policy.is_expired(t0, t0 + Duration::days(89)));
        assert!(policy.is_expired(t0, t0 + Duration::days(90)));
    }

    #[test]
    fn test_retention_overflow_is_an_error() {
        let mut config = StorageConfig::default();
        config.retention.max_retention_days = 200_000_000;
        assert!(config.retention.expires_at(Utc::now()).is_none());
        assert!(!config.retention.is_expired(Utc::now(), Utc::now()));

        let r = record("consent-abc123");
        let blob = r.to_blob().unwrap();
        assert!(matches!(
            r.metadata(&blob, &config),
            Err(EvidenceError::Retention(200_000_000))
        ));
    }
}
