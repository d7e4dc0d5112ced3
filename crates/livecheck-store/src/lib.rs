//! Encrypted SQLite evidence store.
//!
//! Each record is sealed with its own random key (XChaCha20-Poly1305, the
//! evidence id as AAD); the record key is wrapped under a key derived from
//! the master key with HKDF-SHA256. Records are content-addressed by the
//! BLAKE3 digest of the plaintext blob, so `store` is safe to retry.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305, XNonce};
use chrono::{DateTime, Utc};
use hkdf::Hkdf;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroize;

use livecheck_core::evidence::{content_digest, StoredEvidence};
use livecheck_core::{AuditAccess, EvidenceError, EvidenceMetadata, EvidenceStore, StorageConfig};

pub mod migration;

const KDF_VERSION: u32 = 1;
const WRAP_INFO: &[u8] = b"livecheck-evidence-key-wrap-v1";

/// Global counter for the first 8 nonce bytes.
/// Starts at 1 to avoid an all-zero prefix.
static NONCE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// 8 bytes monotonic counter + 16 bytes OS randomness
#[inline]
fn generate_hybrid_nonce() -> [u8; 24] {
    let mut nonce = [0u8; 24];
    let ctr = NONCE_COUNTER.fetch_add(1, Ordering::Relaxed);
    nonce[..8].copy_from_slice(&ctr.to_le_bytes());
    OsRng.fill_bytes(&mut nonce[8..]);
    nonce
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("crypto error: {0}")]
    Crypto(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("audit token rejected")]
    Unauthorized,
}

impl From<StoreError> for EvidenceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Crypto(msg) => EvidenceError::Crypto(msg),
            StoreError::NotFound(id) => EvidenceError::NotFound(id),
            StoreError::Unauthorized => EvidenceError::Unauthorized,
            StoreError::Serialization(msg) => EvidenceError::Serialization(msg),
            other => EvidenceError::Backend(other.to_string()),
        }
    }
}

/// 256-bit key wiped on drop
struct SecretKey([u8; 32]);

impl SecretKey {
    fn random() -> Self {
        let mut k = [0u8; 32];
        OsRng.fill_bytes(&mut k);
        SecretKey(k)
    }

    fn aead(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

struct Sealed {
    ciphertext: Vec<u8>,
    nonce: [u8; 24],
    wrapped_key: Vec<u8>,
    wrap_nonce: [u8; 24],
}

struct Inner {
    conn: Mutex<Connection>,
    wrap_key: SecretKey,
}

/// SQLite-backed [`EvidenceStore`]
#[derive(Clone)]
pub struct SqliteEvidenceStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SqliteEvidenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEvidenceStore").finish_non_exhaustive()
    }
}

impl SqliteEvidenceStore {
    pub fn open<P: AsRef<Path>>(path: P, master_key: [u8; 32]) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::with_connection(conn, master_key)
    }

    pub fn open_in_memory(master_key: [u8; 32]) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, master_key)
    }

    fn with_connection(conn: Connection, mut master_key: [u8; 32]) -> Result<Self, StoreError> {
        migration::migrate_to_current(&conn)?;
        let wrap_key = derive_wrapping_key(&master_key);
        master_key.zeroize();
        Ok(Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                wrap_key: wrap_key?,
            }),
        })
    }

    /// Allow an audit token to read evidence; only its digest is kept
    pub fn register_audit_token(&self, token: &str, label: &str) -> Result<(), StoreError> {
        self.inner.conn.lock().execute(
            "INSERT OR REPLACE INTO audit_tokens (digest, label, created_ts_us) VALUES (?1, ?2, ?3)",
            params![content_digest(token.as_bytes()), label, Utc::now().timestamp_micros()],
        )?;
        Ok(())
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .inner
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM evidence", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    /// Delete expired records whose retention asks for deletion
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let removed = self.inner.conn.lock().execute(
            "DELETE FROM evidence WHERE delete_on_expiry = 1 AND expires_ts_us <= ?1",
            params![now.timestamp_micros()],
        )?;
        if removed > 0 {
            log::info!("purged {} expired evidence records", removed);
        }
        Ok(removed)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, EvidenceError>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T, StoreError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| EvidenceError::Backend(format!("store task failed: {}", e)))?
            .map_err(EvidenceError::from)
    }
}

fn derive_wrapping_key(master_key: &[u8; 32]) -> Result<SecretKey, StoreError> {
    let hk = Hkdf::<Sha256>::new(None, master_key);
    let mut okm = [0u8; 32];
    hk.expand(WRAP_INFO, &mut okm)
        .map_err(|e| StoreError::Crypto(format!("hkdf expand failed: {:?}", e)))?;
    let key = SecretKey(okm);
    okm.zeroize();
    Ok(key)
}

fn from_micros(ts: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(ts)
        .ok_or_else(|| StoreError::Serialization(format!("timestamp out of range: {}", ts)))
}

struct EvidenceRow {
    session_id: String,
    device_id: String,
    consent_digest: String,
    content_digest: String,
    created_ts_us: i64,
    expires_ts_us: i64,
    delete_on_expiry: bool,
    ciphertext: Vec<u8>,
    nonce: Vec<u8>,
    wrapped_key: Vec<u8>,
    wrap_nonce: Vec<u8>,
}

impl EvidenceRow {
    fn metadata(self) -> Result<EvidenceMetadata, StoreError> {
        Ok(EvidenceMetadata {
            session_id: self.session_id,
            device_id: self.device_id,
            consent_digest: self.consent_digest,
            content_digest: self.content_digest,
            created_at: from_micros(self.created_ts_us)?,
            expires_at: from_micros(self.expires_ts_us)?,
            delete_on_expiry: self.delete_on_expiry,
        })
    }
}

impl Inner {
    fn seal(&self, id: &str, blob: &[u8]) -> Result<Sealed, StoreError> {
        let record_key = SecretKey::random();
        let nonce = generate_hybrid_nonce();
        let ciphertext = record_key
            .aead()
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: blob,
                    aad: id.as_bytes(),
                },
            )
            .map_err(|e| StoreError::Crypto(format!("encryption failed: {:?}", e)))?;

        let wrap_nonce = generate_hybrid_nonce();
        let wrapped_key = self
            .wrap_key
            .aead()
            .encrypt(XNonce::from_slice(&wrap_nonce), &record_key.0[..])
            .map_err(|e| StoreError::Crypto(format!("key wrap failed: {:?}", e)))?;

        Ok(Sealed {
            ciphertext,
            nonce,
            wrapped_key,
            wrap_nonce,
        })
    }

    fn open_sealed(
        &self,
        id: &str,
        ciphertext: &[u8],
        nonce: &[u8],
        wrapped_key: &[u8],
        wrap_nonce: &[u8],
    ) -> Result<Vec<u8>, StoreError> {
        if nonce.len() != 24 || wrap_nonce.len() != 24 {
            return Err(StoreError::Crypto("invalid nonce length".into()));
        }
        let mut raw = self
            .wrap_key
            .aead()
            .decrypt(XNonce::from_slice(wrap_nonce), wrapped_key)
            .map_err(|_| StoreError::Crypto("failed to unwrap record key".into()))?;
        if raw.len() != 32 {
            raw.zeroize();
            return Err(StoreError::Crypto(format!("invalid record key length: {}", raw.len())));
        }
        let mut k = [0u8; 32];
        k.copy_from_slice(&raw);
        raw.zeroize();
        let record_key = SecretKey(k);
        k.zeroize();

        record_key
            .aead()
            .decrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: id.as_bytes(),
                },
            )
            .map_err(|_| StoreError::Crypto("decryption failed".into()))
    }

    fn put(&self, blob: &[u8], metadata: &EvidenceMetadata) -> Result<String, StoreError> {
        let id = content_digest(blob);
        if metadata.content_digest != id {
            return Err(StoreError::Crypto(
                "metadata digest does not match blob".into(),
            ));
        }
        let sealed = self.seal(&id, blob)?;
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO evidence (id, session_id, device_id, consent_digest, content_digest,
                created_ts_us, expires_ts_us, delete_on_expiry, ciphertext, nonce, wrapped_key, wrap_nonce, kdf_version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                id,
                metadata.session_id,
                metadata.device_id,
                metadata.consent_digest,
                metadata.content_digest,
                metadata.created_at.timestamp_micros(),
                metadata.expires_at.timestamp_micros(),
                metadata.delete_on_expiry,
                sealed.ciphertext,
                sealed.nonce.to_vec(),
                sealed.wrapped_key,
                sealed.wrap_nonce.to_vec(),
                KDF_VERSION,
            ],
        )?;
        if inserted == 0 {
            log::debug!("evidence {} already stored", id);
        }
        Ok(id)
    }

    fn authorized(&self, access: &AuditAccess) -> Result<bool, StoreError> {
        let found: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT digest FROM audit_tokens WHERE digest = ?1",
                params![content_digest(access.audit_token.as_bytes())],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn load_row(&self, evidence_id: &str) -> Result<Option<EvidenceRow>, StoreError> {
        let row = self
            .conn
            .lock()
            .query_row(
                "SELECT session_id, device_id, consent_digest, content_digest, created_ts_us,
                        expires_ts_us, delete_on_expiry, ciphertext, nonce, wrapped_key, wrap_nonce
                 FROM evidence WHERE id = ?1",
                params![evidence_id],
                |r| {
                    Ok(EvidenceRow {
                        session_id: r.get(0)?,
                        device_id: r.get(1)?,
                        consent_digest: r.get(2)?,
                        content_digest: r.get(3)?,
                        created_ts_us: r.get(4)?,
                        expires_ts_us: r.get(5)?,
                        delete_on_expiry: r.get(6)?,
                        ciphertext: r.get(7)?,
                        nonce: r.get(8)?,
                        wrapped_key: r.get(9)?,
                        wrap_nonce: r.get(10)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn fetch(
        &self,
        evidence_id: &str,
        access: &AuditAccess,
    ) -> Result<Option<StoredEvidence>, StoreError> {
        if !self.authorized(access)? {
            log::warn!("evidence {}: audit token rejected", evidence_id);
            return Err(StoreError::Unauthorized);
        }
        let Some(row) = self.load_row(evidence_id)? else {
            return Ok(None);
        };
        let blob = self.open_sealed(
            evidence_id,
            &row.ciphertext,
            &row.nonce,
            &row.wrapped_key,
            &row.wrap_nonce,
        )?;
        Ok(Some(StoredEvidence {
            evidence_id: evidence_id.to_string(),
            blob,
            metadata: row.metadata()?,
        }))
    }

    fn check(&self, evidence_id: &str) -> Result<bool, StoreError> {
        let row = self
            .load_row(evidence_id)?
            .ok_or_else(|| StoreError::NotFound(evidence_id.to_string()))?;
        match self.open_sealed(
            evidence_id,
            &row.ciphertext,
            &row.nonce,
            &row.wrapped_key,
            &row.wrap_nonce,
        ) {
            Ok(blob) => {
                let digest = content_digest(&blob);
                Ok(digest == evidence_id && digest == row.content_digest)
            }
            Err(e) => {
                log::warn!("evidence {} failed verification: {}", evidence_id, e);
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl EvidenceStore for SqliteEvidenceStore {
    async fn store(
        &self,
        blob: &[u8],
        metadata: &EvidenceMetadata,
        _config: &StorageConfig,
    ) -> Result<String, EvidenceError> {
        let blob = blob.to_vec();
        let metadata = metadata.clone();
        self.blocking(move |inner| inner.put(&blob, &metadata))
            .await
    }

    async fn get(
        &self,
        evidence_id: &str,
        access: &AuditAccess,
    ) -> Result<Option<StoredEvidence>, EvidenceError> {
        let id = evidence_id.to_string();
        let access = access.clone();
        self.blocking(move |inner| inner.fetch(&id, &access)).await
    }

    async fn verify(&self, evidence_id: &str) -> Result<bool, EvidenceError> {
        let id = evidence_id.to_string();
        self.blocking(move |inner| inner.check(&id)).await
    }
}
