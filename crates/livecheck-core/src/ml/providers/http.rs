//! JSON-over-HTTP remote verifier.
//!
//! Posts a [`RemoteVerificationRequest`] (frame hashes and identifiers only)
//! and expects a [`RemoteVerdict`] body back. `ureq` is blocking, so each
//! call runs on tokio's blocking pool.
//!
//! # Example
//! ```rust,ignore
//! use livecheck_core::ml::HttpRemoteVerifier;
//!
//! let remote = HttpRemoteVerifier::new("https://verify.internal/v1/liveness")
//!     .with_api_key(std::env::var("LIVECHECK_REMOTE_KEY")?);
//! ```

use std::time::Duration;

use async_trait::async_trait;

use crate::error::MlError;
use crate::ml::{RemoteVerdict, RemoteVerificationRequest, RemoteVerifier};

/// Blocking HTTP client for a remote liveness verifier.
///
/// Dropping the future returned by `verify` releases the caller at once,
/// but the request already handed to the blocking pool runs on until it
/// completes or hits `timeout`. Keep the timeout short; it bounds how long
/// an abandoned call can outlive its session.
#[derive(Debug, Clone)]
pub struct HttpRemoteVerifier {
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpRemoteVerifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn post(&self, request: &RemoteVerificationRequest) -> Result<RemoteVerdict, MlError> {
        let mut call = ureq::post(&self.endpoint).timeout(self.timeout);
        if let Some(key) = &self.api_key {
            call = call.set("Authorization", &format!("Bearer {}", key));
        }

        let response = call.send_json(request).map_err(|e| match e {
            ureq::Error::Status(code, _) => {
                MlError::Remote(format!("verifier returned status {}", code))
            }
            ureq::Error::Transport(t) => {
                let msg = t.to_string();
                if msg.contains("timeout") || msg.contains("timed out") {
                    MlError::Timeout {
                        elapsed_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    MlError::Remote(format!("transport error: {}", msg))
                }
            }
        })?;

        response
            .into_json::<RemoteVerdict>()
            .map_err(|e| MlError::InvalidOutput(e.to_string()))
    }
}

#[async_trait]
impl RemoteVerifier for HttpRemoteVerifier {
    fn name(&self) -> &str {
        "http"
    }

    async fn verify(&self, request: &RemoteVerificationRequest) -> Result<RemoteVerdict, MlError> {
        let this = self.clone();
        let request = request.clone();
        tokio::task::spawn_blocking(move || this.post(&request))
            .await
            .map_err(|e| MlError::Remote(format!("verifier task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_endpoint_is_remote_error() {
        // port 9 (discard) on localhost is closed on test machines
        let remote = HttpRemoteVerifier::new("http://127.0.0.1:9/verify")
            .with_timeout(Duration::from_millis(200));
        let request = RemoteVerificationRequest {
            session_id: "s".into(),
            device_id: "d".into(),
            employee_id: None,
            frame_hashes: vec!["00".into()],
        };
        let err = remote.verify(&request).await.unwrap_err();
        assert!(matches!(err, MlError::Remote(_) | MlError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_abandoned_call_releases_caller() {
        // non-routable address; connect either hangs or fails fast
        let remote = HttpRemoteVerifier::new("http://10.255.255.1:81/verify")
            .with_timeout(Duration::from_millis(500));
        let request = RemoteVerificationRequest {
            session_id: "s".into(),
            device_id: "d".into(),
            employee_id: None,
            frame_hashes: vec![],
        };
        let started = std::time::Instant::now();
        let _ = tokio::time::timeout(Duration::from_millis(50), remote.verify(&request)).await;
        assert!(started.elapsed() < Duration::from_millis(450));
    }
}
