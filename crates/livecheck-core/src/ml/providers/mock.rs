//! Scripted model and remote verifier for tests.
//!
//! Deterministic outputs, injectable failures and call counters, so the
//! adapter's fallback logic can be exercised without weights or network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::MlError;
use crate::ml::{
    LivenessModel, ModelDescriptor, ModelInput, ModelShape, RawPrediction, RemoteVerdict,
    RemoteVerificationRequest, RemoteVerifier,
};

/// Mock local model.
///
/// Returns scripted outputs in order, then `default_output` forever.
#[derive(Debug)]
pub struct MockLivenessModel {
    descriptor: ModelDescriptor,
    default_output: RawPrediction,
    scripted: Mutex<VecDeque<Result<RawPrediction, MlError>>>,
    load_failures: Mutex<u32>,
    load_calls: AtomicUsize,
    infer_calls: AtomicUsize,
    last_input_len: Mutex<Option<usize>>,
}

impl MockLivenessModel {
    pub fn new(shape: ModelShape, default_output: RawPrediction) -> Self {
        Self {
            descriptor: ModelDescriptor::new("mock", "0.0.0", shape),
            default_output,
            scripted: Mutex::new(VecDeque::new()),
            load_failures: Mutex::new(0),
            load_calls: AtomicUsize::new(0),
            infer_calls: AtomicUsize::new(0),
            last_input_len: Mutex::new(None),
        }
    }

    pub fn single_frame(default_output: RawPrediction) -> Self {
        Self::new(ModelShape::SingleFrame, default_output)
    }

    pub fn sequence(window: usize, default_output: RawPrediction) -> Self {
        Self::new(ModelShape::Sequence { window }, default_output)
    }

    /// Queue one output ahead of the default
    pub fn push_output(&self, output: Result<RawPrediction, MlError>) {
        self.scripted.lock().push_back(output);
    }

    /// Make the next `n` loads fail
    pub fn fail_loads(&self, n: u32) {
        *self.load_failures.lock() = n;
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn infer_calls(&self) -> usize {
        self.infer_calls.load(Ordering::SeqCst)
    }

    /// Frame count of the most recent input
    pub fn last_input_len(&self) -> Option<usize> {
        *self.last_input_len.lock()
    }
}

#[async_trait]
impl LivenessModel for MockLivenessModel {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    async fn load(&self) -> Result<(), MlError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        let mut failures = self.load_failures.lock();
        if *failures > 0 {
            *failures -= 1;
            return Err(MlError::LoadFailed("scripted load failure".to_string()));
        }
        Ok(())
    }

    async fn infer(&self, input: ModelInput<'_>) -> Result<RawPrediction, MlError> {
        self.infer_calls.fetch_add(1, Ordering::SeqCst);
        let len = match input {
            ModelInput::Frame(_) => 1,
            ModelInput::Sequence(frames) => frames.len(),
        };
        *self.last_input_len.lock() = Some(len);

        match self.scripted.lock().pop_front() {
            Some(output) => output,
            None => Ok(self.default_output.clone()),
        }
    }
}

/// Mock remote verifier with a fixed answer
#[derive(Debug)]
pub struct MockRemoteVerifier {
    response: Result<RemoteVerdict, MlError>,
    calls: AtomicUsize,
    last_request: Mutex<Option<RemoteVerificationRequest>>,
}

impl MockRemoteVerifier {
    pub fn answering(score: f64, confidence: f64, is_live: bool) -> Self {
        Self::with_response(Ok(RemoteVerdict {
            score,
            confidence,
            is_live,
            model_id: Some("mock-remote".to_string()),
            model_version: Some("0.0.0".to_string()),
        }))
    }

    pub fn failing(error: MlError) -> Self {
        Self::with_response(Err(error))
    }

    fn with_response(response: Result<RemoteVerdict, MlError>) -> Self {
        Self {
            response,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<RemoteVerificationRequest> {
        self.last_request.lock().clone()
    }
}

#[async_trait]
impl RemoteVerifier for MockRemoteVerifier {
    fn name(&self) -> &str {
        "mock-remote"
    }

    async fn verify(&self, request: &RemoteVerificationRequest) -> Result<RemoteVerdict, MlError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request.clone());
        self.response.clone()
    }
}
