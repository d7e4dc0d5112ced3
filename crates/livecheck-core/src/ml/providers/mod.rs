//! Liveness model and remote verifier implementations
//!
//! Available providers:
//! - `HeuristicMotionModel` - weight-free landmark micro-motion model
//! - `MockLivenessModel` / `MockRemoteVerifier` - scripted, for testing
//! - `HttpRemoteVerifier` - JSON remote verification (feature: remote-http)

pub mod heuristic;
pub mod mock;

#[cfg(feature = "remote-http")]
pub mod http;

pub use heuristic::HeuristicMotionModel;
pub use mock::{MockLivenessModel, MockRemoteVerifier};

#[cfg(feature = "remote-http")]
pub use http::HttpRemoteVerifier;
