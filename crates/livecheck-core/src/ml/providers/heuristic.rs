//! Weight-free local sequence model.
//!
//! Scores landmark micro-motion: the mean frame-to-frame displacement of
//! every landmark, in inter-ocular units. Printed photos and frozen screens
//! sit at zero; a live face never holds perfectly still.

use async_trait::async_trait;

use livecheck_signals::frame::distance;
use livecheck_signals::{LandmarkFrame, Point};

use crate::error::MlError;
use crate::ml::{LivenessModel, ModelDescriptor, ModelInput, ModelShape, RawPrediction};

/// Displacement (inter-ocular units per frame) mapping to ~63% live
const JITTER_SCALE: f32 = 0.01;

#[derive(Debug, Clone)]
pub struct HeuristicMotionModel {
    descriptor: ModelDescriptor,
}

impl HeuristicMotionModel {
    pub const ID: &'static str = "heuristic-motion";

    pub fn new(window: usize) -> Self {
        Self {
            descriptor: ModelDescriptor::new(
                Self::ID,
                "1.0",
                ModelShape::Sequence {
                    window: window.max(2),
                },
            ),
        }
    }
}

impl Default for HeuristicMotionModel {
    fn default() -> Self {
        Self::new(8)
    }
}

fn landmarks(frame: &LandmarkFrame) -> Vec<Point> {
    let mut points = Vec::with_capacity(21);
    if let Some(eye) = &frame.left_eye {
        points.extend_from_slice(eye);
    }
    if let Some(eye) = &frame.right_eye {
        points.extend_from_slice(eye);
    }
    if let Some(mouth) = &frame.mouth {
        points.extend_from_slice(mouth);
    }
    if let Some(nose) = frame.nose {
        points.push(nose);
    }
    points
}

/// Mean landmark displacement between two frames, or None if incomparable
fn displacement(prev: &LandmarkFrame, curr: &LandmarkFrame) -> Option<f32> {
    let a = landmarks(prev);
    let b = landmarks(curr);
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let scale = curr
        .eye_centers()
        .map(|(l, r)| distance(l, r))
        .filter(|iod| *iod > 1e-3)
        .unwrap_or(1.0);
    let total: f32 = a.iter().zip(b.iter()).map(|(p, q)| distance(*p, *q)).sum();
    Some(total / a.len() as f32 / scale)
}

/// Live probability from the mean micro-motion of a sequence
pub fn micro_motion_score(frames: &[LandmarkFrame]) -> Option<f32> {
    let moves: Vec<f32> = frames
        .windows(2)
        .filter_map(|pair| displacement(&pair[0], &pair[1]))
        .collect();
    if moves.is_empty() {
        return None;
    }
    let jitter = moves.iter().sum::<f32>() / moves.len() as f32;
    Some(1.0 - (-jitter / JITTER_SCALE).exp())
}

#[async_trait]
impl LivenessModel for HeuristicMotionModel {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    async fn load(&self) -> Result<(), MlError> {
        Ok(())
    }

    async fn infer(&self, input: ModelInput<'_>) -> Result<RawPrediction, MlError> {
        let frames = match input {
            ModelInput::Sequence(frames) => frames,
            ModelInput::Frame(_) => {
                return Err(MlError::Inference(
                    "heuristic model needs a frame sequence".to_string(),
                ))
            }
        };
        micro_motion_score(frames)
            .map(|p| RawPrediction::Probability(p.clamp(0.0, 1.0) as f64))
            .ok_or_else(|| MlError::Inference("no comparable landmark frames".to_string()))
    }
}
