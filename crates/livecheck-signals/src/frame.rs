//! Landmark Frames
//!
//! One captured sample in time: eye, mouth and nose landmark clusters in
//! normalized image coordinates plus optional raw pixel statistics.
//! Frames are produced by the capture pipeline and never mutated here.

use serde::{Deserialize, Serialize};

/// 2D point in normalized image coordinates
pub type Point = [f32; 2];

/// Minimum number of frames from which liveness can be assessed
pub const MIN_FRAMES: usize = 3;

/// Eye contour point order (6 points)
pub mod eye_points {
    pub const OUTER: usize = 0;
    pub const UPPER_OUTER: usize = 1;
    pub const UPPER_INNER: usize = 2;
    pub const INNER: usize = 3;
    pub const LOWER_INNER: usize = 4;
    pub const LOWER_OUTER: usize = 5;
}

/// Mouth contour point order (8 points)
pub mod mouth_points {
    pub const LEFT_CORNER: usize = 0;
    pub const UPPER_LEFT: usize = 1;
    pub const UPPER_CENTER: usize = 2;
    pub const UPPER_RIGHT: usize = 3;
    pub const RIGHT_CORNER: usize = 4;
    pub const LOWER_RIGHT: usize = 5;
    pub const LOWER_CENTER: usize = 6;
    pub const LOWER_LEFT: usize = 7;
}

/// Downsampled grayscale grid of the face region (luma 0..255)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelSample {
    pub width: u32,
    pub height: u32,
    pub luma: Vec<f32>,
}

impl PixelSample {
    pub fn new(width: u32, height: u32, luma: Vec<f32>) -> Self {
        Self { width, height, luma }
    }

    /// Mean squared difference against another sample of the same size
    pub fn mean_squared_diff(&self, other: &PixelSample) -> Option<f32> {
        if self.luma.len() != other.luma.len() || self.luma.is_empty() {
            return None;
        }
        let sum: f32 = self
            .luma
            .iter()
            .zip(other.luma.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum();
        Some(sum / self.luma.len() as f32)
    }
}

/// One sample of the capture burst
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    /// Capture timestamp in milliseconds (strictly increasing within a burst)
    pub timestamp_ms: i64,
    #[serde(default)]
    pub left_eye: Option<[Point; 6]>,
    #[serde(default)]
    pub right_eye: Option<[Point; 6]>,
    #[serde(default)]
    pub mouth: Option<[Point; 8]>,
    #[serde(default)]
    pub nose: Option<Point>,
    #[serde(default)]
    pub pixels: Option<PixelSample>,
    /// Per-frame capture quality (0-1) if the pipeline provides one
    #[serde(default)]
    pub quality: Option<f32>,
}

impl LandmarkFrame {
    /// Frame with no landmark clusters, only a timestamp
    pub fn empty(timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms,
            left_eye: None,
            right_eye: None,
            mouth: None,
            nose: None,
            pixels: None,
            quality: None,
        }
    }

    /// Average eye-openness over the eyes present in this frame
    pub fn eye_openness(&self) -> Option<f32> {
        match (self.left_eye.as_ref(), self.right_eye.as_ref()) {
            (Some(l), Some(r)) => Some((eye_aspect_ratio(l) + eye_aspect_ratio(r)) / 2.0),
            (Some(e), None) | (None, Some(e)) => Some(eye_aspect_ratio(e)),
            (None, None) => None,
        }
    }

    /// Mouth-openness for this frame
    pub fn mouth_openness(&self) -> Option<f32> {
        self.mouth.as_ref().map(mouth_aspect_ratio)
    }

    /// Eye centers (left, right) if both eyes are present
    pub fn eye_centers(&self) -> Option<(Point, Point)> {
        let l = self.left_eye.as_ref()?;
        let r = self.right_eye.as_ref()?;
        Some((centroid(l), centroid(r)))
    }
}

/// Euclidean distance between two points
pub fn distance(a: Point, b: Point) -> f32 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    (dx * dx + dy * dy).sqrt()
}

/// Mean of a set of points
pub fn centroid(points: &[Point]) -> Point {
    if points.is_empty() {
        return [0.0, 0.0];
    }
    let n = points.len() as f32;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
    [sx / n, sy / n]
}

/// Eye Aspect Ratio: vertical over horizontal eye span
///
/// ~0.25-0.35 for an open eye, 0 when the eyelids coincide.
pub fn eye_aspect_ratio(eye: &[Point; 6]) -> f32 {
    use eye_points::*;

    let v1 = distance(eye[UPPER_OUTER], eye[LOWER_OUTER]);
    let v2 = distance(eye[UPPER_INNER], eye[LOWER_INNER]);
    let h = distance(eye[OUTER], eye[INNER]);

    if h < 0.001 {
        return 0.0;
    }

    (v1 + v2) / (2.0 * h)
}

/// Mouth Aspect Ratio over the eight mouth-contour points
pub fn mouth_aspect_ratio(mouth: &[Point; 8]) -> f32 {
    use mouth_points::*;

    let v1 = distance(mouth[UPPER_LEFT], mouth[LOWER_LEFT]);
    let v2 = distance(mouth[UPPER_CENTER], mouth[LOWER_CENTER]);
    let v3 = distance(mouth[UPPER_RIGHT], mouth[LOWER_RIGHT]);
    let h = distance(mouth[LEFT_CORNER], mouth[RIGHT_CORNER]);

    if h < 0.001 {
        return 0.0;
    }

    (v1 + v2 + v3) / (2.0 * h)
}

/// Input contract violations on a frame burst
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceError {
    TooFewFrames { got: usize, required: usize },
    NonMonotonic { index: usize },
}

/// Check the input contract: enough frames, strictly increasing timestamps
pub fn validate_sequence(frames: &[LandmarkFrame], min_frames: usize) -> Result<(), SequenceError> {
    if frames.len() < min_frames {
        return Err(SequenceError::TooFewFrames {
            got: frames.len(),
            required: min_frames,
        });
    }
    for (i, pair) in frames.windows(2).enumerate() {
        if pair[1].timestamp_ms <= pair[0].timestamp_ms {
            return Err(SequenceError::NonMonotonic { index: i + 1 });
        }
    }
    Ok(())
}

/// Synthetic landmark builders shared by tests across the workspace
pub mod synth {
    use super::*;

    /// Eye centered at `center` with the given openness (EAR) and width
    pub fn eye(center: Point, width: f32, ear: f32) -> [Point; 6] {
        let half_w = width / 2.0;
        // EAR = (v1 + v2) / (2h) with v1 == v2 == v  =>  v = ear * h
        let half_v = ear * width / 2.0;
        let [cx, cy] = center;
        [
            [cx - half_w, cy],
            [cx - half_w / 3.0, cy - half_v],
            [cx + half_w / 3.0, cy - half_v],
            [cx + half_w, cy],
            [cx + half_w / 3.0, cy + half_v],
            [cx - half_w / 3.0, cy + half_v],
        ]
    }

    /// Mouth centered at `center` with the given openness (MAR) and width
    pub fn mouth(center: Point, width: f32, mar: f32) -> [Point; 8] {
        let half_w = width / 2.0;
        // MAR = 3v / (2h)  =>  v = 2 * mar * h / 3
        let half_v = mar * width / 3.0;
        let [cx, cy] = center;
        [
            [cx - half_w, cy],
            [cx - half_w / 2.0, cy - half_v],
            [cx, cy - half_v],
            [cx + half_w / 2.0, cy - half_v],
            [cx + half_w, cy],
            [cx + half_w / 2.0, cy + half_v],
            [cx, cy + half_v],
            [cx - half_w / 2.0, cy + half_v],
        ]
    }

    /// Frontal face frame with the given eye/mouth openness and nose offset
    ///
    /// `nose_dx` is the lateral nose displacement in inter-ocular units.
    pub fn face(timestamp_ms: i64, ear: f32, mar: f32, nose_dx: f32) -> LandmarkFrame {
        let iod = 0.2;
        LandmarkFrame {
            timestamp_ms,
            left_eye: Some(eye([0.4, 0.4], 0.08, ear)),
            right_eye: Some(eye([0.6, 0.4], 0.08, ear)),
            mouth: Some(mouth([0.5, 0.7], 0.16, mar)),
            nose: Some([0.5 + nose_dx * iod, 0.55]),
            pixels: None,
            quality: None,
        }
    }

    /// Uniform pixel grid
    pub fn pixels(level: f32) -> PixelSample {
        PixelSample::new(8, 8, vec![level; 64])
    }
}
