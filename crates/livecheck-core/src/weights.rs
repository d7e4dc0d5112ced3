//! Fusion weights and the environment-driven weight recommender.

use serde::{Deserialize, Serialize};

/// Five non-negative component weights
///
/// Always re-normalized to sum to 1.0 before fusion, whatever the caller
/// supplied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub motion: f64,
    pub ml: f64,
    pub quality: f64,
    pub device: f64,
    pub stability: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self::new(0.30, 0.35, 0.10, 0.10, 0.15)
    }
}

impl FusionWeights {
    pub const fn new(motion: f64, ml: f64, quality: f64, device: f64, stability: f64) -> Self {
        Self {
            motion,
            ml,
            quality,
            device,
            stability,
        }
    }

    pub const fn equal() -> Self {
        Self::new(0.2, 0.2, 0.2, 0.2, 0.2)
    }

    pub fn as_array(&self) -> [f64; 5] {
        [self.motion, self.ml, self.quality, self.device, self.stability]
    }

    fn from_array(a: [f64; 5]) -> Self {
        Self::new(a[0], a[1], a[2], a[3], a[4])
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }

    /// Scale the weights to sum to 1.0
    ///
    /// Negative or non-finite weights count as zero; if nothing positive
    /// remains the weights fall back to equal shares.
    pub fn normalized(&self) -> Self {
        let clean = self
            .as_array()
            .map(|w| if w.is_finite() && w > 0.0 { w } else { 0.0 });

        // rescale by the max first so huge magnitudes cannot overflow the sum
        let max = clean.iter().cloned().fold(0.0f64, f64::max);
        if max <= 0.0 {
            return Self::equal();
        }
        let scaled = clean.map(|w| w / max);
        let total: f64 = scaled.iter().sum();
        Self::from_array(scaled.map(|w| w / total))
    }

    /// Multiply each weight by a factor (no re-normalization)
    fn scaled(&self, factors: [f64; 5]) -> Self {
        let a = self.as_array();
        Self::from_array([
            a[0] * factors[0],
            a[1] * factors[1],
            a[2] * factors[2],
            a[3] * factors[3],
            a[4] * factors[4],
        ])
    }
}

/// Ambient lighting at the capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lighting {
    Poor,
    Normal,
    Bright,
}

/// Camera/device capture quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceQuality {
    Low,
    Medium,
    High,
}

/// Assurance level required by the deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    Low,
    Standard,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentProfile {
    pub lighting: Lighting,
    pub device_quality: DeviceQuality,
    pub security_level: SecurityLevel,
}

impl Default for EnvironmentProfile {
    fn default() -> Self {
        Self {
            lighting: Lighting::Normal,
            device_quality: DeviceQuality::Medium,
            security_level: SecurityLevel::Standard,
        }
    }
}

/// Nudge `base` weights for the capture environment
///
/// Poor lighting shifts trust from image quality and ML toward motion;
/// low-end cameras do the same for ML; high security leans on ML,
/// stability and device trust. The result is always normalized.
pub fn recommend_weights(base: &FusionWeights, env: &EnvironmentProfile) -> FusionWeights {
    //                    motion  ml    quality device stability
    let lighting = match env.lighting {
        Lighting::Poor => [1.3, 0.9, 0.5, 1.0, 1.0],
        Lighting::Normal => [1.0; 5],
        Lighting::Bright => [1.0, 1.1, 1.1, 1.0, 1.0],
    };
    let device = match env.device_quality {
        DeviceQuality::Low => [1.2, 0.8, 0.8, 1.0, 1.1],
        DeviceQuality::Medium => [1.0; 5],
        DeviceQuality::High => [1.0, 1.1, 1.0, 1.0, 1.0],
    };
    let security = match env.security_level {
        SecurityLevel::Low => [1.2, 0.9, 1.0, 0.9, 0.9],
        SecurityLevel::Standard => [1.0; 5],
        SecurityLevel::High => [0.9, 1.3, 1.0, 1.2, 1.3],
    };

    base.normalized()
        .scaled(lighting)
        .scaled(device)
        .scaled(security)
        .normalized()
}
