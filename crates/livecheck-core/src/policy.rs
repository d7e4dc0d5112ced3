//! Policy Registry
//!
//! Named security postures: fusion weights, liveness threshold, required
//! behavioral signals and whether evidence is retained. Built once at
//! process start and shared read-only (`Arc<PolicyRegistry>`) between
//! sessions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use livecheck_signals::RequiredSignals;

use crate::error::{LivenessError, LivenessResult};
use crate::weights::FusionWeights;

pub const DEFAULT_POLICY: &str = "default";
pub const STRICT_POLICY: &str = "strict";
pub const LENIENT_POLICY: &str = "lenient";

/// Default liveness threshold
pub const DEFAULT_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub name: String,
    pub weights: FusionWeights,
    pub threshold: f64,
    pub required_signals: RequiredSignals,
    pub store_evidence: bool,
}

impl Policy {
    /// Balanced posture for everyday check-ins
    pub fn default_policy() -> Self {
        Self {
            name: DEFAULT_POLICY.to_string(),
            weights: FusionWeights::default(),
            threshold: DEFAULT_THRESHOLD,
            required_signals: RequiredSignals::blink_and_turn(),
            store_evidence: true,
        }
    }

    /// High-assurance contexts: ML-heavy, higher bar, all gestures
    pub fn strict() -> Self {
        Self {
            name: STRICT_POLICY.to_string(),
            weights: FusionWeights::new(0.25, 0.45, 0.10, 0.10, 0.10),
            threshold: 0.8,
            required_signals: RequiredSignals::all(),
            store_evidence: true,
        }
    }

    /// Poor-lighting tolerance: motion-heavy, lower bar
    pub fn lenient() -> Self {
        Self {
            name: LENIENT_POLICY.to_string(),
            weights: FusionWeights::new(0.40, 0.25, 0.05, 0.10, 0.20),
            threshold: 0.6,
            required_signals: RequiredSignals::blink_only(),
            store_evidence: false,
        }
    }

    pub fn validate(&self) -> LivenessResult<()> {
        if self.name.trim().is_empty() {
            return Err(LivenessError::InvalidPolicy("policy name is empty".to_string()));
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(LivenessError::InvalidPolicy(format!(
                "{}: threshold must be in (0, 1), got {}",
                self.name, self.threshold
            )));
        }
        let w = self.weights.as_array();
        if w.iter().any(|x| !x.is_finite() || *x < 0.0) {
            return Err(LivenessError::InvalidPolicy(format!(
                "{}: weights must be finite and non-negative",
                self.name
            )));
        }
        if self.weights.sum() <= 0.0 {
            return Err(LivenessError::InvalidPolicy(format!(
                "{}: at least one weight must be positive",
                self.name
            )));
        }
        Ok(())
    }
}

/// Read-only lookup from policy name to policy
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    policies: BTreeMap<String, Policy>,
}

impl PolicyRegistry {
    /// Registry holding `default`, `strict` and `lenient`
    pub fn with_defaults() -> Self {
        let mut policies = BTreeMap::new();
        for p in [Policy::default_policy(), Policy::strict(), Policy::lenient()] {
            policies.insert(p.name.clone(), p);
        }
        Self { policies }
    }

    /// Defaults plus caller-supplied policies (same name replaces)
    pub fn with_overrides<I>(overrides: I) -> LivenessResult<Self>
    where
        I: IntoIterator<Item = Policy>,
    {
        let mut registry = Self::with_defaults();
        for policy in overrides {
            policy.validate()?;
            registry.policies.insert(policy.name.clone(), policy);
        }
        Ok(registry)
    }

    /// Resolve a policy by name; unknown names are a caller error
    pub fn get(&self, name: &str) -> LivenessResult<&Policy> {
        self.policies
            .get(name)
            .ok_or_else(|| LivenessError::UnknownPolicy(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.policies.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Policy> {
        self.policies.values()
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
