use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use livecheck_signals::ExtractorConfig;

use crate::evidence::StorageConfig;
use crate::ml::MlAdapterConfig;
use crate::policy::{Policy, PolicyRegistry};

/// Longest evidence retention a configuration may ask for (100 years)
pub const MAX_RETENTION_DAYS: u32 = 36_500;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Engine-wide configuration, built once at process start
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub extractors: ExtractorConfig,
    #[serde(default)]
    pub ml: MlAdapterConfig,
    #[serde(default)]
    pub evidence: StorageConfig,
    /// Overrides of, or additions to, the named policies
    #[serde(default)]
    pub policies: Vec<Policy>,
}

impl EngineConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    /// Environment variables are prefixed with LIVECHECK_
    /// Example: LIVECHECK_ML_FALLBACK_CONFIDENCE=60
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. User config file (if exists)
    /// 3. Default config file
    /// 4. Built-in defaults (lowest priority)
    pub fn load_layered(
        default_path: Option<&Path>,
        user_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut config = EngineConfig::default();

        if let Some(path) = default_path {
            if path.exists() {
                config = Self::from_file(path)?;
            }
        }

        if let Some(path) = user_path {
            if path.exists() {
                let user_config = Self::from_file(path)?;
                config = config.merge(user_config);
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Sections come from `other`; policy overrides accumulate by name
    fn merge(self, mut other: EngineConfig) -> Self {
        let mut policies = self.policies;
        for p in other.policies.drain(..) {
            policies.retain(|existing| existing.name != p.name);
            policies.push(p);
        }
        other.policies = policies;
        other
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (the environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ex = &mut self.extractors;
        if let Some(v) = parse_var(&lookup, "LIVECHECK_BLINK_CLOSED_THRESHOLD")? {
            ex.blink.closed_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "LIVECHECK_BLINK_OPEN_THRESHOLD")? {
            ex.blink.open_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "LIVECHECK_BLINK_MIN_DWELL_MS")? {
            ex.blink.min_dwell_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "LIVECHECK_HEAD_TURN_OUTWARD_DEG")? {
            ex.head_turn.outward_deg = v;
        }
        if let Some(v) = parse_var(&lookup, "LIVECHECK_STABILITY_VARIANCE_FLOOR")? {
            ex.stability.variance_floor = v;
        }
        if let Some(v) = parse_var(&lookup, "LIVECHECK_ML_FALLBACK_CONFIDENCE")? {
            self.ml.fallback_confidence = v;
        }
        if let Some(v) = parse_var(&lookup, "LIVECHECK_ML_LIVE_THRESHOLD")? {
            self.ml.live_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "LIVECHECK_EVIDENCE_RETENTION_DAYS")? {
            self.evidence.retention.max_retention_days = v;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let blink = &self.extractors.blink;
        if !(0.0 < blink.closed_threshold && blink.closed_threshold < blink.open_threshold) {
            return Err(ConfigError::Validation(
                "blink.closed_threshold must be positive and below blink.open_threshold".to_string(),
            ));
        }
        if blink.open_threshold >= 1.0 {
            return Err(ConfigError::Validation(
                "blink.open_threshold must be below 1.0".to_string(),
            ));
        }
        if blink.min_dwell_ms < 0 || blink.min_dwell_ms >= blink.max_blink_ms {
            return Err(ConfigError::Validation(
                "blink.min_dwell_ms must be non-negative and below blink.max_blink_ms".to_string(),
            ));
        }
        if blink.saturation == 0 {
            return Err(ConfigError::Validation(
                "blink.saturation must be at least 1".to_string(),
            ));
        }

        let turn = &self.extractors.head_turn;
        if !(0.0 <= turn.return_deg
            && turn.return_deg < turn.outward_deg
            && turn.outward_deg < turn.yaw_scale_deg)
        {
            return Err(ConfigError::Validation(
                "head_turn requires 0 <= return_deg < outward_deg < yaw_scale_deg".to_string(),
            ));
        }

        let mouth = &self.extractors.mouth;
        if !(0.0 < mouth.closed_threshold && mouth.closed_threshold < mouth.open_threshold) {
            return Err(ConfigError::Validation(
                "mouth.closed_threshold must be positive and below mouth.open_threshold".to_string(),
            ));
        }
        if mouth.saturation == 0 {
            return Err(ConfigError::Validation(
                "mouth.saturation must be at least 1".to_string(),
            ));
        }

        if !(self.extractors.stability.variance_floor >= 0.0) {
            return Err(ConfigError::Validation(
                "stability.variance_floor must be non-negative".to_string(),
            ));
        }

        let mw = &self.extractors.motion_weights;
        if [mw.blink, mw.head_turn, mw.mouth]
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
        {
            return Err(ConfigError::Validation(
                "motion_weights must be finite and non-negative".to_string(),
            ));
        }

        if !(0.0..=100.0).contains(&self.ml.fallback_confidence) {
            return Err(ConfigError::Validation(
                "ml.fallback_confidence must be in [0, 100]".to_string(),
            ));
        }
        if !(self.ml.live_threshold > 0.0 && self.ml.live_threshold < 1.0) {
            return Err(ConfigError::Validation(
                "ml.live_threshold must be in (0, 1)".to_string(),
            ));
        }
        if self.ml.sequence_window == 0 {
            return Err(ConfigError::Validation(
                "ml.sequence_window must be at least 1".to_string(),
            ));
        }

        let days = self.evidence.retention.max_retention_days;
        if days == 0 || days > MAX_RETENTION_DAYS {
            return Err(ConfigError::Validation(format!(
                "evidence.retention.max_retention_days must be in [1, {}]",
                MAX_RETENTION_DAYS
            )));
        }

        for policy in &self.policies {
            policy
                .validate()
                .map_err(|e| ConfigError::Validation(e.to_string()))?;
        }

        Ok(())
    }

    /// Built-in policies with this configuration's overrides applied
    pub fn policy_registry(&self) -> Result<PolicyRegistry, ConfigError> {
        PolicyRegistry::with_overrides(self.policies.iter().cloned())
            .map_err(|e| ConfigError::Validation(e.to_string()))
    }

    /// Export configuration to TOML string
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = self
            .to_toml_string()
            .map_err(|e| ConfigError::Validation(format!("TOML serialization error: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Validation(format!("Invalid {}", key))),
        None => Ok(None),
    }
}
