//! # Probe Configuration
//!
//! A probe run is described by a YAML file plus a handful of environment
//! overrides. Everything is read once at startup and validated before any
//! virtual user starts; there is no reconfiguration mid-run.
//!
//! ## Example
//!
//! ```yaml
//! target:
//!   base_url: http://localhost:8080
//!   api_prefix: /api
//!   timeout: 30s
//! stages:
//!   - { target: 10, duration: 2m }
//!   - { target: 50, duration: 3m }
//!   - { target: 200, duration: 3m }
//!   - { target: 50, duration: 2m }
//! detection:
//!   baseline_ceiling: 25
//!   threshold: 3.0
//! scenarios:
//!   core: 0.60
//!   resource_intensive: 0.25
//!   health_check: 0.15
//! ```
//!
//! ## Environment Variables
//!
//! - `BRRTPROBE_BASE_URL`: overrides `target.base_url`
//! - `BRRTPROBE_USERNAME` / `BRRTPROBE_PASSWORD`: login credentials
//! - `BRRTPROBE_SEED`: seed for scenario draws (reproducible runs)

pub mod duration;

use crate::load::LoadLevels;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating a probe configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid duration '{0}' (expected e.g. 500ms, 30s, 3m, 1h)")]
    InvalidDuration(String),
    #[error("stage table is empty")]
    EmptyStages,
    #[error("stage {index} has a zero duration")]
    ZeroDurationStage { index: usize },
    #[error("every stage targets zero users")]
    NoLoad,
    #[error("load_levels must contain at least one non-zero level")]
    InvalidLoadLevels,
    #[error("invalid base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("breakpoint threshold must be greater than 1.0, got {0}")]
    InvalidThreshold(f64),
    #[error("safe capacity factor must be in (0, 1], got {0}")]
    InvalidSafeCapacityFactor(f64),
    #[error("invalid scenario weights: {0}")]
    InvalidWeights(String),
    #[error("ramp tick must be non-zero")]
    InvalidTick,
    #[error("invalid value '{value}' for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// One entry of the ramp: hold or ramp toward `target` users for `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStage {
    pub target: usize,
    #[serde(with = "duration")]
    pub duration: Duration,
}

impl LoadStage {
    pub fn new(target: usize, duration: Duration) -> Self {
        Self { target, duration }
    }
}

/// How the target user count moves between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RampMode {
    /// Interpolate from the previous stage target over the stage duration.
    #[default]
    Linear,
    /// Jump to the stage target when the stage starts.
    Step,
}

/// Target service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetConfig {
    pub base_url: String,
    pub api_prefix: String,
    pub health_path: String,
    #[serde(with = "duration")]
    pub timeout: Duration,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Skip the reachability check before the first VU starts.
    pub skip_preflight: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_prefix: "/api".to_string(),
            health_path: "/health".to_string(),
            timeout: Duration::from_secs(30),
            username: None,
            password: None,
            skip_preflight: false,
        }
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RampConfig {
    pub mode: RampMode,
    /// How often the scheduler re-evaluates the target user count.
    #[serde(with = "duration")]
    pub tick: Duration,
    /// How long VUs get to finish their iteration once the schedule ends.
    #[serde(with = "duration")]
    pub graceful_stop: Duration,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            mode: RampMode::Linear,
            tick: Duration::from_millis(250),
            graceful_stop: Duration::from_secs(30),
        }
    }
}

/// Baseline and breakpoint tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectionConfig {
    /// Highest load level a session may be tagged with to become the baseline.
    pub baseline_ceiling: usize,
    /// Degradation multiple of baseline that latches the breakpoint.
    pub threshold: f64,
    /// Share of the breakpoint level recommended as safe capacity.
    pub safe_capacity_factor: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            baseline_ceiling: 25,
            threshold: 3.0,
            safe_capacity_factor: 0.7,
        }
    }
}

/// Relative weights of the workload categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioWeights {
    pub core: f64,
    pub resource_intensive: f64,
    pub health_check: f64,
}

impl Default for ScenarioWeights {
    fn default() -> Self {
        Self {
            core: 0.60,
            resource_intensive: 0.25,
            health_check: 0.15,
        }
    }
}

/// Complete configuration of a probe run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeConfig {
    pub target: TargetConfig,
    pub stages: Vec<LoadStage>,
    /// Explicit level set; derived from the stage targets when absent.
    pub load_levels: Option<Vec<usize>>,
    pub ramp: RampConfig,
    pub detection: DetectionConfig,
    pub scenarios: ScenarioWeights,
    /// Seed for per-VU random draws. Unset means entropy-seeded.
    pub seed: Option<u64>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            target: TargetConfig::default(),
            stages: default_stages(),
            load_levels: None,
            ramp: RampConfig::default(),
            detection: DetectionConfig::default(),
            scenarios: ScenarioWeights::default(),
            seed: None,
        }
    }
}

/// Ramp through the standard levels to 500 users, then back down to observe recovery.
pub fn default_stages() -> Vec<LoadStage> {
    let min = |m: u64| Duration::from_secs(m * 60);
    vec![
        LoadStage::new(10, min(2)),
        LoadStage::new(25, min(3)),
        LoadStage::new(50, min(3)),
        LoadStage::new(75, min(3)),
        LoadStage::new(100, min(3)),
        LoadStage::new(150, min(3)),
        LoadStage::new(200, min(3)),
        LoadStage::new(300, min(3)),
        LoadStage::new(400, min(3)),
        LoadStage::new(500, min(3)),
        LoadStage::new(100, min(2)),
        LoadStage::new(0, min(1)),
    ]
}

impl ProbeConfig {
    /// Parse a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load from an optional file, apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p).map_err(|source| ConfigError::Io {
                    path: p.to_path_buf(),
                    source,
                })?;
                Self::from_yaml_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BRRTPROBE_BASE_URL") {
            self.target.base_url = url;
        }
        if let Some(user) = lookup("BRRTPROBE_USERNAME") {
            self.target.username = Some(user);
        }
        if let Some(pass) = lookup("BRRTPROBE_PASSWORD") {
            self.target.password = Some(pass);
        }
        if let Some(seed) = lookup("BRRTPROBE_SEED") {
            let parsed = seed.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "BRRTPROBE_SEED",
                value: seed.clone(),
            })?;
            self.seed = Some(parsed);
        }
        Ok(())
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::EmptyStages);
        }
        if let Some(index) = self.stages.iter().position(|s| s.duration.is_zero()) {
            return Err(ConfigError::ZeroDurationStage { index });
        }
        if self.stages.iter().all(|s| s.target == 0) {
            return Err(ConfigError::NoLoad);
        }
        if let Some(levels) = &self.load_levels {
            if LoadLevels::new(levels.iter().copied()).is_none() {
                return Err(ConfigError::InvalidLoadLevels);
            }
        }
        if self.ramp.tick.is_zero() {
            return Err(ConfigError::InvalidTick);
        }

        let url = url::Url::parse(&self.target.base_url).map_err(|e| {
            ConfigError::InvalidBaseUrl {
                url: self.target.base_url.clone(),
                reason: e.to_string(),
            }
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.target.base_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        let threshold = self.detection.threshold;
        if !threshold.is_finite() || threshold <= 1.0 {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        let factor = self.detection.safe_capacity_factor;
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(ConfigError::InvalidSafeCapacityFactor(factor));
        }

        let w = self.scenarios;
        let weights = [w.core, w.resource_intensive, w.health_check];
        if weights.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ConfigError::InvalidWeights(
                "weights must be finite and non-negative".to_string(),
            ));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(ConfigError::InvalidWeights(
                "weights must sum to a positive value".to_string(),
            ));
        }
        Ok(())
    }

    /// The level set used to tag samples.
    pub fn load_levels(&self) -> Result<LoadLevels, ConfigError> {
        match &self.load_levels {
            Some(levels) => LoadLevels::new(levels.iter().copied()),
            None => LoadLevels::new(self.stages.iter().map(|s| s.target)),
        }
        .ok_or(ConfigError::InvalidLoadLevels)
    }

    /// Sum of all stage durations.
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }
}
