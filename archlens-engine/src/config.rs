//! Configuration loading and validation for the analysis engine.
//!
//! The engine reads an optional `archlens.yaml` with one section per
//! analysis. Every field has a default, so an empty file (or no file at
//! all) yields the standard thresholds.
//!
//! # Environment Variable Overrides
//!
//! Configuration values can be overridden using environment variables:
//! - `ARCHLENS_CYCLES_MAX_LENGTH`: Longest cycle reported by bounded search
//! - `ARCHLENS_METRICS_IMPACT_THRESHOLD`: Transitive dependents above which a module is critical
//! - `ARCHLENS_METRICS_BOTTLENECK_DEGREE`: Degree above which a module is a bottleneck
//! - `ARCHLENS_DRIFT_EFFERENT_THRESHOLD`: Efferent coupling above which a module is flagged
//! - `ARCHLENS_DRIFT_RECENT_WINDOW_DAYS`: Trailing window of the recent-violations query

use crate::cycles::DEFAULT_MAX_CYCLE_LENGTH;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "archlens.yaml";

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file was not found at the specified path.
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    /// Failed to read the configuration file.
    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse the YAML configuration.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root configuration structure for `archlens.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub cycles: CycleConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub drift: DriftConfig,
}

/// Cycle detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Longest cycle (in edges) returned by the bounded search.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
        }
    }
}

fn default_max_length() -> usize {
    DEFAULT_MAX_CYCLE_LENGTH
}

/// Coupling metrics settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// A module is critical when more modules than this depend on it transitively.
    #[serde(default = "default_impact_threshold")]
    pub impact_threshold: usize,

    /// A module is a bottleneck when both direct degrees exceed this.
    #[serde(default = "default_bottleneck_degree")]
    pub bottleneck_degree: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            impact_threshold: default_impact_threshold(),
            bottleneck_degree: default_bottleneck_degree(),
        }
    }
}

fn default_impact_threshold() -> usize {
    3
}

fn default_bottleneck_degree() -> usize {
    3
}

/// Drift detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftConfig {
    /// Efferent coupling above which a module is a high-coupling violation.
    #[serde(default = "default_efferent_threshold")]
    pub efferent_threshold: usize,

    /// Trailing window, in days, of the recent-violations query.
    #[serde(default = "default_recent_window_days")]
    pub recent_window_days: u32,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            efferent_threshold: default_efferent_threshold(),
            recent_window_days: default_recent_window_days(),
        }
    }
}

fn default_efferent_threshold() -> usize {
    5
}

fn default_recent_window_days() -> u32 {
    7
}

impl DriftConfig {
    pub fn recent_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.recent_window_days))
    }
}

impl EngineConfig {
    /// Load configuration from `archlens.yaml` in the current directory,
    /// falling back to defaults when the file does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Path::new(DEFAULT_CONFIG_FILE);
        if !path.exists() {
            let mut config = Self::default();
            config.apply_env_overrides();
            config.validate()?;
            return Ok(config);
        }
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from a YAML string without env overrides.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source. Values that do not
    /// parse are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(n) = parsed("ARCHLENS_CYCLES_MAX_LENGTH") {
            self.cycles.max_length = n as usize;
        }

        if let Some(n) = parsed("ARCHLENS_METRICS_IMPACT_THRESHOLD") {
            self.metrics.impact_threshold = n as usize;
        }

        if let Some(n) = parsed("ARCHLENS_METRICS_BOTTLENECK_DEGREE") {
            self.metrics.bottleneck_degree = n as usize;
        }

        if let Some(n) = parsed("ARCHLENS_DRIFT_EFFERENT_THRESHOLD") {
            self.drift.efferent_threshold = n as usize;
        }

        if let Some(n) = parsed("ARCHLENS_DRIFT_RECENT_WINDOW_DAYS") {
            if let Ok(days) = u32::try_from(n) {
                self.drift.recent_window_days = days;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycles.max_length < 2 {
            return Err(ConfigError::ValidationError(format!(
                "cycles.max_length must be at least 2, got {}",
                self.cycles.max_length
            )));
        }

        if self.drift.recent_window_days == 0 {
            return Err(ConfigError::ValidationError(
                "drift.recent_window_days must be at least 1".into(),
            ));
        }

        Ok(())
    }
}
