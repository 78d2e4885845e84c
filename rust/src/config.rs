//! Configuration for the analysis engine.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Policy knobs for bottleneck classification and opportunity derivation.
///
/// Thresholds are policy, not contract; every field has a default and may be
/// overridden from TOML.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// A critical step whose duration / total_latency reaches this fraction
    /// is a high-latency bottleneck.
    pub bottleneck_fraction: f64,
    /// Non-critical steps below this share of both total cost and total
    /// latency are flagged for elimination review.
    pub elimination_fraction: f64,
    /// Topological layers with at least this many steps are costed on
    /// scoped worker threads.
    pub parallel_layer_threshold: usize,
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug.
    pub verbosity: u8,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bottleneck_fraction: 0.2,
            elimination_fraction: 0.01,
            parallel_layer_threshold: 512,
            verbosity: 0,
        }
    }
}

impl AnalysisConfig {
    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("bottleneck_fraction", self.bottleneck_fraction),
            ("elimination_fraction", self.elimination_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.parallel_layer_threshold == 0 {
            return Err(ConfigError::Invalid(
                "parallel_layer_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = AnalysisConfig::default();
        assert!((config.bottleneck_fraction - 0.2).abs() < 1e-9);
        assert!((config.elimination_fraction - 0.01).abs() < 1e-9);
        assert_eq!(config.parallel_layer_threshold, 512);
        assert_eq!(config.verbosity, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AnalysisConfig::from_toml_str("bottleneck_fraction = 0.35\nverbosity = 2\n")
            .unwrap();
        assert!((config.bottleneck_fraction - 0.35).abs() < 1e-9);
        assert_eq!(config.verbosity, 2);
        assert!((config.elimination_fraction - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_fraction_rejected() {
        let err = AnalysisConfig::from_toml_str("elimination_fraction = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let err = AnalysisConfig::from_toml_str("parallel_layer_threshold = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let err = AnalysisConfig::from_toml_str("bottleneck_fraction = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
