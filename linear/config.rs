//! Pipeline settings, read from and written to TOML.
//!
//! Every field has a default, so a configuration file only needs to name the
//! settings it changes.

use crate::frequency::Threshold;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Elastic-net mixing ratios searched during feature selection.
pub const DEFAULT_L1_RATIOS: [f64; 7] = [0.1, 0.5, 0.7, 0.9, 0.95, 0.99, 1.0];

/// Ridge strengths searched by leave-one-out cross-validation.
pub const DEFAULT_RIDGE_ALPHAS: [f64; 3] = [0.1, 1.0, 10.0];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Settings for the cross-validated elastic net used to select features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Candidate L1/L2 mixing ratios, each in (0, 1].
    pub l1_ratios: Vec<f64>,
    /// Length of the regularization path per mixing ratio.
    pub n_alphas: usize,
    /// Ratio of the smallest to the largest strength on each path.
    pub eps: f64,
    pub cv_folds: usize,
    /// Duality-gap tolerance of coordinate descent, relative to `‖y‖²`.
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            l1_ratios: DEFAULT_L1_RATIOS.to_vec(),
            n_alphas: 100,
            eps: 1e-3,
            cv_folds: 5,
            tolerance: 1e-4,
            max_iterations: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RidgeConfig {
    pub alphas: Vec<f64>,
}

impl Default for RidgeConfig {
    fn default() -> Self {
        Self {
            alphas: DEFAULT_RIDGE_ALPHAS.to_vec(),
        }
    }
}

/// Column conventions for fingerprint tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Column holding the log CMC target.
    pub target_column: String,
    /// Optional column of molecule identifiers.
    pub id_column: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            target_column: "log_cmc".to_string(),
            id_column: "id".to_string(),
        }
    }
}

/// The complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub threshold: Threshold,
    pub selector: SelectorConfig,
    pub ridge: RidgeConfig,
    pub data: DataConfig,
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Rejects settings the estimators cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::InvalidValue {
                field,
                reason: reason.into(),
            }
        }

        self.threshold
            .validate()
            .map_err(|e| invalid("threshold", e.to_string()))?;

        let selector = &self.selector;
        if selector.l1_ratios.is_empty() {
            return Err(invalid("selector.l1_ratios", "at least one ratio is required"));
        }
        if let Some(bad) = selector
            .l1_ratios
            .iter()
            .find(|&&r| !(r > 0.0 && r <= 1.0))
        {
            return Err(invalid(
                "selector.l1_ratios",
                format!("{bad} is outside (0, 1]"),
            ));
        }
        if selector.n_alphas == 0 {
            return Err(invalid("selector.n_alphas", "must be positive"));
        }
        if !(selector.eps > 0.0 && selector.eps < 1.0) {
            return Err(invalid("selector.eps", "must lie in (0, 1)"));
        }
        if selector.cv_folds < 2 {
            return Err(invalid("selector.cv_folds", "at least two folds are required"));
        }
        if !(selector.tolerance > 0.0) {
            return Err(invalid("selector.tolerance", "must be positive"));
        }
        if selector.max_iterations == 0 {
            return Err(invalid("selector.max_iterations", "must be positive"));
        }

        if self.ridge.alphas.is_empty() {
            return Err(invalid("ridge.alphas", "at least one strength is required"));
        }
        if let Some(bad) = self.ridge.alphas.iter().find(|&&a| !(a > 0.0 && a.is_finite())) {
            return Err(invalid("ridge.alphas", format!("{bad} is not a positive strength")));
        }
        Ok(())
    }
}
