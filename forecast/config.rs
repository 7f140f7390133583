//! Runtime settings for the forecaster.
//!
//! Settings come from an optional TOML file. Any key left out keeps its
//! default, and unknown keys are rejected so a typo cannot silently fall back
//! to a default path.

use crate::format::{DEFAULT_TOP_K, GaugeScale};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "finvision.toml";
pub const DEFAULT_MODEL_FILE: &str = "revenue_model.toml";
pub const DEFAULT_FEATURES_FILE: &str = "model_features.toml";
pub const DEFAULT_OUTPUT_FILE: &str = "forecast_results.csv";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastConfig {
    /// Pretrained model artifact.
    pub model_path: PathBuf,
    /// Ordered feature list that accompanies the model.
    pub features_path: PathBuf,
    /// Where batch results are written.
    pub output_path: PathBuf,
    /// Length of the importance ranking.
    pub top_k: usize,
    pub gauge: GaugeScale,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_FILE),
            features_path: PathBuf::from(DEFAULT_FEATURES_FILE),
            output_path: PathBuf::from(DEFAULT_OUTPUT_FILE),
            top_k: DEFAULT_TOP_K,
            gauge: GaugeScale::default(),
        }
    }
}

impl ForecastConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        log::info!("Loaded settings from '{}'", path.display());
        Ok(config)
    }

    /// An explicit path must exist. Without one, [`DEFAULT_CONFIG_FILE`] is
    /// used when present and built-in defaults otherwise.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let implicit = Path::new(DEFAULT_CONFIG_FILE);
        if implicit.is_file() {
            Self::load(implicit)
        } else {
            log::debug!("No {DEFAULT_CONFIG_FILE} found; using built-in defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be at least 1".to_string()));
        }
        if !self.gauge.floor.is_finite() || self.gauge.floor < 0.0 {
            return Err(ConfigError::Invalid(
                "gauge.floor must be a finite, non-negative number".to_string(),
            ));
        }
        if !self.gauge.headroom.is_finite() || self.gauge.headroom < 1.0 {
            return Err(ConfigError::Invalid(
                "gauge.headroom must be a finite number of at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
