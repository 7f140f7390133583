//! Loading and caching of the pretrained model and its feature list.
//!
//! Both artifacts are read once per process. After that the pair is shared
//! read-only by every request, so no locking is needed beyond the one-time
//! initialization guard.

use crate::model::{ModelError, Regressor, TrainedModel};
use crate::schema::{FeatureSchema, SchemaError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

static ASSETS: OnceLock<ModelAssets> = OnceLock::new();

/// Errors that make the forecaster unusable. Nothing can be served until the
/// artifacts are fixed.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Could not load the model from '{path}': {source}")]
    ModelUnavailable { path: PathBuf, source: ModelError },
    #[error("Could not read the feature list from '{path}': {source}")]
    FeaturesUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not parse the feature list in '{path}': {source}")]
    FeaturesMalformed {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("The feature list is invalid: {0}")]
    InvalidFeatureList(#[from] SchemaError),
    #[error("The model expects {model} features, but the feature list names {schema}.")]
    FeatureCountMismatch { model: usize, schema: usize },
}

/// On-disk form of the feature list: `features = ["Assets - Total", ...]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureList {
    pub features: Vec<String>,
}

impl FeatureList {
    pub fn load(path: &Path) -> Result<Self, StartupError> {
        let text = fs::read_to_string(path).map_err(|source| StartupError::FeaturesUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| StartupError::FeaturesMalformed {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// A model paired with the schema its inputs must follow.
pub struct ModelAssets {
    model: Box<dyn Regressor>,
    schema: FeatureSchema,
}

impl std::fmt::Debug for ModelAssets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAssets")
            .field("n_features", &self.model.n_features())
            .field("schema", &self.schema)
            .finish()
    }
}

impl ModelAssets {
    /// Pairs a model with a schema, refusing pairs whose widths disagree.
    pub fn new(model: Box<dyn Regressor>, schema: FeatureSchema) -> Result<Self, StartupError> {
        if model.n_features() != schema.len() {
            return Err(StartupError::FeatureCountMismatch {
                model: model.n_features(),
                schema: schema.len(),
            });
        }
        Ok(Self { model, schema })
    }

    /// Reads both artifacts from disk.
    pub fn load(model_path: &Path, features_path: &Path) -> Result<Self, StartupError> {
        log::info!("Loading model from '{}'", model_path.display());
        let model =
            TrainedModel::load(model_path).map_err(|source| StartupError::ModelUnavailable {
                path: model_path.to_path_buf(),
                source,
            })?;
        if let Some(name) = &model.name {
            log::info!("Model '{name}' loaded");
        }

        log::info!("Loading feature list from '{}'", features_path.display());
        let list = FeatureList::load(features_path)?;
        let schema = FeatureSchema::new(list.features)?;
        log::info!("Model expects {} features", schema.len());

        Self::new(Box::new(model), schema)
    }

    pub fn model(&self) -> &dyn Regressor {
        self.model.as_ref()
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }
}

/// Returns the process-wide assets, loading them on first use.
///
/// Only the first successful load is kept. Later calls return that same pair
/// whatever paths they pass. A failed load caches nothing, so the next call
/// tries again.
pub fn shared_assets(
    model_path: &Path,
    features_path: &Path,
) -> Result<&'static ModelAssets, StartupError> {
    if let Some(assets) = ASSETS.get() {
        return Ok(assets);
    }

    let loaded = ModelAssets::load(model_path, features_path)?;
    // If another thread finished first, its assets win and ours are dropped.
    Ok(ASSETS.get_or_init(|| loaded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Estimator, LinearModel};
    use tempfile::tempdir;

    fn linear(n: usize) -> TrainedModel {
        TrainedModel {
            name: Some("linear".to_string()),
            n_features: n,
            feature_importances: None,
            estimator: Estimator::Linear(LinearModel {
                intercept: 0.0,
                coefficients: vec![1.0; n],
            }),
        }
    }

    #[test]
    fn loads_matching_artifacts() {
        let dir = tempdir().unwrap();
        let model_path = dir.path().join("revenue_model.toml");
        let features_path = dir.path().join("model_features.toml");
        linear(2).save(&model_path).unwrap();
        fs::write(&features_path, "features = [\"Cash\", \"Employees\"]\n").unwrap();

        let assets = ModelAssets::load(&model_path, &features_path).unwrap();
        assert_eq!(assets.schema().names(), &["Cash", "Employees"]);
        assert_eq!(assets.model().n_features(), 2);
    }

    #[test]
    fn missing_model_file_is_a_startup_error() {
        let dir = tempdir().unwrap();
        let features_path = dir.path().join("model_features.toml");
        fs::write(&features_path, "features = [\"Cash\"]\n").unwrap();

        let err = ModelAssets::load(&dir.path().join("absent.toml"), &features_path).unwrap_err();
        assert!(matches!(
            err,
            StartupError::ModelUnavailable {
                source: ModelError::IoError(_),
                ..
            }
        ));
    }

    #[test]
    fn missing_feature_list_is_a_startup_error() {
        let dir = tempdir().unwrap();
        let model_path = dir.path().join("revenue_model.toml");
        linear(1).save(&model_path).unwrap();

        let err = ModelAssets::load(&model_path, &dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, StartupError::FeaturesUnreadable { .. }));
    }

    #[test]
    fn width_disagreement_is_a_startup_error() {
        let schema = FeatureSchema::new(vec!["A".into(), "B".into(), "C".into()]).unwrap();
        let err = ModelAssets::new(Box::new(linear(2)), schema).unwrap_err();
        assert!(matches!(
            err,
            StartupError::FeatureCountMismatch {
                model: 2,
                schema: 3
            }
        ));
    }

    #[test]
    fn duplicate_feature_names_are_rejected() {
        let dir = tempdir().unwrap();
        let model_path = dir.path().join("revenue_model.toml");
        let features_path = dir.path().join("model_features.toml");
        linear(2).save(&model_path).unwrap();
        fs::write(&features_path, "features = [\"Cash\", \"Cash\"]\n").unwrap();

        let err = ModelAssets::load(&model_path, &features_path).unwrap_err();
        assert!(matches!(
            err,
            StartupError::InvalidFeatureList(SchemaError::DuplicateFeature(_))
        ));
    }
}
