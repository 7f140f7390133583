use ndarray::parallel::prelude::*;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

// --- Artifact layout ---
// Field names below are the keys of `revenue_model.toml`.

/// The capability the forecaster needs from a pretrained model.
///
/// Implementations must be pure with respect to their inputs: the same rows
/// always produce the same predictions, and nothing is mutated by a call.
pub trait Regressor: Send + Sync {
    /// Number of input columns the model was trained on.
    fn n_features(&self) -> usize;

    /// Predicts one value per row of `rows`, whose shape is `[n_rows, n_features]`.
    fn predict(&self, rows: ArrayView2<f64>) -> Result<Array1<f64>, ModelError>;

    /// Global per-feature influence scores, one per input column.
    fn feature_importances(&self) -> Array1<f64>;
}

/// How the outputs of individual trees are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Average of tree outputs, as in a random forest.
    Mean,
    /// Sum of tree outputs, as in gradient boosting.
    Sum,
}

/// A node of a regression tree stored in flat array form.
///
/// Rows with `x[feature] <= threshold` descend to `left`, all others to `right`.
/// Child indices must point forward in the node array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        /// Impurity decrease credited to `feature`. Defaults to one, which turns
        /// the derived importance into a split count.
        #[serde(default = "default_gain")]
        gain: f64,
    },
    Leaf {
        value: f64,
    },
}

fn default_gain() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub aggregation: Aggregation,
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<RegressionTree>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

/// The fitted estimator held by the artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    Linear(LinearModel),
    TreeEnsemble(TreeEnsemble),
}

/// A complete pretrained artifact: estimator, width and optional exported importances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    /// Free-form label shown in logs.
    #[serde(default)]
    pub name: Option<String>,
    pub n_features: usize,
    /// Importances exported at training time. When absent they are derived
    /// from the estimator itself.
    #[serde(default)]
    pub feature_importances: Option<Vec<f64>>,
    pub estimator: Estimator,
}

/// Custom error type for model loading, saving, and prediction.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write model file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML model file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize model to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Input has {found} feature columns, but the model was trained on {expected}.")]
    MismatchedFeatureCount { found: usize, expected: usize },
    #[error("The model artifact is malformed: {0}")]
    InvalidArtifact(String),
}

impl TrainedModel {
    /// Saves the model to a file in a human-readable TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Loads a model from a TOML file and checks its internal consistency.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let model: Self = toml::from_str(&toml_string)?;
        model.validate()?;
        Ok(model)
    }

    /// Structural checks that make prediction infallible apart from input shape.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.n_features == 0 {
            return Err(ModelError::InvalidArtifact(
                "n_features must be at least 1".to_string(),
            ));
        }

        if let Some(importances) = &self.feature_importances {
            if importances.len() != self.n_features {
                return Err(ModelError::InvalidArtifact(format!(
                    "{} feature importances stored for {} features",
                    importances.len(),
                    self.n_features
                )));
            }
            if importances.iter().any(|&v| !v.is_finite() || v < 0.0) {
                return Err(ModelError::InvalidArtifact(
                    "feature importances must be finite and non-negative".to_string(),
                ));
            }
        }

        match &self.estimator {
            Estimator::Linear(linear) => {
                if linear.coefficients.len() != self.n_features {
                    return Err(ModelError::InvalidArtifact(format!(
                        "{} coefficients stored for {} features",
                        linear.coefficients.len(),
                        self.n_features
                    )));
                }
            }
            Estimator::TreeEnsemble(ensemble) => {
                if ensemble.trees.is_empty() {
                    return Err(ModelError::InvalidArtifact(
                        "tree ensemble contains no trees".to_string(),
                    ));
                }
                for (tree_idx, tree) in ensemble.trees.iter().enumerate() {
                    internal::validate_tree(tree, self.n_features)
                        .map_err(|msg| ModelError::InvalidArtifact(format!("tree {tree_idx}: {msg}")))?;
                }
            }
        }

        Ok(())
    }
}

impl Regressor for TrainedModel {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, rows: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        if rows.ncols() != self.n_features {
            return Err(ModelError::MismatchedFeatureCount {
                found: rows.ncols(),
                expected: self.n_features,
            });
        }

        let predictions = match &self.estimator {
            Estimator::Linear(linear) => {
                let coefficients = ArrayView1::from(linear.coefficients.as_slice());
                rows.dot(&coefficients) + linear.intercept
            }
            Estimator::TreeEnsemble(ensemble) => {
                let values: Vec<f64> = rows
                    .axis_iter(Axis(0))
                    .into_par_iter()
                    .map(|row| internal::predict_ensemble_row(ensemble, row))
                    .collect();
                Array1::from_vec(values)
            }
        };

        Ok(predictions)
    }

    fn feature_importances(&self) -> Array1<f64> {
        if let Some(stored) = &self.feature_importances {
            return Array1::from_vec(stored.clone());
        }

        let raw = match &self.estimator {
            Estimator::Linear(linear) => linear.coefficients.iter().map(|c| c.abs()).collect(),
            Estimator::TreeEnsemble(ensemble) => {
                internal::ensemble_gain_importances(ensemble, self.n_features)
            }
        };
        internal::normalize(raw)
    }
}

/// Internal module for prediction-specific implementation details.
mod internal {
    use super::*;

    pub(super) fn validate_tree(tree: &RegressionTree, n_features: usize) -> Result<(), String> {
        if tree.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in tree.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                threshold,
                left,
                right,
                gain,
            } = node
            {
                if *feature >= n_features {
                    return Err(format!(
                        "node {idx} splits on feature {feature}, but only {n_features} exist"
                    ));
                }
                if !threshold.is_finite() || !gain.is_finite() || *gain < 0.0 {
                    return Err(format!("node {idx} has a non-finite threshold or gain"));
                }
                // Forward-only children rule out cycles, so traversal terminates.
                for child in [*left, *right] {
                    if child <= idx || child >= tree.nodes.len() {
                        return Err(format!("node {idx} has out-of-order child {child}"));
                    }
                }
            }
        }
        Ok(())
    }

    pub(super) fn predict_tree(tree: &RegressionTree, row: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &tree.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub(super) fn predict_ensemble_row(ensemble: &TreeEnsemble, row: ArrayView1<f64>) -> f64 {
        let total: f64 = ensemble
            .trees
            .iter()
            .map(|tree| predict_tree(tree, row))
            .sum();
        let combined = match ensemble.aggregation {
            Aggregation::Mean => total / ensemble.trees.len() as f64,
            Aggregation::Sum => total,
        };
        ensemble.base_score + combined
    }

    /// Per-tree normalized gain, averaged over trees.
    pub(super) fn ensemble_gain_importances(ensemble: &TreeEnsemble, n_features: usize) -> Vec<f64> {
        let mut totals = vec![0.0; n_features];
        for tree in &ensemble.trees {
            let mut per_tree = vec![0.0; n_features];
            for node in &tree.nodes {
                if let TreeNode::Split { feature, gain, .. } = node {
                    per_tree[*feature] += *gain;
                }
            }
            for (total, value) in totals.iter_mut().zip(normalize(per_tree)) {
                *total += value;
            }
        }
        totals
    }

    /// Scales to unit sum. An all-zero vector stays all zero.
    pub(super) fn normalize(raw: Vec<f64>) -> Array1<f64> {
        let sum: f64 = raw.iter().sum();
        let values = Array1::from_vec(raw);
        if sum > 0.0 { values / sum } else { values }
    }
}
