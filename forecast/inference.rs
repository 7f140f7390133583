//! Adapter between bound feature rows and the opaque model capability.
//!
//! A call either yields exactly one finite prediction per input row, in input
//! order, or fails as a whole. There are no partial results and no retries.

use crate::model::{ModelError, Regressor};
use crate::schema::FeatureSchema;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("The model call failed: {0}")]
    Model(#[from] ModelError),
    #[error("The model returned {found} predictions for {expected} input rows.")]
    OutputCountMismatch { found: usize, expected: usize },
    #[error("The model returned a non-finite prediction for row {row}.")]
    NonFinitePrediction { row: usize },
    #[error(
        "The model reports {found} feature importances, but the feature list names {expected} features."
    )]
    ImportanceCountMismatch { found: usize, expected: usize },
    #[error("The model reported an invalid importance score for feature '{0}'.")]
    InvalidImportance(String),
}

/// One feature's global influence score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub name: String,
    pub score: f64,
}

/// Runs the model over every row of `rows` in a single call.
pub fn predict(
    model: &dyn Regressor,
    rows: ArrayView2<f64>,
) -> Result<Array1<f64>, InferenceError> {
    log::debug!(
        "Running inference on {} rows x {} features",
        rows.nrows(),
        rows.ncols()
    );

    let predictions = model.predict(rows)?;
    if predictions.len() != rows.nrows() {
        return Err(InferenceError::OutputCountMismatch {
            found: predictions.len(),
            expected: rows.nrows(),
        });
    }
    if let Some(row) = predictions.iter().position(|p| !p.is_finite()) {
        return Err(InferenceError::NonFinitePrediction { row });
    }

    Ok(predictions)
}

/// Predicts a single bound record.
pub fn predict_one(model: &dyn Regressor, record: ArrayView1<f64>) -> Result<f64, InferenceError> {
    let rows = record.insert_axis(Axis(0));
    let predictions = predict(model, rows)?;
    Ok(predictions[0])
}

/// Pairs the model's importance scores with the schema's feature names, in
/// schema order.
///
/// The scores are a property of the trained model as a whole. They do not vary
/// with the record being forecast.
pub fn importances(
    model: &dyn Regressor,
    schema: &FeatureSchema,
) -> Result<Vec<FeatureImportance>, InferenceError> {
    let scores = model.feature_importances();
    if scores.len() != schema.len() {
        return Err(InferenceError::ImportanceCountMismatch {
            found: scores.len(),
            expected: schema.len(),
        });
    }

    schema
        .names()
        .iter()
        .zip(scores.iter())
        .map(|(name, &score)| {
            if !score.is_finite() || score < 0.0 {
                return Err(InferenceError::InvalidImportance(name.clone()));
            }
            Ok(FeatureImportance {
                name: name.clone(),
                score,
            })
        })
        .collect()
}
