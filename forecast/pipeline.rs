//! The two forecasting flows, single record and batch. Both run
//! binding, then inference, then formatting, synchronously and in that order.

use crate::assets::ModelAssets;
use crate::config::ForecastConfig;
use crate::data::{self, DataError};
use crate::format::{self, GaugeRange};
use crate::inference::{self, FeatureImportance, InferenceError};
use crate::schema::{FormError, FormInput};
use polars::prelude::DataFrame;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures of a single request. None of them affect the loaded assets.
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error(transparent)]
    Form(#[from] FormError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Everything the single-record view displays.
#[derive(Debug, Clone, Serialize)]
pub struct SingleForecast {
    pub inputs: FormInput,
    pub prediction: f64,
    pub formatted: String,
    pub gauge: GaugeRange,
    /// Global ranking from the model, not an explanation of this record.
    pub top_features: Vec<FeatureImportance>,
}

/// Outcome of a batch run.
#[derive(Debug)]
pub struct BatchForecast {
    /// The uploaded table with the prediction column appended.
    pub table: DataFrame,
    pub output_path: PathBuf,
}

/// Forecasts one company from the form fields. Features the form does not
/// expose are bound to zero.
pub fn forecast_single(
    assets: &ModelAssets,
    form: &FormInput,
    config: &ForecastConfig,
) -> Result<SingleForecast, ForecastError> {
    let record = form.to_record(assets.schema())?;
    let prediction = inference::predict_one(assets.model(), record.view())?;
    log::info!("Single-record forecast: {prediction}");

    Ok(SingleForecast {
        inputs: *form,
        prediction,
        formatted: format::format_currency(prediction),
        gauge: config.gauge.range(prediction),
        top_features: importance_ranking(assets, config.top_k)?,
    })
}

/// The `k` most influential model features.
pub fn importance_ranking(
    assets: &ModelAssets,
    k: usize,
) -> Result<Vec<FeatureImportance>, InferenceError> {
    let all = inference::importances(assets.model(), assets.schema())?;
    Ok(format::top_k(&all, k))
}

/// Binds an in-memory table, predicts every row in one call, and returns the
/// table with predictions appended. Nothing is predicted if binding fails.
pub fn forecast_table(assets: &ModelAssets, table: DataFrame) -> Result<DataFrame, ForecastError> {
    let bound = data::bind_table(assets.schema(), table)?;
    log::info!("Forecasting {} rows", bound.num_rows());
    let predictions = inference::predict(assets.model(), bound.features.view())?;
    Ok(bound.with_predictions(&predictions)?)
}

/// Reads `input`, forecasts every row and writes the result to `output`.
pub fn forecast_batch_file(
    assets: &ModelAssets,
    input: &Path,
    output: &Path,
) -> Result<BatchForecast, ForecastError> {
    let table = data::load_batch_table(input)?;
    let mut table = forecast_table(assets, table)?;
    data::write_batch_table(&mut table, output)?;
    Ok(BatchForecast {
        table,
        output_path: output.to_path_buf(),
    })
}
