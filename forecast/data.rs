//! # Batch Table Loading and Binding
//!
//! Entry point for uploaded company tables. A batch file is a comma-separated
//! table whose header must contain every model feature by exact,
//! case-sensitive name. Any other columns ride along untouched and reappear in
//! the output next to the prediction.
//!
//! - Missing features are a hard error. Zero-filling a whole column would
//!   quietly skew every row's forecast.
//! - Feature columns must be numeric, complete and finite.
//! - Row order is never changed between input and output.

use crate::schema::FeatureSchema;
use itertools::Itertools;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Name of the column appended to batch output.
pub const PREDICTION_COLUMN: &str = "Revenue_Prediction";

/// How many missing column names an error message spells out.
const MISSING_PREVIEW_LEN: usize = 5;

/// A comprehensive error type for all batch loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Missing required columns: {}", preview_missing(.missing))]
    SchemaMismatch { missing: Vec<String> },
    #[error(
        "The required column '{column_name}' could not be converted to the expected type '{expected_type}'. It contains non-numeric data. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in the required column '{0}'. Every row needs a value for every model feature."
    )]
    MissingValuesFound(String),
    #[error(
        "Non-finite values (NaN or Infinity) were found in the required column '{0}'. All feature values must be finite."
    )]
    NonFiniteValuesFound(String),
    #[error("The uploaded table contains a header but no data rows.")]
    NoRows,
    #[error("Received {predictions} predictions for a table of {rows} rows.")]
    PredictionCountMismatch { rows: usize, predictions: usize },
}

fn preview_missing(missing: &[String]) -> String {
    let shown = missing.iter().take(MISSING_PREVIEW_LEN).join(", ");
    if missing.len() > MISSING_PREVIEW_LEN {
        format!("{shown}...")
    } else {
        shown
    }
}

/// An uploaded table whose feature columns have been validated and extracted.
#[derive(Debug)]
pub struct BoundTable {
    /// The table exactly as uploaded, every column retained.
    pub frame: DataFrame,
    /// The model's feature columns in schema order. Shape: `[n_rows, n_features]`.
    pub features: Array2<f64>,
}

impl BoundTable {
    pub fn num_rows(&self) -> usize {
        self.features.nrows()
    }

    /// Appends `predictions` as the [`PREDICTION_COLUMN`] and returns the
    /// finished table. An existing column of that name is replaced.
    pub fn with_predictions(self, predictions: &Array1<f64>) -> Result<DataFrame, DataError> {
        if predictions.len() != self.num_rows() {
            return Err(DataError::PredictionCountMismatch {
                rows: self.num_rows(),
                predictions: predictions.len(),
            });
        }

        let mut frame = self.frame;
        let column = Series::new(PREDICTION_COLUMN.into(), predictions.to_vec());
        frame.with_column(column)?;
        Ok(frame)
    }
}

/// Reads a comma-separated batch file with a header row.
pub fn load_batch_table(path: &Path) -> Result<DataFrame, DataError> {
    log::info!("Loading batch table from '{}'", path.display());

    // Column types are inferred from every row, so a late decimal or text
    // value widens the column instead of failing the read.
    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(None),
        )
        .finish()?;

    log::info!(
        "Loaded {} rows and {} columns",
        df.height(),
        df.width()
    );
    Ok(df)
}

/// Validates `table` against `schema` and extracts the feature matrix.
///
/// Every schema feature absent from the table's header is reported in a single
/// [`DataError::SchemaMismatch`], in schema order.
pub fn bind_table(schema: &FeatureSchema, table: DataFrame) -> Result<BoundTable, DataError> {
    let columns_set: HashSet<String> = table
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    let missing: Vec<String> = schema
        .names()
        .iter()
        .filter(|name| !columns_set.contains(name.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        log::warn!("Uploaded table is missing {} model features", missing.len());
        return Err(DataError::SchemaMismatch { missing });
    }

    if table.height() == 0 {
        return Err(DataError::NoRows);
    }

    let extra = columns_set.len() - schema.len();
    if extra > 0 {
        log::debug!("{extra} columns are not model features and will be passed through");
    }

    let columns: Vec<Vec<f64>> = schema
        .names()
        .par_iter()
        .map(|name| internal::extract_numeric_column(&table, name))
        .collect::<Result<_, _>>()?;

    let mut features = Array2::zeros((table.height(), schema.len()));
    for (position, values) in columns.into_iter().enumerate() {
        features
            .column_mut(position)
            .assign(&Array1::from_vec(values));
    }

    Ok(BoundTable {
        frame: table,
        features,
    })
}

/// Writes `table` as UTF-8 comma-separated text with a header row.
///
/// The text goes to a temporary file next to `path` that is renamed over it
/// once complete. A failed write leaves any previous file at `path` as it was.
pub fn write_batch_table(table: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut staged = NamedTempFile::new_in(dir)?;
    CsvWriter::new(&mut staged)
        .include_header(true)
        .with_separator(b',')
        .finish(table)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;

    log::info!("Wrote {} rows to '{}'", table.height(), path.display());
    Ok(())
}

mod internal {
    use super::*;

    pub(super) fn extract_numeric_column(
        df: &DataFrame,
        column_name: &str,
    ) -> Result<Vec<f64>, DataError> {
        let series = df.column(column_name)?;
        if series.null_count() > 0 {
            return Err(DataError::MissingValuesFound(column_name.to_string()));
        }

        let casted = match series.cast(&DataType::Float64) {
            Ok(casted) => casted,
            Err(_) => {
                return Err(DataError::ColumnWrongType {
                    column_name: column_name.to_string(),
                    expected_type: "f64 (numeric)",
                    found_type: format!("{:?}", series.dtype()),
                });
            }
        };

        // A lossy cast turns unparseable text into nulls.
        if casted.null_count() > 0 {
            return Err(DataError::ColumnWrongType {
                column_name: column_name.to_string(),
                expected_type: "f64 (numeric)",
                found_type: format!("{:?}", series.dtype()),
            });
        }

        let values: Vec<f64> = casted.f64()?.into_no_null_iter().collect();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
        }
        Ok(values)
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::io::{self, Write};
    use tempfile::tempdir;

    fn create_test_csv(content: &str) -> io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "{}", content)?;
        file.flush()?;
        Ok(file)
    }

    fn schema(names: &[&str]) -> FeatureSchema {
        FeatureSchema::new(names.iter().map(|n| n.to_string()).collect()).unwrap()
    }

    #[test]
    fn bind_table_reorders_features_and_keeps_row_order() {
        let table = df!(
            "company" => ["acme", "globex", "initech"],
            "B" => [10.0, 20.0, 30.0],
            "A" => [1.0, 2.0, 3.0],
        )
        .unwrap();

        let bound = bind_table(&schema(&["A", "B"]), table).unwrap();
        assert_eq!(bound.features, array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]]);
        assert_eq!(bound.frame.width(), 3);
    }

    #[test]
    fn bind_table_reports_every_missing_feature_in_schema_order() {
        let table = df!("A" => [1.0], "other" => [2.0]).unwrap();
        let err = bind_table(&schema(&["C", "A", "B"]), table).unwrap_err();
        match err {
            DataError::SchemaMismatch { missing } => {
                assert_eq!(missing, vec!["C".to_string(), "B".to_string()]);
            }
            other => panic!("Expected SchemaMismatch, got {other:?}"),
        }
    }

    #[test]
    fn missing_column_match_is_case_sensitive() {
        let table = df!("cash" => [1.0]).unwrap();
        let err = bind_table(&schema(&["Cash"]), table).unwrap_err();
        assert!(matches!(err, DataError::SchemaMismatch { .. }));
    }

    #[test]
    fn schema_mismatch_message_previews_five_names() {
        let missing: Vec<String> = (1..=7).map(|i| format!("F{i}")).collect();
        let err = DataError::SchemaMismatch { missing };
        assert_eq!(
            err.to_string(),
            "Missing required columns: F1, F2, F3, F4, F5..."
        );

        let err = DataError::SchemaMismatch {
            missing: vec!["B".to_string()],
        };
        assert_eq!(err.to_string(), "Missing required columns: B");
    }

    #[test]
    fn integer_columns_are_accepted_as_numeric() {
        let table = df!("A" => [1i64, 2, 3]).unwrap();
        let bound = bind_table(&schema(&["A"]), table).unwrap();
        assert_eq!(bound.features.column(0).to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn with_predictions_appends_column_in_row_order() {
        let table = df!(
            "id" => ["r1", "r2", "r3"],
            "A" => [1.0, 2.0, 3.0],
        )
        .unwrap();
        let bound = bind_table(&schema(&["A"]), table).unwrap();
        let out = bound
            .with_predictions(&array![10.0, 20.0, 30.0])
            .unwrap();

        assert_eq!(out.width(), 3);
        let names: Vec<String> = out
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(names, vec!["id", "A", PREDICTION_COLUMN]);

        let preds: Vec<f64> = out
            .column(PREDICTION_COLUMN)
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(preds, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn with_predictions_rejects_count_mismatch() {
        let table = df!("A" => [1.0, 2.0]).unwrap();
        let bound = bind_table(&schema(&["A"]), table).unwrap();
        let err = bound.with_predictions(&array![1.0]).unwrap_err();
        assert!(matches!(
            err,
            DataError::PredictionCountMismatch {
                rows: 2,
                predictions: 1
            }
        ));
    }

    #[test]
    fn csv_file_with_text_in_feature_column_is_rejected() {
        let file = create_test_csv("A,B\n1.0,2.0\n3.0,not_a_number").unwrap();
        let table = load_batch_table(file.path()).unwrap();
        match bind_table(&schema(&["A", "B"]), table) {
            Err(DataError::ColumnWrongType {
                column_name,
                expected_type,
                found_type,
            }) => {
                assert_eq!(column_name, "B");
                assert_eq!(expected_type, "f64 (numeric)");
                assert!(
                    found_type.contains("String") || found_type.contains("text"),
                    "Expected found_type to indicate String or text, got {found_type}"
                );
            }
            other => panic!("Expected ColumnWrongType for 'B', got {other:?}"),
        }
    }

    #[test]
    fn csv_file_with_empty_cell_is_rejected() {
        let file = create_test_csv("A,B\n1.0,2.0\n3.0,").unwrap();
        let table = load_batch_table(file.path()).unwrap();
        match bind_table(&schema(&["A", "B"]), table) {
            Err(DataError::MissingValuesFound(col)) => assert_eq!(col, "B"),
            other => panic!("Expected MissingValuesFound(B), got {other:?}"),
        }
    }

    #[test]
    fn csv_file_with_nan_is_rejected() {
        let file = create_test_csv("A,B\n1.0,NaN\n3.0,4.0").unwrap();
        let table = load_batch_table(file.path()).unwrap();
        match bind_table(&schema(&["A", "B"]), table) {
            Err(DataError::NonFiniteValuesFound(col)) => assert_eq!(col, "B"),
            other => panic!("Expected NonFiniteValuesFound(B), got {other:?}"),
        }
    }

    #[test]
    fn header_only_csv_has_no_rows() {
        let file = create_test_csv("A,B").unwrap();
        let table = load_batch_table(file.path()).unwrap();
        assert!(matches!(
            bind_table(&schema(&["A", "B"]), table),
            Err(DataError::NoRows)
        ));
    }

    #[test]
    fn written_csv_round_trips_through_loader() {
        let table = df!("name" => ["x", "y"], "A" => [1.5, 2.5]).unwrap();
        let bound = bind_table(&schema(&["A"]), table).unwrap();
        let mut out = bound.with_predictions(&array![100.25, 200.5]).unwrap();

        let file = NamedTempFile::new().unwrap();
        write_batch_table(&mut out, file.path()).unwrap();

        let reloaded = load_batch_table(file.path()).unwrap();
        let preds: Vec<f64> = reloaded
            .column(PREDICTION_COLUMN)
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_abs_diff_eq!(preds[0], 100.25, epsilon = 1e-9);
        assert_abs_diff_eq!(preds[1], 200.5, epsilon = 1e-9);
        assert_eq!(reloaded.width(), 3);
    }

    #[test]
    fn late_decimal_beyond_the_first_hundred_rows_is_read() {
        let mut content = String::from("ticker,Cash");
        for i in 0..150 {
            content.push_str(&format!("\nT{i},{i}"));
        }
        content.push_str("\nLAST,12.5");
        let file = create_test_csv(&content).unwrap();

        let table = load_batch_table(file.path()).unwrap();
        assert_eq!(table.height(), 151);
        let bound = bind_table(&schema(&["Cash"]), table).unwrap();

        let mut expected: Vec<f64> = (0..150).map(|i| i as f64).collect();
        expected.push(12.5);
        assert_eq!(bound.features.column(0).to_vec(), expected);
    }

    #[test]
    fn late_text_in_pass_through_column_is_read() {
        let mut content = String::from("code,A");
        for i in 0..150 {
            content.push_str(&format!("\n{i},1.0"));
        }
        content.push_str("\nX9,2.0");
        let file = create_test_csv(&content).unwrap();

        let table = load_batch_table(file.path()).unwrap();
        assert_eq!(table.column("code").unwrap().dtype(), &DataType::String);

        let bound = bind_table(&schema(&["A"]), table).unwrap();
        assert_eq!(bound.num_rows(), 151);
        assert_eq!(bound.features[[150, 0]], 2.0);
    }

    #[test]
    fn write_replaces_existing_output() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("forecast_results.csv");
        std::fs::write(&path, "stale,contents\n1,2\n3,4\n5,6\n").unwrap();

        let mut table = df!("A" => [1.0]).unwrap();
        write_batch_table(&mut table, &path).unwrap();

        let reloaded = load_batch_table(&path).unwrap();
        assert_eq!(reloaded.height(), 1);
        let names: Vec<String> = reloaded
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(names, vec!["A"]);
    }

    #[test]
    fn failed_write_leaves_no_partial_file_behind() {
        let dir = tempdir().unwrap();
        // A directory at the target path makes the final rename fail.
        let path = dir.path().join("forecast_results.csv");
        std::fs::create_dir(&path).unwrap();

        let mut table = df!("A" => [1.0, 2.0]).unwrap();
        assert!(write_batch_table(&mut table, &path).is_err());

        let entries: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["forecast_results.csv".to_string()]);
        assert!(path.is_dir());
    }
}
