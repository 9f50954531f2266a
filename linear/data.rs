//! # Fingerprint table loading
//!
//! Reads tab-separated fingerprint tables into `ndarray` structures. A table
//! has a header row, one target column (log CMC), an optional identifier
//! column, and one column per subgraph holding its occurrence count in each
//! molecule. The subgraph columns keep their file order, and their headers
//! become the feature identifiers of the catalog.
//!
//! Failures are assumed to be input errors and are reported with the column
//! they concern.

use crate::config::DataConfig;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One split of fingerprints with their targets.
#[derive(Debug, Clone)]
pub struct FingerprintData {
    /// Molecule identifiers, from the id column or 1-based row numbers.
    pub ids: Vec<String>,
    /// Subgraph identifiers in column order.
    pub feature_ids: Vec<String>,
    /// Shape: [n_molecules, n_subgraphs].
    pub fingerprints: Array2<f64>,
    pub targets: Array1<f64>,
}

impl FingerprintData {
    pub fn n_molecules(&self) -> usize {
        self.fingerprints.nrows()
    }
}

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("Failed to open '{path}': {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "Column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error("Missing or null values were found in column '{0}'.")]
    MissingValuesFound(String),
    #[error("Non-finite values (NaN or Infinity) were found in column '{0}'.")]
    NonFiniteValuesFound(String),
    #[error("Subgraph column '{column_name}' has negative count {value} at row {row}.")]
    NegativeCount {
        column_name: String,
        value: f64,
        row: usize,
    },
    #[error("Input file contains {found} data rows, but at least {required} are required.")]
    InsufficientRows { found: usize, required: usize },
    #[error("Input file has no subgraph columns besides '{0}'.")]
    NoFeatures(String),
    #[error(
        "Training and test tables have different subgraph columns (first difference at position {position}: '{train}' vs '{test}')."
    )]
    FeatureMismatch {
        position: usize,
        train: String,
        test: String,
    },
}

const MINIMUM_ROWS: usize = 1;

/// Loads one fingerprint table.
pub fn load_fingerprints(path: &Path, columns: &DataConfig) -> Result<FingerprintData, DataError> {
    log::info!("Loading fingerprints from '{}'", path.display());
    let file = File::open(path).map_err(|source| DataError::IoError {
        path: path.to_path_buf(),
        source,
    })?;
    let df = CsvReader::new(file)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
        )
        .finish()?;

    if df.height() < MINIMUM_ROWS {
        return Err(DataError::InsufficientRows {
            found: df.height(),
            required: MINIMUM_ROWS,
        });
    }

    let names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();
    if !names.contains(&columns.target_column) {
        return Err(DataError::ColumnNotFound(columns.target_column.clone()));
    }
    let has_ids = names.contains(&columns.id_column);
    let feature_ids: Vec<String> = names
        .into_iter()
        .filter(|name| *name != columns.target_column && *name != columns.id_column)
        .collect();
    if feature_ids.is_empty() {
        return Err(DataError::NoFeatures(columns.target_column.clone()));
    }

    let n = df.height();
    let targets = Array1::from_vec(numeric_column(&df, &columns.target_column)?);

    let mut fingerprints = Array2::zeros((n, feature_ids.len()));
    for (j, name) in feature_ids.iter().enumerate() {
        let values = numeric_column(&df, name)?;
        if let Some((row, &value)) = values.iter().enumerate().find(|(_, v)| **v < 0.0) {
            return Err(DataError::NegativeCount {
                column_name: name.clone(),
                value,
                row: row + 1,
            });
        }
        fingerprints.column_mut(j).assign(&Array1::from_vec(values));
    }

    let ids = if has_ids {
        id_column(&df, &columns.id_column)?
    } else {
        (1..=n).map(|i| i.to_string()).collect()
    };

    log::info!(
        "Loaded {} molecules with {} subgraph columns.",
        n,
        feature_ids.len()
    );
    Ok(FingerprintData {
        ids,
        feature_ids,
        fingerprints,
        targets,
    })
}

/// Checks that two tables share the same subgraph columns in the same order.
pub fn ensure_same_features(train: &FingerprintData, test: &FingerprintData) -> Result<(), DataError> {
    let longest = train.feature_ids.len().max(test.feature_ids.len());
    for position in 0..longest {
        let left = train.feature_ids.get(position);
        let right = test.feature_ids.get(position);
        if left != right {
            return Err(DataError::FeatureMismatch {
                position,
                train: left.cloned().unwrap_or_default(),
                test: right.cloned().unwrap_or_default(),
            });
        }
    }
    Ok(())
}

fn numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
    let column = df.column(column_name)?;
    if column.null_count() > 0 {
        return Err(DataError::MissingValuesFound(column_name.to_string()));
    }

    let wrong_type = || DataError::ColumnWrongType {
        column_name: column_name.to_string(),
        expected_type: "f64 (numeric)",
        found_type: format!("{:?}", column.dtype()),
    };
    let casted = column.cast(&DataType::Float64).map_err(|_| wrong_type())?;
    if casted.null_count() > 0 {
        return Err(wrong_type());
    }

    let values: Vec<f64> = casted.f64()?.rechunk().into_no_null_iter().collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
    }
    Ok(values)
}

/// Identifiers as text; blank or null cells fall back to the row number.
fn id_column(df: &DataFrame, column_name: &str) -> Result<Vec<String>, DataError> {
    let casted = df.column(column_name)?.cast(&DataType::String)?;
    let ids = casted
        .str()?
        .into_iter()
        .enumerate()
        .map(|(i, value)| match value {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => (i + 1).to_string(),
        })
        .collect();
    Ok(ids)
}
