//! Labeled Dataset
//!
//! In-memory feature matrix with integer class labels, CSV persistence, and
//! the row selection used for minibatching.

use ndarray::{Array2, Axis};
use thiserror::Error;

/// Errors that can occur while loading or assembling datasets
#[derive(Error, Debug)]
pub enum DataError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("dataset is empty")]
    Empty,

    #[error("rows need at least one feature column plus a label column")]
    TooFewColumns,

    #[error("row {row}: expected {expected} columns, got {got}")]
    InconsistentRow {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("row {row}, column {col}: invalid value {value:?}")]
    InvalidValue {
        row: usize,
        col: usize,
        value: String,
    },

    #[error("{rows} feature rows but {labels} labels")]
    LengthMismatch { rows: usize, labels: usize },
}

/// Feature rows with one class label per row
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Feature matrix, shape (samples, features)
    pub features: Array2<f64>,
    /// Class label per row
    pub labels: Vec<usize>,
}

impl Dataset {
    pub fn new(features: Array2<f64>, labels: Vec<usize>) -> Result<Self, DataError> {
        if features.nrows() != labels.len() {
            return Err(DataError::LengthMismatch {
                rows: features.nrows(),
                labels: labels.len(),
            });
        }
        if features.nrows() == 0 {
            return Err(DataError::Empty);
        }

        Ok(Self { features, labels })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of feature columns.
    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Number of classes, taken as the largest label plus one.
    pub fn n_classes(&self) -> usize {
        self.labels.iter().max().map_or(0, |&m| m + 1)
    }

    /// Load from CSV: feature columns followed by one integer label column.
    /// The first line is treated as a header.
    pub fn from_csv(path: &str) -> Result<Self, DataError> {
        let mut reader = csv::Reader::from_path(path)?;

        let mut values = Vec::new();
        let mut labels = Vec::new();
        let mut n_columns = None;

        for (row, result) in reader.records().enumerate() {
            let record = result?;
            let width = record.len();

            if width < 2 {
                return Err(DataError::TooFewColumns);
            }
            let expected = *n_columns.get_or_insert(width);
            if width != expected {
                return Err(DataError::InconsistentRow {
                    row,
                    expected,
                    got: width,
                });
            }

            for col in 0..width - 1 {
                let value: f64 = record[col].trim().parse().map_err(|_| {
                    DataError::InvalidValue {
                        row,
                        col,
                        value: record[col].to_string(),
                    }
                })?;
                values.push(value);
            }

            let label_col = width - 1;
            let label: usize = record[label_col].trim().parse().map_err(|_| {
                DataError::InvalidValue {
                    row,
                    col: label_col,
                    value: record[label_col].to_string(),
                }
            })?;
            labels.push(label);
        }

        let n_features = n_columns.ok_or(DataError::Empty)? - 1;
        let features = Array2::from_shape_vec((labels.len(), n_features), values)?;

        Self::new(features, labels)
    }

    /// Save as CSV with a generated header.
    pub fn to_csv(&self, path: &str) -> Result<(), DataError> {
        let mut writer = csv::Writer::from_path(path)?;

        let mut header: Vec<String> = (0..self.n_features()).map(|j| format!("f{}", j)).collect();
        header.push("label".to_string());
        writer.write_record(&header)?;

        for (row, &label) in self.features.outer_iter().zip(self.labels.iter()) {
            let mut record: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            record.push(label.to_string());
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Deterministic split: the first `fraction` of rows become the training
    /// set, the remainder the validation set.
    pub fn split(&self, fraction: f64) -> (Dataset, Dataset) {
        let cut = ((self.len() as f64 * fraction) as usize)
            .max(1)
            .min(self.len().saturating_sub(1).max(1));

        let head = Dataset {
            features: self.features.slice(ndarray::s![..cut, ..]).to_owned(),
            labels: self.labels[..cut].to_vec(),
        };
        let tail = Dataset {
            features: self.features.slice(ndarray::s![cut.., ..]).to_owned(),
            labels: self.labels[cut..].to_vec(),
        };

        (head, tail)
    }

    /// Select the given rows as a minibatch.
    pub fn batch(&self, indices: &[usize]) -> (Array2<f64>, Vec<usize>) {
        let features = self.features.select(Axis(0), indices);
        let labels = indices.iter().map(|&i| self.labels[i]).collect();
        (features, labels)
    }
}
