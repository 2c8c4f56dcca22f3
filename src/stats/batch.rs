//! Batch Activation Statistics
//!
//! Computes the sample covariance and Pearson correlation matrices between
//! hidden units across a minibatch of activations. Rows are observations,
//! columns are units.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard deviations at or below this threshold are treated as zero.
pub(crate) const STD_EPS: f64 = 1e-10;

/// Errors that can occur when computing batch statistics
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("invalid activation matrix shape {rows}x{cols}: need at least 2 rows and 1 column")]
    InvalidShape { rows: usize, cols: usize },

    #[error("unit {unit} has zero variance, correlation is undefined")]
    DegenerateUnit { unit: usize },
}

/// Behavior when correlation is requested and a unit has zero variance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DegeneratePolicy {
    /// Fail with [`StatsError::DegenerateUnit`].
    #[default]
    Fail,
    /// Substitute 0.0 for every correlation entry involving the degenerate
    /// unit, including its diagonal entry.
    Zero,
}

/// Options for [`ActivationStats::compute`]
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsOptions {
    /// Also compute the correlation matrix.
    pub correlation: bool,
    /// Zero-variance handling when correlation is requested.
    pub degenerate: DegeneratePolicy,
}

impl StatsOptions {
    /// Covariance only.
    pub fn covariance_only() -> Self {
        Self::default()
    }

    /// Covariance plus correlation, failing on zero-variance units.
    pub fn with_correlation() -> Self {
        Self {
            correlation: true,
            degenerate: DegeneratePolicy::Fail,
        }
    }

    /// Set the zero-variance policy.
    pub fn degenerate(mut self, policy: DegeneratePolicy) -> Self {
        self.degenerate = policy;
        self
    }
}

/// Statistics of one batch of activations
#[derive(Debug, Clone)]
pub struct ActivationStats {
    /// Number of observations the batch contained.
    pub n_observations: usize,
    /// Per-unit mean activation.
    pub mean: Array1<f64>,
    /// Unbiased sample covariance between units (divisor t - 1).
    pub covariance: Array2<f64>,
    /// Per-unit standard deviation, sqrt of the covariance diagonal.
    pub std_dev: Array1<f64>,
    /// Pearson correlation between units, if requested.
    pub correlation: Option<Array2<f64>>,
}

impl ActivationStats {
    /// Compute batch statistics for an activation matrix.
    ///
    /// # Arguments
    ///
    /// * `activations` - Batch of activations, shape (observations, units)
    /// * `options` - Which statistics to produce and the degeneracy policy
    pub fn compute(
        activations: &Array2<f64>,
        options: &StatsOptions,
    ) -> Result<Self, StatsError> {
        validate_shape(activations)?;

        let t = activations.nrows();
        let mean = column_means(activations);
        let covariance = covariance_of_centered(&center(activations, &mean), t);
        let std_dev = covariance.diag().mapv(f64::sqrt);

        let correlation = if options.correlation {
            Some(correlation_from_covariance(&covariance, options.degenerate)?)
        } else {
            None
        };

        Ok(Self {
            n_observations: t,
            mean,
            covariance,
            std_dev,
            correlation,
        })
    }

    /// Sum of squared off-diagonal covariance entries.
    pub fn off_diagonal_covariance_sq(&self) -> f64 {
        off_diagonal_sq_sum(&self.covariance)
    }

    /// Sum of squared off-diagonal correlation entries, if correlation was
    /// computed.
    pub fn off_diagonal_correlation_sq(&self) -> Option<f64> {
        self.correlation.as_ref().map(off_diagonal_sq_sum)
    }
}

/// Per-column arithmetic means of an activation matrix.
pub fn column_means(activations: &Array2<f64>) -> Array1<f64> {
    activations.sum_axis(Axis(0)) / activations.nrows() as f64
}

/// Unbiased sample covariance matrix between the columns of `activations`.
///
/// Uses the two-pass method: center on the column means first, then
/// accumulate cross products, which avoids the cancellation of the
/// sum-of-products form.
pub fn covariance(activations: &Array2<f64>) -> Result<Array2<f64>, StatsError> {
    validate_shape(activations)?;
    let mean = column_means(activations);
    Ok(covariance_of_centered(
        &center(activations, &mean),
        activations.nrows(),
    ))
}

/// Pearson correlation matrix between the columns of `activations`.
pub fn correlation(
    activations: &Array2<f64>,
    policy: DegeneratePolicy,
) -> Result<Array2<f64>, StatsError> {
    let cov = covariance(activations)?;
    correlation_from_covariance(&cov, policy)
}

/// Normalize a covariance matrix into a correlation matrix.
///
/// Diagonal entries of units with nonzero variance are exactly 1. Entries
/// involving a zero-variance unit follow `policy`.
pub fn correlation_from_covariance(
    cov: &Array2<f64>,
    policy: DegeneratePolicy,
) -> Result<Array2<f64>, StatsError> {
    let d = cov.nrows();
    let std_devs: Vec<f64> = (0..d).map(|j| cov[[j, j]].max(0.0).sqrt()).collect();

    if policy == DegeneratePolicy::Fail {
        if let Some(unit) = std_devs.iter().position(|&s| s <= STD_EPS) {
            return Err(StatsError::DegenerateUnit { unit });
        }
    }

    let mut corr = Array2::zeros((d, d));
    for j in 0..d {
        for k in 0..d {
            if std_devs[j] <= STD_EPS || std_devs[k] <= STD_EPS {
                continue;
            }
            corr[[j, k]] = if j == k {
                1.0
            } else {
                cov[[j, k]] / (std_devs[j] * std_devs[k])
            };
        }
    }

    Ok(corr)
}

pub(crate) fn validate_shape(activations: &Array2<f64>) -> Result<(), StatsError> {
    let (rows, cols) = activations.dim();
    if rows < 2 || cols < 1 {
        return Err(StatsError::InvalidShape { rows, cols });
    }
    Ok(())
}

pub(crate) fn center(activations: &Array2<f64>, mean: &Array1<f64>) -> Array2<f64> {
    activations - mean
}

pub(crate) fn covariance_of_centered(centered: &Array2<f64>, t: usize) -> Array2<f64> {
    centered.t().dot(centered) / (t - 1) as f64
}

pub(crate) fn off_diagonal_sq_sum(matrix: &Array2<f64>) -> f64 {
    let squared = matrix.mapv(|v| v * v);
    squared.sum() - squared.diag().sum()
}
