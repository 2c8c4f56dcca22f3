//! Decorrelation Penalties
//!
//! Penalty terms that discourage redundant hidden units by charging for the
//! squared off-diagonal entries of the batch covariance or correlation
//! matrix. Each penalty exposes its scalar value together with the analytic
//! gradient with respect to the activations, so it can be folded into
//! backpropagation.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::batch::{
    center, column_means, covariance_of_centered, off_diagonal_sq_sum, validate_shape,
    DegeneratePolicy, StatsError, STD_EPS,
};

/// Which batch statistic the penalty is charged on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PenaltyKind {
    /// Squared off-diagonal covariance entries. Sensitive to activation
    /// magnitudes.
    Covariance,
    /// Squared off-diagonal correlation entries. Scale-free.
    Correlation,
}

/// A decorrelation penalty with an associated strength
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DecorrelationPenalty {
    pub kind: PenaltyKind,
    /// Nonnegative weight multiplying the penalty in the training loss.
    pub strength: f64,
    /// Zero-variance handling for the correlation kind.
    pub degenerate: DegeneratePolicy,
}

impl DecorrelationPenalty {
    /// Covariance penalty with the given strength.
    pub fn covariance(strength: f64) -> Self {
        Self {
            kind: PenaltyKind::Covariance,
            strength,
            degenerate: DegeneratePolicy::Fail,
        }
    }

    /// Correlation penalty with the given strength.
    pub fn correlation(strength: f64) -> Self {
        Self {
            kind: PenaltyKind::Correlation,
            strength,
            degenerate: DegeneratePolicy::Fail,
        }
    }

    /// Set the zero-variance policy.
    pub fn with_degenerate(mut self, policy: DegeneratePolicy) -> Self {
        self.degenerate = policy;
        self
    }

    /// Penalty value for one batch of activations, scaled by `strength`.
    pub fn value(&self, activations: &Array2<f64>) -> Result<f64, StatsError> {
        Ok(self.value_and_grad(activations)?.0)
    }

    /// Penalty value and its gradient with respect to the activations, both
    /// scaled by `strength`.
    ///
    /// The gradient accounts for the centering step: every entry of the
    /// activation matrix moves the column mean, so the backpropagated matrix
    /// is re-centered before it is returned.
    pub fn value_and_grad(
        &self,
        activations: &Array2<f64>,
    ) -> Result<(f64, Array2<f64>), StatsError> {
        validate_shape(activations)?;

        let t = activations.nrows();
        let mean = column_means(activations);
        let centered = center(activations, &mean);
        let cov = covariance_of_centered(&centered, t);

        let (raw, grad_cov) = match self.kind {
            PenaltyKind::Covariance => covariance_objective(&cov),
            PenaltyKind::Correlation => correlation_objective(&cov, self.degenerate)?,
        };

        // d(penalty)/dC = 2/(t-1) * C * G for symmetric G = d(penalty)/dCov.
        let grad_centered = centered.dot(&grad_cov) * (2.0 / (t - 1) as f64);

        // Re-center: each activation also shifts its column mean.
        let grad_mean = grad_centered.sum_axis(Axis(0)) / t as f64;
        let grad = grad_centered - &grad_mean;

        Ok((self.strength * raw, grad * self.strength))
    }
}

fn covariance_objective(cov: &Array2<f64>) -> (f64, Array2<f64>) {
    let raw = off_diagonal_sq_sum(cov);

    let mut grad = cov * 2.0;
    grad.diag_mut().fill(0.0);

    (raw, grad)
}

fn correlation_objective(
    cov: &Array2<f64>,
    policy: DegeneratePolicy,
) -> Result<(f64, Array2<f64>), StatsError> {
    let d = cov.nrows();
    let std_devs: Array1<f64> = cov.diag().mapv(|v| v.max(0.0).sqrt());

    if policy == DegeneratePolicy::Fail {
        if let Some(unit) = std_devs.iter().position(|&s| s <= STD_EPS) {
            return Err(StatsError::DegenerateUnit { unit });
        }
    }

    let mut raw = 0.0;
    let mut grad = Array2::zeros((d, d));

    for j in 0..d {
        if std_devs[j] <= STD_EPS {
            continue;
        }
        let mut row_sq_sum = 0.0;
        for k in 0..d {
            if k == j || std_devs[k] <= STD_EPS {
                continue;
            }
            let rho = cov[[j, k]] / (std_devs[j] * std_devs[k]);
            raw += rho * rho;
            row_sq_sum += rho * rho;
            grad[[j, k]] = 2.0 * rho / (std_devs[j] * std_devs[k]);
        }
        grad[[j, j]] = -2.0 * row_sq_sum / cov[[j, j]];
    }

    Ok((raw, grad))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn sample_activations() -> Array2<f64> {
        array![
            [0.2, -1.1, 0.7],
            [1.3, 0.4, -0.2],
            [-0.5, 0.9, 1.8],
            [0.8, -0.3, 0.1],
            [2.1, 1.2, -0.9],
        ]
    }

    fn numeric_gradient(
        penalty: &DecorrelationPenalty,
        activations: &Array2<f64>,
    ) -> Array2<f64> {
        let h = 1e-6;
        let mut grad = Array2::zeros(activations.dim());

        for i in 0..activations.nrows() {
            for j in 0..activations.ncols() {
                let mut plus = activations.clone();
                plus[[i, j]] += h;
                let mut minus = activations.clone();
                minus[[i, j]] -= h;

                grad[[i, j]] =
                    (penalty.value(&plus).unwrap() - penalty.value(&minus).unwrap()) / (2.0 * h);
            }
        }

        grad
    }

    #[test]
    fn test_covariance_penalty_value() {
        // Second column doubles the first: cov = [[1, 2], [2, 4]].
        let a = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0]];
        let penalty = DecorrelationPenalty::covariance(1.0);
        assert_relative_eq!(penalty.value(&a).unwrap(), 8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_correlation_penalty_value() {
        let a = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0]];
        let penalty = DecorrelationPenalty::correlation(1.0);
        assert_relative_eq!(penalty.value(&a).unwrap(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_strength_scales_value_and_grad() {
        let a = sample_activations();
        let unit = DecorrelationPenalty::covariance(1.0);
        let scaled = DecorrelationPenalty::covariance(0.25);

        let (v1, g1) = unit.value_and_grad(&a).unwrap();
        let (v2, g2) = scaled.value_and_grad(&a).unwrap();

        assert_relative_eq!(v2, 0.25 * v1, epsilon = 1e-12);
        for (x, y) in g1.iter().zip(g2.iter()) {
            assert_relative_eq!(*y, 0.25 * x, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_covariance_gradient_matches_finite_differences() {
        let a = sample_activations();
        let penalty = DecorrelationPenalty::covariance(1.0);

        let (_, grad) = penalty.value_and_grad(&a).unwrap();
        let numeric = numeric_gradient(&penalty, &a);

        for (x, y) in grad.iter().zip(numeric.iter()) {
            assert_relative_eq!(x, y, epsilon = 1e-5, max_relative = 1e-4);
        }
    }

    #[test]
    fn test_correlation_gradient_matches_finite_differences() {
        let a = sample_activations();
        let penalty = DecorrelationPenalty::correlation(1.0);

        let (_, grad) = penalty.value_and_grad(&a).unwrap();
        let numeric = numeric_gradient(&penalty, &a);

        for (x, y) in grad.iter().zip(numeric.iter()) {
            assert_relative_eq!(x, y, epsilon = 1e-5, max_relative = 1e-4);
        }
    }

    #[test]
    fn test_correlation_penalty_degenerate_unit() {
        let a = array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0]];

        let failing = DecorrelationPenalty::correlation(1.0);
        assert_eq!(
            failing.value(&a).unwrap_err(),
            StatsError::DegenerateUnit { unit: 1 }
        );

        // Under the zero policy the constant column contributes nothing.
        let zeroing =
            DecorrelationPenalty::correlation(1.0).with_degenerate(DegeneratePolicy::Zero);
        assert_relative_eq!(zeroing.value(&a).unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_uncorrelated_columns_near_zero_penalty() {
        // Orthogonal centered columns: covariance off-diagonal is exactly 0.
        let a = array![[1.0, 1.0], [-1.0, 1.0], [1.0, -1.0], [-1.0, -1.0]];
        let penalty = DecorrelationPenalty::covariance(1.0);
        assert_relative_eq!(penalty.value(&a).unwrap(), 0.0, epsilon = 1e-12);
    }
}
