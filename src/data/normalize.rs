//! Feature Standardization
//!
//! Z-score scaling fit on the training split and applied to every split, so
//! validation data never leaks into the statistics.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Per-feature z-score scaler
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Option<Array1<f64>>,
    pub std: Option<Array1<f64>>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit the per-feature mean and standard deviation.
    pub fn fit(&mut self, data: &Array2<f64>) {
        let n = data.nrows() as f64;
        let mean = data.sum_axis(Axis(0)) / n;

        let mut std = Array1::zeros(data.ncols());
        for row in data.rows() {
            let diff = &row - &mean;
            std = std + &diff * &diff;
        }
        std = (std / n).mapv(f64::sqrt);

        // Constant features pass through unscaled.
        std = std.mapv(|v| if v.abs() < 1e-10 { 1.0 } else { v });

        self.mean = Some(mean);
        self.std = Some(std);
    }

    /// Standardize using the fitted parameters.
    pub fn transform(&self, data: &Array2<f64>) -> Array2<f64> {
        let mean = self.mean.as_ref().expect("scaler not fitted");
        let std = self.std.as_ref().expect("scaler not fitted");

        (data - mean) / std
    }

    /// Fit and transform in one step.
    pub fn fit_transform(&mut self, data: &Array2<f64>) -> Array2<f64> {
        self.fit(data);
        self.transform(data)
    }

    /// Map standardized data back to the original scale.
    pub fn inverse_transform(&self, data: &Array2<f64>) -> Array2<f64> {
        let mean = self.mean.as_ref().expect("scaler not fitted");
        let std = self.std.as_ref().expect("scaler not fitted");

        data * std + mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_standardized_columns_have_zero_mean() {
        let data = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0], [4.0, 8.0]];
        let mut scaler = StandardScaler::new();
        let standardized = scaler.fit_transform(&data);

        let mean = standardized.sum_axis(Axis(0)) / 4.0;
        assert!(mean.iter().all(|&v| v.abs() < 1e-10));
    }

    #[test]
    fn test_inverse_roundtrip() {
        let data = array![[1.0, 10.0], [2.0, 40.0], [3.0, 90.0]];
        let mut scaler = StandardScaler::new();
        let standardized = scaler.fit_transform(&data);
        let restored = scaler.inverse_transform(&standardized);

        for (a, b) in data.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn test_constant_feature_is_left_in_place() {
        let data = array![[5.0, 1.0], [5.0, 2.0], [5.0, 3.0]];
        let mut scaler = StandardScaler::new();
        let standardized = scaler.fit_transform(&data);

        for i in 0..3 {
            assert!((standardized[[i, 0]]).abs() < 1e-10);
        }
    }
}
