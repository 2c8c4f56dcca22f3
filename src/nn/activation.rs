//! Activation Functions
//!
//! Hidden-layer nonlinearities with their derivatives for backpropagation,
//! plus the row-wise softmax used by the output layer.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Hidden-layer activation function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Activation {
    /// Hyperbolic tangent.
    #[default]
    Tanh,
    /// Logistic sigmoid: 1 / (1 + exp(-x)).
    Sigmoid,
    /// Rectified linear unit: max(0, x).
    Relu,
}

impl Activation {
    /// Apply the activation to a batch of pre-activations.
    pub fn forward(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Tanh => z.mapv(f64::tanh),
            Activation::Sigmoid => z.mapv(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Relu => z.mapv(|v| v.max(0.0)),
        }
    }

    /// Derivative with respect to the pre-activations.
    pub fn derivative(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Tanh => {
                let t = z.mapv(f64::tanh);
                1.0 - &t * &t
            }
            Activation::Sigmoid => {
                let s = self.forward(z);
                &s * &(1.0 - &s)
            }
            Activation::Relu => z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
        }
    }
}

/// Row-wise softmax over a batch of logits.
///
/// Subtracts each row's maximum before exponentiating so large logits do not
/// overflow.
pub fn softmax(logits: &Array2<f64>) -> Array2<f64> {
    let mut probs = logits.clone();

    for mut row in probs.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }

    probs
}

/// Index of the most probable class per row.
pub fn argmax_rows(probs: &Array2<f64>) -> Vec<usize> {
    probs
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| {
                    if v > bv {
                        (i, v)
                    } else {
                        (bi, bv)
                    }
                })
                .0
        })
        .collect()
}
