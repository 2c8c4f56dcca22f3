//! Network Layers
//!
//! The hidden layer and the softmax output layer of the perceptron, each
//! with forward and backward passes. Forward passes cache what the backward
//! pass needs.

use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::activation::{softmax, Activation};

/// Floor applied to probabilities before taking logs.
const PROB_EPS: f64 = 1e-15;

/// Dense hidden layer: h = act(x W + b)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiddenLayer {
    /// Weight matrix (n_inputs x n_units)
    pub weights: Array2<f64>,
    /// Bias vector (n_units)
    pub biases: Array1<f64>,
    /// Nonlinearity applied to the pre-activations
    pub activation: Activation,

    #[serde(skip)]
    last_input: Option<Array2<f64>>,
    #[serde(skip)]
    last_z: Option<Array2<f64>>,
}

impl HiddenLayer {
    /// Create a hidden layer with Xavier/Glorot-uniform weights and zero
    /// biases, drawn from the given RNG.
    pub fn new(n_inputs: usize, n_units: usize, activation: Activation, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (n_inputs + n_units) as f64).sqrt();
        let weights = Array2::random_using((n_inputs, n_units), Uniform::new(-limit, limit), rng);
        let biases = Array1::zeros(n_units);

        Self {
            weights,
            biases,
            activation,
            last_input: None,
            last_z: None,
        }
    }

    /// Number of units in the layer.
    pub fn n_units(&self) -> usize {
        self.weights.ncols()
    }

    /// Forward pass, caching input and pre-activations for backprop.
    pub fn forward(&mut self, input: &Array2<f64>) -> Array2<f64> {
        let z = input.dot(&self.weights) + &self.biases;
        let output = self.activation.forward(&z);

        self.last_input = Some(input.clone());
        self.last_z = Some(z);

        output
    }

    /// Forward pass without caching, for inference.
    pub fn activate(&self, input: &Array2<f64>) -> Array2<f64> {
        let z = input.dot(&self.weights) + &self.biases;
        self.activation.forward(&z)
    }

    /// Backward pass from the gradient at the layer's activations.
    ///
    /// Returns (input gradient, weight gradient, bias gradient).
    pub fn backward(
        &self,
        activation_gradient: &Array2<f64>,
    ) -> (Array2<f64>, Array2<f64>, Array1<f64>) {
        let z = self.last_z.as_ref().expect("forward must precede backward");
        let input = self
            .last_input
            .as_ref()
            .expect("forward must precede backward");

        let delta = activation_gradient * &self.activation.derivative(z);

        let weight_gradient = input.t().dot(&delta);
        let bias_gradient = delta.sum_axis(Axis(0));
        let input_gradient = delta.dot(&self.weights.t());

        (input_gradient, weight_gradient, bias_gradient)
    }

    /// Number of trainable parameters.
    pub fn num_parameters(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}

/// Softmax output layer producing class probabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftmaxLayer {
    /// Weight matrix (n_inputs x n_classes)
    pub weights: Array2<f64>,
    /// Bias vector (n_classes)
    pub biases: Array1<f64>,

    #[serde(skip)]
    last_input: Option<Array2<f64>>,
    #[serde(skip)]
    last_probs: Option<Array2<f64>>,
}

impl SoftmaxLayer {
    /// Create a softmax layer with zero-initialized weights and biases.
    pub fn new(n_inputs: usize, n_classes: usize) -> Self {
        Self {
            weights: Array2::zeros((n_inputs, n_classes)),
            biases: Array1::zeros(n_classes),
            last_input: None,
            last_probs: None,
        }
    }

    /// Number of classes.
    pub fn n_classes(&self) -> usize {
        self.weights.ncols()
    }

    /// Forward pass, caching input and probabilities for backprop.
    pub fn forward(&mut self, input: &Array2<f64>) -> Array2<f64> {
        let probs = self.activate(input);

        self.last_input = Some(input.clone());
        self.last_probs = Some(probs.clone());

        probs
    }

    /// Forward pass without caching, for inference.
    pub fn activate(&self, input: &Array2<f64>) -> Array2<f64> {
        let logits = input.dot(&self.weights) + &self.biases;
        softmax(&logits)
    }

    /// Mean negative log-likelihood of the true labels under `probs`.
    pub fn nll(probs: &Array2<f64>, labels: &[usize]) -> f64 {
        let total: f64 = labels
            .iter()
            .enumerate()
            .map(|(i, &label)| -probs[[i, label]].max(PROB_EPS).ln())
            .sum();
        total / labels.len() as f64
    }

    /// Fraction of rows whose most probable class differs from the label.
    pub fn zero_one_error(probs: &Array2<f64>, labels: &[usize]) -> f64 {
        let predicted = super::activation::argmax_rows(probs);
        let wrong = predicted
            .iter()
            .zip(labels.iter())
            .filter(|(p, l)| p != l)
            .count();
        wrong as f64 / labels.len() as f64
    }

    /// Backward pass for the mean NLL loss.
    ///
    /// Returns (input gradient, weight gradient, bias gradient).
    pub fn backward(&self, labels: &[usize]) -> (Array2<f64>, Array2<f64>, Array1<f64>) {
        let probs = self
            .last_probs
            .as_ref()
            .expect("forward must precede backward");
        let input = self
            .last_input
            .as_ref()
            .expect("forward must precede backward");

        let t = labels.len() as f64;

        // d(mean NLL)/d(logits) = (probs - onehot) / t
        let mut delta = probs.clone();
        for (i, &label) in labels.iter().enumerate() {
            delta[[i, label]] -= 1.0;
        }
        delta /= t;

        let weight_gradient = input.t().dot(&delta);
        let bias_gradient = delta.sum_axis(Axis(0));
        let input_gradient = delta.dot(&self.weights.t());

        (input_gradient, weight_gradient, bias_gradient)
    }

    /// Number of trainable parameters.
    pub fn num_parameters(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn test_hidden_layer_shapes() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut layer = HiddenLayer::new(4, 3, Activation::Tanh, &mut rng);

        let input = Array2::ones((2, 4));
        let output = layer.forward(&input);
        assert_eq!(output.dim(), (2, 3));
        assert_eq!(layer.num_parameters(), 4 * 3 + 3);
    }

    #[test]
    fn test_hidden_layer_seeded_init_is_deterministic() {
        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        let a = HiddenLayer::new(5, 4, Activation::Tanh, &mut rng_a);
        let b = HiddenLayer::new(5, 4, Activation::Tanh, &mut rng_b);

        assert_eq!(a.weights, b.weights);
    }

    #[test]
    fn test_softmax_layer_uniform_at_init() {
        // Zero weights produce uniform class probabilities.
        let mut layer = SoftmaxLayer::new(3, 4);
        let input = array![[0.5, -0.2, 1.0]];
        let probs = layer.forward(&input);

        for j in 0..4 {
            assert_relative_eq!(probs[[0, j]], 0.25, epsilon = 1e-12);
        }
        assert_relative_eq!(SoftmaxLayer::nll(&probs, &[2]), 4.0_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_zero_one_error() {
        let probs = array![[0.9, 0.1], [0.2, 0.8], [0.6, 0.4]];
        assert_relative_eq!(
            SoftmaxLayer::zero_one_error(&probs, &[0, 1, 1]),
            1.0 / 3.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_softmax_backward_gradient_direction() {
        let mut layer = SoftmaxLayer::new(2, 2);
        let input = array![[1.0, 0.0], [0.0, 1.0]];
        let probs = layer.forward(&input);
        let (_, weight_grad, bias_grad) = layer.backward(&[0, 1]);

        // At uniform probabilities delta rows are (p - onehot)/t.
        assert_relative_eq!(probs[[0, 0]], 0.5, epsilon = 1e-12);
        assert_relative_eq!(weight_grad[[0, 0]], -0.25, epsilon = 1e-12);
        assert_relative_eq!(weight_grad[[0, 1]], 0.25, epsilon = 1e-12);
        assert_relative_eq!(bias_grad[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(bias_grad[1], 0.0, epsilon = 1e-12);
    }
}
