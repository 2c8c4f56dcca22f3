//! Multilayer Perceptron
//!
//! One-hidden-layer classifier: a dense nonlinear hidden layer feeding a
//! softmax output layer. The training loss is the mean negative
//! log-likelihood plus L1/L2 weight regularization and, optionally, a
//! decorrelation penalty on the hidden activations.

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use thiserror::Error;

use crate::stats::{DecorrelationPenalty, StatsError};

use super::activation::{argmax_rows, Activation};
use super::layer::{HiddenLayer, SoftmaxLayer};

/// Errors that can occur in network operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("invalid input dimension: expected {expected}, got {got}")]
    InvalidInputDimension { expected: usize, got: usize },

    #[error("label {label} out of range for {n_classes} classes")]
    LabelOutOfRange { label: usize, n_classes: usize },

    #[error("batch is empty")]
    EmptyBatch,

    #[error("statistics error: {0}")]
    Stats(#[from] StatsError),
}

/// Network architecture and loss configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpConfig {
    /// Input feature count
    pub n_inputs: usize,
    /// Hidden unit count
    pub n_hidden: usize,
    /// Output class count
    pub n_classes: usize,
    /// Hidden-layer nonlinearity
    pub activation: Activation,
    /// L1 weight-norm coefficient
    pub l1: f64,
    /// L2 squared-weight-norm coefficient
    pub l2: f64,
    /// Decorrelation penalty on the hidden activations
    pub penalty: Option<DecorrelationPenalty>,
    /// RNG seed for weight init and minibatch shuffling
    pub seed: u64,
}

impl MlpConfig {
    pub fn new(n_inputs: usize, n_hidden: usize, n_classes: usize) -> Self {
        Self {
            n_inputs,
            n_hidden,
            n_classes,
            activation: Activation::default(),
            l1: 0.0,
            l2: 0.0,
            penalty: None,
            seed: 1234,
        }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_l1(mut self, l1: f64) -> Self {
        self.l1 = l1;
        self
    }

    pub fn with_l2(mut self, l2: f64) -> Self {
        self.l2 = l2;
        self
    }

    pub fn with_penalty(mut self, penalty: DecorrelationPenalty) -> Self {
        self.penalty = Some(penalty);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// SGD training parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 20,
            learning_rate: 0.01,
        }
    }
}

/// Per-epoch training record
#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    /// Mean minibatch loss per epoch
    pub train_loss: Vec<f64>,
    /// Validation zero-one error per epoch (empty without a validation set)
    pub valid_error: Vec<f64>,
    /// Epoch with the lowest validation error
    pub best_epoch: Option<usize>,
    /// Lowest validation error seen
    pub best_valid_error: f64,
}

/// One-hidden-layer perceptron with softmax output
pub struct Mlp {
    pub config: MlpConfig,
    hidden: HiddenLayer,
    output: SoftmaxLayer,
    rng: StdRng,
}

impl Mlp {
    /// Build a network from its configuration.
    pub fn new(config: MlpConfig) -> Result<Self, NetworkError> {
        if config.n_inputs == 0 || config.n_hidden == 0 {
            return Err(NetworkError::InvalidConfig(
                "input and hidden sizes must be nonzero",
            ));
        }
        if config.n_classes < 2 {
            return Err(NetworkError::InvalidConfig("need at least 2 classes"));
        }
        if let Some(penalty) = &config.penalty {
            if penalty.strength < 0.0 {
                return Err(NetworkError::InvalidConfig(
                    "penalty strength must be nonnegative",
                ));
            }
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let hidden = HiddenLayer::new(config.n_inputs, config.n_hidden, config.activation, &mut rng);
        let output = SoftmaxLayer::new(config.n_hidden, config.n_classes);

        Ok(Self {
            config,
            hidden,
            output,
            rng,
        })
    }

    /// Hidden-layer activations for a batch of inputs.
    pub fn hidden_activations(&self, inputs: &Array2<f64>) -> Result<Array2<f64>, NetworkError> {
        self.check_inputs(inputs)?;
        Ok(self.hidden.activate(inputs))
    }

    /// Class probabilities for a batch of inputs.
    pub fn predict_proba(&self, inputs: &Array2<f64>) -> Result<Array2<f64>, NetworkError> {
        self.check_inputs(inputs)?;
        Ok(self.output.activate(&self.hidden.activate(inputs)))
    }

    /// Most probable class per input row.
    pub fn predict(&self, inputs: &Array2<f64>) -> Result<Vec<usize>, NetworkError> {
        Ok(argmax_rows(&self.predict_proba(inputs)?))
    }

    /// Full training loss on a batch: NLL + regularization + penalty.
    pub fn loss(&self, inputs: &Array2<f64>, labels: &[usize]) -> Result<f64, NetworkError> {
        self.check_batch(inputs, labels)?;

        let activations = self.hidden.activate(inputs);
        let probs = self.output.activate(&activations);
        let mut loss = SoftmaxLayer::nll(&probs, labels) + self.regularization();

        if let Some(penalty) = &self.config.penalty {
            loss += penalty.value(&activations)?;
        }

        Ok(loss)
    }

    /// Zero-one error on a labeled batch.
    pub fn evaluate(&self, inputs: &Array2<f64>, labels: &[usize]) -> Result<f64, NetworkError> {
        self.check_batch(inputs, labels)?;
        let probs = self.predict_proba(inputs)?;
        Ok(SoftmaxLayer::zero_one_error(&probs, labels))
    }

    /// One SGD step on a minibatch. Returns the batch loss before the update.
    pub fn train_batch(
        &mut self,
        inputs: &Array2<f64>,
        labels: &[usize],
        learning_rate: f64,
    ) -> Result<f64, NetworkError> {
        self.check_batch(inputs, labels)?;

        // Forward, caching layer state.
        let activations = self.hidden.forward(inputs);
        let probs = self.output.forward(&activations);

        let mut loss = SoftmaxLayer::nll(&probs, labels) + self.regularization();

        // Backward through the output layer.
        let (mut activation_grad, out_w_grad, out_b_grad) = self.output.backward(labels);

        // The decorrelation penalty contributes directly at the hidden
        // activations, alongside the gradient from the loss above.
        if let Some(penalty) = &self.config.penalty {
            let (value, grad) = penalty.value_and_grad(&activations)?;
            loss += value;
            activation_grad += &grad;
        }

        let (_, hid_w_grad, hid_b_grad) = self.hidden.backward(&activation_grad);

        // Weight decay applies to weights only, never biases.
        let hid_w_grad = hid_w_grad + self.weight_decay_grad(&self.hidden.weights);
        let out_w_grad = out_w_grad + self.weight_decay_grad(&self.output.weights);

        self.hidden.weights -= &(hid_w_grad * learning_rate);
        self.hidden.biases -= &(hid_b_grad * learning_rate);
        self.output.weights -= &(out_w_grad * learning_rate);
        self.output.biases -= &(out_b_grad * learning_rate);

        Ok(loss)
    }

    /// One epoch of minibatch SGD over a fresh random permutation of the
    /// training rows. Returns the mean minibatch loss.
    pub fn train_epoch(
        &mut self,
        inputs: &Array2<f64>,
        labels: &[usize],
        train: &TrainConfig,
    ) -> Result<f64, NetworkError> {
        self.check_batch(inputs, labels)?;

        let n_samples = inputs.nrows();
        let batch_size = train.batch_size.max(1).min(n_samples);

        let mut indices: Vec<usize> = (0..n_samples).collect();
        indices.shuffle(&mut self.rng);

        let mut total_loss = 0.0;
        let mut n_batches = 0;

        for batch_indices in indices.chunks(batch_size) {
            let batch_inputs = inputs.select(Axis(0), batch_indices);
            let batch_labels: Vec<usize> = batch_indices.iter().map(|&i| labels[i]).collect();

            total_loss += self.train_batch(&batch_inputs, &batch_labels, train.learning_rate)?;
            n_batches += 1;
        }

        Ok(total_loss / n_batches as f64)
    }

    /// Train for the configured number of epochs, tracking validation error
    /// when a validation set is provided.
    pub fn fit(
        &mut self,
        inputs: &Array2<f64>,
        labels: &[usize],
        validation: Option<(&Array2<f64>, &[usize])>,
        train: &TrainConfig,
    ) -> Result<TrainingHistory, NetworkError> {
        let mut history = TrainingHistory {
            best_valid_error: f64::INFINITY,
            ..TrainingHistory::default()
        };

        for epoch in 0..train.epochs {
            let loss = self.train_epoch(inputs, labels, train)?;
            history.train_loss.push(loss);

            match validation {
                Some((valid_inputs, valid_labels)) => {
                    let error = self.evaluate(valid_inputs, valid_labels)?;
                    history.valid_error.push(error);

                    if error < history.best_valid_error {
                        history.best_valid_error = error;
                        history.best_epoch = Some(epoch);
                    }

                    log::info!(
                        "epoch {}/{}: train loss {:.6}, validation error {:.2}%",
                        epoch + 1,
                        train.epochs,
                        loss,
                        error * 100.0
                    );
                }
                None => {
                    log::info!("epoch {}/{}: train loss {:.6}", epoch + 1, train.epochs, loss);
                }
            }
        }

        Ok(history)
    }

    /// Total trainable parameter count.
    pub fn num_parameters(&self) -> usize {
        self.hidden.num_parameters() + self.output.num_parameters()
    }

    /// Save the network as JSON.
    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);

        let data = (&self.config, &self.hidden, &self.output);
        serde_json::to_writer(writer, &data)?;

        Ok(())
    }

    /// Load a network saved with [`Mlp::save`].
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let (config, hidden, output): (MlpConfig, HiddenLayer, SoftmaxLayer) =
            serde_json::from_reader(reader)?;
        let rng = StdRng::seed_from_u64(config.seed);

        Ok(Self {
            config,
            hidden,
            output,
            rng,
        })
    }

    fn regularization(&self) -> f64 {
        let l1_norm = self.hidden.weights.mapv(f64::abs).sum()
            + self.output.weights.mapv(f64::abs).sum();
        let l2_sqr = self.hidden.weights.mapv(|w| w * w).sum()
            + self.output.weights.mapv(|w| w * w).sum();

        self.config.l1 * l1_norm + self.config.l2 * l2_sqr
    }

    fn weight_decay_grad(&self, weights: &Array2<f64>) -> Array2<f64> {
        weights.mapv(|w| self.config.l1 * w.signum() + 2.0 * self.config.l2 * w)
    }

    fn check_inputs(&self, inputs: &Array2<f64>) -> Result<(), NetworkError> {
        if inputs.ncols() != self.config.n_inputs {
            return Err(NetworkError::InvalidInputDimension {
                expected: self.config.n_inputs,
                got: inputs.ncols(),
            });
        }
        Ok(())
    }

    fn check_batch(&self, inputs: &Array2<f64>, labels: &[usize]) -> Result<(), NetworkError> {
        self.check_inputs(inputs)?;

        if inputs.nrows() == 0 || labels.is_empty() {
            return Err(NetworkError::EmptyBatch);
        }
        if inputs.nrows() != labels.len() {
            return Err(NetworkError::InvalidInputDimension {
                expected: inputs.nrows(),
                got: labels.len(),
            });
        }
        if let Some(&label) = labels.iter().find(|&&l| l >= self.config.n_classes) {
            return Err(NetworkError::LabelOutOfRange {
                label,
                n_classes: self.config.n_classes,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn toy_problem() -> (Array2<f64>, Vec<usize>) {
        // Two well-separated clusters in two dimensions.
        let inputs = array![
            [1.0, 1.2],
            [0.8, 1.0],
            [1.2, 0.9],
            [1.1, 1.1],
            [-1.0, -1.1],
            [-0.9, -1.2],
            [-1.2, -0.8],
            [-1.1, -1.0],
        ];
        let labels = vec![0, 0, 0, 0, 1, 1, 1, 1];
        (inputs, labels)
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(Mlp::new(MlpConfig::new(0, 4, 2)).is_err());
        assert!(Mlp::new(MlpConfig::new(3, 0, 2)).is_err());
        assert!(Mlp::new(MlpConfig::new(3, 4, 1)).is_err());
    }

    #[test]
    fn test_rejects_wrong_input_width() {
        let mlp = Mlp::new(MlpConfig::new(3, 4, 2)).unwrap();
        let inputs = Array2::ones((2, 5));
        assert_eq!(
            mlp.predict(&inputs),
            Err(NetworkError::InvalidInputDimension {
                expected: 3,
                got: 5
            })
        );
    }

    #[test]
    fn test_rejects_label_out_of_range() {
        let mlp = Mlp::new(MlpConfig::new(2, 4, 2)).unwrap();
        let inputs = Array2::ones((2, 2));
        assert_eq!(
            mlp.evaluate(&inputs, &[0, 2]),
            Err(NetworkError::LabelOutOfRange {
                label: 2,
                n_classes: 2
            })
        );
    }

    #[test]
    fn test_training_reduces_loss() {
        let (inputs, labels) = toy_problem();
        let mut mlp = Mlp::new(MlpConfig::new(2, 8, 2).with_seed(42)).unwrap();

        let initial = mlp.loss(&inputs, &labels).unwrap();
        let train = TrainConfig {
            epochs: 50,
            batch_size: 4,
            learning_rate: 0.1,
        };
        mlp.fit(&inputs, &labels, None, &train).unwrap();
        let trained = mlp.loss(&inputs, &labels).unwrap();

        assert!(trained < initial);
        assert_eq!(mlp.evaluate(&inputs, &labels).unwrap(), 0.0);
    }

    #[test]
    fn test_training_with_covariance_penalty() {
        let (inputs, labels) = toy_problem();
        let config = MlpConfig::new(2, 8, 2)
            .with_seed(42)
            .with_penalty(DecorrelationPenalty::covariance(1e-3));
        let mut mlp = Mlp::new(config).unwrap();

        let initial = mlp.loss(&inputs, &labels).unwrap();
        let train = TrainConfig {
            epochs: 50,
            batch_size: 4,
            learning_rate: 0.1,
        };
        mlp.fit(&inputs, &labels, None, &train).unwrap();

        assert!(mlp.loss(&inputs, &labels).unwrap() < initial);
    }

    #[test]
    fn test_fit_tracks_best_validation_epoch() {
        let (inputs, labels) = toy_problem();
        let mut mlp = Mlp::new(MlpConfig::new(2, 8, 2).with_seed(7)).unwrap();

        let train = TrainConfig {
            epochs: 20,
            batch_size: 4,
            learning_rate: 0.1,
        };
        let history = mlp
            .fit(&inputs, &labels, Some((&inputs, labels.as_slice())), &train)
            .unwrap();

        assert_eq!(history.valid_error.len(), 20);
        assert!(history.best_epoch.is_some());
        assert!(history.best_valid_error <= history.valid_error[0]);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let (inputs, labels) = toy_problem();
        let mut mlp = Mlp::new(MlpConfig::new(2, 4, 2).with_seed(3)).unwrap();
        let train = TrainConfig {
            epochs: 10,
            batch_size: 4,
            learning_rate: 0.1,
        };
        mlp.fit(&inputs, &labels, None, &train).unwrap();

        let dir = std::env::temp_dir().join("decorr_mlp_test_model.json");
        let path = dir.to_str().unwrap();
        mlp.save(path).unwrap();
        let restored = Mlp::load(path).unwrap();
        std::fs::remove_file(path).ok();

        let a = mlp.predict_proba(&inputs).unwrap();
        let b = restored.predict_proba(&inputs).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-12);
        }
    }
}
