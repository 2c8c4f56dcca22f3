//! # Decorrelation-Penalized MLP
//!
//! This library computes covariance and Pearson correlation statistics over
//! the hidden-unit activations of a neural network, and trains a
//! one-hidden-layer perceptron whose loss penalizes redundant hidden units
//! through those statistics.
//!
//! ## Modules
//!
//! - `stats` - Batch covariance/correlation computation and the
//!   decorrelation penalties built on it
//! - `nn` - The perceptron: layers, activations, training
//! - `data` - Dataset loading, splitting, and standardization

pub mod data;
pub mod nn;
pub mod stats;

pub use data::{DataError, Dataset, StandardScaler};
pub use nn::{Activation, Mlp, MlpConfig, NetworkError, TrainConfig, TrainingHistory};
pub use stats::{
    column_means, correlation, covariance, ActivationStats, DecorrelationPenalty,
    DegeneratePolicy, PenaltyKind, StatsError, StatsOptions,
};
