//! Neural Network Module
//!
//! One-hidden-layer perceptron with a softmax readout, trained by minibatch
//! SGD with optional decorrelation of the hidden units.

pub mod activation;
pub mod layer;
pub mod network;

pub use activation::{softmax, Activation};
pub use layer::{HiddenLayer, SoftmaxLayer};
pub use network::{Mlp, MlpConfig, NetworkError, TrainConfig, TrainingHistory};
