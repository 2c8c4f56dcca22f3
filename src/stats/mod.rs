//! Batch Statistics Module
//!
//! Covariance/correlation computation over minibatch activations and the
//! decorrelation penalties built on top of it.

mod batch;
mod penalty;

pub use batch::{
    column_means, correlation, correlation_from_covariance, covariance, ActivationStats,
    DegeneratePolicy, StatsError, StatsOptions,
};
pub use penalty::{DecorrelationPenalty, PenaltyKind};
