//! Data Module
//!
//! Dataset loading, train/validation splitting, and feature standardization
//! for the training workflow.

mod dataset;
mod normalize;

pub use dataset::{DataError, Dataset};
pub use normalize::StandardScaler;
