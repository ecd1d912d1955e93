//! # RBM (Restricted Boltzmann Machines)
//!
//! Restricted Boltzmann Machines trained with contrastive divergence, and their
//! greedy layer-wise composition into a stacked classifier (a Deep Belief
//! Network with a label-augmented top layer).
//!
//! ## Overview
//!
//! An RBM is a bipartite stochastic network: visible units `v` connect to
//! hidden units `h` through a weight matrix `W`, with no intra-layer links.
//! Learning follows the contrastive-divergence estimate of the likelihood
//! gradient, collected over mini-batches and applied with L2 weight decay.
//!
//! ## Structure
//!
//! - [`core`] — RBM kernel: unit types, energies, Gibbs sampling, CD updates
//! - [`classifier`] — RBM with a softmax label block, free-energy inference
//! - [`stacked`] — Gaussian/binary feature layers topped by a classifier
//! - [`training`] — Mini-batch driver shared by all models, training metrics
//! - [`checkpoint`] — Flat text layout and JSON checkpoints
//! - [`data`] — Normalization and permutation helpers for datasets
//! - [`utils`] — Sigmoid, softplus, Bernoulli draws, masked softmax
//!
//! All randomness comes from an `Rng` passed in by the caller; seed it to make
//! training reproducible.

pub mod checkpoint;
pub mod classifier;
pub mod core;
pub mod data;
pub mod stacked;
pub mod training;
pub mod utils;

pub use checkpoint::{load_checkpoint, save_checkpoint};
pub use classifier::Classifier;
pub use crate::core::{BoltzmannMachine, Rbm, RbmError, RbmResult, UnitType};
pub use stacked::StackedClassifier;
pub use training::Metrics;

use serde::{Deserialize, Serialize};

/// Configuration for one training run.
///
/// Used by [`Rbm::train`], [`Classifier::train`] and [`StackedClassifier::train`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainOption {
    /// Examples per mini-batch; the final batch of an epoch may be shorter.
    pub batch_size: usize,
    /// Full passes over the data.
    pub iteration: usize,
    /// Alternating Gibbs sweeps per CD step (CD-n).
    pub gibbs_step: usize,
    /// Multiplies the average per-example gradient of a mini-batch.
    pub learning_rate: f64,
    /// L2 penalty coefficient, scaled by the learning rate.
    pub weight_decay: f64,
}

impl TrainOption {
    /// Options with the default learning rate and weight decay.
    pub fn new(batch_size: usize, iteration: usize, gibbs_step: usize) -> Self {
        Self {
            batch_size,
            iteration,
            gibbs_step,
            ..Self::default()
        }
    }

    /// Reject options no training run can honor.
    pub fn validate(&self) -> RbmResult<()> {
        if self.batch_size == 0 {
            return Err(RbmError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.gibbs_step == 0 {
            return Err(RbmError::InvalidConfig(
                "gibbs_step must be at least 1".to_string(),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate < 0.0 {
            return Err(RbmError::InvalidConfig(format!(
                "learning_rate must be finite and non-negative, got {}",
                self.learning_rate
            )));
        }
        if !self.weight_decay.is_finite() || self.weight_decay < 0.0 {
            return Err(RbmError::InvalidConfig(format!(
                "weight_decay must be finite and non-negative, got {}",
                self.weight_decay
            )));
        }
        Ok(())
    }
}

impl Default for TrainOption {
    fn default() -> Self {
        Self {
            batch_size: 10,
            iteration: 1000,
            gibbs_step: 1,
            learning_rate: 0.1,
            weight_decay: 0.001,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_option_is_valid() {
        assert!(TrainOption::default().validate().is_ok());
    }

    #[test]
    fn test_new_keeps_default_rates() {
        let opt = TrainOption::new(4, 20, 3);
        assert_eq!(opt.batch_size, 4);
        assert_eq!(opt.iteration, 20);
        assert_eq!(opt.gibbs_step, 3);
        assert_eq!(opt.learning_rate, 0.1);
        assert_eq!(opt.weight_decay, 0.001);
    }

    #[test]
    fn test_invalid_options() {
        assert!(TrainOption::new(0, 1, 1).validate().is_err());
        assert!(TrainOption::new(1, 1, 0).validate().is_err());
        let opt = TrainOption {
            learning_rate: f64::NAN,
            ..TrainOption::default()
        };
        assert!(opt.validate().is_err());
        let opt = TrainOption {
            weight_decay: -1.0,
            ..TrainOption::default()
        };
        assert!(opt.validate().is_err());
    }

    #[test]
    fn test_zero_iterations_allowed() {
        assert!(TrainOption::new(1, 0, 1).validate().is_ok());
    }
}
