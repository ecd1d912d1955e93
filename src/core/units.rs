//! Visible unit families.
//!
//! Each visible unit carries a [`UnitType`] tag that decides how it is
//! resampled during reconstruction and how it enters the free energy.

use crate::utils::{bernoulli, sigmoid};
use ndarray_rand::rand_distr::StandardNormal;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Activation family of a single visible unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitType {
    /// Stochastic binary unit: Bernoulli draw on σ(e).
    Binary,
    /// Real-valued unit with unit variance: e + N(0, 1).
    Gaussian,
    /// Member of a categorical group normalized with a softmax.
    Softmax,
}

impl UnitType {
    /// New state of a visible unit given its activation energy `e`.
    ///
    /// Softmax units return the raw energy; the group is normalized and
    /// sampled once every visible unit has been updated.
    pub fn activate<R: Rng + ?Sized>(self, energy: f64, rng: &mut R) -> f64 {
        match self {
            UnitType::Binary => bernoulli(sigmoid(energy), rng),
            UnitType::Gaussian => energy + rng.sample::<f64, _>(StandardNormal),
            UnitType::Softmax => energy,
        }
    }
}
