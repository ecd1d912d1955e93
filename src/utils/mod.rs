//! Scalar activations, stochastic draws and the masked softmax.

use crate::core::UnitType;
use ndarray::Array1;
use rand::Rng;

/// Logistic function: σ(x) = 1 / (1 + e^-x)
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Softplus: ln(1 + e^x), evaluated without overflow for large `x`.
#[inline]
pub fn softplus(x: f64) -> f64 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

/// Bernoulli draw: 1 with probability `p`, else 0.
#[inline]
pub fn bernoulli<R: Rng + ?Sized>(p: f64, rng: &mut R) -> f64 {
    if p > rng.gen::<f64>() {
        1.0
    } else {
        0.0
    }
}

/// Numerically stable softmax over the entries tagged [`UnitType::Softmax`].
///
/// Other entries are left untouched. The group maximum is subtracted before
/// exponentiating so that large energies cannot overflow.
pub fn softmax_masked(x: &mut Array1<f64>, units: &[UnitType]) {
    let mut max = f64::NEG_INFINITY;
    for (v, unit) in x.iter().zip(units) {
        if *unit == UnitType::Softmax && *v > max {
            max = *v;
        }
    }
    if max == f64::NEG_INFINITY {
        return;
    }

    let mut sum = 0.0;
    for (v, unit) in x.iter_mut().zip(units) {
        if *unit == UnitType::Softmax {
            *v = (*v - max).exp();
            sum += *v;
        }
    }
    for (v, unit) in x.iter_mut().zip(units) {
        if *unit == UnitType::Softmax {
            *v /= sum;
        }
    }
}
