//! Core RBM implementation.
//!
//! This module provides the bipartite network and its learning dynamics:
//! - Hidden/visible activation energies
//! - Alternating Gibbs sampling (reconstruction)
//! - Contrastive-divergence gradient accumulation
//! - Mini-batch updates with L2 weight decay
//!
//! ## Energies
//!
//! ```text
//! e_h(j, v) = bh[j] + Σ_i W[i][j] v[i]
//! e_v(i, h) = bv[i] + Σ_j W[i][j] h[j]
//! p(h_j = 1 | v) = σ(e_h(j, v))
//! ```

mod units;

pub use units::UnitType;

use crate::training::{self, Metrics};
use crate::utils::{bernoulli, sigmoid, softmax_masked};
use crate::TrainOption;
use ndarray::linalg::general_mat_vec_mul;
use ndarray::{Array, Array1, Array2, ArrayView1, Dimension, Zip};
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand::Rng;
use std::io::{BufRead, Write};
use thiserror::Error;

/// Standard deviation of the zero-mean Gaussian used for initial weights.
pub const WEIGHT_STD_DEV: f64 = 0.01;

/// Error type for RBM operations.
#[derive(Debug, Error)]
pub enum RbmError {
    /// Data or parameters disagree with the model's dimensions
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),
    /// Invalid model or training configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    /// Reading or writing a model failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed or truncated persisted model
    #[error("Parse error: {0}")]
    Parse(String),
    /// JSON checkpoint (de)serialization failed
    #[error("Checkpoint error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RbmResult<T> = Result<T, RbmError>;

/// Shared surface of every RBM-backed model.
///
/// Plain RBMs and classifiers differ in how they build visible vectors and
/// train, but expose the same sampling, propagation and persistence through
/// the [`Rbm`] they wrap.
pub trait BoltzmannMachine {
    /// The underlying machine.
    fn rbm(&self) -> &Rbm;

    /// The underlying machine, mutably.
    fn rbm_mut(&mut self) -> &mut Rbm;

    fn visible(&self) -> usize {
        self.rbm().visible()
    }

    fn hidden(&self) -> usize {
        self.rbm().hidden()
    }

    /// See [`Rbm::reconstruct`].
    fn reconstruct<R: Rng + ?Sized>(
        &mut self,
        v0: ArrayView1<'_, f64>,
        steps: usize,
        rng: &mut R,
    ) -> RbmResult<(&Array1<f64>, &Array1<f64>)> {
        self.rbm_mut().reconstruct(v0, steps, rng)
    }

    /// See [`Rbm::hidden_probabilities`].
    fn hidden_probabilities(&mut self, v: ArrayView1<'_, f64>) -> RbmResult<&Array1<f64>> {
        self.rbm_mut().hidden_probabilities(v)
    }

    /// Write parameters in the flat text layout.
    fn write_to<W: Write>(&self, out: &mut W) -> RbmResult<()> {
        crate::checkpoint::write_rbm(self.rbm(), out)
    }

    /// Read parameters in the flat text layout, consuming exactly one model.
    fn read_from<B: BufRead>(&mut self, input: &mut B) -> RbmResult<()> {
        crate::checkpoint::read_rbm(self.rbm_mut(), input)
    }
}

/// Gradient accumulators for one mini-batch.
#[derive(Debug, Clone, PartialEq)]
struct Gradient {
    dw: Array2<f64>,
    dbv: Array1<f64>,
    dbh: Array1<f64>,
}

impl Gradient {
    fn zeros(visible: usize, hidden: usize) -> Self {
        Self {
            dw: Array2::zeros((visible, hidden)),
            dbv: Array1::zeros(visible),
            dbh: Array1::zeros(hidden),
        }
    }

    fn reset(&mut self) {
        self.dw.fill(0.0);
        self.dbv.fill(0.0);
        self.dbh.fill(0.0);
    }

    /// Add positive statistics `(v, h)` and subtract negative ones `(rv, rh)`.
    fn accumulate(
        &mut self,
        v: ArrayView1<'_, f64>,
        rv: &Array1<f64>,
        h: &Array1<f64>,
        rh: &Array1<f64>,
    ) {
        for ((i, j), d) in self.dw.indexed_iter_mut() {
            *d += h[j] * v[i] - rh[j] * rv[i];
        }
        Zip::from(&mut self.dbv)
            .and(&v)
            .and(rv)
            .for_each(|d, &pos, &neg| *d += pos - neg);
        Zip::from(&mut self.dbh)
            .and(h)
            .and(rh)
            .for_each(|d, &pos, &neg| *d += pos - neg);
    }
}

/// Per-instance scratch buffers reused by every sampling call.
///
/// `rh` holds the hidden probabilities at the reconstruction during CD.
#[derive(Debug, Clone, PartialEq)]
struct Scratch {
    v: Array1<f64>,
    h: Array1<f64>,
    rh: Array1<f64>,
}

impl Scratch {
    fn zeros(visible: usize, hidden: usize) -> Self {
        Self {
            v: Array1::zeros(visible),
            h: Array1::zeros(hidden),
            rh: Array1::zeros(hidden),
        }
    }
}

/// A Restricted Boltzmann Machine.
///
/// # Architecture
///
/// - **Weights:** `W` of shape `(visible, hidden)`
/// - **Biases:** `bv` (visible), `bh` (hidden)
/// - **Units:** one [`UnitType`] per visible unit; hidden units are binary
///
/// The model owns scratch buffers that every sampling call overwrites, so an
/// instance must not be shared between threads while in use. Borrows
/// returned by [`reconstruct`](Rbm::reconstruct) and
/// [`hidden_probabilities`](Rbm::hidden_probabilities) point into them.
#[derive(Clone, PartialEq)]
pub struct Rbm {
    w: Array2<f64>,
    bv: Array1<f64>,
    bh: Array1<f64>,
    units: Vec<UnitType>,
    grad: Gradient,
    scratch: Scratch,
}

impl std::fmt::Debug for Rbm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = |kind: UnitType| self.units.iter().filter(|u| **u == kind).count();
        f.debug_struct("Rbm")
            .field("visible", &self.visible())
            .field("hidden", &self.hidden())
            .field("binary_units", &count(UnitType::Binary))
            .field("gaussian_units", &count(UnitType::Gaussian))
            .field("softmax_units", &count(UnitType::Softmax))
            .finish()
    }
}

impl Rbm {
    /// RBM whose visible units all are binary.
    pub fn binary<R: Rng + ?Sized>(visible: usize, hidden: usize, rng: &mut R) -> Self {
        Self::with_units(vec![UnitType::Binary; visible], hidden, rng)
    }

    /// RBM with real-valued, unit-variance Gaussian visible units.
    pub fn gaussian<R: Rng + ?Sized>(visible: usize, hidden: usize, rng: &mut R) -> Self {
        Self::with_units(vec![UnitType::Gaussian; visible], hidden, rng)
    }

    /// RBM with an explicit unit type per visible unit.
    ///
    /// Weights are drawn from N(0, [`WEIGHT_STD_DEV`]²); biases start at zero.
    pub fn with_units<R: Rng + ?Sized>(units: Vec<UnitType>, hidden: usize, rng: &mut R) -> Self {
        let visible = units.len();
        let mut rbm = Self {
            w: Array2::zeros((visible, hidden)),
            bv: Array1::zeros(visible),
            bh: Array1::zeros(hidden),
            units,
            grad: Gradient::zeros(visible, hidden),
            scratch: Scratch::zeros(visible, hidden),
        };
        rbm.reset(rng);
        rbm
    }

    /// Restore an RBM from stored parameters.
    ///
    /// # Errors
    /// - `ShapeMismatch` if `w` is not `(units.len(), bh.len())` or `bv` is not `units.len()` long
    pub fn from_parameters(
        units: Vec<UnitType>,
        w: Array2<f64>,
        bv: Array1<f64>,
        bh: Array1<f64>,
    ) -> RbmResult<Self> {
        check_parameters(units.len(), bh.len(), &w, &bv, &bh)?;
        let (visible, hidden) = w.dim();
        Ok(Self {
            w,
            bv,
            bh,
            units,
            grad: Gradient::zeros(visible, hidden),
            scratch: Scratch::zeros(visible, hidden),
        })
    }

    /// Re-draw the weights and clear biases and scratch state.
    pub fn reset<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.w = Array2::random_using(self.w.dim(), StandardNormal, rng) * WEIGHT_STD_DEV;
        self.bv.fill(0.0);
        self.bh.fill(0.0);
        self.grad.reset();
        self.scratch.v.fill(0.0);
        self.scratch.h.fill(0.0);
        self.scratch.rh.fill(0.0);
    }

    pub fn visible(&self) -> usize {
        self.bv.len()
    }

    pub fn hidden(&self) -> usize {
        self.bh.len()
    }

    pub fn units(&self) -> &[UnitType] {
        &self.units
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.w
    }

    pub fn visible_bias(&self) -> &Array1<f64> {
        &self.bv
    }

    pub fn hidden_bias(&self) -> &Array1<f64> {
        &self.bh
    }

    /// Replace weights and biases, keeping the model's dimensions.
    ///
    /// # Errors
    /// - `ShapeMismatch` if any array disagrees with `(visible, hidden)`
    pub fn set_parameters(
        &mut self,
        w: Array2<f64>,
        bv: Array1<f64>,
        bh: Array1<f64>,
    ) -> RbmResult<()> {
        check_parameters(self.visible(), self.hidden(), &w, &bv, &bh)?;
        self.w = w;
        self.bv = bv;
        self.bh = bh;
        Ok(())
    }

    /// Hidden unit activation energy: `bh[j] + Σ_i W[i][j] v[i]`
    pub fn hidden_energy(&self, j: usize, v: ArrayView1<'_, f64>) -> RbmResult<f64> {
        self.check_visible(v.len())?;
        if j >= self.hidden() {
            return Err(RbmError::ShapeMismatch(format!(
                "hidden unit {j} out of range for {} hidden units",
                self.hidden()
            )));
        }
        Ok(self.bh[j] + self.w.column(j).dot(&v))
    }

    /// Visible unit activation energy: `bv[i] + Σ_j W[i][j] h[j]`
    pub fn visible_energy(&self, i: usize, h: ArrayView1<'_, f64>) -> RbmResult<f64> {
        if h.len() != self.hidden() {
            return Err(RbmError::ShapeMismatch(format!(
                "expected {} hidden values, got {}",
                self.hidden(),
                h.len()
            )));
        }
        if i >= self.visible() {
            return Err(RbmError::ShapeMismatch(format!(
                "visible unit {i} out of range for {} visible units",
                self.visible()
            )));
        }
        Ok(self.bv[i] + self.w.row(i).dot(&h))
    }

    /// Hidden activation probabilities `σ(e_h(j, v))` for every hidden unit.
    ///
    /// The result lives in the hidden scratch buffer; copy it before the next
    /// call on this model if it must be kept.
    pub fn hidden_probabilities(&mut self, v: ArrayView1<'_, f64>) -> RbmResult<&Array1<f64>> {
        self.check_visible(v.len())?;
        propagate_up(&self.w, &self.bh, v, &mut self.scratch.h);
        Ok(&self.scratch.h)
    }

    /// Hidden activation probabilities for every row of `data`.
    ///
    /// Returns a new `(rows, hidden)` matrix; the model is untouched.
    pub fn transform(&self, data: &Array2<f64>) -> RbmResult<Array2<f64>> {
        self.check_columns(data)?;
        let mut out = data.dot(&self.w);
        for mut row in out.rows_mut() {
            row += &self.bh;
        }
        out.mapv_inplace(sigmoid);
        Ok(out)
    }

    /// Run `steps` sweeps of alternating Gibbs sampling starting at `v0`.
    ///
    /// # Algorithm
    ///
    /// ```text
    /// for s in 0..steps:
    ///     h_j ~ Bernoulli(σ(e_h(j, v)))
    ///     v_i = unit_i.activate(e_v(i, h))
    ///     softmax over Softmax units, then v_i ~ Bernoulli(v_i) for each of them
    /// ```
    ///
    /// Returns borrows of the visible and hidden scratch buffers.
    pub fn reconstruct<R: Rng + ?Sized>(
        &mut self,
        v0: ArrayView1<'_, f64>,
        steps: usize,
        rng: &mut R,
    ) -> RbmResult<(&Array1<f64>, &Array1<f64>)> {
        self.check_visible(v0.len())?;
        self.scratch.v.assign(&v0);
        self.gibbs(steps, rng);
        Ok((&self.scratch.v, &self.scratch.h))
    }

    fn gibbs<R: Rng + ?Sized>(&mut self, steps: usize, rng: &mut R) {
        let Rbm {
            w,
            bv,
            bh,
            units,
            scratch,
            ..
        } = self;

        for _ in 0..steps {
            // Hidden states must be binary samples, not probabilities: a hidden
            // unit may convey at most one bit to the reconstruction.
            general_mat_vec_mul(1.0, &w.t(), &scratch.v, 0.0, &mut scratch.h);
            for (h, b) in scratch.h.iter_mut().zip(bh.iter()) {
                *h = bernoulli(sigmoid(*h + b), rng);
            }

            general_mat_vec_mul(1.0, &*w, &scratch.h, 0.0, &mut scratch.v);
            for ((v, b), unit) in scratch.v.iter_mut().zip(bv.iter()).zip(units.iter()) {
                *v = unit.activate(*v + b, rng);
            }

            softmax_masked(&mut scratch.v, units);
            for (v, unit) in scratch.v.iter_mut().zip(units.iter()) {
                if *unit == UnitType::Softmax {
                    *v = bernoulli(*v, rng);
                }
            }
        }
    }

    /// One contrastive-divergence step (CD-`steps`) on a single example.
    ///
    /// Accumulates into the mini-batch gradient:
    /// ```text
    /// dW[i][j] += h[j] v[i] - rh[j] rv[i]
    /// dbv[i]   += v[i] - rv[i]
    /// dbh[j]   += h[j] - rh[j]
    /// ```
    /// where `rv` is the Gibbs reconstruction of `v`, and `h`, `rh` are hidden
    /// probabilities (not samples) at `v` and `rv`.
    ///
    /// # Returns
    /// Squared reconstruction error `Σ_i (v[i] - rv[i])²`.
    pub fn contrastive_divergence<R: Rng + ?Sized>(
        &mut self,
        v: ArrayView1<'_, f64>,
        steps: usize,
        rng: &mut R,
    ) -> RbmResult<f64> {
        self.reconstruct(v, steps, rng)?;

        let Rbm {
            w,
            bh,
            grad,
            scratch,
            ..
        } = self;
        propagate_up(w, bh, v, &mut scratch.h);
        propagate_up(w, bh, scratch.v.view(), &mut scratch.rh);
        grad.accumulate(v, &scratch.v, &scratch.h, &scratch.rh);

        Ok(v
            .iter()
            .zip(scratch.v.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum())
    }

    /// Zero the gradient accumulators before a mini-batch.
    pub(crate) fn begin_batch(&mut self) {
        self.grad.reset();
    }

    /// Apply `θ += rate * (dθ - weight_decay * θ)` to every parameter.
    pub(crate) fn apply_update(&mut self, rate: f64, weight_decay: f64) {
        descend(&mut self.w, &self.grad.dw, rate, weight_decay);
        descend(&mut self.bv, &self.grad.dbv, rate, weight_decay);
        descend(&mut self.bh, &self.grad.dbh, rate, weight_decay);
    }

    /// Unsupervised training with mini-batch contrastive divergence.
    ///
    /// Rows of `data` are consumed in order, `opt.batch_size` at a time; the
    /// learning rate is divided by each batch's actual size. No shuffling is
    /// done here.
    ///
    /// # Errors
    /// - `ShapeMismatch` if `data` does not have `visible` columns
    /// - `InvalidConfig` if `opt` is invalid
    pub fn train<R: Rng + ?Sized>(
        &mut self,
        data: &Array2<f64>,
        opt: &TrainOption,
        rng: &mut R,
    ) -> RbmResult<Metrics> {
        self.check_columns(data)?;
        training::train_minibatches(data.nrows(), opt, rng, |batch, rng| {
            let size = batch.len();
            self.begin_batch();
            let mut error = 0.0;
            for i in batch {
                error += self.contrastive_divergence(data.row(i), opt.gibbs_step, rng)?;
            }
            self.apply_update(opt.learning_rate / size as f64, opt.weight_decay);
            Ok(error)
        })
    }

    fn check_visible(&self, len: usize) -> RbmResult<()> {
        if len != self.visible() {
            return Err(RbmError::ShapeMismatch(format!(
                "expected {} visible values, got {}",
                self.visible(),
                len
            )));
        }
        Ok(())
    }

    fn check_columns(&self, data: &Array2<f64>) -> RbmResult<()> {
        if data.ncols() != self.visible() {
            return Err(RbmError::ShapeMismatch(format!(
                "data has {} columns, model has {} visible units",
                data.ncols(),
                self.visible()
            )));
        }
        Ok(())
    }
}

impl BoltzmannMachine for Rbm {
    fn rbm(&self) -> &Rbm {
        self
    }

    fn rbm_mut(&mut self) -> &mut Rbm {
        self
    }
}

/// `out[j] = σ(bh[j] + Σ_i W[i][j] v[i])`
fn propagate_up(
    w: &Array2<f64>,
    bh: &Array1<f64>,
    v: ArrayView1<'_, f64>,
    out: &mut Array1<f64>,
) {
    general_mat_vec_mul(1.0, &w.t(), &v, 0.0, out);
    Zip::from(out).and(bh).for_each(|h, &b| *h = sigmoid(*h + b));
}

fn descend<D: Dimension>(
    param: &mut Array<f64, D>,
    delta: &Array<f64, D>,
    rate: f64,
    weight_decay: f64,
) {
    // Decay is scaled by the rate so that changing the rate does not change
    // the objective being optimized.
    Zip::from(param)
        .and(delta)
        .for_each(|p, &d| *p += rate * (d - weight_decay * *p));
}

fn check_parameters(
    visible: usize,
    hidden: usize,
    w: &Array2<f64>,
    bv: &Array1<f64>,
    bh: &Array1<f64>,
) -> RbmResult<()> {
    if w.dim() != (visible, hidden) || bv.len() != visible || bh.len() != hidden {
        return Err(RbmError::ShapeMismatch(format!(
            "expected W {visible}x{hidden}, bv {visible}, bh {hidden}; got W {}x{}, bv {}, bh {}",
            w.nrows(),
            w.ncols(),
            bv.len(),
            bh.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, array};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    /// Parameters so large that every draw is certain: h = 1, binary v = 0.
    fn saturated(units: Vec<UnitType>) -> Rbm {
        let visible = units.len();
        Rbm::from_parameters(
            units,
            Array2::zeros((visible, 1)),
            Array1::from_elem(visible, -100.0),
            array![100.0],
        )
        .unwrap()
    }

    #[test]
    fn test_rbm_init() {
        let rbm = Rbm::binary(4, 3, &mut rng());
        assert_eq!(rbm.visible(), 4);
        assert_eq!(rbm.hidden(), 3);
        assert_eq!(rbm.weights().dim(), (4, 3));
        assert!(rbm.visible_bias().iter().all(|&b| b == 0.0));
        assert!(rbm.hidden_bias().iter().all(|&b| b == 0.0));
        assert!(rbm.weights().iter().all(|w| w.abs() < 0.1));
        assert!(rbm.units().iter().all(|u| *u == UnitType::Binary));
    }

    #[test]
    fn test_gaussian_units() {
        let rbm = Rbm::gaussian(2, 5, &mut rng());
        assert_eq!(rbm.units(), &[UnitType::Gaussian, UnitType::Gaussian]);
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = Rbm::binary(3, 2, &mut rng());
        let b = Rbm::binary(3, 2, &mut rng());
        assert_eq!(a, b);
    }

    #[test]
    fn test_energies() {
        let mut rbm = Rbm::binary(2, 3, &mut rng());
        rbm.set_parameters(
            arr2(&[[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]),
            array![0.01, 0.02],
            array![1.0, 2.0, 3.0],
        )
        .unwrap();

        let v = array![1.0, 2.0];
        // 2.0 + 0.2*1 + 0.5*2
        let e = rbm.hidden_energy(1, v.view()).unwrap();
        assert!((e - 3.2).abs() < 1e-12);

        let h = array![1.0, 0.0, 1.0];
        // 0.02 + 0.4 + 0.6
        let e = rbm.visible_energy(1, h.view()).unwrap();
        assert!((e - 1.02).abs() < 1e-12);

        let ph = rbm.hidden_probabilities(v.view()).unwrap().clone();
        assert!((ph[1] - sigmoid(3.2)).abs() < 1e-12);
    }

    #[test]
    fn test_energy_index_out_of_range() {
        let rbm = Rbm::binary(2, 3, &mut rng());
        assert!(rbm.hidden_energy(3, array![0.0, 0.0].view()).is_err());
        assert!(rbm.visible_energy(2, array![0.0, 0.0, 0.0].view()).is_err());
    }

    #[test]
    fn test_transform_matches_hidden_probabilities() {
        let mut rbm = Rbm::binary(3, 2, &mut rng());
        let data = arr2(&[[1.0, 0.0, 1.0], [0.0, 1.0, 0.5]]);
        let out = rbm.transform(&data).unwrap();
        assert_eq!(out.dim(), (2, 2));
        for (i, row) in data.rows().into_iter().enumerate() {
            let ph = rbm.hidden_probabilities(row).unwrap();
            for j in 0..2 {
                assert!((out[[i, j]] - ph[j]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_reconstruct_shape_mismatch() {
        let mut rbm = Rbm::binary(4, 3, &mut rng());
        let v = array![1.0, 0.0];
        assert!(matches!(
            rbm.reconstruct(v.view(), 1, &mut rng()),
            Err(RbmError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_reconstruct_binary_values() {
        let mut r = rng();
        let mut rbm = Rbm::binary(4, 3, &mut r);
        let v = array![1.0, 0.0, 1.0, 0.0];
        let (rv, h) = rbm.reconstruct(v.view(), 3, &mut r).unwrap();
        assert!(rv.iter().all(|&x| x == 0.0 || x == 1.0));
        assert!(h.iter().all(|&x| x == 0.0 || x == 1.0));
    }

    #[test]
    fn test_reconstruct_saturated_is_deterministic() {
        let mut rbm = saturated(vec![UnitType::Binary; 3]);
        let v = array![1.0, 1.0, 0.0];
        let (rv, h) = rbm.reconstruct(v.view(), 2, &mut rng()).unwrap();
        assert_eq!(rv, &array![0.0, 0.0, 0.0]);
        assert_eq!(h, &array![1.0]);
    }

    #[test]
    fn test_reconstruct_softmax_units_binary() {
        let units = vec![
            UnitType::Binary,
            UnitType::Softmax,
            UnitType::Softmax,
            UnitType::Softmax,
        ];
        let mut r = rng();
        let mut rbm = Rbm::with_units(units, 2, &mut r);
        for _ in 0..20 {
            let (rv, _) = rbm
                .reconstruct(array![1.0, 0.0, 1.0, 0.0].view(), 1, &mut r)
                .unwrap();
            assert!(rv.iter().all(|&x| x == 0.0 || x == 1.0));
        }
    }

    #[test]
    fn test_zero_steps_returns_input() {
        let mut rbm = Rbm::gaussian(2, 2, &mut rng());
        let v = array![0.25, -1.5];
        let (rv, _) = rbm.reconstruct(v.view(), 0, &mut rng()).unwrap();
        assert_eq!(rv, &v);
    }

    #[test]
    fn test_cd_update_saturated() {
        // h = rh = 1, rv = 0: dW = v, dbv = v, dbh = 0
        let mut rbm = saturated(vec![UnitType::Binary; 2]);
        let v = array![1.0, 0.0];
        rbm.begin_batch();
        let err = rbm
            .contrastive_divergence(v.view(), 1, &mut rng())
            .unwrap();
        assert!((err - 1.0).abs() < 1e-12);
        assert_eq!(rbm.grad.dw, arr2(&[[1.0], [0.0]]));
        assert_eq!(rbm.grad.dbv, array![1.0, 0.0]);
        assert_eq!(rbm.grad.dbh, array![0.0]);

        rbm.apply_update(0.5, 0.0);
        assert_eq!(rbm.weights(), &arr2(&[[0.5], [0.0]]));
        assert_eq!(rbm.visible_bias(), &array![-99.5, -100.0]);
        assert_eq!(rbm.hidden_bias(), &array![100.0]);
    }

    #[test]
    fn test_cd_uses_hidden_probabilities() {
        // zero parameters: p(h = 1 | v) = 0.5 for any v
        let mut rbm = Rbm::from_parameters(
            vec![UnitType::Binary; 3],
            Array2::zeros((3, 2)),
            Array1::zeros(3),
            Array1::zeros(2),
        )
        .unwrap();
        let v = array![1.0, 0.0, 1.0];
        rbm.begin_batch();
        rbm.contrastive_divergence(v.view(), 1, &mut rng()).unwrap();

        assert_eq!(rbm.scratch.h, array![0.5, 0.5]);
        assert_eq!(rbm.scratch.rh, array![0.5, 0.5]);
        assert_eq!(rbm.grad.dbh, array![0.0, 0.0]);
        let rv = rbm.scratch.v.clone();
        for ((i, j), d) in rbm.grad.dw.indexed_iter() {
            assert_eq!(*d, 0.5 * (v[i] - rv[i]), "dW[{i}][{j}]");
        }
    }

    #[test]
    fn test_weight_decay_shrinks_parameters() {
        let mut rbm = saturated(vec![UnitType::Binary; 1]);
        rbm.begin_batch();
        rbm.apply_update(0.1, 0.01);
        // bv: -100 + 0.1 * (0 - 0.01 * -100)
        assert!((rbm.visible_bias()[0] - (-99.9)).abs() < 1e-9);
        assert!((rbm.hidden_bias()[0] - 99.9).abs() < 1e-9);
    }

    #[test]
    fn test_gradient_accumulates_across_examples() {
        let mut rbm = saturated(vec![UnitType::Binary; 2]);
        let mut r = rng();
        rbm.begin_batch();
        for _ in 0..3 {
            rbm.contrastive_divergence(array![1.0, 1.0].view(), 1, &mut r)
                .unwrap();
        }
        assert_eq!(rbm.grad.dbv, array![3.0, 3.0]);
        rbm.begin_batch();
        assert_eq!(rbm.grad.dbv, array![0.0, 0.0]);
    }

    #[test]
    fn test_train_rejects_wrong_columns() {
        let mut rbm = Rbm::binary(3, 2, &mut rng());
        let data = Array2::zeros((4, 2));
        let opt = TrainOption::new(2, 1, 1);
        assert!(matches!(
            rbm.train(&data, &opt, &mut rng()),
            Err(RbmError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_train_zero_iterations_is_noop() {
        let mut r = rng();
        let mut rbm = Rbm::binary(3, 2, &mut r);
        let before = rbm.clone();
        let data = Array2::ones((4, 3));
        let metrics = rbm.train(&data, &TrainOption::new(2, 0, 1), &mut r).unwrap();
        assert_eq!(metrics.epochs, 0);
        assert_eq!(rbm, before);
    }

    #[test]
    fn test_set_parameters_shape_checked() {
        let mut rbm = Rbm::binary(2, 2, &mut rng());
        let res = rbm.set_parameters(Array2::zeros((2, 3)), Array1::zeros(2), Array1::zeros(2));
        assert!(res.is_err());
        assert!(Rbm::from_parameters(
            vec![UnitType::Binary; 3],
            Array2::zeros((2, 2)),
            Array1::zeros(2),
            Array1::zeros(2)
        )
        .is_err());
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut r = rng();
        let mut rbm = Rbm::binary(3, 2, &mut r);
        let data = Array2::ones((2, 3));
        rbm.train(&data, &TrainOption::new(2, 5, 1), &mut r).unwrap();
        rbm.reset(&mut r);
        assert!(rbm.visible_bias().iter().all(|&b| b == 0.0));
        assert!(rbm.hidden_bias().iter().all(|&b| b == 0.0));
        assert!(rbm.weights().iter().all(|w| w.abs() < 0.1));
    }
}
