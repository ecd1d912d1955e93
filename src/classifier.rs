//! Label-augmented RBM classifier.
//!
//! The visible layer is `[features | one-hot label]`: the first `input` units
//! are binary, the last `output` units are a softmax group. A label is
//! inferred by clamping each candidate in turn and picking the configuration
//! with the lowest free energy:
//!
//! ```text
//! F(v) = -Σ_{i ∈ label} bv[i] v[i] - Σ_j softplus(e_h(j, v))
//! ```

use crate::core::{BoltzmannMachine, Rbm, RbmError, RbmResult, UnitType};
use crate::training::{self, Metrics};
use crate::utils::softplus;
use crate::TrainOption;
use ndarray::{s, Array1, Array2, ArrayView1};
use rand::Rng;

/// An RBM that jointly models input features and a class label.
#[derive(Debug, Clone, PartialEq)]
pub struct Classifier {
    rbm: Rbm,
    input: usize,
    output: usize,
    /// Scratch visible vector built by [`Classifier::vis`]
    joint: Array1<f64>,
}

impl Classifier {
    /// Create a classifier with `input` features, `output` classes and
    /// `hidden` hidden units.
    ///
    /// # Errors
    /// - `InvalidConfig` if `output` is zero
    pub fn new<R: Rng + ?Sized>(
        input: usize,
        output: usize,
        hidden: usize,
        rng: &mut R,
    ) -> RbmResult<Self> {
        check_output(output)?;
        let rbm = Rbm::with_units(units(input, output), hidden, rng);
        Ok(Self::wrap(rbm, input, output))
    }

    /// Restore a classifier from stored parameters.
    ///
    /// # Errors
    /// - `InvalidConfig` if `output` is zero
    /// - `ShapeMismatch` if the arrays do not describe `input + output` visible units
    pub fn from_parameters(
        input: usize,
        output: usize,
        w: Array2<f64>,
        bv: Array1<f64>,
        bh: Array1<f64>,
    ) -> RbmResult<Self> {
        check_output(output)?;
        let rbm = Rbm::from_parameters(units(input, output), w, bv, bh)?;
        Ok(Self::wrap(rbm, input, output))
    }

    fn wrap(rbm: Rbm, input: usize, output: usize) -> Self {
        Self {
            rbm,
            input,
            output,
            joint: Array1::zeros(input + output),
        }
    }

    /// Number of input features.
    pub fn input(&self) -> usize {
        self.input
    }

    /// Number of classes.
    pub fn output(&self) -> usize {
        self.output
    }

    /// Build the visible vector for `input` with `label` one-hot encoded.
    ///
    /// Overwrites and returns the classifier's scratch visible buffer.
    pub fn vis(&mut self, input: ArrayView1<'_, f64>, label: usize) -> RbmResult<&Array1<f64>> {
        self.check_input(input.len())?;
        self.check_label(label)?;
        encode(&mut self.joint, input, label, self.input);
        Ok(&self.joint)
    }

    /// Free energy of a full visible configuration; lower is more probable.
    pub fn free_energy(&self, v: ArrayView1<'_, f64>) -> RbmResult<f64> {
        let visible = self.rbm.visible();
        if v.len() != visible {
            return Err(RbmError::ShapeMismatch(format!(
                "expected {} visible values, got {}",
                visible,
                v.len()
            )));
        }

        let bv = self.rbm.visible_bias();
        let label_term: f64 = (self.input..visible).map(|i| bv[i] * v[i]).sum();

        let mut eh = v.dot(self.rbm.weights());
        eh += self.rbm.hidden_bias();
        let hidden_term: f64 = eh.iter().map(|&e| softplus(e)).sum();

        Ok(-label_term - hidden_term)
    }

    /// Train on `inputs` rows paired with class `labels`.
    ///
    /// Same batching as [`Rbm::train`], with each example clamped as
    /// `vis(input, label)`.
    ///
    /// # Errors
    /// - `ShapeMismatch` if `inputs` does not have `input` columns or `labels` has a different length
    /// - `InvalidConfig` if a label is out of range or `opt` is invalid
    pub fn train<R: Rng + ?Sized>(
        &mut self,
        inputs: &Array2<f64>,
        labels: &[usize],
        opt: &TrainOption,
        rng: &mut R,
    ) -> RbmResult<Metrics> {
        self.check_input(inputs.ncols())?;
        if labels.len() != inputs.nrows() {
            return Err(RbmError::ShapeMismatch(format!(
                "{} input rows but {} labels",
                inputs.nrows(),
                labels.len()
            )));
        }
        for &label in labels {
            self.check_label(label)?;
        }

        let Classifier {
            rbm, input, joint, ..
        } = self;
        training::train_minibatches(inputs.nrows(), opt, rng, |batch, rng| {
            let size = batch.len();
            rbm.begin_batch();
            let mut error = 0.0;
            for i in batch {
                encode(joint, inputs.row(i), labels[i], *input);
                error += rbm.contrastive_divergence(joint.view(), opt.gibbs_step, rng)?;
            }
            rbm.apply_update(opt.learning_rate / size as f64, opt.weight_decay);
            Ok(error)
        })
    }

    /// Label with the lowest free energy for `input`; ties go to the smaller label.
    pub fn classify(&mut self, input: ArrayView1<'_, f64>) -> RbmResult<usize> {
        self.check_input(input.len())?;

        let mut best = 0;
        let mut min = f64::INFINITY;
        for label in 0..self.output {
            encode(&mut self.joint, input, label, self.input);
            let e = self.free_energy(self.joint.view())?;
            if label == 0 || e < min {
                best = label;
                min = e;
            }
        }
        Ok(best)
    }

    fn check_input(&self, len: usize) -> RbmResult<()> {
        if len != self.input {
            return Err(RbmError::ShapeMismatch(format!(
                "expected {} input features, got {}",
                self.input, len
            )));
        }
        Ok(())
    }

    fn check_label(&self, label: usize) -> RbmResult<()> {
        if label >= self.output {
            return Err(RbmError::InvalidConfig(format!(
                "label {} out of range for {} classes",
                label, self.output
            )));
        }
        Ok(())
    }
}

impl BoltzmannMachine for Classifier {
    fn rbm(&self) -> &Rbm {
        &self.rbm
    }

    fn rbm_mut(&mut self) -> &mut Rbm {
        &mut self.rbm
    }
}

fn units(input: usize, output: usize) -> Vec<UnitType> {
    let mut units = vec![UnitType::Binary; input];
    units.extend(std::iter::repeat(UnitType::Softmax).take(output));
    units
}

fn check_output(output: usize) -> RbmResult<()> {
    if output == 0 {
        return Err(RbmError::InvalidConfig(
            "classifier needs at least one output class".to_string(),
        ));
    }
    Ok(())
}

/// `joint = [input | one_hot(label)]`
fn encode(joint: &mut Array1<f64>, input: ArrayView1<'_, f64>, label: usize, input_dim: usize) {
    joint.slice_mut(s![..input_dim]).assign(&input);
    let mut one_hot = joint.slice_mut(s![input_dim..]);
    one_hot.fill(0.0);
    one_hot[label] = 1.0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, array};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    #[test]
    fn test_classifier_units() {
        let c = Classifier::new(2, 3, 4, &mut rng()).unwrap();
        assert_eq!(c.input(), 2);
        assert_eq!(c.output(), 3);
        assert_eq!(c.visible(), 5);
        assert_eq!(c.hidden(), 4);
        assert_eq!(
            c.rbm().units(),
            &[
                UnitType::Binary,
                UnitType::Binary,
                UnitType::Softmax,
                UnitType::Softmax,
                UnitType::Softmax
            ]
        );
    }

    #[test]
    fn test_zero_classes_rejected() {
        assert!(matches!(
            Classifier::new(2, 0, 3, &mut rng()),
            Err(RbmError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_vis_one_hot() {
        let mut c = Classifier::new(2, 3, 2, &mut rng()).unwrap();
        let v = c.vis(array![0.5, 1.0].view(), 1).unwrap();
        assert_eq!(v, &array![0.5, 1.0, 0.0, 1.0, 0.0]);
        let v = c.vis(array![0.0, 0.0].view(), 2).unwrap();
        assert_eq!(v, &array![0.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(v.iter().skip(2).filter(|&&x| x == 1.0).count(), 1);
    }

    #[test]
    fn test_vis_rejects_bad_label() {
        let mut c = Classifier::new(2, 2, 2, &mut rng()).unwrap();
        assert!(c.vis(array![0.0, 0.0].view(), 2).is_err());
        assert!(c.vis(array![0.0].view(), 0).is_err());
    }

    #[test]
    fn test_free_energy_known_parameters() {
        // one input, two labels, one hidden unit
        let c = Classifier::from_parameters(
            1,
            2,
            arr2(&[[1.0], [0.5], [-0.5]]),
            array![0.0, 0.2, -0.3],
            array![0.1],
        )
        .unwrap();

        let v = array![1.0, 1.0, 0.0];
        // -(0.2) - softplus(0.1 + 1.0 + 0.5)
        let expected = -0.2 - (1.0 + 1.6f64.exp()).ln();
        let e = c.free_energy(v.view()).unwrap();
        assert!((e - expected).abs() < 1e-12);
    }

    #[test]
    fn test_classify_prefers_lower_free_energy() {
        let mut c = Classifier::from_parameters(
            1,
            2,
            arr2(&[[0.0], [-2.0], [2.0]]),
            array![0.0, 0.0, 0.0],
            array![0.0],
        )
        .unwrap();
        assert_eq!(c.classify(array![1.0].view()).unwrap(), 1);
    }

    #[test]
    fn test_classify_tie_goes_to_first_label() {
        let mut c = Classifier::from_parameters(
            1,
            3,
            Array2::zeros((4, 2)),
            Array1::zeros(4),
            Array1::zeros(2),
        )
        .unwrap();
        assert_eq!(c.classify(array![1.0].view()).unwrap(), 0);
    }

    #[test]
    fn test_train_rejects_mismatched_labels() {
        let mut r = rng();
        let mut c = Classifier::new(2, 2, 3, &mut r).unwrap();
        let inputs = arr2(&[[0.0, 0.0], [1.0, 1.0]]);
        let opt = TrainOption::new(2, 1, 1);
        assert!(matches!(
            c.train(&inputs, &[0], &opt, &mut r),
            Err(RbmError::ShapeMismatch(_))
        ));
        assert!(matches!(
            c.train(&inputs, &[0, 5], &opt, &mut r),
            Err(RbmError::InvalidConfig(_))
        ));
    }
}
