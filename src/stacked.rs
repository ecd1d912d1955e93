//! Stacked classifier: greedy layer-wise pretrained RBMs topped by a
//! [`Classifier`].
//!
//! ```text
//! input -> [Gaussian RBM]? -> [binary RBM]* -> Classifier -> label
//! ```
//!
//! Each feature layer is trained unsupervised on the hidden probabilities of
//! the layer below; only deterministic probabilities flow upward and there is
//! no global fine-tuning pass.

use crate::classifier::Classifier;
use crate::core::{BoltzmannMachine, Rbm, RbmError, RbmResult};
use crate::training::Metrics;
use crate::TrainOption;
use ndarray::{Array2, ArrayView1};
use rand::Rng;
use std::io::{BufRead, Write};

/// A deep belief network used as a classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct StackedClassifier {
    gaussian: Option<Rbm>,
    binary: Vec<Rbm>,
    classifier: Classifier,
}

impl StackedClassifier {
    /// Build a stack from a list of unit counts.
    ///
    /// The last three counts are the classifier's `(input, output, hidden)`.
    /// Every preceding adjacent pair `(units[i], units[i + 1])` is one feature
    /// layer; the first is a Gaussian RBM when `with_gaussian` is set, the
    /// rest are binary.
    ///
    /// # Errors
    /// - `InvalidConfig` if fewer than 3 unit counts are given or the
    ///   classifier has no output classes
    pub fn new<R: Rng + ?Sized>(
        with_gaussian: bool,
        units: &[usize],
        rng: &mut R,
    ) -> RbmResult<Self> {
        if units.len() < 3 {
            return Err(RbmError::InvalidConfig(format!(
                "not enough layers specified for stacked classifier: need at least 3 unit counts, got {}",
                units.len()
            )));
        }

        let n = units.len();
        let mut gaussian = None;
        let mut binary = Vec::with_capacity(n - 3);
        for i in 0..n - 3 {
            if with_gaussian && i == 0 {
                gaussian = Some(Rbm::gaussian(units[i], units[i + 1], rng));
            } else {
                binary.push(Rbm::binary(units[i], units[i + 1], rng));
            }
        }
        let classifier = Classifier::new(units[n - 3], units[n - 2], units[n - 1], rng)?;

        Ok(Self {
            gaussian,
            binary,
            classifier,
        })
    }

    /// Assemble a stack from existing layers.
    ///
    /// # Errors
    /// - `ShapeMismatch` if a layer's hidden count differs from the next
    ///   layer's visible (or the classifier's input) count
    pub fn from_parts(
        gaussian: Option<Rbm>,
        binary: Vec<Rbm>,
        classifier: Classifier,
    ) -> RbmResult<Self> {
        let stack = Self {
            gaussian,
            binary,
            classifier,
        };

        let mut features: Option<usize> = None;
        for (depth, layer) in stack.layers().enumerate() {
            if let Some(expected) = features {
                if layer.visible() != expected {
                    return Err(RbmError::ShapeMismatch(format!(
                        "layer {depth} has {} visible units but the layer below outputs {expected}",
                        layer.visible()
                    )));
                }
            }
            features = Some(layer.hidden());
        }
        if let Some(expected) = features {
            if stack.classifier.input() != expected {
                return Err(RbmError::ShapeMismatch(format!(
                    "classifier takes {} inputs but the layer below outputs {expected}",
                    stack.classifier.input()
                )));
            }
        }

        Ok(stack)
    }

    /// Feature layers in forward order (Gaussian first, if any).
    pub fn layers(&self) -> impl Iterator<Item = &Rbm> {
        self.gaussian.iter().chain(self.binary.iter())
    }

    fn layers_mut(&mut self) -> impl Iterator<Item = &mut Rbm> {
        self.gaussian.iter_mut().chain(self.binary.iter_mut())
    }

    pub fn gaussian(&self) -> Option<&Rbm> {
        self.gaussian.as_ref()
    }

    pub fn binary(&self) -> &[Rbm] {
        &self.binary
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Width of the raw feature vectors the stack accepts.
    pub fn input(&self) -> usize {
        self.layers()
            .next()
            .map_or(self.classifier.input(), |layer| layer.visible())
    }

    /// Number of classes.
    pub fn output(&self) -> usize {
        self.classifier.output()
    }

    /// Greedy layer-wise training.
    ///
    /// Each feature layer is trained on the current inputs, which are then
    /// replaced by that layer's hidden probabilities; the classifier is
    /// finally trained on the top-level features against `labels`.
    ///
    /// # Returns
    /// One [`Metrics`] per layer, classifier last.
    ///
    /// # Errors
    /// - `ShapeMismatch` if `inputs` has the wrong width or `labels` the wrong length
    /// - `InvalidConfig` if a label is out of range or `opt` is invalid
    pub fn train<R: Rng + ?Sized>(
        &mut self,
        inputs: &Array2<f64>,
        labels: &[usize],
        opt: &TrainOption,
        rng: &mut R,
    ) -> RbmResult<Vec<Metrics>> {
        opt.validate()?;
        if inputs.ncols() != self.input() {
            return Err(RbmError::ShapeMismatch(format!(
                "inputs have {} columns, stack expects {}",
                inputs.ncols(),
                self.input()
            )));
        }
        if labels.len() != inputs.nrows() {
            return Err(RbmError::ShapeMismatch(format!(
                "{} input rows but {} labels",
                inputs.nrows(),
                labels.len()
            )));
        }
        if let Some(&label) = labels.iter().find(|&&l| l >= self.output()) {
            return Err(RbmError::InvalidConfig(format!(
                "label {label} out of range for {} classes",
                self.output()
            )));
        }

        let mut metrics = Vec::new();
        let mut features = inputs.to_owned();
        for (depth, layer) in self.layers_mut().enumerate() {
            log::info!(
                "pretraining layer {}: {} -> {} units",
                depth,
                layer.visible(),
                layer.hidden()
            );
            metrics.push(layer.train(&features, opt, rng)?);
            features = layer.transform(&features)?;
        }

        log::info!(
            "training classifier: {} inputs, {} classes",
            self.classifier.input(),
            self.classifier.output()
        );
        metrics.push(self.classifier.train(&features, labels, opt, rng)?);
        Ok(metrics)
    }

    /// Propagate `input` through every feature layer and classify the result.
    pub fn classify(&mut self, input: ArrayView1<'_, f64>) -> RbmResult<usize> {
        let mut features = input.to_owned();
        for layer in self.layers_mut() {
            features = layer.hidden_probabilities(features.view())?.to_owned();
        }
        self.classifier.classify(features.view())
    }

    /// Write every layer back-to-back in the flat text layout.
    pub fn write_to<W: Write>(&self, out: &mut W) -> RbmResult<()> {
        for layer in self.layers() {
            layer.write_to(out)?;
        }
        self.classifier.write_to(out)
    }

    /// Read every layer in construction order; the topology must already match.
    pub fn read_from<B: BufRead>(&mut self, input: &mut B) -> RbmResult<()> {
        for layer in self.layers_mut() {
            layer.read_from(input)?;
        }
        self.classifier.read_from(input)
    }
}
