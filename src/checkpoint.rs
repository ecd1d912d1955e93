//! Model persistence.
//!
//! Two formats are supported:
//!
//! - **Flat text**, one RBM after another with no delimiter:
//!   ```text
//!   <visible> <hidden>
//!   <bv[0]> ... <bv[V-1]>
//!   <bh[0]> ... <bh[H-1]>
//!   <W[i][0]> ... <W[i][H-1]>      (one line per visible unit)
//!   ```
//!   The reader must know the topology in advance.
//! - **JSON checkpoints** of a whole [`StackedClassifier`], which also store
//!   the topology so the model can be rebuilt from the file alone.

use crate::classifier::Classifier;
use crate::core::{BoltzmannMachine, Rbm, RbmError, RbmResult, UnitType};
use crate::stacked::StackedClassifier;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::io::{BufRead, Write};
use std::path::Path;
use std::str::FromStr;

fn write_row<'a, W: Write>(out: &mut W, values: impl Iterator<Item = &'a f64>) -> RbmResult<()> {
    for (i, v) in values.enumerate() {
        if i > 0 {
            write!(out, " ")?;
        }
        // `Display` for f64 prints the shortest string that parses back exactly
        write!(out, "{v}")?;
    }
    writeln!(out)?;
    Ok(())
}

/// Write one RBM in the flat text layout.
pub fn write_rbm<W: Write>(rbm: &Rbm, out: &mut W) -> RbmResult<()> {
    writeln!(out, "{} {}", rbm.visible(), rbm.hidden())?;
    write_row(out, rbm.visible_bias().iter())?;
    write_row(out, rbm.hidden_bias().iter())?;
    for row in rbm.weights().rows() {
        write_row(out, row.iter())?;
    }
    Ok(())
}

/// Read one RBM in the flat text layout into `rbm`.
///
/// Consumes exactly the tokens of this model, so several models can be read
/// back-to-back from one stream. Parameters are replaced only once the whole
/// model has been parsed.
///
/// # Errors
/// - `ShapeMismatch` if the declared counts differ from `rbm`'s dimensions
/// - `Parse` on malformed or truncated input
pub fn read_rbm<B: BufRead>(rbm: &mut Rbm, input: &mut B) -> RbmResult<()> {
    let visible: usize = next_value(input, "visible count")?;
    let hidden: usize = next_value(input, "hidden count")?;
    if (visible, hidden) != (rbm.visible(), rbm.hidden()) {
        return Err(RbmError::ShapeMismatch(format!(
            "stored model is {visible}x{hidden}, target is {}x{}",
            rbm.visible(),
            rbm.hidden()
        )));
    }

    let mut bv = Array1::zeros(visible);
    for b in bv.iter_mut() {
        *b = next_value(input, "visible bias")?;
    }
    let mut bh = Array1::zeros(hidden);
    for b in bh.iter_mut() {
        *b = next_value(input, "hidden bias")?;
    }
    let mut w = Array2::zeros((visible, hidden));
    for x in w.iter_mut() {
        *x = next_value(input, "weight")?;
    }

    rbm.set_parameters(w, bv, bh)
}

/// Next whitespace-delimited token, consuming at most one trailing delimiter.
fn next_token<B: BufRead>(input: &mut B) -> RbmResult<Option<String>> {
    let mut token = Vec::new();
    loop {
        let buf = input.fill_buf()?;
        if buf.is_empty() {
            break;
        }

        let mut used = 0;
        let mut done = false;
        for &byte in buf {
            used += 1;
            if byte.is_ascii_whitespace() {
                if token.is_empty() {
                    continue;
                }
                done = true;
                break;
            }
            token.push(byte);
        }
        input.consume(used);
        if done {
            break;
        }
    }

    if token.is_empty() {
        return Ok(None);
    }
    String::from_utf8(token)
        .map(Some)
        .map_err(|e| RbmError::Parse(format!("invalid UTF-8 in model data: {e}")))
}

fn next_value<T, B>(input: &mut B, what: &str) -> RbmResult<T>
where
    T: FromStr,
    T::Err: Display,
    B: BufRead,
{
    let token = next_token(input)?
        .ok_or_else(|| RbmError::Parse(format!("unexpected end of input reading {what}")))?;
    token
        .parse()
        .map_err(|e| RbmError::Parse(format!("invalid {what} {token:?}: {e}")))
}

/// Serializable parameters of one RBM layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerData {
    /// Unit type of every visible unit.
    pub units: Vec<UnitType>,
    /// Visible bias vector.
    pub visible_bias: Vec<f64>,
    /// Hidden bias vector.
    pub hidden_bias: Vec<f64>,
    /// Weight matrix as rows of visible units.
    pub weights: Vec<Vec<f64>>,
}

impl LayerData {
    fn from_rbm(rbm: &Rbm) -> Self {
        Self {
            units: rbm.units().to_vec(),
            visible_bias: rbm.visible_bias().to_vec(),
            hidden_bias: rbm.hidden_bias().to_vec(),
            weights: array2_to_vecs(rbm.weights()),
        }
    }

    fn parameters(self) -> RbmResult<(Vec<UnitType>, Array2<f64>, Array1<f64>, Array1<f64>)> {
        let w = vecs_to_array2(&self.weights, self.visible_bias.len(), self.hidden_bias.len())?;
        Ok((
            self.units,
            w,
            Array1::from(self.visible_bias),
            Array1::from(self.hidden_bias),
        ))
    }

    fn into_rbm(self) -> RbmResult<Rbm> {
        let (units, w, bv, bh) = self.parameters()?;
        Rbm::from_parameters(units, w, bv, bh)
    }
}

/// Serializable snapshot of a [`StackedClassifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointData {
    /// Gaussian input layer, if the stack has one.
    pub gaussian: Option<LayerData>,
    /// Binary feature layers in forward order.
    pub binary: Vec<LayerData>,
    /// Classifier input feature count.
    pub classifier_input: usize,
    /// Classifier class count.
    pub classifier_output: usize,
    /// Classifier parameters.
    pub classifier: LayerData,
}

impl CheckpointData {
    pub fn from_model(model: &StackedClassifier) -> Self {
        let classifier = model.classifier();
        Self {
            gaussian: model.gaussian().map(LayerData::from_rbm),
            binary: model.binary().iter().map(LayerData::from_rbm).collect(),
            classifier_input: classifier.input(),
            classifier_output: classifier.output(),
            classifier: LayerData::from_rbm(classifier.rbm()),
        }
    }

    pub fn into_model(self) -> RbmResult<StackedClassifier> {
        let gaussian = self.gaussian.map(LayerData::into_rbm).transpose()?;
        let binary = self
            .binary
            .into_iter()
            .map(LayerData::into_rbm)
            .collect::<RbmResult<Vec<_>>>()?;
        let (_, w, bv, bh) = self.classifier.parameters()?;
        let classifier =
            Classifier::from_parameters(self.classifier_input, self.classifier_output, w, bv, bh)?;
        StackedClassifier::from_parts(gaussian, binary, classifier)
    }
}

/// Convert an Array2 to Vec<Vec<f64>> for serialization.
fn array2_to_vecs(arr: &Array2<f64>) -> Vec<Vec<f64>> {
    arr.rows().into_iter().map(|row| row.to_vec()).collect()
}

/// Convert Vec<Vec<f64>> back to a `(rows, cols)` Array2.
fn vecs_to_array2(vecs: &[Vec<f64>], rows: usize, cols: usize) -> RbmResult<Array2<f64>> {
    if vecs.len() != rows || vecs.iter().any(|r| r.len() != cols) {
        return Err(RbmError::ShapeMismatch(format!(
            "weight matrix is not {rows}x{cols}"
        )));
    }
    let flat: Vec<f64> = vecs.iter().flat_map(|r| r.iter().copied()).collect();
    Array2::from_shape_vec((rows, cols), flat)
        .map_err(|e| RbmError::ShapeMismatch(format!("failed to rebuild weight matrix: {e}")))
}

/// Save a stacked classifier, topology included, to a JSON file.
///
/// Parent directories are created as needed.
pub fn save_checkpoint(model: &StackedClassifier, path: &Path) -> RbmResult<()> {
    let data = CheckpointData::from_model(model);
    let json = serde_json::to_string_pretty(&data)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)?;
    log::info!("saved checkpoint to {}", path.display());
    Ok(())
}

/// Load a stacked classifier saved by [`save_checkpoint`].
pub fn load_checkpoint(path: &Path) -> RbmResult<StackedClassifier> {
    let json = std::fs::read_to_string(path)?;
    let data: CheckpointData = serde_json::from_str(&json)?;
    data.into_model()
}
