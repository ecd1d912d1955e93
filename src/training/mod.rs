//! Mini-batch training loop and metrics.
//!
//! Every model trains with the same protocol: `iteration` passes over the
//! data, each split into contiguous chunks of `batch_size` examples (the last
//! chunk may be shorter). The per-batch work is supplied by the model.

use crate::core::RbmResult;
use crate::TrainOption;
use rand::Rng;
use std::ops::Range;

/// Metrics computed during training.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    /// Completed passes over the data
    pub epochs: usize,
    /// Examples per pass
    pub examples: usize,
    /// Mean squared reconstruction error per example over the last pass
    pub reconstruction_error: f64,
}

/// Contiguous mini-batch ranges covering `0..len`.
pub fn batches(len: usize, batch_size: usize) -> impl Iterator<Item = Range<usize>> {
    let step = batch_size.max(1);
    (0..len)
        .step_by(step)
        .map(move |start| start..(start + step).min(len))
}

/// Drive `opt.iteration` epochs of mini-batch training over `len` examples.
///
/// `minibatch` receives the example indices of one batch and must reset the
/// gradient, run a CD step per example and apply the update. It returns the
/// summed squared reconstruction error of the batch.
///
/// # Errors
/// - `InvalidConfig` if `opt` is invalid; errors from `minibatch` abort training
pub fn train_minibatches<R, F>(
    len: usize,
    opt: &TrainOption,
    rng: &mut R,
    mut minibatch: F,
) -> RbmResult<Metrics>
where
    R: Rng + ?Sized,
    F: FnMut(Range<usize>, &mut R) -> RbmResult<f64>,
{
    opt.validate()?;
    log::info!(
        "training CD-{} for {} epochs on {} examples (batch size {})",
        opt.gibbs_step,
        opt.iteration,
        len,
        opt.batch_size
    );

    let mut metrics = Metrics {
        epochs: 0,
        examples: len,
        reconstruction_error: 0.0,
    };

    for epoch in 0..opt.iteration {
        let mut total_error = 0.0;
        for batch in batches(len, opt.batch_size) {
            log::trace!("epoch {} batch {:?}", epoch + 1, batch);
            total_error += minibatch(batch, rng)?;
        }

        metrics.epochs = epoch + 1;
        metrics.reconstruction_error = if len > 0 {
            total_error / len as f64
        } else {
            0.0
        };
        log::debug!(
            "epoch {}/{}: reconstruction_error = {:.6}",
            epoch + 1,
            opt.iteration,
            metrics.reconstruction_error
        );
    }

    Ok(metrics)
}
