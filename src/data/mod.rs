//! Dataset preparation: standardization, one-hot expansion and permutation.
//!
//! These helpers prepare raw tabular data for a Gaussian input layer. Columns
//! holding only 0/1 values are treated as binary indicators and mapped to ±2;
//! every other column is standardized to zero mean and unit deviation.

use crate::core::{RbmError, RbmResult};
use ndarray::{Array2, ArrayView1, Axis};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

/// Value written for "off" binary indicators and blank rows.
pub const LOW: f64 = -2.0;
/// Value written for "on" binary indicators.
pub const HIGH: f64 = 2.0;

/// Mean and standard deviation of one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnStats {
    pub mean: f64,
    pub stdev: f64,
}

/// Rescale `data` column by column.
///
/// Columns with an entry in `stats` are standardized (`(x - mean) / stdev`),
/// or set to [`LOW`] on rows where `is_blank` holds. All other columns become
/// [`HIGH`] when positive and [`LOW`] otherwise.
pub fn normalize<F>(
    data: &Array2<f64>,
    stats: &BTreeMap<usize, ColumnStats>,
    is_blank: F,
) -> Array2<f64>
where
    F: Fn(ArrayView1<'_, f64>) -> bool,
{
    let mut out = Array2::zeros(data.dim());
    for (row, mut dst) in data.rows().into_iter().zip(out.rows_mut()) {
        let blank = is_blank(row);
        for (j, (&x, y)) in row.iter().zip(dst.iter_mut()).enumerate() {
            *y = match stats.get(&j) {
                Some(_) if blank => LOW,
                Some(s) => (x - s.mean) / s.stdev,
                None if x > 0.0 => HIGH,
                None => LOW,
            };
        }
    }
    out
}

/// Compute column statistics from `data` and [`normalize`] it.
///
/// Rows where `is_blank` holds are left out of the statistics. Columns whose
/// values are all 0 or 1 get no statistics and are treated as binary.
///
/// # Returns
/// The normalized data and the statistics of every standardized column.
pub fn normalizer<F>(data: &Array2<f64>, is_blank: F) -> (Array2<f64>, BTreeMap<usize, ColumnStats>)
where
    F: Fn(ArrayView1<'_, f64>) -> bool,
{
    let mut stats = BTreeMap::new();
    let kept: Vec<usize> = (0..data.nrows())
        .filter(|&i| !is_blank(data.row(i)))
        .collect();

    for (j, column) in data.axis_iter(Axis(1)).enumerate() {
        if column.iter().all(|&x| x == 0.0 || x == 1.0) {
            log::debug!("column {}: binary", j + 1);
            continue;
        }

        let count = kept.len() as f64;
        let (mean, stdev) = if kept.is_empty() {
            (0.0, 1.0)
        } else {
            let mean = kept.iter().map(|&i| column[i]).sum::<f64>() / count;
            let var = kept
                .iter()
                .map(|&i| (column[i] - mean) * (column[i] - mean))
                .sum::<f64>()
                / count;
            (mean, var.sqrt())
        };
        // A constant column would divide by zero
        let stdev = if stdev > 0.0 { stdev } else { 1.0 };

        log::debug!("column {}: mean {:.6} stdev {:.6}", j + 1, mean, stdev);
        stats.insert(j, ColumnStats { mean, stdev });
    }

    (normalize(data, &stats, is_blank), stats)
}

/// Replace categorical columns with one-hot blocks.
///
/// `categories` maps a column index to its category count; the column's values
/// must be integer category indices below that count.
///
/// # Errors
/// - `InvalidConfig` if a value is not a valid category index
pub fn expand_one_hot(
    data: &Array2<f64>,
    categories: &BTreeMap<usize, usize>,
) -> RbmResult<Array2<f64>> {
    let width: usize = (0..data.ncols())
        .map(|j| categories.get(&j).copied().unwrap_or(1))
        .sum();

    let mut out = Array2::zeros((data.nrows(), width));
    for (row, mut dst) in data.rows().into_iter().zip(out.rows_mut()) {
        let mut k = 0;
        for (j, &x) in row.iter().enumerate() {
            match categories.get(&j) {
                Some(&n) => {
                    if x < 0.0 || x.fract() != 0.0 || x >= n as f64 {
                        return Err(RbmError::InvalidConfig(format!(
                            "column {j} value {x} is not a category index below {n}"
                        )));
                    }
                    dst[k + x as usize] = 1.0;
                    k += n;
                }
                None => {
                    dst[k] = x;
                    k += 1;
                }
            }
        }
    }
    Ok(out)
}

/// Random permutation of `0..n`.
pub fn random_permutation<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..n).collect();
    perm.shuffle(rng);
    perm
}

/// Rows of `data` reordered so that row `i` is `data[perm[i]]`.
///
/// # Panics
/// If an index in `perm` is out of bounds.
pub fn permute_rows(data: &Array2<f64>, perm: &[usize]) -> Array2<f64> {
    data.select(Axis(0), perm)
}

/// Items reordered so that item `i` is `items[perm[i]]`.
pub fn permute<T: Clone>(items: &[T], perm: &[usize]) -> Vec<T> {
    perm.iter().map(|&i| items[i].clone()).collect()
}
