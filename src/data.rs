//! Paired input and target rows for training.

use core::ops::Range;

use crate::error::{Error, Result};
use crate::tensors::TensorRef;

/// Inputs and targets with the same number of rows along the batch axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dataset<'a> {
    inputs: TensorRef<'a>,
    targets: TensorRef<'a>,
}

impl<'a> Dataset<'a> {
    /// Pairs `inputs` with `targets`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] when the row counts differ.
    pub fn new(inputs: TensorRef<'a>, targets: TensorRef<'a>) -> Result<Self> {
        let (expected, actual) = (inputs.shape().batch(), targets.shape().batch());
        if expected != actual {
            return Err(Error::ShapeMismatch { expected, actual });
        }
        Ok(Self { inputs, targets })
    }

    /// Number of rows.
    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.inputs.shape().batch()
    }

    /// Sample `i` as one-row views, `None` past the last row.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<(TensorRef<'a>, TensorRef<'a>)> {
        self.get_batch(i..i + 1)
    }

    /// Rows `range` of both tensors, `None` when out of bounds.
    #[must_use]
    pub fn get_batch(&self, range: Range<usize>) -> Option<(TensorRef<'a>, TensorRef<'a>)> {
        Some((self.inputs.rows(range.start, range.end)?, self.targets.rows(range.start, range.end)?))
    }

    /// Consecutive full batches of `batch_size` rows; trailing rows that do
    /// not fill a batch are left out.
    pub fn batches(&self, batch_size: usize) -> impl Iterator<Item = (TensorRef<'a>, TensorRef<'a>)> + '_ {
        let count = if batch_size == 0 { 0 } else { self.num_samples() / batch_size };
        (0..count).filter_map(move |i| self.get_batch(i * batch_size..(i + 1) * batch_size))
    }
}
