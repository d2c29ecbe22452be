//! Optimizers.
//!
//! An optimizer never allocates: its per-parameter state ("optimem") is a
//! region of the training block sized by [`Optimizer::sizeof_optimem`] and
//! carved out by the planner. Step-dependent scalars (Adam's running powers
//! of β) live on the optimizer value itself and advance in
//! [`Optimizer::end_step`].
//!
//! One update runs `begin_step`, then `update_params` once per trainable
//! tensor, then `end_step`.

use core::fmt;

use crate::tensors::Tensor;

mod adam;
mod sgd;

pub use adam::Adam;
pub use sgd::Sgd;

/// Contract between the sequential engine and an optimizer.
pub trait Optimizer: fmt::Debug {
    /// Bytes of state for one parameter tensor, padded to `alignment`.
    fn sizeof_optimem(&self, param: &Tensor, alignment: usize) -> usize;

    /// Resets the state of one parameter tensor.
    fn init_optimem(&self, param: &Tensor, optimem: &mut [f32]) {
        let _ = param;
        optimem.fill(0.0);
    }

    /// Clears a gradient accumulator.
    fn zero_gradients(&self, gradients: &mut [f32]) {
        gradients.fill(0.0);
    }

    /// Computes per-step scalars before any tensor is updated.
    fn begin_step(&mut self) {}

    /// Applies accumulated `gradients` to `params`.
    fn update_params(&self, params: &mut [f32], gradients: &[f32], optimem: &mut [f32]);

    /// Advances per-step scalars after every tensor was updated.
    fn end_step(&mut self) {}

    /// Restarts step counting.
    fn reset(&mut self) {}
}
