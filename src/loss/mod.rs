//! Loss functions: the sink at the end of the chain.
//!
//! A loss hosts the "connection" deltas tensor that seeds backpropagation:
//! `calc_delta` writes the gradient of the loss with respect to the output
//! layer's result into it, and the output layer reads it as its
//! `output_deltas`.
//!
//! A loss may instead fuse its gradient with the output layer's (cross-entropy
//! after softmax or sigmoid). It then flags the layer
//! [`Settings::BYPASS_BACKWARD`](crate::layers::Settings::BYPASS_BACKWARD),
//! writes straight into that layer's deltas and needs no memory of its own.

use core::fmt;

use crate::error::Result;
use crate::layers::Layer;
use crate::memory::Arena;
use crate::tensors::{sizeof_data, sizeof_params, sizeof_tensor, Tensor};

mod cross_entropy;
mod mse;

pub use cross_entropy::CrossEntropy;
pub use mse::Mse;

/// Identifies a loss variant in errors and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossKind {
    /// [`Mse`]
    Mse,
    /// [`CrossEntropy`]
    CrossEntropy,
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mse => "mse",
            Self::CrossEntropy => "cross_entropy",
        })
    }
}

/// Contract of a loss attached behind the output layer.
pub trait Loss: fmt::Debug {
    /// Variant tag.
    fn kind(&self) -> LossKind;

    /// Checks that the loss can follow `output` and shapes the connection
    /// deltas after its result.
    ///
    /// # Errors
    /// [`Error::IncompatibleLoss`](crate::Error::IncompatibleLoss) when the
    /// layer is not supported.
    fn attach(&mut self, output: &mut dyn Layer) -> Result<()>;

    /// The connection deltas header.
    fn deltas(&self) -> &Tensor;

    /// Mutable connection deltas header.
    fn deltas_mut(&mut self) -> &mut Tensor;

    /// Whether the gradient is written into the output layer's deltas.
    fn bypasses_output(&self) -> bool {
        false
    }

    /// Bytes of connection deltas; zero when bypassing.
    fn sizeof_trainmem(&self, alignment: usize) -> usize {
        if self.bypasses_output() { 0 } else { sizeof_tensor(self.deltas(), alignment) }
    }

    /// Claims the connection deltas from `arena`.
    fn set_trainmem(&mut self, arena: &mut Arena) {
        if self.bypasses_output() {
            return;
        }
        let deltas = self.deltas_mut();
        deltas.params = arena.alloc(sizeof_params(deltas));
        deltas.data = arena.alloc(sizeof_data(deltas));
    }

    /// Writes the gradient of the loss with respect to `predicted`.
    fn calc_delta(&self, predicted: &[f32], target: &[f32], deltas: &mut [f32]);

    /// Loss value summed over the batch.
    fn calc_loss(&self, predicted: &[f32], target: &[f32]) -> f32;
}
