use crate::error::{Error, Result};
use crate::ops::cpu;
use crate::tensors::Shape;

use super::{Backward, Forward, Layer, LayerCore, LayerKind, Settings};

/// Softmax over the last axis.
///
/// Followed by [`CrossEntropy`](crate::loss::CrossEntropy), its backward is
/// bypassed and the loss writes `p − t` straight into its deltas.
#[derive(Debug, Clone)]
pub struct Softmax {
    core: LayerCore,
    row_len: usize,
}

impl Softmax {
    /// A softmax layer.
    #[must_use]
    pub const fn new() -> Self {
        Self { core: LayerCore::new(Settings::empty()), row_len: 0 }
    }
}

impl Default for Softmax {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for Softmax {
    fn kind(&self) -> LayerKind {
        LayerKind::Softmax
    }

    fn core(&self) -> &LayerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LayerCore {
        &mut self.core
    }

    fn calc_result_shape(&mut self, input: &Shape) -> Result<Shape> {
        if input.dim() < 2 {
            return Err(Error::InvalidConfig("softmax input must be [batch, ..., classes]"));
        }
        self.row_len = input.axis(input.dim() - 1);
        Ok(*input)
    }

    fn forward(&self, pass: Forward<'_>) -> Result<()> {
        cpu::softmax(pass.input, pass.result, self.row_len);
        Ok(())
    }

    fn backward(&self, pass: Backward<'_>) -> Result<()> {
        if let Some(dx) = pass.deltas {
            cpu::softmax_backward(pass.result, pass.output_deltas, dx, self.row_len);
        }
        Ok(())
    }
}
