use crate::error::Result;
use crate::layers::Layer;
use crate::ops::cpu;
use crate::tensors::Tensor;

use super::{Loss, LossKind};

/// Half sum of squared errors, `½ Σ (p − t)²`, with gradient `p − t`.
///
/// Follows any layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mse {
    deltas: Tensor,
}

impl Mse {
    /// A detached loss.
    #[must_use]
    pub const fn new() -> Self {
        Self { deltas: Tensor::UNRESOLVED }
    }
}

impl Default for Mse {
    fn default() -> Self {
        Self::new()
    }
}

impl Loss for Mse {
    fn kind(&self) -> LossKind {
        LossKind::Mse
    }

    fn attach(&mut self, output: &mut dyn Layer) -> Result<()> {
        self.deltas = Tensor::f32(output.core().result.shape);
        Ok(())
    }

    fn deltas(&self) -> &Tensor {
        &self.deltas
    }

    fn deltas_mut(&mut self) -> &mut Tensor {
        &mut self.deltas
    }

    fn calc_delta(&self, predicted: &[f32], target: &[f32], deltas: &mut [f32]) {
        cpu::mse_delta(predicted, target, deltas);
    }

    fn calc_loss(&self, predicted: &[f32], target: &[f32]) -> f32 {
        cpu::mse(predicted, target)
    }
}
