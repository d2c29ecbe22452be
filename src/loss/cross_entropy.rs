use crate::error::{Error, Result};
use crate::layers::{Layer, LayerKind, Settings};
use crate::ops::cpu;
use crate::tensors::Tensor;

use super::{Loss, LossKind};

/// Cross-entropy after a softmax (categorical) or sigmoid (binary) layer.
///
/// The combined gradient of the activation and the loss is `p − t`; it is
/// written straight into the output layer's deltas and the layer's own
/// backward is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossEntropy {
    deltas: Tensor,
    binary: bool,
}

impl CrossEntropy {
    /// A detached loss.
    #[must_use]
    pub const fn new() -> Self {
        Self { deltas: Tensor::UNRESOLVED, binary: false }
    }

    /// Whether the loss was attached to a sigmoid output.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        self.binary
    }
}

impl Default for CrossEntropy {
    fn default() -> Self {
        Self::new()
    }
}

impl Loss for CrossEntropy {
    fn kind(&self) -> LossKind {
        LossKind::CrossEntropy
    }

    fn attach(&mut self, output: &mut dyn Layer) -> Result<()> {
        self.binary = match output.kind() {
            LayerKind::Softmax => false,
            LayerKind::Sigmoid => true,
            layer => return Err(Error::IncompatibleLoss { loss: LossKind::CrossEntropy, layer }),
        };
        output.core_mut().settings.set(Settings::BYPASS_BACKWARD, true);
        self.deltas = Tensor::f32(output.core().result.shape);
        Ok(())
    }

    fn deltas(&self) -> &Tensor {
        &self.deltas
    }

    fn deltas_mut(&mut self) -> &mut Tensor {
        &mut self.deltas
    }

    fn bypasses_output(&self) -> bool {
        true
    }

    fn calc_delta(&self, predicted: &[f32], target: &[f32], deltas: &mut [f32]) {
        cpu::sub(predicted, target, deltas);
    }

    fn calc_loss(&self, predicted: &[f32], target: &[f32]) -> f32 {
        if self.binary {
            cpu::binary_cross_entropy(predicted, target)
        } else {
            cpu::cross_entropy(predicted, target)
        }
    }
}
