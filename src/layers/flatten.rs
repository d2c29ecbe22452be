use crate::error::Result;
use crate::tensors::Shape;

use super::{Backward, Forward, Layer, LayerCore, LayerKind, Settings};

/// Reshapes `[batch, d1, ..]` into `[batch, d1 · ..]`, copying the data.
#[derive(Debug, Clone)]
pub struct Flatten {
    core: LayerCore,
}

impl Flatten {
    /// A flatten layer.
    #[must_use]
    pub const fn new() -> Self {
        Self { core: LayerCore::new(Settings::empty()) }
    }
}

impl Default for Flatten {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for Flatten {
    fn kind(&self) -> LayerKind {
        LayerKind::Flatten
    }

    fn core(&self) -> &LayerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LayerCore {
        &mut self.core
    }

    fn calc_result_shape(&mut self, input: &Shape) -> Result<Shape> {
        Ok(Shape::d2(input.batch(), input.row_len()))
    }

    fn forward(&self, pass: Forward<'_>) -> Result<()> {
        pass.result.copy_from_slice(pass.input);
        Ok(())
    }

    fn backward(&self, pass: Backward<'_>) -> Result<()> {
        if let Some(dx) = pass.deltas {
            dx.copy_from_slice(pass.output_deltas);
        }
        Ok(())
    }
}
