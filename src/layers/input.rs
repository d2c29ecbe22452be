use crate::dtype::Dtype;
use crate::error::Result;
use crate::tensors::{Shape, Tensor};

use super::{Backward, Forward, Layer, LayerCore, LayerKind, Settings};

/// Head of every chain. Its result is the caller's input tensor, so it
/// needs no memory and never computes.
#[derive(Debug, Clone)]
pub struct Input {
    core: LayerCore,
}

impl Input {
    /// An f32 input of `shape`; the leading axis is the batch size.
    #[must_use]
    pub const fn new(shape: Shape) -> Self {
        Self::with_dtype(&crate::dtype::F32, shape)
    }

    /// An input of another dtype. Only f32 chains can be compiled.
    #[must_use]
    pub const fn with_dtype(dtype: &'static Dtype, shape: Shape) -> Self {
        let mut core = LayerCore::new(Settings::empty());
        core.result = Tensor::new(dtype, shape);
        Self { core }
    }
}

impl Layer for Input {
    fn kind(&self) -> LayerKind {
        LayerKind::Input
    }

    fn core(&self) -> &LayerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LayerCore {
        &mut self.core
    }

    fn calc_result_shape(&mut self, _input: &Shape) -> Result<Shape> {
        Ok(self.core.result.shape)
    }

    fn forward(&self, _pass: Forward<'_>) -> Result<()> {
        Ok(())
    }

    fn backward(&self, _pass: Backward<'_>) -> Result<()> {
        Ok(())
    }
}
