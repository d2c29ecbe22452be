use crate::error::Result;
use crate::ops::cpu;
use crate::tensors::Shape;

use super::{Backward, Forward, Layer, LayerCore, LayerKind, Settings};

/// Element-wise activation functions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivationKind {
    /// `max(0, x)`
    ReLU,
    /// `x` or `alpha · x`
    LeakyReLU(f32),
    /// `x` or `alpha · (eˣ − 1)`
    Elu(f32),
    /// `1 / (1 + e⁻ˣ)`
    Sigmoid,
    /// `tanh(x)`
    Tanh,
    /// `x / (1 + |x|)`
    Softsign,
}

/// Parameterless element-wise layer; the result has the input's shape.
#[derive(Debug, Clone)]
pub struct Activation {
    core: LayerCore,
    function: ActivationKind,
}

impl Activation {
    /// Layer applying `function`.
    #[must_use]
    pub const fn new(function: ActivationKind) -> Self {
        Self { core: LayerCore::new(Settings::empty()), function }
    }

    /// `ReLU`.
    #[must_use]
    pub const fn relu() -> Self {
        Self::new(ActivationKind::ReLU)
    }

    /// Leaky `ReLU` with negative slope `alpha`.
    #[must_use]
    pub const fn leaky_relu(alpha: f32) -> Self {
        Self::new(ActivationKind::LeakyReLU(alpha))
    }

    /// ELU with saturation `alpha`.
    #[must_use]
    pub const fn elu(alpha: f32) -> Self {
        Self::new(ActivationKind::Elu(alpha))
    }

    /// Logistic sigmoid.
    #[must_use]
    pub const fn sigmoid() -> Self {
        Self::new(ActivationKind::Sigmoid)
    }

    /// Hyperbolic tangent.
    #[must_use]
    pub const fn tanh() -> Self {
        Self::new(ActivationKind::Tanh)
    }

    /// Softsign.
    #[must_use]
    pub const fn softsign() -> Self {
        Self::new(ActivationKind::Softsign)
    }

    /// The function applied.
    #[must_use]
    pub const fn function(&self) -> ActivationKind {
        self.function
    }
}

impl Layer for Activation {
    fn kind(&self) -> LayerKind {
        match self.function {
            ActivationKind::ReLU => LayerKind::ReLU,
            ActivationKind::LeakyReLU(_) => LayerKind::LeakyReLU,
            ActivationKind::Elu(_) => LayerKind::Elu,
            ActivationKind::Sigmoid => LayerKind::Sigmoid,
            ActivationKind::Tanh => LayerKind::Tanh,
            ActivationKind::Softsign => LayerKind::Softsign,
        }
    }

    fn core(&self) -> &LayerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LayerCore {
        &mut self.core
    }

    fn calc_result_shape(&mut self, input: &Shape) -> Result<Shape> {
        Ok(*input)
    }

    fn forward(&self, pass: Forward<'_>) -> Result<()> {
        let (x, y) = (pass.input, pass.result);
        match self.function {
            ActivationKind::ReLU => cpu::relu(x, y),
            ActivationKind::LeakyReLU(alpha) => cpu::leaky_relu(x, y, alpha),
            ActivationKind::Elu(alpha) => cpu::elu(x, y, alpha),
            ActivationKind::Sigmoid => cpu::sigmoid(x, y),
            ActivationKind::Tanh => cpu::tanh(x, y),
            ActivationKind::Softsign => cpu::softsign(x, y),
        }
        Ok(())
    }

    fn backward(&self, pass: Backward<'_>) -> Result<()> {
        let Some(dx) = pass.deltas else {
            return Ok(());
        };
        let (x, y, dy) = (pass.input, pass.result, pass.output_deltas);
        match self.function {
            ActivationKind::ReLU => cpu::relu_backward(x, dy, dx),
            ActivationKind::LeakyReLU(alpha) => cpu::leaky_relu_backward(x, dy, dx, alpha),
            ActivationKind::Elu(alpha) => cpu::elu_backward(x, dy, dx, alpha),
            ActivationKind::Sigmoid => cpu::sigmoid_backward(y, dy, dx),
            ActivationKind::Tanh => cpu::tanh_backward(y, dy, dx),
            ActivationKind::Softsign => cpu::softsign_backward(x, dy, dx),
        }
        Ok(())
    }
}
