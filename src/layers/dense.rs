use rand::RngCore;

use crate::backend;
use crate::error::{Error, Result};
use crate::memory::{floats, floats_mut};
use crate::ops::{cpu, Kernels, MatDims};
use crate::tensors::Shape;

use super::{Backward, Forward, Layer, LayerCore, LayerKind, Settings, Trainable};

const WEIGHTS: usize = 0;
const BIAS: usize = 1;

/// Fully connected layer: `y = x · W + b`.
///
/// `W` is `[inputs, neurons]` and `b` is `[1, neurons]`. The input must be
/// `[batch, inputs]`; put a [`Flatten`](super::Flatten) in front of
/// higher-rank tensors.
#[derive(Debug, Clone)]
pub struct Dense {
    core: LayerCore,
    neurons: usize,
    inputs: usize,
    trainable: Trainable,
    kernels: &'static Kernels,
}

impl Dense {
    /// A trainable layer of `neurons` outputs using the active backend.
    #[must_use]
    pub fn new(neurons: usize) -> Self {
        Self {
            core: LayerCore::new(Settings::TRAINABLE),
            neurons,
            inputs: 0,
            trainable: Trainable::new(2),
            kernels: backend::kernels(),
        }
    }

    /// Pins the layer to a kernel table.
    #[must_use]
    pub fn with_kernels(mut self, kernels: &'static Kernels) -> Self {
        self.kernels = kernels;
        self
    }

    /// Output features.
    #[must_use]
    pub const fn neurons(&self) -> usize {
        self.neurons
    }

    fn dims(&self) -> MatDims {
        MatDims::new(self.core.result.shape.batch(), self.inputs, self.neurons)
    }
}

impl Layer for Dense {
    fn kind(&self) -> LayerKind {
        LayerKind::Dense
    }

    fn core(&self) -> &LayerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LayerCore {
        &mut self.core
    }

    fn calc_result_shape(&mut self, input: &Shape) -> Result<Shape> {
        if input.dim() != 2 {
            return Err(Error::InvalidConfig("dense input must be [batch, features]"));
        }
        if self.neurons == 0 {
            return Err(Error::InvalidConfig("dense layer needs at least one neuron"));
        }
        self.inputs = input.axis(1);
        self.trainable.resize(WEIGHTS, Shape::d2(self.inputs, self.neurons));
        self.trainable.resize(BIAS, Shape::d2(1, self.neurons));
        Ok(Shape::d2(input.batch(), self.neurons))
    }

    fn trainable(&self) -> Option<&Trainable> {
        Some(&self.trainable)
    }

    fn trainable_mut(&mut self) -> Option<&mut Trainable> {
        Some(&mut self.trainable)
    }

    /// One buffer, reused for the weight gradient and then the bias gradient.
    fn sizeof_bwdmem(&self) -> usize {
        if self.is_trainable() {
            self.inputs * self.neurons * core::mem::size_of::<f32>()
        } else {
            0
        }
    }

    fn init_params(&self, params: &mut [u8], rng: &mut dyn RngCore) -> Result<()> {
        let [w, b] = [self.trainable.params()[WEIGHTS].data, self.trainable.params()[BIAS].data];
        cpu::glorot_uniform(floats_mut(params, w)?, self.inputs, self.neurons, rng);
        floats_mut(params, b)?.fill(0.0);
        Ok(())
    }

    fn forward(&self, pass: Forward<'_>) -> Result<()> {
        let weights = floats(pass.params, self.trainable.params()[WEIGHTS].data)?;
        let bias = floats(pass.params, self.trainable.params()[BIAS].data)?;
        (self.kernels.matmul)(pass.input, weights, pass.result, self.dims());
        (self.kernels.add_bias_rows)(pass.result, bias);
        Ok(())
    }

    fn backward(&self, pass: Backward<'_>) -> Result<()> {
        let Backward { input, output_deltas, deltas, gradients, scratch, params, .. } = pass;
        let dims = self.dims();

        if self.is_trainable() {
            let [dw, db] = gradients;
            let tmp = &mut scratch[..dw.len()];
            (self.kernels.matmul_at_b)(input, output_deltas, tmp, dims);
            cpu::add_assign(dw, tmp);

            let tmp = &mut scratch[..db.len()];
            (self.kernels.sum_rows)(output_deltas, tmp);
            cpu::add_assign(db, tmp);
        }

        if let Some(dx) = deltas {
            let weights = floats(params, self.trainable.params()[WEIGHTS].data)?;
            (self.kernels.matmul_a_bt)(output_deltas, weights, dx, dims);
        }
        Ok(())
    }
}
