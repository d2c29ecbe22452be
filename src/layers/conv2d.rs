use rand::RngCore;

use crate::backend;
use crate::error::{Error, Result};
use crate::memory::{floats, floats_mut};
use crate::ops::cpu::{self, output_extent, Conv2dGeometry};
use crate::ops::Kernels;
use crate::tensors::Shape;

use super::{Backward, Forward, Layer, LayerCore, LayerKind, Settings, Trainable};

const WEIGHTS: usize = 0;
const BIAS: usize = 1;

/// 2D convolution over channels-first `[batch, channels, height, width]`
/// input.
///
/// Weights are `[filters, channels, kh, kw]`, bias is `[1, filters]`. The
/// forward pass lowers each sample with im2col into forward scratch and runs
/// a matrix product; the backward pass accumulates gradients directly and
/// needs no scratch.
#[derive(Debug, Clone)]
pub struct Conv2D {
    core: LayerCore,
    filters: usize,
    kernel: (usize, usize),
    stride: (usize, usize),
    padding: (usize, usize),
    dilation: (usize, usize),
    geometry: Option<Conv2dGeometry>,
    trainable: Trainable,
    kernels: &'static Kernels,
}

impl Conv2D {
    /// `filters` output channels with a `kernel` of `(height, width)`, unit
    /// stride and dilation, no padding.
    #[must_use]
    pub fn new(filters: usize, kernel: (usize, usize)) -> Self {
        Self {
            core: LayerCore::new(Settings::TRAINABLE),
            filters,
            kernel,
            stride: (1, 1),
            padding: (0, 0),
            dilation: (1, 1),
            geometry: None,
            trainable: Trainable::new(2),
            kernels: backend::kernels(),
        }
    }

    /// Sets the stride.
    #[must_use]
    pub const fn with_stride(mut self, stride: (usize, usize)) -> Self {
        self.stride = stride;
        self
    }

    /// Sets zero padding applied on each side.
    #[must_use]
    pub const fn with_padding(mut self, padding: (usize, usize)) -> Self {
        self.padding = padding;
        self
    }

    /// Sets the dilation.
    #[must_use]
    pub const fn with_dilation(mut self, dilation: (usize, usize)) -> Self {
        self.dilation = dilation;
        self
    }

    /// Pins the layer to a kernel table.
    #[must_use]
    pub fn with_kernels(mut self, kernels: &'static Kernels) -> Self {
        self.kernels = kernels;
        self
    }

    fn geometry(&self) -> Result<&Conv2dGeometry> {
        self.geometry.as_ref().ok_or(Error::InvalidConfig("conv2d used before shape resolution"))
    }
}

impl Layer for Conv2D {
    fn kind(&self) -> LayerKind {
        LayerKind::Conv2D
    }

    fn core(&self) -> &LayerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LayerCore {
        &mut self.core
    }

    fn calc_result_shape(&mut self, input: &Shape) -> Result<Shape> {
        if input.dim() != 4 {
            return Err(Error::InvalidConfig("conv2d input must be [batch, channels, height, width]"));
        }
        if self.filters == 0 {
            return Err(Error::InvalidConfig("conv2d needs at least one filter"));
        }
        let (channels, in_h, in_w) = (input.axis(1), input.axis(2), input.axis(3));
        let out_h = output_extent(in_h, self.kernel.0, self.stride.0, self.padding.0, self.dilation.0);
        let out_w = output_extent(in_w, self.kernel.1, self.stride.1, self.padding.1, self.dilation.1);
        let (Some(out_h), Some(out_w)) = (out_h, out_w) else {
            return Err(Error::InvalidConfig("conv2d kernel does not fit the input"));
        };

        self.geometry = Some(Conv2dGeometry {
            in_channels: channels,
            in_h,
            in_w,
            out_channels: self.filters,
            kernel: self.kernel,
            stride: self.stride,
            padding: self.padding,
            dilation: self.dilation,
            out_h,
            out_w,
        });
        self.trainable.resize(WEIGHTS, Shape::d4(self.filters, channels, self.kernel.0, self.kernel.1));
        self.trainable.resize(BIAS, Shape::d2(1, self.filters));
        Ok(Shape::d4(input.batch(), self.filters, out_h, out_w))
    }

    fn trainable(&self) -> Option<&Trainable> {
        Some(&self.trainable)
    }

    fn trainable_mut(&mut self) -> Option<&mut Trainable> {
        Some(&mut self.trainable)
    }

    fn sizeof_fwdmem(&self) -> usize {
        self.geometry.map_or(0, |g| g.im2col_len() * core::mem::size_of::<f32>())
    }

    fn init_params(&self, params: &mut [u8], rng: &mut dyn RngCore) -> Result<()> {
        let geom = self.geometry()?;
        let taps = geom.kernel.0 * geom.kernel.1;
        let [w, b] = [self.trainable.params()[WEIGHTS].data, self.trainable.params()[BIAS].data];
        cpu::glorot_uniform(floats_mut(params, w)?, geom.in_channels * taps, self.filters * taps, rng);
        floats_mut(params, b)?.fill(0.0);
        Ok(())
    }

    fn forward(&self, pass: Forward<'_>) -> Result<()> {
        let weights = floats(pass.params, self.trainable.params()[WEIGHTS].data)?;
        let bias = floats(pass.params, self.trainable.params()[BIAS].data)?;
        cpu::conv2d(pass.input, weights, bias, pass.result, pass.scratch, self.geometry()?, self.kernels);
        Ok(())
    }

    fn backward(&self, pass: Backward<'_>) -> Result<()> {
        let Backward { input, output_deltas, deltas, gradients, params, .. } = pass;
        let weights = floats(params, self.trainable.params()[WEIGHTS].data)?;
        let grads = if self.is_trainable() {
            let [dw, db] = gradients;
            Some((dw, db))
        } else {
            None
        };
        cpu::conv2d_backward(input, weights, output_deltas, deltas, grads, self.geometry()?);
        Ok(())
    }
}
