//! Layer contract and the built-in layers.
//!
//! A model is a chain of `Box<dyn Layer>`. Each layer embeds a [`LayerCore`]
//! (result and deltas headers, settings, scratch regions) and, when it has
//! weights, a [`Trainable`] set of parameter, gradient and optimizer-state
//! headers. The planner drives layers through the `sizeof_*` / `set_*`
//! callbacks; the sequential engine through [`Layer::forward`] and
//! [`Layer::backward`], handing each call disjoint views of the caller's
//! memory blocks.
//!
//! Most layers only implement shape resolution and the two passes; the
//! memory callbacks have defaults derived from [`Trainable`] and the layer's
//! scratch sizes.

use core::fmt;
use core::ops::BitOr;

use rand::RngCore;

use crate::dtype::F32;
use crate::error::{Error, Result};
use crate::memory::{Arena, Region};
use crate::tensors::{sizeof_data, sizeof_params, sizeof_tensor, Shape, Tensor};

mod activation;
mod conv2d;
mod dense;
mod flatten;
mod input;
mod softmax;

pub use activation::{Activation, ActivationKind};
pub use conv2d::Conv2D;
pub use dense::Dense;
pub use flatten::Flatten;
pub use input::Input;
pub use softmax::Softmax;

/// Largest number of trainable tensors a single layer owns.
pub const MAX_TRAINABLE: usize = 2;

/// Per-layer behaviour flags.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Settings(u8);

impl Settings {
    /// The layer owns parameters that receive gradients and updates.
    pub const TRAINABLE: Self = Self(1);
    /// The layer's input needs no gradient: no deltas are stored and
    /// backpropagation stops after this layer.
    pub const NO_INPUT_GRADIENT: Self = Self(1 << 1);
    /// A training epoch is running.
    pub const TRAINING_MODE: Self = Self(1 << 2);
    /// The configured input batch equals the step batch.
    pub const BATCH_MODE: Self = Self(1 << 3);
    /// The loss writes this layer's deltas directly; its backward is skipped.
    pub const BYPASS_BACKWARD: Self = Self(1 << 4);

    /// No flags.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw flag bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets or clears `flag`.
    pub fn set(&mut self, flag: Self, on: bool) {
        if on {
            self.0 |= flag.0;
        } else {
            self.0 &= !flag.0;
        }
    }
}

impl BitOr for Settings {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [&str; 5] =
            ["TRAINABLE", "NO_INPUT_GRADIENT", "TRAINING_MODE", "BATCH_MODE", "BYPASS_BACKWARD"];
        let mut set = f.debug_set();
        for (bit, name) in NAMES.iter().enumerate() {
            if self.0 & (1 << bit) != 0 {
                set.entry(name);
            }
        }
        set.finish()
    }
}

/// Identifies a layer variant in errors and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// [`Input`]
    Input,
    /// [`Dense`]
    Dense,
    /// [`Conv2D`]
    Conv2D,
    /// [`Flatten`]
    Flatten,
    /// [`Activation::relu`]
    ReLU,
    /// [`Activation::leaky_relu`]
    LeakyReLU,
    /// [`Activation::elu`]
    Elu,
    /// [`Activation::sigmoid`]
    Sigmoid,
    /// [`Activation::tanh`]
    Tanh,
    /// [`Activation::softsign`]
    Softsign,
    /// [`Softmax`]
    Softmax,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Dense => "dense",
            Self::Conv2D => "conv2d",
            Self::Flatten => "flatten",
            Self::ReLU => "relu",
            Self::LeakyReLU => "leaky_relu",
            Self::Elu => "elu",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Softsign => "softsign",
            Self::Softmax => "softmax",
        })
    }
}

/// State every layer carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerCore {
    /// Output of the layer.
    pub result: Tensor,
    /// Gradient of the loss with respect to the layer's input.
    pub deltas: Tensor,
    /// Behaviour flags.
    pub settings: Settings,
    /// Forward scratch region in the work block.
    pub fwdmem: Region,
    /// Backward scratch region (a prefix of the shared scratch).
    pub bwdmem: Region,
}

impl LayerCore {
    /// Unresolved core with the given flags.
    #[must_use]
    pub const fn new(settings: Settings) -> Self {
        Self {
            result: Tensor::UNRESOLVED,
            deltas: Tensor::UNRESOLVED,
            settings,
            fwdmem: Region::EMPTY,
            bwdmem: Region::EMPTY,
        }
    }
}

/// Parameter, gradient and optimizer-state headers of a trainable layer.
///
/// `params()[i]` and `gradients()[i]` always have the same shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trainable {
    params: [Tensor; MAX_TRAINABLE],
    gradients: [Tensor; MAX_TRAINABLE],
    optimem: [Region; MAX_TRAINABLE],
    count: usize,
}

impl Trainable {
    /// `count` unresolved tensors.
    #[must_use]
    pub const fn new(count: usize) -> Self {
        Self {
            params: [Tensor::UNRESOLVED; MAX_TRAINABLE],
            gradients: [Tensor::UNRESOLVED; MAX_TRAINABLE],
            optimem: [Region::EMPTY; MAX_TRAINABLE],
            count: if count < MAX_TRAINABLE { count } else { MAX_TRAINABLE },
        }
    }

    /// Number of trainable tensors.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Sets the shape of parameter `i` and its gradient.
    pub fn resize(&mut self, i: usize, shape: Shape) {
        self.params[i] = Tensor::f32(shape);
        self.gradients[i] = Tensor::f32(shape);
    }

    /// Parameter headers.
    #[must_use]
    pub fn params(&self) -> &[Tensor] {
        &self.params[..self.count]
    }

    /// Mutable parameter headers.
    pub fn params_mut(&mut self) -> &mut [Tensor] {
        &mut self.params[..self.count]
    }

    /// Gradient headers.
    #[must_use]
    pub fn gradients(&self) -> &[Tensor] {
        &self.gradients[..self.count]
    }

    /// Mutable gradient headers.
    pub fn gradients_mut(&mut self) -> &mut [Tensor] {
        &mut self.gradients[..self.count]
    }

    /// Optimizer-state regions, one per parameter.
    #[must_use]
    pub fn optimem(&self) -> &[Region] {
        &self.optimem[..self.count]
    }

    /// Mutable optimizer-state regions.
    pub fn optimem_mut(&mut self) -> &mut [Region] {
        &mut self.optimem[..self.count]
    }

    /// Gradient data regions padded with empty regions to [`MAX_TRAINABLE`].
    #[must_use]
    pub fn gradient_regions(&self) -> [Region; MAX_TRAINABLE] {
        core::array::from_fn(|i| if i < self.count { self.gradients[i].data } else { Region::EMPTY })
    }
}

/// Views handed to [`Layer::forward`].
#[derive(Debug)]
pub struct Forward<'a> {
    /// Result of the previous layer.
    pub input: &'a [f32],
    /// This layer's result.
    pub result: &'a mut [f32],
    /// Forward scratch of [`Layer::sizeof_fwdmem`] bytes.
    pub scratch: &'a mut [f32],
    /// The whole parameter block.
    pub params: &'a [u8],
}

/// Views handed to [`Layer::backward`].
#[derive(Debug)]
pub struct Backward<'a> {
    /// Result of the previous layer (the forward input).
    pub input: &'a [f32],
    /// This layer's forward result.
    pub result: &'a [f32],
    /// Gradient of the loss with respect to this layer's result.
    pub output_deltas: &'a [f32],
    /// Where to write the gradient with respect to the input; `None` when the
    /// layer has [`Settings::NO_INPUT_GRADIENT`].
    pub deltas: Option<&'a mut [f32]>,
    /// Gradient accumulators, in [`Trainable::params`] order; empty slices
    /// when the layer is frozen.
    pub gradients: [&'a mut [f32]; MAX_TRAINABLE],
    /// Backward scratch of [`Layer::sizeof_bwdmem`] bytes.
    pub scratch: &'a mut [f32],
    /// The whole parameter block.
    pub params: &'a [u8],
}

/// Uniform contract the planner and the sequential engine drive.
pub trait Layer: fmt::Debug {
    /// Variant tag.
    fn kind(&self) -> LayerKind;

    /// Shared state.
    fn core(&self) -> &LayerCore;

    /// Mutable shared state.
    fn core_mut(&mut self) -> &mut LayerCore;

    /// Resolves internal shapes from the input shape and returns the result
    /// shape.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] when the input shape does not fit the layer.
    fn calc_result_shape(&mut self, input: &Shape) -> Result<Shape>;

    /// Derives the result's type-specific parameters from the input tensor.
    ///
    /// Layers compute in f32, which has no parameter block, so the default
    /// only rejects other input dtypes.
    ///
    /// # Errors
    /// [`Error::UnsupportedDtype`] for a non-f32 input.
    fn calc_result_tensor_params(&mut self, input: &Tensor) -> Result<()> {
        if *input.dtype == F32 { Ok(()) } else { Err(Error::UnsupportedDtype(input.dtype.name)) }
    }

    /// Trainable tensors, when the layer has any.
    fn trainable(&self) -> Option<&Trainable> {
        None
    }

    /// Mutable trainable tensors.
    fn trainable_mut(&mut self) -> Option<&mut Trainable> {
        None
    }

    /// Whether the layer has parameters and is flagged [`Settings::TRAINABLE`].
    fn is_trainable(&self) -> bool {
        self.trainable().is_some() && self.core().settings.contains(Settings::TRAINABLE)
    }

    /// Freezes or unfreezes the layer's parameters. No-op without parameters.
    fn set_trainable(&mut self, on: bool) {
        if self.trainable().is_some() {
            self.core_mut().settings.set(Settings::TRAINABLE, on);
        }
    }

    /// Bytes of parameter memory.
    fn sizeof_paramem(&self, alignment: usize) -> usize {
        self.trainable()
            .map_or(0, |t| t.params().iter().map(|p| sizeof_tensor(p, alignment)).sum())
    }

    /// Claims parameter memory from `arena`.
    fn set_paramem(&mut self, arena: &mut Arena) {
        if let Some(t) = self.trainable_mut() {
            for p in t.params_mut() {
                p.params = arena.alloc(sizeof_params(p));
                p.data = arena.alloc(sizeof_data(p));
            }
        }
    }

    /// Bytes of gradient memory; zero when frozen.
    fn sizeof_trainmem(&self, alignment: usize) -> usize {
        if !self.is_trainable() {
            return 0;
        }
        self.trainable()
            .map_or(0, |t| t.gradients().iter().map(|g| sizeof_tensor(g, alignment)).sum())
    }

    /// Claims gradient memory from `arena`.
    fn set_trainmem(&mut self, arena: &mut Arena) {
        if !self.is_trainable() {
            return;
        }
        if let Some(t) = self.trainable_mut() {
            for g in t.gradients_mut() {
                g.params = arena.alloc(sizeof_params(g));
                g.data = arena.alloc(sizeof_data(g));
            }
        }
    }

    /// Bytes of forward scratch, unpadded.
    fn sizeof_fwdmem(&self) -> usize {
        0
    }

    /// Claims forward scratch from `arena`.
    fn set_fwdmem(&mut self, arena: &mut Arena) {
        let bytes = self.sizeof_fwdmem();
        self.core_mut().fwdmem = arena.alloc(bytes);
    }

    /// Bytes of backward scratch, unpadded.
    fn sizeof_bwdmem(&self) -> usize {
        0
    }

    /// Takes the prefix of the shared backward scratch this layer needs.
    fn set_bwdmem(&mut self, shared: Region) {
        let bytes = self.sizeof_bwdmem();
        self.core_mut().bwdmem = Region::new(shared.offset, bytes.min(shared.len));
    }

    /// Initialises parameters in `params` (the whole parameter block).
    ///
    /// # Errors
    /// Region errors when the block does not match the distribution.
    fn init_params(&self, params: &mut [u8], rng: &mut dyn RngCore) -> Result<()> {
        let _ = (params, rng);
        Ok(())
    }

    /// Computes the result from the input.
    ///
    /// # Errors
    /// Region errors when reading parameters.
    fn forward(&self, pass: Forward<'_>) -> Result<()>;

    /// Accumulates parameter gradients and writes input deltas.
    ///
    /// # Errors
    /// Region errors when reading parameters.
    fn backward(&self, pass: Backward<'_>) -> Result<()>;
}
