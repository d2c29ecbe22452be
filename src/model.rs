//! Model construction and the compile step.
//!
//! A [`Model`] is an ordered chain of layers starting with an
//! [`Input`](crate::layers::Input), plus an optional loss. Neighbours are
//! addressed by index: layer `i` reads the result of layer `i - 1` and, when
//! training, the deltas of layer `i + 1` (or the loss).
//!
//! [`ModelBuilder::build`] wires the chain, resolves every shape, attaches
//! the loss and compiles. The planner (`sizeof_*`, `schedule_*`,
//! `distribute_*`) and the sequential engine (`forward`, `train`, ...) are
//! further `impl Model` blocks in [`crate::planner`] and
//! [`crate::sequential`].

use alloc::boxed::Box;
use alloc::vec::Vec;

use rand::RngCore;
use tracing::debug;

use crate::error::{Error, Result};
use crate::layers::{Input, Layer, LayerKind, Settings};
use crate::loss::Loss;
use crate::memory::{floats, floats_mut, MemoryConfig, MemoryKind};
use crate::tensors::{Shape, Tensor};

fn check_extents(shape: &Shape) -> Result<()> {
    if shape.dim() == 0 || shape.as_slice().contains(&0) {
        return Err(Error::InvalidConfig("tensor shapes need non-zero extents"));
    }
    Ok(())
}

/// Collects layers and a loss, then builds a compiled [`Model`].
#[derive(Debug)]
pub struct ModelBuilder {
    layers: Vec<Box<dyn Layer>>,
    loss: Option<Box<dyn Loss>>,
    config: MemoryConfig,
}

impl ModelBuilder {
    /// Starts a chain at `input`.
    #[must_use]
    pub fn new(input: Input) -> Self {
        Self { layers: alloc::vec![Box::new(input) as Box<dyn Layer>], loss: None, config: MemoryConfig::default() }
    }

    /// Appends a layer.
    #[must_use]
    pub fn layer(mut self, layer: impl Layer + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    /// Appends an already boxed layer.
    #[must_use]
    pub fn boxed_layer(mut self, layer: Box<dyn Layer>) -> Self {
        self.layers.push(layer);
        self
    }

    /// Attaches the loss, replacing any previous one.
    #[must_use]
    pub fn loss(mut self, loss: impl Loss + 'static) -> Self {
        self.loss = Some(Box::new(loss));
        self
    }

    /// Sets the alignment of memory blocks and of every region in them.
    #[must_use]
    pub const fn alignment(mut self, alignment: usize) -> Self {
        self.config.alignment = alignment;
        self
    }

    /// Resolves shapes, attaches the loss and compiles.
    ///
    /// # Errors
    /// - [`Error::InvalidAlignment`] for an unusable alignment
    /// - [`Error::MisplacedInput`] when an input layer follows the head
    /// - [`Error::InvalidConfig`] for a chain without layers after the input,
    ///   a layer rejecting its input shape, or any resolved shape with a zero
    ///   extent
    /// - [`Error::UnsupportedDtype`] for a non-f32 input
    /// - [`Error::IncompatibleLoss`] when the loss cannot follow the output
    pub fn build<'m>(self) -> Result<Model<'m>> {
        let Self { mut layers, mut loss, config } = self;
        config.validate()?;

        if let Some(i) = layers.iter().skip(1).position(|l| l.kind() == LayerKind::Input) {
            return Err(Error::MisplacedInput(i + 1));
        }
        if layers.len() < 2 {
            return Err(Error::InvalidConfig("model needs at least one layer after the input"));
        }

        let mut previous = layers[0].core().result;
        check_extents(&previous.shape)?;
        for layer in layers.iter_mut().skip(1) {
            layer.calc_result_tensor_params(&previous)?;
            let shape = layer.calc_result_shape(&previous.shape)?;
            check_extents(&shape)?;
            let core = layer.core_mut();
            core.deltas = Tensor::f32(previous.shape);
            core.result = Tensor::f32(shape);
            previous = core.result;
        }
        layers[1].core_mut().settings.set(Settings::NO_INPUT_GRADIENT, true);

        if let (Some(loss), Some(output)) = (loss.as_deref_mut(), layers.last_mut()) {
            loss.attach(output.as_mut())?;
        }

        let mut model = Model {
            layers,
            loss,
            config,
            layer_count: 0,
            trainable_params_count: 0,
            params: None,
            work: None,
            schedule: None,
        };
        model.compile();
        Ok(model)
    }
}

/// A compiled chain bound to caller memory for its lifetime `'m`.
#[derive(Debug)]
pub struct Model<'m> {
    pub(crate) layers: Vec<Box<dyn Layer>>,
    pub(crate) loss: Option<Box<dyn Loss>>,
    pub(crate) config: MemoryConfig,
    pub(crate) layer_count: usize,
    pub(crate) trainable_params_count: usize,
    pub(crate) params: Option<&'m mut [u8]>,
    pub(crate) work: Option<&'m mut [u8]>,
    pub(crate) schedule: Option<MemoryKind>,
}

impl<'m> Model<'m> {
    /// Counts layers and trainable tensors.
    pub fn compile(&mut self) {
        self.layer_count = self.layers.len();
        self.trainable_params_count = self
            .layers
            .iter()
            .filter(|l| l.is_trainable())
            .filter_map(|l| l.trainable())
            .map(crate::layers::Trainable::count)
            .sum();
        debug!(
            layers = self.layer_count,
            trainable = self.trainable_params_count,
            loss = ?self.loss.as_ref().map(|l| l.kind()),
            "compiled model"
        );
    }

    /// Number of layers, the input included.
    #[must_use]
    pub const fn layer_count(&self) -> usize {
        self.layer_count
    }

    /// Number of trainable parameter tensors.
    #[must_use]
    pub const fn trainable_params_count(&self) -> usize {
        self.trainable_params_count
    }

    /// Planner configuration.
    #[must_use]
    pub const fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Layer `index`, the input being 0.
    #[must_use]
    pub fn layer(&self, index: usize) -> Option<&dyn Layer> {
        self.layers.get(index).map(|l| &**l)
    }

    /// All layers in chain order.
    pub fn layers(&self) -> impl Iterator<Item = &dyn Layer> {
        self.layers.iter().map(|l| &**l)
    }

    /// The attached loss.
    #[must_use]
    pub fn loss(&self) -> Option<&dyn Loss> {
        self.loss.as_deref()
    }

    /// Which work layout is currently scheduled.
    #[must_use]
    pub const fn schedule(&self) -> Option<MemoryKind> {
        self.schedule
    }

    /// Freezes or unfreezes layer `index`.
    ///
    /// Gradient and optimizer memory depend on the trainable set, so a
    /// scheduled training block is released and returned; re-query
    /// [`Model::sizeof_training_memory`] and schedule it again.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] for an unknown layer.
    pub fn set_trainable(&mut self, index: usize, on: bool) -> Result<Option<&'m mut [u8]>> {
        let layer = self.layers.get_mut(index).ok_or(Error::InvalidConfig("no such layer"))?;
        layer.set_trainable(on);
        let released = if self.schedule == Some(MemoryKind::Training) { self.release_work() } else { None };
        self.compile();
        Ok(released)
    }

    /// Takes back the inference or training block. The model is unscheduled
    /// until another block is given.
    pub fn release_work(&mut self) -> Option<&'m mut [u8]> {
        self.schedule = None;
        self.work.take()
    }

    /// Takes back the parameter block. Parameter values stay in it.
    pub fn release_params(&mut self) -> Option<&'m mut [u8]> {
        self.params.take()
    }

    /// Initialises every layer's parameters: Glorot-uniform weights, zero
    /// biases.
    ///
    /// # Errors
    /// [`Error::NotScheduled`] before parameter memory is distributed.
    pub fn init_params(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        let params = self.params.as_deref_mut().ok_or(Error::NotScheduled(MemoryKind::Parameter))?;
        for layer in &self.layers {
            layer.init_params(params, rng)?;
        }
        Ok(())
    }

    fn trainable_tensor(&self, layer: usize, index: usize) -> Result<(&Tensor, &Tensor)> {
        let t = self
            .layers
            .get(layer)
            .and_then(|l| l.trainable())
            .ok_or(Error::InvalidConfig("layer has no parameters"))?;
        match (t.params().get(index), t.gradients().get(index)) {
            (Some(p), Some(g)) => Ok((p, g)),
            _ => Err(Error::InvalidConfig("no such parameter tensor")),
        }
    }

    /// Parameter tensor `index` of `layer` (weights are 0, bias is 1).
    ///
    /// # Errors
    /// [`Error::NotScheduled`] before distribution, [`Error::InvalidConfig`]
    /// for an unknown tensor.
    pub fn params(&self, layer: usize, index: usize) -> Result<&[f32]> {
        let (p, _) = self.trainable_tensor(layer, index)?;
        let block = self.params.as_deref().ok_or(Error::NotScheduled(MemoryKind::Parameter))?;
        floats(block, p.data)
    }

    /// Mutable parameter tensor `index` of `layer`, e.g. to load weights.
    ///
    /// # Errors
    /// As [`Model::params`].
    pub fn params_mut(&mut self, layer: usize, index: usize) -> Result<&mut [f32]> {
        let region = self.trainable_tensor(layer, index)?.0.data;
        let block = self.params.as_deref_mut().ok_or(Error::NotScheduled(MemoryKind::Parameter))?;
        floats_mut(block, region)
    }

    /// Accumulated gradient of parameter tensor `index` of `layer`.
    ///
    /// # Errors
    /// [`Error::NotScheduled`] without training memory, [`Error::InvalidConfig`]
    /// for an unknown or frozen tensor.
    pub fn gradients(&self, layer: usize, index: usize) -> Result<&[f32]> {
        let (_, g) = self.trainable_tensor(layer, index)?;
        if !self.layers[layer].is_trainable() {
            return Err(Error::InvalidConfig("layer is frozen"));
        }
        floats(self.training_block()?, g.data)
    }

    /// Deltas of `layer`: the gradient of the loss with respect to its input.
    ///
    /// Empty for the first layer after the input.
    ///
    /// # Errors
    /// [`Error::NotScheduled`] without training memory, [`Error::InvalidConfig`]
    /// for an unknown layer.
    pub fn deltas(&self, layer: usize) -> Result<&[f32]> {
        let core = self.layers.get(layer).ok_or(Error::InvalidConfig("no such layer"))?.core();
        if core.settings.contains(Settings::NO_INPUT_GRADIENT) {
            return Ok(&[]);
        }
        floats(self.training_block()?, core.deltas.data)
    }

    /// Result of the output layer after the last forward pass.
    ///
    /// # Errors
    /// [`Error::NotScheduled`] without work memory.
    pub fn output(&self) -> Result<&[f32]> {
        let block = self.work.as_deref().ok_or(Error::NotScheduled(MemoryKind::Inference))?;
        let last = self.layers.last().ok_or(Error::InvalidConfig("empty model"))?;
        floats(block, last.core().result.data)
    }

    pub(crate) fn training_block(&self) -> Result<&[u8]> {
        match (self.schedule, self.work.as_deref()) {
            (Some(MemoryKind::Training), Some(block)) => Ok(block),
            _ => Err(Error::NotScheduled(MemoryKind::Training)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Activation, Conv2D, Dense, Flatten, Softmax};
    use crate::loss::{CrossEntropy, Mse};

    #[test]
    fn build_resolves_shapes_and_flags() {
        let model = ModelBuilder::new(Input::new(Shape::d4(2, 1, 5, 5)))
            .layer(Conv2D::new(2, (3, 3)))
            .layer(Activation::relu())
            .layer(Flatten::new())
            .layer(Dense::new(3))
            .layer(Softmax::new())
            .loss(CrossEntropy::new())
            .build()
            .unwrap();

        assert_eq!(model.layer_count(), 6);
        assert_eq!(model.trainable_params_count(), 4);
        let conv = model.layer(1).unwrap().core();
        assert_eq!(conv.result.shape, Shape::d4(2, 2, 3, 3));
        assert!(conv.settings.contains(Settings::NO_INPUT_GRADIENT));
        assert_eq!(model.layer(3).unwrap().core().result.shape, Shape::d2(2, 18));
        assert_eq!(model.layer(4).unwrap().core().deltas.shape, Shape::d2(2, 18));
        assert!(model.layer(5).unwrap().core().settings.contains(Settings::BYPASS_BACKWARD));
    }

    #[test]
    fn build_rejects_misplaced_input() {
        let err = ModelBuilder::new(Input::new(Shape::d2(1, 2)))
            .layer(Dense::new(2))
            .layer(Input::new(Shape::d2(1, 2)))
            .build()
            .unwrap_err();
        assert_eq!(err, Error::MisplacedInput(2));
    }

    #[test]
    fn build_rejects_bare_input_and_bad_alignment() {
        assert!(ModelBuilder::new(Input::new(Shape::d2(1, 2))).build().is_err());
        let err = ModelBuilder::new(Input::new(Shape::d2(1, 2)))
            .layer(Dense::new(1))
            .alignment(3)
            .build()
            .unwrap_err();
        assert_eq!(err, Error::InvalidAlignment(3));
    }

    #[test]
    fn zero_extents_are_rejected() {
        let zero = Error::InvalidConfig("tensor shapes need non-zero extents");
        for input in [Shape::d2(0, 2), Shape::d2(4, 0), Shape::EMPTY] {
            let err = ModelBuilder::new(Input::new(input)).layer(Dense::new(1)).loss(Mse::new()).build().unwrap_err();
            assert_eq!(err, zero, "input {input}");
        }
        let err = ModelBuilder::new(Input::new(Shape::d4(1, 0, 5, 5)))
            .layer(Conv2D::new(2, (3, 3)))
            .layer(Flatten::new())
            .build()
            .unwrap_err();
        assert_eq!(err, zero);
    }

    #[test]
    fn quantized_input_is_rejected() {
        let err = ModelBuilder::new(Input::with_dtype(&crate::dtype::Q7, Shape::d2(1, 2)))
            .layer(Dense::new(1))
            .build()
            .unwrap_err();
        assert_eq!(err, Error::UnsupportedDtype("q7"));
    }

    #[test]
    fn freezing_recounts_trainable_tensors() {
        let mut model = ModelBuilder::new(Input::new(Shape::d2(1, 2)))
            .layer(Dense::new(2))
            .layer(Dense::new(1))
            .loss(Mse::new())
            .build()
            .unwrap();
        assert_eq!(model.trainable_params_count(), 4);
        model.set_trainable(1, false).unwrap();
        assert_eq!(model.trainable_params_count(), 2);
        assert!(model.set_trainable(9, false).is_err());
    }
}
