//! The sequential engine: forward, backward, parameter updates and training.
//!
//! Every pass walks the layer chain in order (or in reverse) and hands each
//! layer disjoint views of the scheduled blocks, carved from the regions the
//! planner recorded. Layer `i` reads the result of layer `i - 1`; layer 1
//! reads the caller's input directly, so the input layer owns no memory.
//!
//! Backpropagation is seeded by the loss, either into its own connection
//! deltas or, for fused losses, straight into the output layer's deltas, and
//! stops after the first layer flagged [`Settings::NO_INPUT_GRADIENT`].
//! Gradients accumulate across sub-batches until [`Model::update_params`].

use alloc::boxed::Box;

use tracing::{debug, trace};

use crate::data::Dataset;
use crate::error::{Error, Result};
use crate::layers::{Backward, Forward, Layer, Settings, MAX_TRAINABLE};
use crate::memory::{carve, floats_mut, MemoryKind, Region};
use crate::model::Model;
use crate::optim::Optimizer;
use crate::tensors::{Shape, TensorMut, TensorRef};

fn param_block<'a>(params: Option<&'a [u8]>, layers: &[Box<dyn Layer>]) -> Result<&'a [u8]> {
    match params {
        Some(block) => Ok(block),
        None if layers.iter().all(|l| l.trainable().is_none()) => Ok(&[]),
        None => Err(Error::NotScheduled(MemoryKind::Parameter)),
    }
}

fn training_work(schedule: Option<MemoryKind>, work: Option<&mut [u8]>) -> Result<&mut [u8]> {
    match (schedule, work) {
        (Some(MemoryKind::Training), Some(block)) => Ok(block),
        _ => Err(Error::NotScheduled(MemoryKind::Training)),
    }
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected == actual { Ok(()) } else { Err(Error::ShapeMismatch { expected, actual }) }
}

fn rows<'a>(tensor: &TensorRef<'a>, start: usize, end: usize) -> Result<TensorRef<'a>> {
    let expected = end * tensor.shape().row_len();
    tensor.rows(start, end).ok_or(Error::ShapeMismatch { expected, actual: tensor.data().len() })
}

fn gradient_regions(layer: &dyn Layer) -> [Region; MAX_TRAINABLE] {
    match layer.trainable() {
        Some(t) if layer.is_trainable() => t.gradient_regions(),
        _ => [Region::EMPTY; MAX_TRAINABLE],
    }
}

fn zero_all_gradients(layers: &[Box<dyn Layer>], optimizer: &dyn Optimizer, work: &mut [u8]) -> Result<()> {
    for layer in layers.iter().filter(|l| l.is_trainable()) {
        for region in gradient_regions(layer.as_ref()) {
            optimizer.zero_gradients(floats_mut(work, region)?);
        }
    }
    Ok(())
}

/// Initialises optimizer state and clears gradients of every trainable layer
/// in a training block.
pub(crate) fn clear_training_state(
    layers: &[Box<dyn Layer>],
    optimizer: &dyn Optimizer,
    work: &mut [u8],
) -> Result<()> {
    for layer in layers.iter().filter(|l| l.is_trainable()) {
        let Some(t) = layer.trainable() else { continue };
        for (param, &region) in t.params().iter().zip(t.optimem()) {
            optimizer.init_optimem(param, floats_mut(work, region)?);
        }
    }
    zero_all_gradients(layers, optimizer, work)
}

impl Model<'_> {
    /// Shape the input layer accepts.
    #[must_use]
    pub fn input_shape(&self) -> Shape {
        self.layers[0].core().result.shape
    }

    /// Shape of the output layer's result.
    #[must_use]
    pub fn output_shape(&self) -> Shape {
        self.layers.last().map_or(Shape::EMPTY, |l| l.core().result.shape)
    }

    /// Runs every layer on one batch and returns a view of the output.
    ///
    /// The input must hold exactly as many elements as the input layer's
    /// shape. The view lives in the work block and is overwritten by the next
    /// pass.
    ///
    /// # Errors
    /// - [`Error::ShapeMismatch`] for a wrongly sized input
    /// - [`Error::NotScheduled`] without work memory, or without parameter
    ///   memory when a layer has parameters
    pub fn forward(&mut self, input: TensorRef<'_>) -> Result<TensorRef<'_>> {
        check_len(self.input_shape().elements(), input.data().len())?;
        let params = param_block(self.params.as_deref(), &self.layers)?;
        let work = self.work.as_deref_mut().ok_or(Error::NotScheduled(MemoryKind::Inference))?;

        for (i, layer) in self.layers.iter().enumerate().skip(1) {
            let core = layer.core();
            let source = if i == 1 { Region::EMPTY } else { self.layers[i - 1].core().result.data };
            let [previous, result, scratch] = carve(work, [source, core.result.data, core.fwdmem])?;
            let input = if i == 1 { input.data() } else { &*previous };
            layer.forward(Forward { input, result, scratch, params })?;
        }

        let shape = self.output_shape();
        let block = self.work.as_deref().ok_or(Error::NotScheduled(MemoryKind::Inference))?;
        let output = self.layers.last().ok_or(Error::InvalidConfig("empty model"))?;
        let data = crate::memory::floats(block, output.core().result.data)?;
        TensorRef::new(shape, data)
    }

    /// Runs the model over any number of rows, one model batch at a time,
    /// writing every output row to `output`.
    ///
    /// # Errors
    /// - [`Error::ShapeMismatch`] when a row length or the output size is
    ///   wrong
    /// - [`Error::InvalidConfig`] when the row count is not a multiple of the
    ///   model batch
    /// - the errors of [`Model::forward`]
    pub fn inference(&mut self, input: TensorRef<'_>, mut output: TensorMut<'_>) -> Result<()> {
        let (in_shape, out_shape) = (self.input_shape(), self.output_shape());
        let batch = in_shape.batch();
        let count = input.shape().batch();
        check_len(in_shape.row_len(), input.shape().row_len())?;
        check_len(count * out_shape.row_len(), output.data().len())?;
        if count % batch != 0 {
            return Err(Error::InvalidConfig("row count must be a multiple of the model batch"));
        }

        let out_len = batch * out_shape.row_len();
        for (i, chunk) in output.data_mut().chunks_exact_mut(out_len).enumerate() {
            let result = self.forward(rows(&input, i * batch, (i + 1) * batch)?)?;
            chunk.copy_from_slice(result.data());
        }
        Ok(())
    }

    /// Seeds the loss gradient from `target` and backpropagates it,
    /// accumulating into every trainable layer's gradients.
    ///
    /// Expects the results of a [`Model::forward`] on the same `input`, which
    /// is read again because the engine keeps no copy of it.
    ///
    /// # Errors
    /// - [`Error::NotScheduled`] without training memory
    /// - [`Error::MissingLoss`] without a loss
    /// - [`Error::ShapeMismatch`] for a wrongly sized input or target
    pub fn backward(&mut self, input: TensorRef<'_>, target: TensorRef<'_>) -> Result<()> {
        let loss = self.loss.as_deref().ok_or(Error::MissingLoss)?;
        check_len(self.input_shape().elements(), input.data().len())?;
        check_len(self.output_shape().elements(), target.data().len())?;
        let params = param_block(self.params.as_deref(), &self.layers)?;
        let work = training_work(self.schedule, self.work.as_deref_mut())?;
        let layers = &self.layers;
        let n = layers.len();

        let output = layers[n - 1].core();
        if !loss.bypasses_output() {
            let [predicted, deltas] = carve(work, [output.result.data, loss.deltas().data])?;
            loss.calc_delta(predicted, target.data(), deltas);
        } else if !output.settings.contains(Settings::NO_INPUT_GRADIENT) {
            let [predicted, deltas] = carve(work, [output.result.data, output.deltas.data])?;
            loss.calc_delta(predicted, target.data(), deltas);
        }

        for i in (1..n).rev() {
            let layer = &layers[i];
            let core = layer.core();
            let stop = core.settings.contains(Settings::NO_INPUT_GRADIENT);

            if !core.settings.contains(Settings::BYPASS_BACKWARD) {
                let source = if i == 1 { Region::EMPTY } else { layers[i - 1].core().result.data };
                let upstream = if i + 1 < n { layers[i + 1].core().deltas.data } else { loss.deltas().data };
                let own = if stop { Region::EMPTY } else { core.deltas.data };
                let [g0, g1] = gradient_regions(layer.as_ref());
                let [previous, result, output_deltas, deltas, g0, g1, scratch] =
                    carve(work, [source, core.result.data, upstream, own, g0, g1, core.bwdmem])?;

                layer.backward(Backward {
                    input: if i == 1 { input.data() } else { &*previous },
                    result: &*result,
                    output_deltas: &*output_deltas,
                    deltas: if stop { None } else { Some(deltas) },
                    gradients: [g0, g1],
                    scratch,
                    params,
                })?;
            }

            if stop {
                break;
            }
        }
        Ok(())
    }

    /// Clears every trainable layer's gradient accumulators.
    ///
    /// # Errors
    /// [`Error::NotScheduled`] without training memory.
    pub fn zero_gradients(&mut self, optimizer: &dyn Optimizer) -> Result<()> {
        let work = training_work(self.schedule, self.work.as_deref_mut())?;
        zero_all_gradients(&self.layers, optimizer, work)
    }

    /// Restarts `optimizer`, clears its state and the gradients.
    ///
    /// # Errors
    /// [`Error::NotScheduled`] without training memory.
    pub fn init_for_training(&mut self, optimizer: &mut dyn Optimizer) -> Result<()> {
        optimizer.reset();
        self.reset_training_state(optimizer)
    }

    fn reset_training_state(&mut self, optimizer: &dyn Optimizer) -> Result<()> {
        let work = training_work(self.schedule, self.work.as_deref_mut())?;
        clear_training_state(&self.layers, optimizer, work)
    }

    /// Applies the accumulated gradients with one optimizer step.
    ///
    /// # Errors
    /// - [`Error::NotScheduled`] without parameter or training memory
    /// - [`Error::OptimizerMismatch`] when training memory was scheduled for
    ///   an optimizer with a different state size
    pub fn update_params(&mut self, optimizer: &mut dyn Optimizer) -> Result<()> {
        let alignment = self.config.alignment;
        let params = self.params.as_deref_mut().ok_or(Error::NotScheduled(MemoryKind::Parameter))?;
        let work = training_work(self.schedule, self.work.as_deref_mut())?;
        let layers = &self.layers;

        for t in layers.iter().filter(|l| l.is_trainable()).filter_map(|l| l.trainable()) {
            for (param, region) in t.params().iter().zip(t.optimem()) {
                if optimizer.sizeof_optimem(param, alignment) != region.len {
                    return Err(Error::OptimizerMismatch);
                }
            }
        }

        optimizer.begin_step();
        for t in layers.iter().filter(|l| l.is_trainable()).filter_map(|l| l.trainable()) {
            for i in 0..t.count() {
                let values = floats_mut(params, t.params()[i].data)?;
                let [gradients, optimem] = carve(work, [t.gradients()[i].data, t.optimem()[i]])?;
                optimizer.update_params(values, gradients, optimem);
            }
        }
        optimizer.end_step();
        Ok(())
    }

    /// Trains one epoch over `input` and `target`.
    ///
    /// Rows are taken `batch_size` at a time. Each step zeroes the gradients,
    /// runs forward and backward on consecutive model batches of the step
    /// (accumulating their gradients) and updates the parameters once.
    /// Trailing rows that do not fill a step are skipped.
    ///
    /// # Errors
    /// - [`Error::NotScheduled`] without training or parameter memory
    /// - [`Error::MissingLoss`] without a loss
    /// - [`Error::InvalidConfig`] when `batch_size` is not a positive
    ///   multiple of the model batch
    /// - [`Error::ShapeMismatch`] for mismatched rows
    pub fn train(
        &mut self,
        input: TensorRef<'_>,
        target: TensorRef<'_>,
        optimizer: &mut dyn Optimizer,
        batch_size: usize,
    ) -> Result<()> {
        training_work(self.schedule, self.work.as_deref_mut())?;
        if self.loss.is_none() {
            return Err(Error::MissingLoss);
        }
        let batch = self.input_shape().batch();
        if batch_size == 0 || batch_size % batch != 0 {
            return Err(Error::InvalidConfig("batch size must be a multiple of the model batch"));
        }
        check_len(self.input_shape().row_len(), input.shape().row_len())?;
        check_len(self.output_shape().row_len(), target.shape().row_len())?;
        let data = Dataset::new(input, target)?;

        self.set_mode(true, batch_size == batch);
        let result = self.run_epoch(&data, optimizer, batch_size);
        self.set_mode(false, false);
        result
    }

    fn set_mode(&mut self, training: bool, batch_mode: bool) {
        for layer in &mut self.layers {
            let settings = &mut layer.core_mut().settings;
            settings.set(Settings::TRAINING_MODE, training);
            settings.set(Settings::BATCH_MODE, batch_mode);
        }
    }

    fn run_epoch(&mut self, data: &Dataset<'_>, optimizer: &mut dyn Optimizer, batch_size: usize) -> Result<()> {
        let batch = self.input_shape().batch();
        let mut steps = 0;
        for (x, y) in data.batches(batch_size) {
            self.zero_gradients(&*optimizer)?;
            for start in (0..batch_size).step_by(batch) {
                let (xb, yb) = (rows(&x, start, start + batch)?, rows(&y, start, start + batch)?);
                self.forward(xb)?;
                self.backward(xb, yb)?;
            }
            self.update_params(optimizer)?;
            trace!(step = steps, "training step");
            steps += 1;
        }
        let skipped = data.num_samples() % batch_size;
        debug!(steps, skipped, "finished epoch");
        Ok(())
    }

    /// Loss over all rows of `input` against `target`, summed over rows.
    ///
    /// # Errors
    /// - [`Error::MissingLoss`] without a loss
    /// - [`Error::InvalidConfig`] when the row count is not a multiple of the
    ///   model batch
    /// - the errors of [`Model::forward`]
    pub fn calc_loss(&mut self, input: TensorRef<'_>, target: TensorRef<'_>) -> Result<f32> {
        if self.loss.is_none() {
            return Err(Error::MissingLoss);
        }
        let batch = self.input_shape().batch();
        check_len(self.input_shape().row_len(), input.shape().row_len())?;
        check_len(self.output_shape().row_len(), target.shape().row_len())?;
        let data = Dataset::new(input, target)?;
        if data.num_samples() % batch != 0 {
            return Err(Error::InvalidConfig("row count must be a multiple of the model batch"));
        }

        let mut total = 0.0;
        for (x, y) in data.batches(batch) {
            self.forward(x)?;
            let loss = self.loss.as_deref().ok_or(Error::MissingLoss)?;
            total += loss.calc_loss(self.output()?, y.data());
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Activation, Dense, Input};
    use crate::loss::Mse;
    use crate::memory::AlignedBlock;
    use crate::model::ModelBuilder;
    use crate::optim::{Adam, Sgd};

    fn linear<'m>() -> Model<'m> {
        ModelBuilder::new(Input::new(Shape::d2(1, 2))).layer(Dense::new(1)).loss(Mse::new()).build().unwrap()
    }

    #[test]
    fn forward_computes_affine_map() {
        let mut params = AlignedBlock::<64>::new();
        let mut work = AlignedBlock::<64>::new();
        let mut model = linear();
        model.distribute_parameter_memory(params.as_bytes_mut()).unwrap();
        model.schedule_inference_memory(work.as_bytes_mut()).unwrap();
        model.params_mut(1, 0).unwrap().copy_from_slice(&[2.0, -1.0]);
        model.params_mut(1, 1).unwrap().copy_from_slice(&[0.5]);

        let x = [3.0, 4.0];
        let out = model.forward(TensorRef::new(Shape::d2(1, 2), &x).unwrap()).unwrap();
        assert_eq!(out.shape(), Shape::d2(1, 1));
        assert_eq!(out.data(), &[2.5]);
    }

    #[test]
    fn forward_needs_memory_and_a_matching_input() {
        let mut params = AlignedBlock::<64>::new();
        let mut model = linear();
        let x = [1.0, 2.0];
        let err = model.forward(TensorRef::new(Shape::d2(1, 2), &x).unwrap()).unwrap_err();
        assert_eq!(err, Error::NotScheduled(MemoryKind::Parameter));

        model.distribute_parameter_memory(params.as_bytes_mut()).unwrap();
        let err = model.forward(TensorRef::new(Shape::d2(1, 2), &x).unwrap()).unwrap_err();
        assert_eq!(err, Error::NotScheduled(MemoryKind::Inference));

        let y = [1.0, 2.0, 3.0];
        let err = model.forward(TensorRef::new(Shape::d2(1, 3), &y).unwrap()).unwrap_err();
        assert_eq!(err, Error::ShapeMismatch { expected: 2, actual: 3 });
    }

    #[test]
    fn one_sgd_step_on_a_linear_unit() {
        let mut params = AlignedBlock::<64>::new();
        let mut work = AlignedBlock::<128>::new();
        let mut model = linear();
        let mut sgd = Sgd::new(0.1);
        model.distribute_parameter_memory(params.as_bytes_mut()).unwrap();
        model.schedule_training_memory(&sgd, work.as_bytes_mut()).unwrap();
        model.params_mut(1, 0).unwrap().copy_from_slice(&[1.0, 1.0]);
        model.params_mut(1, 1).unwrap().copy_from_slice(&[0.0]);

        // prediction 3, target 1: delta 2, dw = x * 2, db = 2
        let x = [1.0, 2.0];
        let y = [1.0];
        let (x, y) = (TensorRef::new(Shape::d2(1, 2), &x).unwrap(), TensorRef::new(Shape::d2(1, 1), &y).unwrap());
        model.train(x, y, &mut sgd, 1).unwrap();

        assert_eq!(model.gradients(1, 0).unwrap(), &[2.0, 4.0]);
        assert_eq!(model.gradients(1, 1).unwrap(), &[2.0]);
        let w = model.params(1, 0).unwrap();
        assert!((w[0] - 0.8).abs() < 1e-6 && (w[1] - 0.6).abs() < 1e-6);
        assert!((model.params(1, 1).unwrap()[0] + 0.2).abs() < 1e-6);
        assert!(!model.layer(1).unwrap().core().settings.contains(Settings::TRAINING_MODE));
    }

    #[test]
    fn optimizer_must_match_schedule() {
        let mut params = AlignedBlock::<64>::new();
        let mut work = AlignedBlock::<256>::new();
        let mut model = linear();
        model.distribute_parameter_memory(params.as_bytes_mut()).unwrap();
        model.schedule_training_memory(&Sgd::new(0.1), work.as_bytes_mut()).unwrap();
        assert_eq!(model.update_params(&mut Adam::new(0.1)), Err(Error::OptimizerMismatch));
    }

    #[test]
    fn train_rejects_partial_model_batches() {
        let mut params = AlignedBlock::<64>::new();
        let mut work = AlignedBlock::<256>::new();
        let mut model = ModelBuilder::new(Input::new(Shape::d2(2, 2)))
            .layer(Dense::new(1))
            .layer(Activation::sigmoid())
            .loss(Mse::new())
            .build()
            .unwrap();
        let mut sgd = Sgd::new(0.1);
        model.distribute_parameter_memory(params.as_bytes_mut()).unwrap();
        model.schedule_training_memory(&sgd, work.as_bytes_mut()).unwrap();
        let x = [0.0; 8];
        let y = [0.0; 4];
        let (x, y) = (TensorRef::new(Shape::d2(4, 2), &x).unwrap(), TensorRef::new(Shape::d2(4, 1), &y).unwrap());
        assert!(matches!(model.train(x, y, &mut sgd, 3), Err(Error::InvalidConfig(_))));
        assert!(model.train(x, y, &mut sgd, 4).is_ok());
    }
}
