//! Ahead-of-time memory planning.
//!
//! Three categories of memory are planned, each living in one flat block the
//! caller supplies:
//!
//! - **Parameter**: trainable tensors of every layer.
//! - **Inference**: every layer's result and forward scratch.
//! - **Training**: the inference layout, then per layer its deltas,
//!   gradients and optimizer state, then the loss's connection deltas, then
//!   one backward scratch region shared by all layers (sized for the largest).
//!
//! Size queries and distribution walk the chain in the same order and ask
//! each layer the same questions, so a block of exactly the queried size is
//! always consumed exactly. Every region starts on the configured alignment.
//! After each `set_*` callback the cursor must have moved by exactly what the
//! matching `sizeof_*` reported, otherwise [`Error::PlanMismatch`].
//!
//! Capacity and alignment are checked before any callback runs, so a failed
//! distribution leaves no region assigned from the rejected block.

use tracing::{debug, warn};

use crate::error::{Error, Placement, Rejected, Result};
use crate::layers::{Layer, LayerKind, Settings};
use crate::memory::{align_up, Arena, MemoryKind, Region};
use crate::model::Model;
use crate::optim::Optimizer;
use crate::sequential::clear_training_state;
use crate::tensors::{sizeof_data, sizeof_params, sizeof_tensor, Tensor};

fn inference_bytes(layer: &dyn Layer, alignment: usize) -> usize {
    sizeof_tensor(&layer.core().result, alignment) + align_up(layer.sizeof_fwdmem(), alignment)
}

fn optimem_bytes(layer: &dyn Layer, optimizer: &dyn Optimizer, alignment: usize) -> usize {
    match layer.trainable() {
        Some(t) if layer.is_trainable() => t.params().iter().map(|p| optimizer.sizeof_optimem(p, alignment)).sum(),
        _ => 0,
    }
}

fn training_bytes(layer: &dyn Layer, optimizer: &dyn Optimizer, alignment: usize) -> usize {
    let core = layer.core();
    let deltas =
        if core.settings.contains(Settings::NO_INPUT_GRADIENT) { 0 } else { sizeof_tensor(&core.deltas, alignment) };
    let gradients = layer.sizeof_trainmem(alignment);
    inference_bytes(layer, alignment) + deltas + gradients + optimem_bytes(layer, optimizer, alignment)
}

fn place_tensor(tensor: &mut Tensor, arena: &mut Arena) {
    tensor.params = arena.alloc(sizeof_params(tensor));
    tensor.data = arena.alloc(sizeof_data(tensor));
}

/// Runs a `set_*` callback and checks it consumed exactly `reported` bytes.
fn claim(layer: LayerKind, reported: usize, arena: &mut Arena, set: impl FnOnce(&mut Arena)) -> Result<()> {
    let before = arena.used();
    set(arena);
    let consumed = arena.used() - before;
    if consumed == reported {
        Ok(())
    } else {
        Err(Error::PlanMismatch { layer, reported, consumed })
    }
}

fn place_inference(layer: &mut dyn Layer, arena: &mut Arena) -> Result<()> {
    place_tensor(&mut layer.core_mut().result, arena);
    let reported = align_up(layer.sizeof_fwdmem(), arena.alignment());
    claim(layer.kind(), reported, arena, |arena| layer.set_fwdmem(arena))
}

fn place_training(layer: &mut dyn Layer, optimizer: &dyn Optimizer, arena: &mut Arena) -> Result<()> {
    place_inference(layer, arena)?;

    let kind = layer.kind();
    let core = layer.core_mut();
    if core.settings.contains(Settings::NO_INPUT_GRADIENT) {
        core.deltas.params = Region::EMPTY;
        core.deltas.data = Region::EMPTY;
    } else {
        place_tensor(&mut core.deltas, arena);
    }

    let reported = layer.sizeof_trainmem(arena.alignment());
    claim(kind, reported, arena, |arena| layer.set_trainmem(arena))?;

    let trainable = layer.is_trainable();
    if let Some(t) = layer.trainable_mut() {
        for i in 0..t.count() {
            let region = if trainable {
                arena.alloc(optimizer.sizeof_optimem(&t.params()[i], arena.alignment()))
            } else {
                Region::EMPTY
            };
            t.optimem_mut()[i] = region;
        }
    }
    Ok(())
}

impl<'m> Model<'m> {
    /// Bytes of the inference block: every layer's result and forward scratch.
    #[must_use]
    pub fn sizeof_inference_memory(&self) -> usize {
        let alignment = self.config.alignment;
        self.layers.iter().skip(1).map(|l| inference_bytes(l.as_ref(), alignment)).sum()
    }

    /// Bytes of the parameter block.
    #[must_use]
    pub fn sizeof_parameter_memory(&self) -> usize {
        let alignment = self.config.alignment;
        self.layers.iter().map(|l| l.sizeof_paramem(alignment)).sum()
    }

    /// Bytes of the training block for `optimizer`.
    ///
    /// # Errors
    /// [`Error::MissingLoss`] when no loss is attached.
    pub fn sizeof_training_memory(&self, optimizer: &dyn Optimizer) -> Result<usize> {
        let loss = self.loss.as_deref().ok_or(Error::MissingLoss)?;
        let alignment = self.config.alignment;
        let layers: usize = self.layers.iter().skip(1).map(|l| training_bytes(l.as_ref(), optimizer, alignment)).sum();
        Ok(layers + loss.sizeof_trainmem(alignment) + align_up(self.sizeof_backward_scratch(), alignment))
    }

    fn sizeof_backward_scratch(&self) -> usize {
        self.layers.iter().skip(1).map(|l| l.sizeof_bwdmem()).max().unwrap_or(0)
    }

    fn check_block(&self, kind: MemoryKind, required: usize, block: &[u8]) -> Result<()> {
        if block.len() < required {
            warn!(%kind, required, available = block.len(), "memory block too small");
            return Err(Error::BufferTooSmall { required, available: block.len() });
        }
        self.config.check_block(block).inspect_err(|_| {
            warn!(%kind, alignment = self.config.alignment, "memory block misaligned");
        })
    }

    /// Assigns parameter regions from `block` and keeps it for the model's
    /// lifetime. Parameter values are left untouched.
    ///
    /// # Errors
    /// [`Error::BufferTooSmall`], [`Error::MisalignedBlock`] or
    /// [`Error::PlanMismatch`], with `block` handed back.
    pub fn distribute_parameter_memory(&mut self, block: &'m mut [u8]) -> Placement<'m> {
        match self.plan_parameters(block) {
            Ok(()) => {
                self.params = Some(block);
                Ok(())
            }
            Err(error) => Err(Rejected { error, block }),
        }
    }

    fn plan_parameters(&mut self, block: &[u8]) -> Result<()> {
        let required = self.sizeof_parameter_memory();
        self.check_block(MemoryKind::Parameter, required, block)?;
        self.params = None;

        let mut arena = Arena::new(self.config.alignment);
        for layer in &mut self.layers {
            let reported = layer.sizeof_paramem(arena.alignment());
            claim(layer.kind(), reported, &mut arena, |arena| layer.set_paramem(arena))?;
        }
        debug_assert_eq!(arena.used(), required);
        debug!(required, available = block.len(), "distributed parameter memory");
        Ok(())
    }

    /// Lays out results and forward scratch in `block` for inference only.
    ///
    /// # Errors
    /// [`Error::BufferTooSmall`], [`Error::MisalignedBlock`] or
    /// [`Error::PlanMismatch`], with `block` handed back.
    pub fn schedule_inference_memory(&mut self, block: &'m mut [u8]) -> Placement<'m> {
        match self.plan_inference(block) {
            Ok(()) => {
                self.work = Some(block);
                self.schedule = Some(MemoryKind::Inference);
                Ok(())
            }
            Err(error) => Err(Rejected { error, block }),
        }
    }

    fn plan_inference(&mut self, block: &[u8]) -> Result<()> {
        let required = self.sizeof_inference_memory();
        self.check_block(MemoryKind::Inference, required, block)?;
        self.work = None;
        self.schedule = None;

        let mut arena = Arena::new(self.config.alignment);
        for layer in self.layers.iter_mut().skip(1) {
            place_inference(layer.as_mut(), &mut arena)?;
        }
        debug_assert_eq!(arena.used(), required);
        debug!(required, available = block.len(), "scheduled inference memory");
        Ok(())
    }

    /// Lays out the full training layout for `optimizer` in `block`, then
    /// zeroes gradients and optimizer state.
    ///
    /// # Errors
    /// [`Error::MissingLoss`], [`Error::BufferTooSmall`],
    /// [`Error::MisalignedBlock`] or [`Error::PlanMismatch`], with `block`
    /// handed back.
    pub fn schedule_training_memory(&mut self, optimizer: &dyn Optimizer, block: &'m mut [u8]) -> Placement<'m> {
        let planned = match self.plan_training(optimizer, block) {
            Ok(()) => clear_training_state(&self.layers, optimizer, block),
            Err(error) => Err(error),
        };
        match planned {
            Ok(()) => {
                self.work = Some(block);
                self.schedule = Some(MemoryKind::Training);
                Ok(())
            }
            Err(error) => Err(Rejected { error, block }),
        }
    }

    fn plan_training(&mut self, optimizer: &dyn Optimizer, block: &[u8]) -> Result<()> {
        let required = self.sizeof_training_memory(optimizer)?;
        self.check_block(MemoryKind::Training, required, block)?;
        self.work = None;
        self.schedule = None;

        let mut arena = Arena::new(self.config.alignment);
        for layer in self.layers.iter_mut().skip(1) {
            place_training(layer.as_mut(), optimizer, &mut arena)?;
        }
        if let Some(loss) = self.loss.as_deref_mut() {
            loss.set_trainmem(&mut arena);
        }
        let scratch = arena.alloc(self.sizeof_backward_scratch());
        for layer in self.layers.iter_mut().skip(1) {
            layer.set_bwdmem(scratch);
        }
        debug_assert_eq!(arena.used(), required);
        debug!(required, available = block.len(), scratch = scratch.len, "scheduled training memory");
        Ok(())
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
    use crate::tensors::Shape;

    fn xor_model<'m>() -> Model<'m> {
        ModelBuilder::new(Input::new(Shape::d2(4, 2)))
            .layer(Dense::new(3))
            .layer(Activation::sigmoid())
            .layer(Dense::new(1))
            .layer(Activation::sigmoid())
            .loss(Mse::new())
            .build()
            .unwrap()
    }

    #[test]
    fn sizes_of_the_xor_network() {
        let model = xor_model();
        assert_eq!(model.sizeof_parameter_memory(), 52);
        assert_eq!(model.sizeof_inference_memory(), 48 + 48 + 16 + 16);
        // inference 128, deltas 48 + 48 + 16 (none for the first dense),
        // gradients 36 + 16, loss deltas 16, shared scratch 24
        assert_eq!(model.sizeof_training_memory(&Sgd::new(0.1)).unwrap(), 332);
        // Adam adds two moments per parameter tensor
        assert_eq!(model.sizeof_training_memory(&Adam::new(0.1)).unwrap(), 332 + 2 * 52);
    }

    #[test]
    fn training_without_loss_is_rejected() {
        let model = ModelBuilder::new(Input::new(Shape::d2(1, 2))).layer(Dense::new(1)).build().unwrap();
        assert_eq!(model.sizeof_training_memory(&Sgd::new(0.1)), Err(Error::MissingLoss));
    }

    #[test]
    fn capacity_is_checked_before_distribution() {
        let mut block = AlignedBlock::<64>::new();
        let mut model = xor_model();
        let err = model.schedule_training_memory(&Sgd::new(0.1), block.as_bytes_mut()).unwrap_err();
        assert_eq!(err.error, Error::BufferTooSmall { required: 332, available: 64 });
        assert_eq!(err.block.len(), 64);
        assert_eq!(model.schedule(), None);
        assert_eq!(model.layer(1).unwrap().core().result.data, Region::EMPTY);
    }

    #[test]
    fn exact_block_is_consumed_exactly() {
        let mut block = AlignedBlock::<332>::new();
        let mut model = xor_model();
        model.schedule_training_memory(&Sgd::new(0.1), block.as_bytes_mut()).unwrap();
        let last = model.loss().unwrap().deltas().data;
        // loss deltas are followed only by the 24-byte shared scratch
        assert_eq!(last.end() + 24, 332);
        assert_eq!(model.schedule(), Some(MemoryKind::Training));
    }
}
