use tinyfes::layers::{
    Activation, Backward, Conv2D, Dense, Flatten, Forward, Input, Layer, LayerCore, LayerKind, Softmax, Trainable,
};
use tinyfes::loss::{CrossEntropy, LossKind, Mse};
use tinyfes::memory::{AlignedBlock, Arena, MemoryKind, Region};
use tinyfes::model::{Model, ModelBuilder};
use tinyfes::optim::{Adam, Optimizer, Sgd};
use tinyfes::tensors::Shape;
use tinyfes::Error;

fn dense_chain<'m>(alignment: usize) -> Model<'m> {
    ModelBuilder::new(Input::new(Shape::d2(3, 5)))
        .layer(Dense::new(7))
        .layer(Activation::leaky_relu(0.01))
        .layer(Dense::new(3))
        .layer(Softmax::new())
        .loss(CrossEntropy::new())
        .alignment(alignment)
        .build()
        .unwrap()
}

fn conv_chain<'m>(alignment: usize) -> Model<'m> {
    ModelBuilder::new(Input::new(Shape::d4(2, 1, 6, 6)))
        .layer(Conv2D::new(3, (3, 3)).with_padding((1, 1)))
        .layer(Activation::tanh())
        .layer(Conv2D::new(2, (3, 3)).with_stride((2, 2)))
        .layer(Flatten::new())
        .layer(Dense::new(1))
        .layer(Activation::sigmoid())
        .loss(Mse::new())
        .alignment(alignment)
        .build()
        .unwrap()
}

/// Every exclusive region of the training layout, the shared scratch left out.
fn training_regions(model: &Model<'_>) -> Vec<Region> {
    let mut regions = Vec::new();
    for layer in model.layers().skip(1) {
        let core = layer.core();
        regions.extend([core.result.data, core.deltas.data, core.fwdmem]);
        if let Some(t) = layer.trainable() {
            regions.extend(t.gradients().iter().map(|g| g.data));
            regions.extend(t.optimem().iter().copied());
        }
    }
    regions.push(model.loss().unwrap().deltas().data);
    regions.retain(|r| !r.is_empty());
    regions
}

fn assert_disjoint_and_aligned(mut regions: Vec<Region>, len: usize, alignment: usize) {
    regions.sort_by_key(|r| r.offset);
    for pair in regions.windows(2) {
        assert!(pair[0].end() <= pair[1].offset, "{:?} overlaps {:?}", pair[0], pair[1]);
    }
    for r in &regions {
        assert_eq!(r.offset % alignment, 0, "{r:?} is not aligned to {alignment}");
        assert!(r.end() <= len);
    }
}

/// A dense layer that takes one float more parameter memory than it reports.
#[derive(Debug)]
struct Overreaching(Dense);

impl Layer for Overreaching {
    fn kind(&self) -> LayerKind {
        self.0.kind()
    }

    fn core(&self) -> &LayerCore {
        self.0.core()
    }

    fn core_mut(&mut self) -> &mut LayerCore {
        self.0.core_mut()
    }

    fn calc_result_shape(&mut self, input: &Shape) -> tinyfes::Result<Shape> {
        self.0.calc_result_shape(input)
    }

    fn trainable(&self) -> Option<&Trainable> {
        self.0.trainable()
    }

    fn trainable_mut(&mut self) -> Option<&mut Trainable> {
        self.0.trainable_mut()
    }

    fn set_paramem(&mut self, arena: &mut Arena) {
        self.0.set_paramem(arena);
        let _ = arena.alloc(4);
    }

    fn forward(&self, pass: Forward<'_>) -> tinyfes::Result<()> {
        self.0.forward(pass)
    }

    fn backward(&self, pass: Backward<'_>) -> tinyfes::Result<()> {
        self.0.backward(pass)
    }
}

fn check_exact_training_fit<'m>(mut model: Model<'m>, optimizer: &dyn Optimizer, block: &'m mut [u8]) {
    let alignment = model.config().alignment;
    let required = model.sizeof_training_memory(optimizer).unwrap();
    assert!(required <= block.len());
    let block = &mut block[..required];
    model.schedule_training_memory(optimizer, block).unwrap();
    assert_eq!(model.schedule(), Some(MemoryKind::Training));

    let regions = training_regions(&model);
    let end = regions.iter().map(|r| tinyfes::memory::align_up(r.end(), alignment)).max().unwrap();
    for layer in model.layers() {
        let scratch = layer.core().bwdmem;
        assert!(scratch.is_empty() || scratch.offset >= end);
        assert!(scratch.end() <= required);
    }
    assert_disjoint_and_aligned(regions, required, alignment);
}

#[test]
fn training_layout_fits_queried_size_exactly() {
    let mut block = AlignedBlock::<16384>::new();
    for alignment in [4, 8, 16] {
        check_exact_training_fit(dense_chain(alignment), &Sgd::new(0.1), block.as_bytes_mut());
        check_exact_training_fit(dense_chain(alignment), &Adam::new(0.01), block.as_bytes_mut());
        check_exact_training_fit(conv_chain(alignment), &Sgd::with_momentum(0.1, 0.9), block.as_bytes_mut());
        check_exact_training_fit(conv_chain(alignment), &Adam::new(0.01), block.as_bytes_mut());
    }
}

#[test]
fn inference_and_parameter_layouts_fit_exactly() {
    let mut params = AlignedBlock::<4096>::new();
    let mut work = AlignedBlock::<4096>::new();
    let mut model = conv_chain(16);

    let p = model.sizeof_parameter_memory();
    let w = model.sizeof_inference_memory();
    // 3x1x3x3 + 3, 2x3x3x3 + 2, 8x1 + 1 floats, each tensor padded to 16
    assert_eq!(p, 112 + 16 + 224 + 16 + 32 + 16);
    model.distribute_parameter_memory(&mut params.as_bytes_mut()[..p]).unwrap();
    model.schedule_inference_memory(&mut work.as_bytes_mut()[..w]).unwrap();
    assert_eq!(model.schedule(), Some(MemoryKind::Inference));

    let mut regions: Vec<Region> = model
        .layers()
        .skip(1)
        .flat_map(|l| [l.core().result.data, l.core().fwdmem])
        .filter(|r| !r.is_empty())
        .collect();
    assert_disjoint_and_aligned(regions.clone(), w, 16);

    regions.clear();
    for layer in model.layers() {
        if let Some(t) = layer.trainable() {
            regions.extend(t.params().iter().map(|p| p.data));
        }
    }
    assert_eq!(regions.len(), 6);
    assert_disjoint_and_aligned(regions, p, 16);
}

#[test]
fn adam_needs_two_moments_per_parameter() {
    let model = dense_chain(4);
    let sgd = model.sizeof_training_memory(&Sgd::new(0.1)).unwrap();
    let momentum = model.sizeof_training_memory(&Sgd::with_momentum(0.1, 0.9)).unwrap();
    let adam = model.sizeof_training_memory(&Adam::new(0.1)).unwrap();
    let params = model.sizeof_parameter_memory();
    assert_eq!(momentum - sgd, params);
    assert_eq!(adam - sgd, 2 * params);
}

#[test]
fn fused_loss_needs_no_connection_deltas() {
    let fused = dense_chain(4);
    let plain = ModelBuilder::new(Input::new(Shape::d2(3, 5)))
        .layer(Dense::new(7))
        .layer(Activation::leaky_relu(0.01))
        .layer(Dense::new(3))
        .layer(Softmax::new())
        .loss(Mse::new())
        .build()
        .unwrap();
    let sgd = Sgd::new(0.1);
    let gap = plain.sizeof_training_memory(&sgd).unwrap() - fused.sizeof_training_memory(&sgd).unwrap();
    assert_eq!(gap, 3 * 3 * 4);
}

#[test]
fn too_small_block_is_rejected() {
    let mut block = AlignedBlock::<4096>::new();
    let mut model = conv_chain(4);
    let required = model.sizeof_inference_memory();
    let err = model.schedule_inference_memory(&mut block.as_bytes_mut()[..required - 4]).unwrap_err();
    assert_eq!(err.error, Error::BufferTooSmall { required, available: required - 4 });
    assert_eq!(model.schedule(), None);
}

#[test]
fn misaligned_block_is_rejected() {
    let mut params = AlignedBlock::<1024>::new();
    let mut work = AlignedBlock::<4096>::new();
    let mut model = dense_chain(16);
    let err = model.distribute_parameter_memory(&mut params.as_bytes_mut()[4..]).unwrap_err();
    assert_eq!(err.error, Error::MisalignedBlock { alignment: 16 });
    let err = model.schedule_training_memory(&Sgd::new(0.1), &mut work.as_bytes_mut()[8..]).unwrap_err();
    assert_eq!(err.error, Error::MisalignedBlock { alignment: 16 });
    assert_eq!(model.schedule(), None);
}

#[test]
fn incompatible_loss_is_rejected_at_build() {
    let err = ModelBuilder::new(Input::new(Shape::d2(1, 4)))
        .layer(Dense::new(2))
        .loss(CrossEntropy::new())
        .build()
        .unwrap_err();
    assert_eq!(err, Error::IncompatibleLoss { loss: LossKind::CrossEntropy, layer: LayerKind::Dense });
}

#[test]
fn scheduling_keeps_parameter_values() {
    let mut params = AlignedBlock::<1024>::new();
    let mut work = AlignedBlock::<4096>::new();
    let mut model = dense_chain(4);
    let p = model.sizeof_parameter_memory();
    model.distribute_parameter_memory(&mut params.as_bytes_mut()[..p]).unwrap();
    model.params_mut(3, 1).unwrap().copy_from_slice(&[1.0, 2.0, 3.0]);

    model.schedule_inference_memory(work.as_bytes_mut()).unwrap();
    assert_eq!(model.params(3, 1).unwrap(), &[1.0, 2.0, 3.0]);
}

#[test]
fn freezing_shrinks_training_memory() {
    let mut model = dense_chain(4);
    let sgd = Sgd::new(0.1);
    let before = model.sizeof_training_memory(&sgd).unwrap();
    model.set_trainable(1, false).unwrap();
    let after = model.sizeof_training_memory(&sgd).unwrap();
    // 5x7 weights and 1x7 bias gradients, and the largest scratch was theirs
    assert_eq!(before - after, (35 + 7) * 4 + (35 - 21) * 4);
}

#[test]
fn layer_taking_more_than_reported_is_caught() {
    let mut params = AlignedBlock::<256>::new();
    let mut model = ModelBuilder::new(Input::new(Shape::d2(1, 2)))
        .layer(Overreaching(Dense::new(1)))
        .alignment(4)
        .build()
        .unwrap();
    // 2x1 weights and a 1x1 bias
    assert_eq!(model.sizeof_parameter_memory(), 12);

    let err = model.distribute_parameter_memory(params.as_bytes_mut()).unwrap_err();
    assert_eq!(err.error, Error::PlanMismatch { layer: LayerKind::Dense, reported: 12, consumed: 16 });
    assert_eq!(err.block.len(), 256);
    assert_eq!(model.params(1, 0), Err(Error::NotScheduled(MemoryKind::Parameter)));
}

#[test]
fn refused_block_can_be_offered_again() {
    let mut work = AlignedBlock::<4096>::new();
    let mut model = dense_chain(4);
    let sgd = Sgd::new(0.1);
    let adam = Adam::new(0.01);
    let needed = model.sizeof_training_memory(&sgd).unwrap();

    let refused = model.schedule_training_memory(&adam, &mut work.as_bytes_mut()[..needed]).unwrap_err();
    let required = model.sizeof_training_memory(&adam).unwrap();
    assert_eq!(refused.error, Error::BufferTooSmall { required, available: needed });
    assert_eq!(refused.block.len(), needed);
    assert_eq!(model.schedule(), None);

    model.schedule_training_memory(&sgd, refused.block).unwrap();
    assert_eq!(model.schedule(), Some(MemoryKind::Training));
}

#[test]
fn released_blocks_are_reusable() {
    let mut params = AlignedBlock::<1024>::new();
    let mut work = AlignedBlock::<4096>::new();
    let mut model = dense_chain(4);
    let sgd = Sgd::new(0.1);
    model.distribute_parameter_memory(params.as_bytes_mut()).unwrap();
    model.schedule_training_memory(&sgd, work.as_bytes_mut()).unwrap();

    // freezing changes the training layout, so the block comes back
    let block = model.set_trainable(1, false).unwrap().unwrap();
    assert_eq!(block.len(), 4096);
    assert_eq!(model.schedule(), None);
    model.schedule_training_memory(&sgd, block).unwrap();

    let block = model.release_work().unwrap();
    assert!(model.release_work().is_none());
    model.schedule_inference_memory(block).unwrap();
    assert_eq!(model.schedule(), Some(MemoryKind::Inference));
    assert!(model.set_trainable(1, true).unwrap().is_none());

    let block = model.release_params().unwrap();
    assert_eq!(model.params(3, 0), Err(Error::NotScheduled(MemoryKind::Parameter)));
    model.distribute_parameter_memory(block).unwrap();
    assert!(model.params(3, 0).is_ok());
}
