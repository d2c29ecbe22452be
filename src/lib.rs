//! # `tinyfes`
//!
//! An embedded-friendly neural network engine. Models are sequential chains of
//! layers; every byte they need for inference or training is computed ahead of
//! time and carved out of caller-supplied memory blocks, so nothing is
//! allocated while the model runs.
//!
//! ## Features
//!
//! - **Memory planning**: exact byte counts for inference, parameter and
//!   training memory, distributed into aligned, non-overlapping regions
//! - **Layers**: Dense, Conv2D, Flatten and the usual activations behind one
//!   [`Layer`](layers::Layer) trait
//! - **Losses**: mean squared error and cross-entropy (with the fused
//!   softmax/sigmoid gradient)
//! - **Optimizers**: SGD (optionally with momentum) and Adam
//! - **`no_std`**: only `alloc` is needed, and only while building the model
//!
//! ## Example
//!
//! ```rust
//! use rand::{rngs::StdRng, SeedableRng};
//! use tinyfes::layers::{Activation, Dense, Input};
//! use tinyfes::loss::Mse;
//! use tinyfes::memory::AlignedBlock;
//! use tinyfes::model::ModelBuilder;
//! use tinyfes::optim::Sgd;
//! use tinyfes::tensors::{Shape, TensorRef};
//!
//! # fn main() -> tinyfes::Result<()> {
//! let mut params = AlignedBlock::<256>::new();
//! let mut work = AlignedBlock::<1024>::new();
//!
//! let mut model = ModelBuilder::new(Input::new(Shape::d2(4, 2)))
//!     .layer(Dense::new(3))
//!     .layer(Activation::sigmoid())
//!     .layer(Dense::new(1))
//!     .layer(Activation::sigmoid())
//!     .loss(Mse::new())
//!     .build()?;
//!
//! let mut optimizer = Sgd::new(0.5);
//!
//! let params_len = model.sizeof_parameter_memory();
//! let work_len = model.sizeof_training_memory(&optimizer)?;
//! model.distribute_parameter_memory(&mut params.as_bytes_mut()[..params_len])?;
//! model.schedule_training_memory(&optimizer, &mut work.as_bytes_mut()[..work_len])?;
//! model.init_params(&mut StdRng::seed_from_u64(7))?;
//!
//! let inputs = [0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0];
//! let targets = [0.0, 1.0, 1.0, 0.0];
//! let x = TensorRef::new(Shape::d2(4, 2), &inputs)?;
//! let y = TensorRef::new(Shape::d2(4, 1), &targets)?;
//! for _ in 0..100 {
//!     model.train(x, y, &mut optimizer, 4)?;
//! }
//! let _loss = model.calc_loss(x, y)?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::many_single_char_names,
    clippy::cast_possible_truncation,
    clippy::similar_names,
    clippy::cast_precision_loss,
    clippy::module_name_repetitions
)]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![no_std]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod approx;
pub mod backend;
pub mod data;
pub mod dtype;
pub mod error;
pub mod layers;
pub mod loss;
pub mod memory;
pub mod model;
pub mod ops;
pub mod optim;
pub mod planner;
pub mod sequential;
pub mod tensors;

pub use error::{Error, Placement, Rejected, Result};
pub use model::{Model, ModelBuilder};
