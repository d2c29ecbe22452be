//! Error types for the engine.
//!
//! Every fallible entry point returns [`Result<T>`]. Caller input never
//! causes a panic; building, planning and running a model report through
//! [`Error`]. Entry points that take ownership of a memory block hand it back
//! inside [`Rejected`] when they refuse it.

use core::fmt;

use crate::layers::LayerKind;
use crate::loss::LossKind;
use crate::memory::MemoryKind;

/// All error conditions reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The caller-supplied block is smaller than the planned requirement.
    #[error("memory block too small: {required} bytes required, {available} available")]
    BufferTooSmall {
        /// Bytes the plan needs.
        required: usize,
        /// Bytes the caller supplied.
        available: usize,
    },

    /// The block does not start on the configured alignment boundary.
    #[error("memory block is not aligned to {alignment} bytes")]
    MisalignedBlock {
        /// Alignment the planner was configured with.
        alignment: usize,
    },

    /// The configured alignment is unusable.
    #[error("invalid memory alignment {0}: must be a power of two no smaller than f32")]
    InvalidAlignment(usize),

    /// A tensor or slice does not have the expected number of elements.
    #[error("shape mismatch: expected {expected} elements, got {actual}")]
    ShapeMismatch {
        /// Element count the receiver expected.
        expected: usize,
        /// Element count it received.
        actual: usize,
    },

    /// The loss cannot be attached behind the model's output layer.
    #[error("{loss} loss cannot follow a {layer} layer")]
    IncompatibleLoss {
        /// The loss being attached.
        loss: LossKind,
        /// The output layer it was attached to.
        layer: LayerKind,
    },

    /// A training or loss entry point was used on a model without a loss.
    #[error("model has no loss attached")]
    MissingLoss,

    /// An input layer was placed anywhere but at the head of the chain.
    #[error("input layer found at position {0}; only the first layer may be an input")]
    MisplacedInput(usize),

    /// A layer rejected its configuration.
    #[error("invalid layer configuration: {0}")]
    InvalidConfig(&'static str),

    /// The engine only computes in f32; quantized tensors are descriptors.
    #[error("dtype {0} is not supported by this operation")]
    UnsupportedDtype(&'static str),

    /// The requested memory category has not been distributed yet.
    #[error("{0} memory has not been scheduled")]
    NotScheduled(MemoryKind),

    /// A layer consumed a different number of bytes than it reported.
    #[error("{layer} layer reported {reported} bytes but consumed {consumed}")]
    PlanMismatch {
        /// The offending layer.
        layer: LayerKind,
        /// Bytes returned by its `sizeof_*` callback.
        reported: usize,
        /// Bytes its `set_*` callback actually took.
        consumed: usize,
    },

    /// Two regions requested together overlap.
    #[error("region at offset {offset} overlaps another region")]
    RegionOverlap {
        /// Start of the second region.
        offset: usize,
    },

    /// A region reaches past the end of its block.
    #[error("region {offset}..{end} exceeds block of {len} bytes")]
    RegionOutOfBounds {
        /// Region start.
        offset: usize,
        /// Region end.
        end: usize,
        /// Block length.
        len: usize,
    },

    /// The optimizer's state layout differs from the one scheduled.
    #[error("optimizer state layout does not match the scheduled training memory")]
    OptimizerMismatch,
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// A memory block the planner refused, returned to the caller with the
/// reason so it can be reused.
#[derive(thiserror::Error)]
#[error("{error}")]
pub struct Rejected<'m> {
    /// Why the block was refused.
    pub error: Error,
    /// The block exactly as it was passed in.
    pub block: &'m mut [u8],
}

impl fmt::Debug for Rejected<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected").field("error", &self.error).field("len", &self.block.len()).finish()
    }
}

impl From<Rejected<'_>> for Error {
    fn from(rejected: Rejected<'_>) -> Self {
        rejected.error
    }
}

/// Outcome of handing a block to the planner.
pub type Placement<'m> = core::result::Result<(), Rejected<'m>>;
