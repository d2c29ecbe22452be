//! Byte regions, the planning cursor and disjoint carving of caller blocks.
//!
//! The engine never owns memory. The caller supplies flat byte blocks; the
//! planner walks the layer chain with an [`Arena`] cursor and records a
//! [`Region`] (offset and length) for every tensor and scratch buffer. At run
//! time the regions a single layer call needs are carved out of the block as
//! disjoint `&mut [f32]` slices with [`carve`].
//!
//! Every region starts on the configured alignment, so casting a region of an
//! aligned block to `f32` never fails.

use core::mem::{align_of, size_of};
use core::ops::Range;

use crate::error::{Error, Result};

/// Default block and region alignment: the larger of a C `int` and an `f32`.
pub const MEMORY_ALIGNMENT: usize = if size_of::<core::ffi::c_int>() > align_of::<f32>() {
    size_of::<core::ffi::c_int>()
} else {
    align_of::<f32>()
};

/// Rounds `bytes` up to the next multiple of `alignment` (a power of two).
#[inline]
#[must_use]
pub const fn align_up(bytes: usize, alignment: usize) -> usize {
    (bytes + alignment - 1) & !(alignment - 1)
}

/// A byte range inside a planner-owned block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    /// Start, in bytes from the beginning of the block.
    pub offset: usize,
    /// Length in bytes.
    pub len: usize,
}

impl Region {
    /// A zero-length region at offset zero.
    pub const EMPTY: Self = Self { offset: 0, len: 0 };

    /// Creates a region.
    #[must_use]
    pub const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// One past the last byte.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Byte range, for slicing a block.
    #[must_use]
    pub const fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }

    /// Whether the region holds no bytes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Bump cursor over a block that has not been materialised.
///
/// Allocation only advances an offset; the planner checks the final offset
/// against the block length before any region is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arena {
    alignment: usize,
    offset: usize,
}

impl Arena {
    /// Creates a cursor at offset zero.
    #[must_use]
    pub const fn new(alignment: usize) -> Self {
        Self { alignment, offset: 0 }
    }

    /// Reserves `bytes` rounded up to the alignment.
    ///
    /// The returned region has the unpadded length; the cursor advances by the
    /// padded one.
    pub fn alloc(&mut self, bytes: usize) -> Region {
        let region = Region::new(self.offset, bytes);
        self.offset += align_up(bytes, self.alignment);
        region
    }

    /// Bytes handed out so far.
    #[inline]
    #[must_use]
    pub const fn used(&self) -> usize {
        self.offset
    }

    /// Alignment every region starts on.
    #[inline]
    #[must_use]
    pub const fn alignment(&self) -> usize {
        self.alignment
    }
}

/// Planner configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Alignment of block starts and of every region inside them.
    pub alignment: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { alignment: MEMORY_ALIGNMENT }
    }
}

impl MemoryConfig {
    /// Checks that the alignment is a power of two and fits an `f32`.
    ///
    /// # Errors
    /// [`Error::InvalidAlignment`] otherwise.
    pub const fn validate(&self) -> Result<()> {
        if self.alignment.is_power_of_two() && self.alignment >= align_of::<f32>() {
            Ok(())
        } else {
            Err(Error::InvalidAlignment(self.alignment))
        }
    }

    /// Checks that `block` starts on the configured alignment.
    ///
    /// # Errors
    /// [`Error::MisalignedBlock`] otherwise.
    pub fn check_block(&self, block: &[u8]) -> Result<()> {
        if (block.as_ptr() as usize) % self.alignment == 0 {
            Ok(())
        } else {
            Err(Error::MisalignedBlock { alignment: self.alignment })
        }
    }
}

/// The three block categories a model plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    /// Results and forward scratch.
    Inference,
    /// Inference memory plus deltas, gradients, optimizer state and scratch.
    Training,
    /// Trainable parameters.
    Parameter,
}

impl core::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Inference => "inference",
            Self::Training => "training",
            Self::Parameter => "parameter",
        })
    }
}

fn check_bounds(block_len: usize, region: Region) -> Result<()> {
    if region.end() > block_len {
        return Err(Error::RegionOutOfBounds { offset: region.offset, end: region.end(), len: block_len });
    }
    Ok(())
}

/// Views `region` of `block` as floats.
///
/// # Errors
/// [`Error::RegionOutOfBounds`] when the region exceeds the block and
/// [`Error::MisalignedBlock`] when it cannot be viewed as `f32`.
pub fn floats(block: &[u8], region: Region) -> Result<&[f32]> {
    if region.is_empty() {
        return Ok(&[]);
    }
    check_bounds(block.len(), region)?;
    bytemuck::try_cast_slice(&block[region.range()])
        .map_err(|_| Error::MisalignedBlock { alignment: align_of::<f32>() })
}

/// Views `region` of `block` as mutable floats.
///
/// # Errors
/// As [`floats`].
pub fn floats_mut(block: &mut [u8], region: Region) -> Result<&mut [f32]> {
    if region.is_empty() {
        return Ok(&mut []);
    }
    check_bounds(block.len(), region)?;
    bytemuck::try_cast_slice_mut(&mut block[region.range()])
        .map_err(|_| Error::MisalignedBlock { alignment: align_of::<f32>() })
}

/// Splits `block` into `N` disjoint mutable float views, one per region.
///
/// Empty regions yield empty slices and never conflict with anything, so
/// callers pass [`Region::EMPTY`] for buffers a layer does not have.
///
/// # Errors
/// [`Error::RegionOverlap`] when two non-empty regions share a byte, plus the
/// errors of [`floats_mut`].
pub fn carve<const N: usize>(block: &mut [u8], regions: [Region; N]) -> Result<[&mut [f32]; N]> {
    let len = block.len();
    let mut out: [&mut [f32]; N] = core::array::from_fn(|_| Default::default());

    let mut order: [usize; N] = core::array::from_fn(|i| i);
    order.sort_unstable_by_key(|&i| regions[i].offset);

    let mut rest = block;
    let mut consumed = 0;
    for i in order {
        let region = regions[i];
        if region.is_empty() {
            continue;
        }
        check_bounds(len, region)?;
        if region.offset < consumed {
            return Err(Error::RegionOverlap { offset: region.offset });
        }
        let tail = core::mem::take(&mut rest);
        let (_, tail) = tail.split_at_mut(region.offset - consumed);
        let (head, tail) = tail.split_at_mut(region.len);
        out[i] = bytemuck::try_cast_slice_mut(head)
            .map_err(|_| Error::MisalignedBlock { alignment: align_of::<f32>() })?;
        rest = tail;
        consumed = region.end();
    }
    Ok(out)
}

/// A byte buffer aligned to 16 bytes, usable as a model memory block.
#[derive(Debug, Clone)]
#[repr(C, align(16))]
pub struct AlignedBlock<const N: usize>([u8; N]);

impl<const N: usize> AlignedBlock<N> {
    /// A zeroed block.
    #[must_use]
    pub const fn new() -> Self {
        Self([0; N])
    }

    /// The whole block as bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The whole block as mutable bytes.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl<const N: usize> Default for AlignedBlock<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_power_of_two() {
        assert_eq!(align_up(0, 4), 0);
        assert_eq!(align_up(1, 4), 4);
        assert_eq!(align_up(12, 4), 12);
        assert_eq!(align_up(13, 8), 16);
    }

    #[test]
    fn arena_pads_but_reports_true_length() {
        let mut arena = Arena::new(8);
        let a = arena.alloc(12);
        let b = arena.alloc(4);
        assert_eq!(a, Region::new(0, 12));
        assert_eq!(b, Region::new(16, 4));
        assert_eq!(arena.used(), 24);
        let empty = arena.alloc(0);
        assert!(empty.is_empty());
        assert_eq!(arena.used(), 24);
    }

    #[test]
    fn config_rejects_bad_alignment() {
        assert!(MemoryConfig::default().validate().is_ok());
        assert_eq!(MemoryConfig { alignment: 6 }.validate(), Err(Error::InvalidAlignment(6)));
        assert_eq!(MemoryConfig { alignment: 2 }.validate(), Err(Error::InvalidAlignment(2)));
        assert!(MemoryConfig { alignment: 16 }.validate().is_ok());
    }

    #[test]
    fn carve_returns_views_in_request_order() {
        let mut block = AlignedBlock::<64>::new();
        let [b, a, none] =
            carve(block.as_bytes_mut(), [Region::new(16, 8), Region::new(0, 16), Region::EMPTY]).unwrap();
        assert_eq!(a.len(), 4);
        assert_eq!(b.len(), 2);
        assert!(none.is_empty());
        a[0] = 1.0;
        b[1] = 2.0;
        assert_eq!(floats(block.as_bytes(), Region::new(0, 4)).unwrap(), &[1.0]);
        assert_eq!(floats(block.as_bytes(), Region::new(20, 4)).unwrap(), &[2.0]);
    }

    #[test]
    fn carve_rejects_overlap_and_overflow() {
        let mut block = AlignedBlock::<32>::new();
        assert_eq!(
            carve(block.as_bytes_mut(), [Region::new(0, 8), Region::new(4, 8)]).err(),
            Some(Error::RegionOverlap { offset: 4 })
        );
        assert_eq!(
            carve(block.as_bytes_mut(), [Region::new(24, 16)]).err(),
            Some(Error::RegionOutOfBounds { offset: 24, end: 40, len: 32 })
        );
    }

    #[test]
    fn misaligned_block_is_detected() {
        let mut block = AlignedBlock::<32>::new();
        let config = MemoryConfig { alignment: 8 };
        assert!(config.check_block(block.as_bytes()).is_ok());
        assert_eq!(
            config.check_block(&block.as_bytes_mut()[4..]),
            Err(Error::MisalignedBlock { alignment: 8 })
        );
    }
}
