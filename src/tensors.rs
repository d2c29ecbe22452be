//! Tensor headers and size accounting.
//!
//! # Two kinds of tensor
//!
//! - [`Tensor`] is the header the engine keeps for every result, delta,
//!   parameter and gradient. It holds the dtype, the shape and the regions of
//!   the planner-owned block that store its parameter block and data. It owns
//!   no memory; the regions are written once by a distribution step.
//! - [`TensorRef`] / [`TensorMut`] are caller-side views used to feed data in
//!   and read results out.
//!
//! The free functions at the bottom ([`elements`], [`sizeof_data`],
//! [`sizeof_params`], [`sizeof_tensor`]) are the byte accounting the planner
//! is built on. Two tensors with the same dtype and shape always report the
//! same sizes.
//!
//! ## Limitations
//! - Row-major only, rank at most [`MAX_DIM`]
//! - No broadcasting or strides

use core::fmt;

use crate::dtype::{Dtype, F32};
use crate::error::{Error, Result};
use crate::memory::{align_up, Region};

/// Highest rank a tensor can have.
pub const MAX_DIM: usize = 4;

/// Per-axis extents of a tensor, stored inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Shape {
    dims: [usize; MAX_DIM],
    dim: usize,
}

impl Shape {
    /// A shape with no axes (zero elements, used before resolution).
    pub const EMPTY: Self = Self { dims: [0; MAX_DIM], dim: 0 };

    /// Rank-1 shape.
    #[must_use]
    pub const fn d1(a: usize) -> Self {
        Self { dims: [a, 0, 0, 0], dim: 1 }
    }

    /// Rank-2 shape, `[batch, features]` for most layers.
    #[must_use]
    pub const fn d2(a: usize, b: usize) -> Self {
        Self { dims: [a, b, 0, 0], dim: 2 }
    }

    /// Rank-3 shape.
    #[must_use]
    pub const fn d3(a: usize, b: usize, c: usize) -> Self {
        Self { dims: [a, b, c, 0], dim: 3 }
    }

    /// Rank-4 shape, `[batch, channels, height, width]` for convolutions.
    #[must_use]
    pub const fn d4(a: usize, b: usize, c: usize, d: usize) -> Self {
        Self { dims: [a, b, c, d], dim: 4 }
    }

    /// Builds a shape from a slice of extents.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] when the slice is longer than [`MAX_DIM`].
    pub fn from_slice(extents: &[usize]) -> Result<Self> {
        if extents.len() > MAX_DIM {
            return Err(Error::InvalidConfig("tensor rank exceeds 4"));
        }
        let mut dims = [0; MAX_DIM];
        dims[..extents.len()].copy_from_slice(extents);
        Ok(Self { dims, dim: extents.len() })
    }

    /// Number of axes.
    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    /// The meaningful extents.
    #[must_use]
    pub fn as_slice(&self) -> &[usize] {
        &self.dims[..self.dim]
    }

    /// Extent of `axis`, zero when out of range.
    #[must_use]
    pub fn axis(&self, axis: usize) -> usize {
        if axis < self.dim { self.dims[axis] } else { 0 }
    }

    /// Leading (batch) extent.
    #[must_use]
    pub fn batch(&self) -> usize {
        self.axis(0)
    }

    /// Elements per batch row.
    #[must_use]
    pub fn row_len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.dims[1..self.dim].iter().product()
        }
    }

    /// Same shape with the leading extent replaced.
    #[must_use]
    pub fn with_batch(mut self, batch: usize) -> Self {
        if self.dim > 0 {
            self.dims[0] = batch;
        }
        self
    }

    /// Total number of elements.
    #[must_use]
    pub fn elements(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.dims[..self.dim].iter().product()
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, d) in self.as_slice().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{d}")?;
        }
        f.write_str("]")
    }
}

/// Planner-side tensor header: dtype, shape and assigned regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tensor {
    /// Shared element type descriptor.
    pub dtype: &'static Dtype,
    /// Per-axis extents.
    pub shape: Shape,
    /// Region of the type-specific parameter block.
    pub params: Region,
    /// Region of the element data.
    pub data: Region,
}

impl Tensor {
    /// An f32 tensor with no shape and no memory yet.
    pub const UNRESOLVED: Self = Self::new(&F32, Shape::EMPTY);

    /// Creates a header without memory.
    #[must_use]
    pub const fn new(dtype: &'static Dtype, shape: Shape) -> Self {
        Self { dtype, shape, params: Region::EMPTY, data: Region::EMPTY }
    }

    /// Creates an f32 header without memory.
    #[must_use]
    pub const fn f32(shape: Shape) -> Self {
        Self::new(&F32, shape)
    }

    /// Number of elements described by the shape.
    #[must_use]
    pub fn elements(&self) -> usize {
        self.shape.elements()
    }
}

/// Read-only caller view: a shape over borrowed f32 data.
///
/// The element count always matches the shape; [`TensorRef::new`] is the
/// only way to build one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TensorRef<'a> {
    shape: Shape,
    data: &'a [f32],
}

impl<'a> TensorRef<'a> {
    /// Wraps `data` with `shape`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] when the element count differs.
    pub fn new(shape: Shape, data: &'a [f32]) -> Result<Self> {
        if shape.elements() != data.len() {
            return Err(Error::ShapeMismatch { expected: shape.elements(), actual: data.len() });
        }
        Ok(Self { shape, data })
    }

    /// Per-axis extents.
    #[must_use]
    pub const fn shape(&self) -> Shape {
        self.shape
    }

    /// Row-major elements.
    #[must_use]
    pub const fn data(&self) -> &'a [f32] {
        self.data
    }

    /// Rows `start..end` along the batch axis, `None` when the range is
    /// reversed or runs past the last row.
    #[must_use]
    pub fn rows(&self, start: usize, end: usize) -> Option<TensorRef<'a>> {
        if start > end || end > self.shape.batch() {
            return None;
        }
        let len = self.shape.row_len();
        Some(TensorRef { shape: self.shape.with_batch(end - start), data: &self.data[start * len..end * len] })
    }
}

/// Writable caller view: a shape over borrowed f32 data.
#[derive(Debug, PartialEq)]
pub struct TensorMut<'a> {
    shape: Shape,
    data: &'a mut [f32],
}

impl<'a> TensorMut<'a> {
    /// Wraps `data` with `shape`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] when the element count differs.
    pub fn new(shape: Shape, data: &'a mut [f32]) -> Result<Self> {
        if shape.elements() != data.len() {
            return Err(Error::ShapeMismatch { expected: shape.elements(), actual: data.len() });
        }
        Ok(Self { shape, data })
    }

    /// Per-axis extents.
    #[must_use]
    pub const fn shape(&self) -> Shape {
        self.shape
    }

    /// Row-major elements.
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &*self.data
    }

    /// Mutable row-major elements.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut *self.data
    }
}

impl fmt::Display for TensorRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", F32.name, self.shape)?;
        let row = self.shape.row_len().max(1);
        for (i, x) in self.data.iter().enumerate() {
            f.write_str(if i % row == 0 { "\n  " } else { " " })?;
            (F32.fmt_element)(&x.to_ne_bytes(), f)?;
        }
        Ok(())
    }
}

/// Number of elements a shape describes.
#[must_use]
pub fn elements(shape: &Shape) -> usize {
    shape.elements()
}

/// Bytes of element data, unpadded.
#[must_use]
pub fn sizeof_data(tensor: &Tensor) -> usize {
    tensor.elements() * tensor.dtype.size
}

/// Bytes of the type-specific parameter block, unpadded.
#[must_use]
pub fn sizeof_params(tensor: &Tensor) -> usize {
    tensor.dtype.tensor_params_size
}

/// Bytes the planner reserves for a tensor: parameter block and data, each
/// padded to `alignment`.
#[must_use]
pub fn sizeof_tensor(tensor: &Tensor, alignment: usize) -> usize {
    align_up(sizeof_params(tensor), alignment) + align_up(sizeof_data(tensor), alignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::{Q31, Q7};

    #[test]
    fn shape_creation_and_total() {
        let s = Shape::d4(2, 3, 4, 5);
        assert_eq!(s.elements(), 120);
        assert_eq!(s.batch(), 2);
        assert_eq!(s.row_len(), 60);
        assert_eq!(s.with_batch(1).elements(), 60);
        assert_eq!(Shape::EMPTY.elements(), 0);
        assert_eq!(Shape::from_slice(&[3, 7]).unwrap(), Shape::d2(3, 7));
        assert!(Shape::from_slice(&[1, 2, 3, 4, 5]).is_err());
    }

    #[test]
    fn same_shape_same_size() {
        let a = Tensor::f32(Shape::d2(3, 5));
        let b = Tensor::f32(Shape::d2(3, 5));
        assert_eq!(sizeof_data(&a), sizeof_data(&b));
        assert_eq!(sizeof_data(&a), 60);
        assert_eq!(sizeof_params(&a), 0);
    }

    #[test]
    fn quantized_tensors_reserve_aligned_params() {
        let q7 = Tensor::new(&Q7, Shape::d2(1, 5));
        assert_eq!(sizeof_data(&q7), 5);
        assert_eq!(sizeof_tensor(&q7, 4), 4 + 8);
        let q31 = Tensor::new(&Q31, Shape::d1(3));
        assert_eq!(sizeof_tensor(&q31, 8), 8 + 16);
    }

    #[test]
    fn tensor_ref_checks_length() {
        let data = [1.0, 2.0, 3.0];
        assert!(TensorRef::new(Shape::d2(2, 2), &data).is_err());
        let t = TensorRef::new(Shape::d2(3, 1), &data).unwrap();
        assert_eq!(t.rows(1, 3).unwrap().data(), &[2.0, 3.0]);
        assert_eq!(t.rows(3, 3).unwrap().shape(), Shape::d2(0, 1));
        assert_eq!(t.rows(2, 4), None);
        assert_eq!(t.rows(2, 1), None);
    }
}
