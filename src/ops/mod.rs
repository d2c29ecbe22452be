//! # Math kernels
//!
//! Plain f32 kernels over row-major slices. Layers, losses and optimizers
//! call into these; nothing here knows about regions or the planner.
//!
//! ## Submodules
//!
//! - [`cpu`]: single-threaded kernels, the default provider
//! - [`parallel`] *(feature `parallel`)*: rayon-backed matrix kernels
//!
//! ## Capability table
//!
//! The heavy matrix kernels are reached through a [`Kernels`] table of
//! function pointers, so a layer can be built against the CPU provider, the
//! parallel provider, or a caller-supplied one (e.g. a DSP library) without
//! generics leaking into the model. [`crate::backend`] picks the default
//! table new layers are created with.
//!
//! ## Shape checks
//!
//! Kernels `debug_assert!` their slice lengths. Release builds trust the
//! planner, which already sized every region from the resolved shapes.

pub mod cpu;
#[cfg(feature = "parallel")]
pub mod parallel;

/// Dimensions of a matrix product `[m × k] · [k × n] = [m × n]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatDims {
    /// Rows of the left operand and of the product.
    pub m: usize,
    /// Shared inner dimension.
    pub k: usize,
    /// Columns of the right operand and of the product.
    pub n: usize,
}

impl MatDims {
    /// Creates product dimensions.
    #[must_use]
    pub const fn new(m: usize, k: usize, n: usize) -> Self {
        Self { m, k, n }
    }
}

/// Matrix kernel signature: `(a, b, out, dims)`.
pub type MatKernel = fn(&[f32], &[f32], &mut [f32], MatDims);

/// Table of matrix kernels a layer computes with.
///
/// All three products are expressed in the dimensions of the forward product
/// `x[m × k] · w[k × n] = y[m × n]`:
///
/// - `matmul(x, w, y)` writes `x · w`
/// - `matmul_at_b(x, dy, dw)` writes `xᵀ · dy` (`[k × n]`)
/// - `matmul_a_bt(dy, w, dx)` writes `dy · wᵀ` (`[m × k]`)
#[derive(Debug, Clone, Copy)]
pub struct Kernels {
    /// Provider name, for diagnostics.
    pub name: &'static str,
    /// `out = a · b`.
    pub matmul: MatKernel,
    /// `out = aᵀ · b`.
    pub matmul_at_b: MatKernel,
    /// `out = a · bᵀ`.
    pub matmul_a_bt: MatKernel,
    /// Adds `bias` to every row of `out`.
    pub add_bias_rows: fn(out: &mut [f32], bias: &[f32]),
    /// Writes the column sums of `a` (rows of `out.len()` elements) into `out`.
    pub sum_rows: fn(a: &[f32], out: &mut [f32]),
}

impl PartialEq for Kernels {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Single-threaded provider.
pub static CPU_KERNELS: Kernels = Kernels {
    name: "cpu",
    matmul: cpu::matmul,
    matmul_at_b: cpu::matmul_at_b,
    matmul_a_bt: cpu::matmul_a_bt,
    add_bias_rows: cpu::add_bias_rows,
    sum_rows: cpu::sum_rows,
};

/// Rayon-backed provider.
#[cfg(feature = "parallel")]
pub static PARALLEL_KERNELS: Kernels = Kernels {
    name: "parallel",
    matmul: parallel::matmul,
    matmul_at_b: parallel::matmul_at_b,
    matmul_a_bt: parallel::matmul_a_bt,
    add_bias_rows: cpu::add_bias_rows,
    sum_rows: cpu::sum_rows,
};

#[inline]
pub(crate) fn exp(x: f32) -> f32 {
    libm::expf(x)
}

#[inline]
pub(crate) fn ln(x: f32) -> f32 {
    libm::logf(x)
}

#[inline]
pub(crate) fn sqrt(x: f32) -> f32 {
    libm::sqrtf(x)
}

#[inline]
pub(crate) fn tanh(x: f32) -> f32 {
    libm::tanhf(x)
}
