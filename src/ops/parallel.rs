//! Rayon-backed matrix kernels.
//!
//! Output rows are independent, so each product is split with
//! `par_chunks_mut` over rows of the output. Results are bit-identical to
//! the [`cpu`](super::cpu) kernels: every output element is accumulated in
//! the same order.

use rayon::prelude::*;

use super::MatDims;

/// Parallel `out[m × n] = a[m × k] · b[k × n]`.
pub fn matmul(a: &[f32], b: &[f32], out: &mut [f32], dims: MatDims) {
    let MatDims { k, n, .. } = dims;
    debug_assert_eq!(a.len(), dims.m * k, "matmul lhs shape mismatch");
    debug_assert_eq!(b.len(), k * n, "matmul rhs shape mismatch");

    out.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        let a_row = &a[i * k..(i + 1) * k];
        row.fill(0.0);
        for (&a_il, b_row) in a_row.iter().zip(b.chunks_exact(n)) {
            for (o, &b_lj) in row.iter_mut().zip(b_row) {
                *o += a_il * b_lj;
            }
        }
    });
}

/// Parallel `out[k × n] = a[m × k]ᵀ · b[m × n]`.
pub fn matmul_at_b(a: &[f32], b: &[f32], out: &mut [f32], dims: MatDims) {
    let MatDims { m, k, n } = dims;
    debug_assert_eq!(a.len(), m * k, "matmul_at_b lhs shape mismatch");
    debug_assert_eq!(b.len(), m * n, "matmul_at_b rhs shape mismatch");

    out.par_chunks_mut(n).enumerate().for_each(|(p, row)| {
        row.fill(0.0);
        for i in 0..m {
            let a_ip = a[i * k + p];
            for (o, &b_ij) in row.iter_mut().zip(&b[i * n..(i + 1) * n]) {
                *o += a_ip * b_ij;
            }
        }
    });
}

/// Parallel `out[m × k] = a[m × n] · b[k × n]ᵀ`.
pub fn matmul_a_bt(a: &[f32], b: &[f32], out: &mut [f32], dims: MatDims) {
    let MatDims { k, n, .. } = dims;
    debug_assert_eq!(b.len(), k * n, "matmul_a_bt rhs shape mismatch");

    out.par_chunks_mut(k).enumerate().for_each(|(i, row)| {
        let a_row = &a[i * n..(i + 1) * n];
        for (o, b_row) in row.iter_mut().zip(b.chunks_exact(n)) {
            *o = a_row.iter().zip(b_row).map(|(&x, &y)| x * y).sum();
        }
    });
}
