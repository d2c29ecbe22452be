use crate::ops::MatDims;

/// Matrix product `out[m × n] = a[m × k] · b[k × n]`.
pub fn matmul(a: &[f32], b: &[f32], out: &mut [f32], dims: MatDims) {
    let MatDims { m, k, n } = dims;
    debug_assert_eq!(a.len(), m * k, "matmul lhs shape mismatch");
    debug_assert_eq!(b.len(), k * n, "matmul rhs shape mismatch");
    debug_assert_eq!(out.len(), m * n, "matmul output shape mismatch");

    for (row, a_row) in out.chunks_exact_mut(n).zip(a.chunks_exact(k)) {
        row.fill(0.0);
        for (&a_il, b_row) in a_row.iter().zip(b.chunks_exact(n)) {
            for (o, &b_lj) in row.iter_mut().zip(b_row) {
                *o += a_il * b_lj;
            }
        }
    }
}

/// Transposed-left product `out[k × n] = a[m × k]ᵀ · b[m × n]`.
pub fn matmul_at_b(a: &[f32], b: &[f32], out: &mut [f32], dims: MatDims) {
    let MatDims { m, k, n } = dims;
    debug_assert_eq!(a.len(), m * k, "matmul_at_b lhs shape mismatch");
    debug_assert_eq!(b.len(), m * n, "matmul_at_b rhs shape mismatch");
    debug_assert_eq!(out.len(), k * n, "matmul_at_b output shape mismatch");

    out.fill(0.0);
    for (a_row, b_row) in a.chunks_exact(k).zip(b.chunks_exact(n)) {
        for (&a_ip, out_row) in a_row.iter().zip(out.chunks_exact_mut(n)) {
            for (o, &b_ij) in out_row.iter_mut().zip(b_row) {
                *o += a_ip * b_ij;
            }
        }
    }
}

/// Transposed-right product `out[m × k] = a[m × n] · b[k × n]ᵀ`.
pub fn matmul_a_bt(a: &[f32], b: &[f32], out: &mut [f32], dims: MatDims) {
    let MatDims { m, k, n } = dims;
    debug_assert_eq!(a.len(), m * n, "matmul_a_bt lhs shape mismatch");
    debug_assert_eq!(b.len(), k * n, "matmul_a_bt rhs shape mismatch");
    debug_assert_eq!(out.len(), m * k, "matmul_a_bt output shape mismatch");

    for (out_row, a_row) in out.chunks_exact_mut(k).zip(a.chunks_exact(n)) {
        for (o, b_row) in out_row.iter_mut().zip(b.chunks_exact(n)) {
            *o = a_row.iter().zip(b_row).map(|(&x, &y)| x * y).sum();
        }
    }
}

/// Adds `bias` to every row of `out`.
pub fn add_bias_rows(out: &mut [f32], bias: &[f32]) {
    if bias.is_empty() {
        return;
    }
    debug_assert_eq!(out.len() % bias.len(), 0, "bias does not divide rows");
    for row in out.chunks_exact_mut(bias.len()) {
        for (o, &b) in row.iter_mut().zip(bias) {
            *o += b;
        }
    }
}

/// Column sums: `out[j] = Σ_i a[i][j]`, rows of `out.len()` elements.
pub fn sum_rows(a: &[f32], out: &mut [f32]) {
    out.fill(0.0);
    if out.is_empty() {
        return;
    }
    debug_assert_eq!(a.len() % out.len(), 0, "row length does not divide input");
    for row in a.chunks_exact(out.len()) {
        for (o, &x) in out.iter_mut().zip(row) {
            *o += x;
        }
    }
}
