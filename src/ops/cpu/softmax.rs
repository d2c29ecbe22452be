use crate::ops::exp;

/// Softmax along rows of `row_len` elements.
pub fn softmax(x: &[f32], y: &mut [f32], row_len: usize) {
    debug_assert_eq!(x.len(), y.len());
    if row_len == 0 {
        return;
    }
    for (x_row, y_row) in x.chunks_exact(row_len).zip(y.chunks_exact_mut(row_len)) {
        let max_val = x_row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut exp_sum = 0.0;
        for (y, &x) in y_row.iter_mut().zip(x_row) {
            *y = exp(x - max_val);
            exp_sum += *y;
        }
        y_row.iter_mut().for_each(|y| *y /= exp_sum);
    }
}

/// Softmax gradient from the forward output: `dx = y ⊙ (dy − Σ y·dy)` per row.
pub fn softmax_backward(y: &[f32], dy: &[f32], dx: &mut [f32], row_len: usize) {
    debug_assert_eq!(y.len(), dy.len());
    if row_len == 0 {
        return;
    }
    for ((y, dy), dx) in y
        .chunks_exact(row_len)
        .zip(dy.chunks_exact(row_len))
        .zip(dx.chunks_exact_mut(row_len))
    {
        let dot: f32 = y.iter().zip(dy).map(|(&yi, &dyi)| yi * dyi).sum();
        for ((g, &yi), &dyi) in dx.iter_mut().zip(y).zip(dy) {
            *g = yi * (dyi - dot);
        }
    }
}
