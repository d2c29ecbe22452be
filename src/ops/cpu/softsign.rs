/// Softsign: `y = x / (1 + |x|)`.
pub fn softsign(x: &[f32], y: &mut [f32]) {
    debug_assert_eq!(x.len(), y.len());
    y.iter_mut().zip(x).for_each(|(y, &x)| *y = x / (1.0 + x.abs()));
}

/// Softsign gradient from the forward input: `dx = dy / (1 + |x|)²`.
pub fn softsign_backward(x: &[f32], dy: &[f32], dx: &mut [f32]) {
    debug_assert_eq!(x.len(), dy.len());
    dx.iter_mut().zip(x.iter().zip(dy)).for_each(|(g, (&x, &dy))| {
        let d = 1.0 + x.abs();
        *g = dy / (d * d);
    });
}
