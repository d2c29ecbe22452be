/// Hyperbolic tangent.
pub fn tanh(x: &[f32], y: &mut [f32]) {
    debug_assert_eq!(x.len(), y.len());
    y.iter_mut().zip(x).for_each(|(y, &x)| *y = crate::ops::tanh(x));
}

/// Tanh gradient from the forward output: `dx = dy · (1 − y²)`.
pub fn tanh_backward(y: &[f32], dy: &[f32], dx: &mut [f32]) {
    debug_assert_eq!(y.len(), dy.len());
    dx.iter_mut()
        .zip(y.iter().zip(dy))
        .for_each(|(g, (&y, &dy))| *g = dy * (1.0 - y * y));
}
