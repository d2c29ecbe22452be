use crate::ops::exp;

/// Logistic sigmoid: `y = 1 / (1 + e⁻ˣ)`.
pub fn sigmoid(x: &[f32], y: &mut [f32]) {
    debug_assert_eq!(x.len(), y.len());
    y.iter_mut().zip(x).for_each(|(y, &x)| *y = 1.0 / (1.0 + exp(-x)));
}

/// Sigmoid gradient from the forward output: `dx = dy · y · (1 − y)`.
pub fn sigmoid_backward(y: &[f32], dy: &[f32], dx: &mut [f32]) {
    debug_assert_eq!(y.len(), dy.len());
    dx.iter_mut()
        .zip(y.iter().zip(dy))
        .for_each(|(g, (&y, &dy))| *g = dy * y * (1.0 - y));
}
