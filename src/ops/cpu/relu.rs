use crate::ops::exp;

/// `ReLU`: `y = max(0, x)`.
pub fn relu(x: &[f32], y: &mut [f32]) {
    debug_assert_eq!(x.len(), y.len());
    y.iter_mut().zip(x).for_each(|(y, &x)| *y = if x > 0.0 { x } else { 0.0 });
}

/// `ReLU` gradient, masked by the forward input.
pub fn relu_backward(x: &[f32], dy: &[f32], dx: &mut [f32]) {
    debug_assert_eq!(x.len(), dy.len());
    dx.iter_mut()
        .zip(x.iter().zip(dy))
        .for_each(|(g, (&x, &dy))| *g = if x > 0.0 { dy } else { 0.0 });
}

/// Leaky `ReLU`: `y = x` for positive inputs, `alpha · x` otherwise.
pub fn leaky_relu(x: &[f32], y: &mut [f32], alpha: f32) {
    debug_assert_eq!(x.len(), y.len());
    y.iter_mut().zip(x).for_each(|(y, &x)| *y = if x > 0.0 { x } else { alpha * x });
}

/// Leaky `ReLU` gradient.
pub fn leaky_relu_backward(x: &[f32], dy: &[f32], dx: &mut [f32], alpha: f32) {
    debug_assert_eq!(x.len(), dy.len());
    dx.iter_mut()
        .zip(x.iter().zip(dy))
        .for_each(|(g, (&x, &dy))| *g = if x > 0.0 { dy } else { alpha * dy });
}

/// ELU: `y = x` for positive inputs, `alpha · (eˣ − 1)` otherwise.
pub fn elu(x: &[f32], y: &mut [f32], alpha: f32) {
    debug_assert_eq!(x.len(), y.len());
    y.iter_mut()
        .zip(x)
        .for_each(|(y, &x)| *y = if x > 0.0 { x } else { alpha * (exp(x) - 1.0) });
}

/// ELU gradient: `dy` for positive inputs, `dy · alpha · eˣ` otherwise.
pub fn elu_backward(x: &[f32], dy: &[f32], dx: &mut [f32], alpha: f32) {
    debug_assert_eq!(x.len(), dy.len());
    dx.iter_mut()
        .zip(x.iter().zip(dy))
        .for_each(|(g, (&x, &dy))| *g = if x > 0.0 { dy } else { dy * alpha * exp(x) });
}
