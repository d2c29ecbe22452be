/// Plain gradient descent step.
///
/// # Formula
///
/// `p ← p − lr · g`
pub fn sgd(params: &mut [f32], grads: &[f32], lr: f32) {
    debug_assert_eq!(params.len(), grads.len());
    params.iter_mut().zip(grads).for_each(|(p, &g)| *p -= lr * g);
}

/// Gradient descent with momentum.
///
/// # Formula
///
/// `v ← μ · v + g`, then `p ← p − lr · v`
pub fn sgd_momentum(params: &mut [f32], grads: &[f32], velocity: &mut [f32], lr: f32, momentum: f32) {
    debug_assert_eq!(params.len(), grads.len());
    debug_assert_eq!(params.len(), velocity.len());
    for ((p, &g), v) in params.iter_mut().zip(grads).zip(velocity.iter_mut()) {
        *v = momentum * *v + g;
        *p -= lr * *v;
    }
}
