use crate::ops::sqrt;

/// Scalars of one Adam step, computed once per update by the optimizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdamStep {
    /// Bias-corrected learning rate `lr · √(1 − β2ᵗ) / (1 − β1ᵗ)`.
    pub lr_t: f32,
    /// First-moment decay.
    pub beta1: f32,
    /// Second-moment decay.
    pub beta2: f32,
    /// Denominator offset.
    pub eps: f32,
}

/// Performs one step of Adam on a parameter tensor.
///
/// # Formula
///
/// - `m ← β1 · m + (1 − β1) · g`
/// - `v ← β2 · v + (1 − β2) · g²`
/// - `p ← p − lr_t · m / (√v + ε)`
pub fn adam(params: &mut [f32], grads: &[f32], m: &mut [f32], v: &mut [f32], step: AdamStep) {
    debug_assert_eq!(params.len(), grads.len());
    debug_assert_eq!(params.len(), m.len());
    debug_assert_eq!(params.len(), v.len());
    let AdamStep { lr_t, beta1, beta2, eps } = step;

    #[allow(clippy::suspicious_operation_groupings)]
    for ((param, &grad), (m_val, v_val)) in params
        .iter_mut()
        .zip(grads)
        .zip(m.iter_mut().zip(v.iter_mut()))
    {
        *m_val = beta1 * *m_val + (1.0 - beta1) * grad;
        *v_val = beta2 * *v_val + (1.0 - beta2) * (grad * grad);
        *param -= lr_t * *m_val / (sqrt(*v_val) + eps);
    }
}
