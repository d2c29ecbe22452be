use crate::ops::ln;

/// Lower clamp applied to probabilities before taking a logarithm.
pub const CROSS_ENTROPY_EPS: f32 = 1e-7;

/// Categorical cross-entropy `−Σ t · ln p` over one-hot (or soft) targets.
#[must_use]
pub fn cross_entropy(predicted: &[f32], target: &[f32]) -> f32 {
    debug_assert_eq!(predicted.len(), target.len());
    -predicted
        .iter()
        .zip(target)
        .map(|(&p, &t)| t * ln(p.max(CROSS_ENTROPY_EPS)))
        .sum::<f32>()
}

/// Binary cross-entropy `−Σ [t · ln p + (1 − t) · ln(1 − p)]`.
#[must_use]
pub fn binary_cross_entropy(predicted: &[f32], target: &[f32]) -> f32 {
    debug_assert_eq!(predicted.len(), target.len());
    -predicted
        .iter()
        .zip(target)
        .map(|(&p, &t)| {
            let p = p.clamp(CROSS_ENTROPY_EPS, 1.0 - CROSS_ENTROPY_EPS);
            t * ln(p) + (1.0 - t) * ln(1.0 - p)
        })
        .sum::<f32>()
}
