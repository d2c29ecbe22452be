/// Half sum of squared errors: `½ Σ (p − t)²`.
#[must_use]
pub fn mse(predicted: &[f32], target: &[f32]) -> f32 {
    debug_assert_eq!(predicted.len(), target.len());
    0.5 * predicted
        .iter()
        .zip(target)
        .map(|(&p, &t)| (p - t) * (p - t))
        .sum::<f32>()
}

/// Gradient of [`mse`] with respect to the prediction: `p − t`.
pub fn mse_delta(predicted: &[f32], target: &[f32], delta: &mut [f32]) {
    super::sub(predicted, target, delta);
}
