use rand::{Rng, RngCore};

use crate::ops::sqrt;

/// Fills `weights` with Glorot-uniform samples in `±√(6 / (fan_in + fan_out))`.
pub fn glorot_uniform(weights: &mut [f32], fan_in: usize, fan_out: usize, mut rng: &mut dyn RngCore) {
    let fans = (fan_in + fan_out).max(1) as f32;
    let limit = sqrt(6.0 / fans);
    for w in weights {
        *w = Rng::random_range(&mut rng, -limit..=limit);
    }
}
