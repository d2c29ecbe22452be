use crate::memory::align_up;
use crate::ops::cpu::{self, AdamStep};
use crate::ops::sqrt;
use crate::tensors::{sizeof_data, Tensor};

use super::Optimizer;

/// Adam with bias-corrected learning rate.
///
/// State per parameter: first moment `m` and second moment `v`, each padded
/// to the alignment, stored back to back in one optimem region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adam {
    /// Learning rate.
    pub learning_rate: f32,
    /// First-moment decay.
    pub beta1: f32,
    /// Second-moment decay.
    pub beta2: f32,
    /// Denominator offset.
    pub eps: f32,
    beta1t: f32,
    beta2t: f32,
    lr_t: f32,
}

impl Adam {
    /// Adam with `β1 = 0.9`, `β2 = 0.999`, `ε = 1e-7`.
    #[must_use]
    pub const fn new(learning_rate: f32) -> Self {
        Self::with_params(learning_rate, 0.9, 0.999, 1e-7)
    }

    /// Adam with explicit hyperparameters.
    #[must_use]
    pub const fn with_params(learning_rate: f32, beta1: f32, beta2: f32, eps: f32) -> Self {
        Self { learning_rate, beta1, beta2, eps, beta1t: beta1, beta2t: beta2, lr_t: learning_rate }
    }

    /// `(β1ᵗ, β2ᵗ)` for the next step.
    #[must_use]
    pub const fn powers(&self) -> (f32, f32) {
        (self.beta1t, self.beta2t)
    }
}

impl Optimizer for Adam {
    fn sizeof_optimem(&self, param: &Tensor, alignment: usize) -> usize {
        2 * align_up(sizeof_data(param), alignment)
    }

    fn begin_step(&mut self) {
        self.lr_t = self.learning_rate * sqrt(1.0 - self.beta2t) / (1.0 - self.beta1t);
    }

    fn update_params(&self, params: &mut [f32], gradients: &[f32], optimem: &mut [f32]) {
        let n = params.len();
        let (m, v) = optimem.split_at_mut(optimem.len() / 2);
        let step = AdamStep { lr_t: self.lr_t, beta1: self.beta1, beta2: self.beta2, eps: self.eps };
        cpu::adam(params, gradients, &mut m[..n], &mut v[..n], step);
    }

    fn end_step(&mut self) {
        self.beta1t *= self.beta1;
        self.beta2t *= self.beta2;
    }

    fn reset(&mut self) {
        self.beta1t = self.beta1;
        self.beta2t = self.beta2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensors::Shape;

    #[test]
    fn moments_are_padded_separately() {
        let t = Tensor::f32(Shape::d1(3));
        assert_eq!(Adam::new(0.01).sizeof_optimem(&t, 4), 24);
        assert_eq!(Adam::new(0.01).sizeof_optimem(&t, 16), 32);
    }

    #[test]
    fn first_step_moves_by_learning_rate() {
        let mut adam = Adam::new(0.001);
        let mut p = [1.0];
        let mut state = [0.0; 2];
        adam.begin_step();
        adam.update_params(&mut p, &[1.0], &mut state);
        adam.end_step();
        assert!((state[0] - 0.1).abs() < 1e-6);
        assert!((state[1] - 0.001).abs() < 1e-7);
        assert!((p[0] - 0.999).abs() < 1e-6);
        let (b1, b2) = adam.powers();
        assert!((b1 - 0.81).abs() < 1e-6);
        assert!((b2 - 0.998_001).abs() < 1e-6);
    }

    #[test]
    fn first_step_with_small_gradient() {
        let mut adam = Adam::new(0.001);
        let mut p = [1.0];
        let mut state = [0.0; 2];
        adam.begin_step();
        adam.update_params(&mut p, &[0.2], &mut state);
        adam.end_step();
        assert!((state[0] - 0.02).abs() < 1e-7);
        assert!((state[1] - 0.000_04).abs() < 1e-9);
        // lr_t = 0.001 * √0.001 / 0.1 and m / (√v + ε) = 0.02 / 0.006_324_6
        assert!((adam.lr_t - 0.000_316_23).abs() < 1e-8);
        assert!((p[0] - 0.999_000).abs() < 1e-6);
    }

    #[test]
    fn padded_state_uses_both_halves() {
        // three parameters padded to 16 bytes: m at floats 0..3, v at 4..7
        let mut adam = Adam::new(0.1);
        let mut p = [0.0; 3];
        let mut state = [0.0; 8];
        adam.begin_step();
        adam.update_params(&mut p, &[1.0, -1.0, 2.0], &mut state);
        assert!((state[2] - 0.2).abs() < 1e-6);
        assert_eq!(state[3], 0.0);
        assert!((state[6] - 0.004).abs() < 1e-6);
        assert!(p[0] < 0.0 && p[1] > 0.0);
    }

    #[test]
    fn reset_restores_powers() {
        let mut adam = Adam::new(0.1);
        adam.end_step();
        adam.end_step();
        adam.reset();
        assert_eq!(adam.powers(), (0.9, 0.999));
    }
}
