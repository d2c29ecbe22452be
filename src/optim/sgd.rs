use crate::memory::align_up;
use crate::ops::cpu;
use crate::tensors::{sizeof_data, Tensor};

use super::Optimizer;

/// Stochastic gradient descent, optionally with momentum.
///
/// Without momentum it keeps no state. With momentum `μ` it keeps one
/// velocity tensor per parameter: `v ← μ · v + g; p ← p − lr · v`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sgd {
    /// Learning rate.
    pub learning_rate: f32,
    /// Momentum factor, if any.
    pub momentum: Option<f32>,
}

impl Sgd {
    /// Plain SGD.
    #[must_use]
    pub const fn new(learning_rate: f32) -> Self {
        Self { learning_rate, momentum: None }
    }

    /// SGD with momentum.
    #[must_use]
    pub const fn with_momentum(learning_rate: f32, momentum: f32) -> Self {
        Self { learning_rate, momentum: Some(momentum) }
    }
}

impl Optimizer for Sgd {
    fn sizeof_optimem(&self, param: &Tensor, alignment: usize) -> usize {
        match self.momentum {
            Some(_) => align_up(sizeof_data(param), alignment),
            None => 0,
        }
    }

    fn update_params(&self, params: &mut [f32], gradients: &[f32], optimem: &mut [f32]) {
        match self.momentum {
            Some(momentum) => {
                let velocity = &mut optimem[..params.len()];
                cpu::sgd_momentum(params, gradients, velocity, self.learning_rate, momentum);
            }
            None => cpu::sgd(params, gradients, self.learning_rate),
        }
    }
}
