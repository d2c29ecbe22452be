//! Single-threaded f32 kernels.
//!
//! Every kernel writes into a caller-provided output slice; none allocate.
//! Backward kernels take the upstream gradient `dy` and write the gradient
//! with respect to the kernel input into `dx`.
//!
//! ## Implemented Ops
//!
//! - `matmul`, `matmul_at_b`, `matmul_a_bt`, `add_bias_rows`, `sum_rows`
//! - activations: `relu`, `leaky_relu`, `elu`, `sigmoid`, `tanh`, `softsign`,
//!   `softmax`
//! - `conv2d` (im2col forward, direct-accumulation backward)
//! - losses: `mse`, `cross_entropy`, `binary_cross_entropy`
//! - optimizers: `sgd`, `sgd_momentum`, `adam`
//! - `glorot_uniform` initialisation

mod adam;
pub use self::adam::{adam, AdamStep};

mod conv2d;
pub use self::conv2d::{conv2d, conv2d_backward, output_extent, Conv2dGeometry};

mod cross_entropy;
pub use self::cross_entropy::{binary_cross_entropy, cross_entropy, CROSS_ENTROPY_EPS};

mod init;
pub use self::init::glorot_uniform;

mod matmul;
pub use self::matmul::{add_bias_rows, matmul, matmul_a_bt, matmul_at_b, sum_rows};

mod mse;
pub use self::mse::{mse, mse_delta};

mod relu;
pub use self::relu::{elu, elu_backward, leaky_relu, leaky_relu_backward, relu, relu_backward};

mod sgd;
pub use self::sgd::{sgd, sgd_momentum};

mod sigmoid;
pub use self::sigmoid::{sigmoid, sigmoid_backward};

mod softmax;
pub use self::softmax::{softmax, softmax_backward};

mod softsign;
pub use self::softsign::{softsign, softsign_backward};

mod tanh;
pub use self::tanh::{tanh, tanh_backward};

/// Writes `a - b` element-wise into `out`.
pub fn sub(a: &[f32], b: &[f32], out: &mut [f32]) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), out.len());
    out.iter_mut().zip(a.iter().zip(b)).for_each(|(o, (&x, &y))| *o = x - y);
}

/// Adds `src` into `dst` element-wise.
pub fn add_assign(dst: &mut [f32], src: &[f32]) {
    debug_assert_eq!(dst.len(), src.len());
    dst.iter_mut().zip(src).for_each(|(d, &s)| *d += s);
}
