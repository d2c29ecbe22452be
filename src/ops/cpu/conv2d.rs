use crate::ops::{Kernels, MatDims};

/// Static geometry of a channels-first 2D convolution over one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2dGeometry {
    /// Input channels.
    pub in_channels: usize,
    /// Input height.
    pub in_h: usize,
    /// Input width.
    pub in_w: usize,
    /// Output channels (filters).
    pub out_channels: usize,
    /// Kernel `(height, width)`.
    pub kernel: (usize, usize),
    /// Stride `(vertical, horizontal)`.
    pub stride: (usize, usize),
    /// Zero padding `(vertical, horizontal)` on each side.
    pub padding: (usize, usize),
    /// Dilation `(vertical, horizontal)`.
    pub dilation: (usize, usize),
    /// Output height.
    pub out_h: usize,
    /// Output width.
    pub out_w: usize,
}

/// Output extent along one axis, `None` when the kernel does not fit.
#[must_use]
pub fn output_extent(input: usize, kernel: usize, stride: usize, padding: usize, dilation: usize) -> Option<usize> {
    if kernel == 0 || stride == 0 || dilation == 0 {
        return None;
    }
    let span = dilation * (kernel - 1) + 1;
    let padded = input + 2 * padding;
    (padded >= span).then(|| (padded - span) / stride + 1)
}

impl Conv2dGeometry {
    /// Elements of one receptive field: `in_channels · kh · kw`.
    #[must_use]
    pub const fn patch_len(&self) -> usize {
        self.in_channels * self.kernel.0 * self.kernel.1
    }

    /// Output pixels per channel.
    #[must_use]
    pub const fn out_pixels(&self) -> usize {
        self.out_h * self.out_w
    }

    /// Elements of the im2col matrix for one sample.
    #[must_use]
    pub const fn im2col_len(&self) -> usize {
        self.patch_len() * self.out_pixels()
    }

    const fn in_len(&self) -> usize {
        self.in_channels * self.in_h * self.in_w
    }

    const fn out_len(&self) -> usize {
        self.out_channels * self.out_pixels()
    }

    /// Input coordinate hit by output index `o` and kernel tap `k` along an axis.
    #[inline]
    fn source(o: usize, k: usize, stride: usize, padding: usize, dilation: usize, extent: usize) -> Option<usize> {
        (o * stride + k * dilation).checked_sub(padding).filter(|&i| i < extent)
    }

    /// Visits every valid `(patch_row, out_pixel, input_index)` triple.
    fn for_each_tap(&self, mut f: impl FnMut(usize, usize, usize)) {
        let (kh, kw) = self.kernel;
        for ci in 0..self.in_channels {
            for ki in 0..kh {
                for kj in 0..kw {
                    let r = (ci * kh + ki) * kw + kj;
                    for oy in 0..self.out_h {
                        let Some(iy) = Self::source(oy, ki, self.stride.0, self.padding.0, self.dilation.0, self.in_h)
                        else {
                            continue;
                        };
                        for ox in 0..self.out_w {
                            if let Some(ix) =
                                Self::source(ox, kj, self.stride.1, self.padding.1, self.dilation.1, self.in_w)
                            {
                                f(r, oy * self.out_w + ox, (ci * self.in_h + iy) * self.in_w + ix);
                            }
                        }
                    }
                }
            }
        }
    }

    fn im2col(&self, x: &[f32], col: &mut [f32]) {
        col.fill(0.0);
        let pixels = self.out_pixels();
        self.for_each_tap(|r, q, i| col[r * pixels + q] = x[i]);
    }
}

/// Convolution forward pass over a batch.
///
/// `weights` is `[out_channels, in_channels, kh, kw]`, `bias` is
/// `[out_channels]`, `col` is the im2col scratch of
/// [`Conv2dGeometry::im2col_len`] elements, reused per sample.
pub fn conv2d(
    x: &[f32],
    weights: &[f32],
    bias: &[f32],
    y: &mut [f32],
    col: &mut [f32],
    geom: &Conv2dGeometry,
    kernels: &Kernels,
) {
    let pixels = geom.out_pixels();
    debug_assert_eq!(col.len(), geom.im2col_len());
    debug_assert_eq!(x.len() / geom.in_len().max(1), y.len() / geom.out_len().max(1));

    let dims = MatDims::new(geom.out_channels, geom.patch_len(), pixels);
    for (x_b, y_b) in x.chunks_exact(geom.in_len()).zip(y.chunks_exact_mut(geom.out_len())) {
        geom.im2col(x_b, col);
        (kernels.matmul)(weights, col, y_b, dims);
        for (channel, &b) in y_b.chunks_exact_mut(pixels).zip(bias) {
            channel.iter_mut().for_each(|v| *v += b);
        }
    }
}

/// Convolution backward pass over a batch.
///
/// Accumulates into the `(dw, db)` gradients when present; overwrites `dx`
/// when present.
pub fn conv2d_backward(
    x: &[f32],
    weights: &[f32],
    dy: &[f32],
    dx: Option<&mut [f32]>,
    grads: Option<(&mut [f32], &mut [f32])>,
    geom: &Conv2dGeometry,
) {
    let pixels = geom.out_pixels();
    let patch = geom.patch_len();
    let (in_len, out_len) = (geom.in_len(), geom.out_len());

    if let Some((dw, db)) = grads {
        debug_assert_eq!(dw.len(), geom.out_channels * patch);
        for (dy_b, x_b) in dy.chunks_exact(out_len).zip(x.chunks_exact(in_len)) {
            for (g, channel) in db.iter_mut().zip(dy_b.chunks_exact(pixels)) {
                *g += channel.iter().sum::<f32>();
            }
            geom.for_each_tap(|r, q, i| {
                for co in 0..geom.out_channels {
                    dw[co * patch + r] += dy_b[co * pixels + q] * x_b[i];
                }
            });
        }
    }

    if let Some(dx) = dx {
        dx.fill(0.0);
        for (dy_b, dx_b) in dy.chunks_exact(out_len).zip(dx.chunks_exact_mut(in_len)) {
            geom.for_each_tap(|r, q, i| {
                for co in 0..geom.out_channels {
                    dx_b[i] += dy_b[co * pixels + q] * weights[co * patch + r];
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::CPU_KERNELS;

    fn geometry(h: usize, w: usize, k: usize, stride: usize, padding: usize) -> Conv2dGeometry {
        let out_h = output_extent(h, k, stride, padding, 1).unwrap();
        let out_w = output_extent(w, k, stride, padding, 1).unwrap();
        Conv2dGeometry {
            in_channels: 1,
            in_h: h,
            in_w: w,
            out_channels: 1,
            kernel: (k, k),
            stride: (stride, stride),
            padding: (padding, padding),
            dilation: (1, 1),
            out_h,
            out_w,
        }
    }

    #[test]
    fn output_extent_formula() {
        assert_eq!(output_extent(5, 3, 1, 0, 1), Some(3));
        assert_eq!(output_extent(5, 3, 2, 1, 1), Some(3));
        assert_eq!(output_extent(5, 3, 1, 0, 2), Some(1));
        assert_eq!(output_extent(2, 3, 1, 0, 1), None);
        assert_eq!(output_extent(4, 3, 0, 0, 1), None);
    }

    #[test]
    fn box_filter_sums_windows() {
        let geom = geometry(3, 3, 2, 1, 0);
        let x: [f32; 9] = core::array::from_fn(|i| i as f32);
        let w = [1.0; 4];
        let mut y = [0.0; 4];
        let mut col = [0.0; 16];
        conv2d(&x, &w, &[0.5], &mut y, &mut col, &geom, &CPU_KERNELS);
        assert_eq!(y, [8.5, 12.5, 20.5, 24.5]);
    }

    #[test]
    fn padding_reads_zeros() {
        let geom = geometry(1, 1, 3, 1, 1);
        let w: [f32; 9] = core::array::from_fn(|i| i as f32);
        let mut y = [0.0];
        let mut col = [0.0; 9];
        conv2d(&[2.0], &w, &[0.0], &mut y, &mut col, &geom, &CPU_KERNELS);
        // only the centre tap sees the single input pixel
        assert_eq!(y, [8.0]);
    }

    #[test]
    fn backward_accumulates_and_overwrites() {
        let geom = geometry(3, 3, 2, 1, 0);
        let x: [f32; 9] = core::array::from_fn(|i| i as f32);
        let w = [1.0, 0.0, 0.0, -1.0];
        let dy = [1.0; 4];
        let mut dx = [9.0; 9];
        let mut dw = [1.0; 4];
        let mut db = [0.0];
        conv2d_backward(&x, &w, &dy, Some(&mut dx), Some((&mut dw, &mut db)), &geom);

        assert_eq!(db, [4.0]);
        // dw[tap] = 1 + sum of the inputs under that tap
        assert_eq!(dw, [1.0 + 8.0, 1.0 + 12.0, 1.0 + 20.0, 1.0 + 24.0]);
        assert_eq!(dx, [1.0, 1.0, 0.0, 1.0, 0.0, -1.0, 0.0, -1.0, -1.0]);
    }
}
