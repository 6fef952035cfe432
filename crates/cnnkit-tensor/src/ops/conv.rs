//! Convolution Kernels
//!
//! Direct 2D cross-correlation over `[N, C, H, W]` inputs, plus the two
//! adjoints needed by the backward pass. Work is split across the batch (or
//! output channels for the weight gradient) with rayon.
//!
//! @version 0.1.0

use cnnkit_core::dtype::Float;
use cnnkit_core::error::{Error, Result};
use rayon::prelude::*;

use crate::shape::window_output_size;
use crate::tensor::Tensor;

/// Stride and zero-padding of a 2D window, as `(height, width)` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2dGeometry {
    /// Step between neighbouring windows.
    pub stride: (usize, usize),
    /// Zero padding added on both sides.
    pub padding: (usize, usize),
}

impl Conv2dGeometry {
    /// Creates a geometry with square stride and padding.
    #[must_use]
    pub const fn new(stride: usize, padding: usize) -> Self {
        Self {
            stride: (stride, stride),
            padding: (padding, padding),
        }
    }

    /// Output spatial size for an input of `(h, w)` and a kernel of `(kh, kw)`.
    pub fn output_size(
        &self,
        input: (usize, usize),
        kernel: (usize, usize),
        input_shape: &[usize],
    ) -> Result<(usize, usize)> {
        let oh = window_output_size(input.0, kernel.0, self.stride.0, self.padding.0);
        let ow = window_output_size(input.1, kernel.1, self.stride.1, self.padding.1);
        match (oh, ow) {
            (Some(oh), Some(ow)) => Ok((oh, ow)),
            _ => Err(Error::invalid_shape(
                input_shape,
                format!(
                    "kernel {kernel:?} with padding {:?} does not fit the input",
                    self.padding
                ),
            )),
        }
    }
}

fn dims4(t: &[usize], what: &str) -> Result<(usize, usize, usize, usize)> {
    match *t {
        [a, b, c, d] => Ok((a, b, c, d)),
        _ => Err(Error::invalid_shape(t, format!("{what} expects a 4D tensor"))),
    }
}

/// Maps an output coordinate plus kernel offset back to an input coordinate.
#[inline]
fn source_index(out: usize, k: usize, stride: usize, pad: usize, limit: usize) -> Option<usize> {
    let pos = (out * stride + k).checked_sub(pad)?;
    (pos < limit).then_some(pos)
}

/// Forward convolution: `[N, C, H, W] * [O, C, KH, KW] (+ [O]) -> [N, O, OH, OW]`.
pub fn conv2d<T: Float>(
    input: &Tensor<T>,
    weight: &Tensor<T>,
    bias: Option<&Tensor<T>>,
    geometry: Conv2dGeometry,
) -> Result<Tensor<T>> {
    let (n, c, h, w) = dims4(input.shape(), "conv2d input")?;
    let (o, wc, kh, kw) = dims4(weight.shape(), "conv2d weight")?;
    if c != wc {
        return Err(Error::shape_mismatch(
            "conv2d",
            &[n, wc, h, w],
            input.shape(),
        ));
    }
    if let Some(b) = bias {
        if b.shape() != [o] {
            return Err(Error::shape_mismatch("conv2d bias", &[o], b.shape()));
        }
    }
    let (oh, ow) = geometry.output_size((h, w), (kh, kw), input.shape())?;
    let (sh, sw) = geometry.stride;
    let (ph, pw) = geometry.padding;

    let x_guard = input.data();
    let w_guard = weight.data();
    let x: &[T] = &x_guard;
    let wt: &[T] = &w_guard;
    let bias_vals: Option<Vec<T>> = bias.map(Tensor::to_vec);

    let plane = oh * ow;
    let mut out = vec![T::ZERO; n * o * plane];
    out.par_chunks_mut(plane.max(1))
        .enumerate()
        .for_each(|(idx, dst)| {
            let (b, oc) = (idx / o, idx % o);
            let init = bias_vals.as_ref().map_or(T::ZERO, |bv| bv[oc]);
            dst.iter_mut().for_each(|v| *v = init);
            for ic in 0..c {
                let x_plane = &x[(b * c + ic) * h * w..(b * c + ic + 1) * h * w];
                let w_plane = &wt[(oc * c + ic) * kh * kw..(oc * c + ic + 1) * kh * kw];
                for oy in 0..oh {
                    for ky in 0..kh {
                        let Some(iy) = source_index(oy, ky, sh, ph, h) else {
                            continue;
                        };
                        for ox in 0..ow {
                            let mut acc = T::ZERO;
                            for kx in 0..kw {
                                if let Some(ix) = source_index(ox, kx, sw, pw, w) {
                                    acc = acc + x_plane[iy * w + ix] * w_plane[ky * kw + kx];
                                }
                            }
                            dst[oy * ow + ox] = dst[oy * ow + ox] + acc;
                        }
                    }
                }
            }
        });
    drop((x_guard, w_guard));
    Tensor::from_vec(out, &[n, o, oh, ow])?.to_device(input.device())
}

/// Gradient of [`conv2d`] with respect to its input.
pub fn conv2d_grad_input<T: Float>(
    grad_output: &Tensor<T>,
    weight: &Tensor<T>,
    input_shape: &[usize],
    geometry: Conv2dGeometry,
) -> Result<Tensor<T>> {
    let (n, c, h, w) = dims4(input_shape, "conv2d input")?;
    let (o, _, kh, kw) = dims4(weight.shape(), "conv2d weight")?;
    let (_, _, oh, ow) = dims4(grad_output.shape(), "conv2d grad")?;
    let (sh, sw) = geometry.stride;
    let (ph, pw) = geometry.padding;

    let g_guard = grad_output.data();
    let w_guard = weight.data();
    let g: &[T] = &g_guard;
    let wt: &[T] = &w_guard;

    let sample = c * h * w;
    let mut out = vec![T::ZERO; n * sample];
    out.par_chunks_mut(sample.max(1))
        .enumerate()
        .for_each(|(b, dst)| {
            for oc in 0..o {
                let g_plane = &g[(b * o + oc) * oh * ow..(b * o + oc + 1) * oh * ow];
                for ic in 0..c {
                    let w_plane = &wt[(oc * c + ic) * kh * kw..(oc * c + ic + 1) * kh * kw];
                    let d_plane = &mut dst[ic * h * w..(ic + 1) * h * w];
                    for oy in 0..oh {
                        for ky in 0..kh {
                            let Some(iy) = source_index(oy, ky, sh, ph, h) else {
                                continue;
                            };
                            for ox in 0..ow {
                                let go = g_plane[oy * ow + ox];
                                for kx in 0..kw {
                                    if let Some(ix) = source_index(ox, kx, sw, pw, w) {
                                        let slot = &mut d_plane[iy * w + ix];
                                        *slot = *slot + go * w_plane[ky * kw + kx];
                                    }
                                }
                            }
                        }
                    }
                }
            }
        });
    drop((g_guard, w_guard));
    Tensor::from_vec(out, input_shape)
}

/// Gradient of [`conv2d`] with respect to its weight.
pub fn conv2d_grad_weight<T: Float>(
    grad_output: &Tensor<T>,
    input: &Tensor<T>,
    weight_shape: &[usize],
    geometry: Conv2dGeometry,
) -> Result<Tensor<T>> {
    let (n, c, h, w) = dims4(input.shape(), "conv2d input")?;
    let (o, _, kh, kw) = dims4(weight_shape, "conv2d weight")?;
    let (_, _, oh, ow) = dims4(grad_output.shape(), "conv2d grad")?;
    let (sh, sw) = geometry.stride;
    let (ph, pw) = geometry.padding;

    let g_guard = grad_output.data();
    let x_guard = input.data();
    let g: &[T] = &g_guard;
    let x: &[T] = &x_guard;

    let filter = c * kh * kw;
    let mut out = vec![T::ZERO; o * filter];
    out.par_chunks_mut(filter.max(1))
        .enumerate()
        .for_each(|(oc, dst)| {
            for b in 0..n {
                let g_plane = &g[(b * o + oc) * oh * ow..(b * o + oc + 1) * oh * ow];
                for ic in 0..c {
                    let x_plane = &x[(b * c + ic) * h * w..(b * c + ic + 1) * h * w];
                    for ky in 0..kh {
                        for kx in 0..kw {
                            let mut acc = T::ZERO;
                            for oy in 0..oh {
                                let Some(iy) = source_index(oy, ky, sh, ph, h) else {
                                    continue;
                                };
                                for ox in 0..ow {
                                    if let Some(ix) = source_index(ox, kx, sw, pw, w) {
                                        acc = acc + g_plane[oy * ow + ox] * x_plane[iy * w + ix];
                                    }
                                }
                            }
                            let slot = &mut dst[(ic * kh + ky) * kw + kx];
                            *slot = *slot + acc;
                        }
                    }
                }
            }
        });
    drop((g_guard, x_guard));
    Tensor::from_vec(out, weight_shape)
}

/// Gradient of [`conv2d`] with respect to its bias: sum over batch and space.
pub fn conv2d_grad_bias<T: Float>(grad_output: &Tensor<T>) -> Result<Tensor<T>> {
    let (n, o, oh, ow) = dims4(grad_output.shape(), "conv2d grad")?;
    let g = grad_output.data();
    let plane = oh * ow;
    let mut out = vec![T::ZERO; o];
    for b in 0..n {
        for (oc, slot) in out.iter_mut().enumerate() {
            let start = (b * o + oc) * plane;
            *slot = g[start..start + plane].iter().fold(*slot, |acc, &v| acc + v);
        }
    }
    drop(g);
    Tensor::from_vec(out, &[o])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conv2d_identity_kernel() {
        let input = Tensor::<f32>::from_vec((1..=9).map(|x| x as f32).collect(), &[1, 1, 3, 3]).unwrap();
        let weight = Tensor::<f32>::from_vec(vec![1.0], &[1, 1, 1, 1]).unwrap();
        let out = conv2d(&input, &weight, None, Conv2dGeometry::new(1, 0)).unwrap();
        assert_eq!(out.shape(), &[1, 1, 3, 3]);
        assert_eq!(out.to_vec(), input.to_vec());
    }

    #[test]
    fn test_conv2d_sum_kernel_with_padding() {
        let input = Tensor::<f32>::ones(&[1, 1, 3, 3]);
        let weight = Tensor::<f32>::ones(&[1, 1, 3, 3]);
        let bias = Tensor::<f32>::from_vec(vec![0.5], &[1]).unwrap();
        let out = conv2d(&input, &weight, Some(&bias), Conv2dGeometry::new(1, 1)).unwrap();
        assert_eq!(out.shape(), &[1, 1, 3, 3]);
        // Corners see 4 ones, edges 6, centre 9.
        assert_eq!(
            out.to_vec(),
            vec![4.5, 6.5, 4.5, 6.5, 9.5, 6.5, 4.5, 6.5, 4.5]
        );
    }

    #[test]
    fn test_conv2d_stride() {
        let input = Tensor::<f32>::ones(&[2, 3, 227, 227]);
        let weight = Tensor::<f32>::zeros(&[4, 3, 11, 11]);
        let out = conv2d(&input, &weight, None, Conv2dGeometry::new(4, 0)).unwrap();
        assert_eq!(out.shape(), &[2, 4, 55, 55]);
    }

    #[test]
    fn test_conv2d_channel_mismatch() {
        let input = Tensor::<f32>::ones(&[1, 2, 5, 5]);
        let weight = Tensor::<f32>::ones(&[1, 3, 3, 3]);
        assert!(matches!(
            conv2d(&input, &weight, None, Conv2dGeometry::new(1, 0)),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_conv2d_kernel_too_large() {
        let input = Tensor::<f32>::ones(&[1, 1, 2, 2]);
        let weight = Tensor::<f32>::ones(&[1, 1, 5, 5]);
        assert!(matches!(
            conv2d(&input, &weight, None, Conv2dGeometry::new(1, 0)),
            Err(Error::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_grad_bias_sums_planes() {
        let g = Tensor::<f32>::ones(&[2, 3, 4, 4]);
        assert_eq!(conv2d_grad_bias(&g).unwrap().to_vec(), vec![32.0; 3]);
    }
}
