//! Pooling Kernels
//!
//! Max and average pooling over `[N, C, H, W]` with no padding. Only
//! windows that fit completely inside the input produce an output.
//!
//! @version 0.1.0

use cnnkit_core::dtype::Float;
use cnnkit_core::error::{Error, Result};

use crate::shape::window_output_size;
use crate::tensor::Tensor;

fn pooled_shape(
    shape: &[usize],
    kernel: (usize, usize),
    stride: (usize, usize),
) -> Result<[usize; 4]> {
    let [n, c, h, w] = *shape else {
        return Err(Error::invalid_shape(shape, "pooling expects a 4D tensor"));
    };
    let oh = window_output_size(h, kernel.0, stride.0, 0);
    let ow = window_output_size(w, kernel.1, stride.1, 0);
    match (oh, ow) {
        (Some(oh), Some(ow)) => Ok([n, c, oh, ow]),
        _ => Err(Error::invalid_shape(
            shape,
            format!("pooling window {kernel:?} with stride {stride:?} does not fit"),
        )),
    }
}

/// Max pooling. Returns the output and, per output element, the flat index
/// of the input element that won.
pub fn max_pool2d<T: Float>(
    input: &Tensor<T>,
    kernel: (usize, usize),
    stride: (usize, usize),
) -> Result<(Tensor<T>, Vec<usize>)> {
    let [n, c, oh, ow] = pooled_shape(input.shape(), kernel, stride)?;
    let (h, w) = (input.shape()[2], input.shape()[3]);
    let x = input.data();

    let mut out = Vec::with_capacity(n * c * oh * ow);
    let mut argmax = Vec::with_capacity(n * c * oh * ow);
    for plane in 0..n * c {
        let base = plane * h * w;
        for oy in 0..oh {
            for ox in 0..ow {
                let mut best = base + oy * stride.0 * w + ox * stride.1;
                for ky in 0..kernel.0 {
                    for kx in 0..kernel.1 {
                        let idx = base + (oy * stride.0 + ky) * w + ox * stride.1 + kx;
                        if x[idx] > x[best] {
                            best = idx;
                        }
                    }
                }
                out.push(x[best]);
                argmax.push(best);
            }
        }
    }
    drop(x);
    Ok((Tensor::from_vec(out, &[n, c, oh, ow])?, argmax))
}

/// Gradient of [`max_pool2d`]: routes each output gradient to its winner.
pub fn max_pool2d_backward<T: Float>(
    grad_output: &Tensor<T>,
    argmax: &[usize],
    input_shape: &[usize],
) -> Result<Tensor<T>> {
    if grad_output.numel() != argmax.len() {
        return Err(Error::shape_mismatch(
            "max_pool2d backward",
            &[argmax.len()],
            grad_output.shape(),
        ));
    }
    let mut grad = vec![T::ZERO; input_shape.iter().product()];
    for (&src, &g) in argmax.iter().zip(grad_output.data().iter()) {
        grad[src] = grad[src] + g;
    }
    Tensor::from_vec(grad, input_shape)
}

/// Average pooling.
pub fn avg_pool2d<T: Float>(
    input: &Tensor<T>,
    kernel: (usize, usize),
    stride: (usize, usize),
) -> Result<Tensor<T>> {
    let [n, c, oh, ow] = pooled_shape(input.shape(), kernel, stride)?;
    let (h, w) = (input.shape()[2], input.shape()[3]);
    let area = T::from_f64((kernel.0 * kernel.1) as f64);
    let x = input.data();

    let mut out = Vec::with_capacity(n * c * oh * ow);
    for plane in 0..n * c {
        let base = plane * h * w;
        for oy in 0..oh {
            for ox in 0..ow {
                let mut acc = T::ZERO;
                for ky in 0..kernel.0 {
                    let row = base + (oy * stride.0 + ky) * w + ox * stride.1;
                    for kx in 0..kernel.1 {
                        acc = acc + x[row + kx];
                    }
                }
                out.push(acc / area);
            }
        }
    }
    drop(x);
    Tensor::from_vec(out, &[n, c, oh, ow])
}

/// Gradient of [`avg_pool2d`]: spreads each output gradient over its window.
pub fn avg_pool2d_backward<T: Float>(
    grad_output: &Tensor<T>,
    input_shape: &[usize],
    kernel: (usize, usize),
    stride: (usize, usize),
) -> Result<Tensor<T>> {
    let [n, c, oh, ow] = pooled_shape(input_shape, kernel, stride)?;
    if grad_output.shape() != [n, c, oh, ow] {
        return Err(Error::shape_mismatch(
            "avg_pool2d backward",
            &[n, c, oh, ow],
            grad_output.shape(),
        ));
    }
    let (h, w) = (input_shape[2], input_shape[3]);
    let area = T::from_f64((kernel.0 * kernel.1) as f64);
    let g = grad_output.data();

    let mut grad = vec![T::ZERO; n * c * h * w];
    for plane in 0..n * c {
        let base = plane * h * w;
        for oy in 0..oh {
            for ox in 0..ow {
                let share = g[(plane * oh + oy) * ow + ox] / area;
                for ky in 0..kernel.0 {
                    let row = base + (oy * stride.0 + ky) * w + ox * stride.1;
                    for kx in 0..kernel.1 {
                        grad[row + kx] = grad[row + kx] + share;
                    }
                }
            }
        }
    }
    drop(g);
    Tensor::from_vec(grad, input_shape)
}
