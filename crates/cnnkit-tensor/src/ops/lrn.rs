//! Local Response Normalization
//!
//! Cross-channel normalisation used by the 2012-era deep networks:
//!
//! ```text
//! scale_c = k + alpha * sum_{j in window(c)} x_j^2
//! y_c     = x_c * scale_c^(-beta)
//! ```
//!
//! The window covers `n` neighbouring channels centred on `c`, clipped at
//! the channel boundaries.
//!
//! @version 0.1.0

use cnnkit_core::dtype::Float;
use cnnkit_core::error::{Error, Result};

use crate::tensor::Tensor;

/// Hyperparameters of local response normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LrnParams {
    /// Number of channels in the window.
    pub size: usize,
    /// Additive constant.
    pub k: f64,
    /// Scale of the squared sum.
    pub alpha: f64,
    /// Exponent.
    pub beta: f64,
}

impl Default for LrnParams {
    fn default() -> Self {
        Self {
            size: 5,
            k: 2.0,
            alpha: 1e-4,
            beta: 0.75,
        }
    }
}

impl LrnParams {
    fn window(&self, c: usize, channels: usize) -> core::ops::Range<usize> {
        let half = self.size / 2;
        c.saturating_sub(half)..(c + half + 1).min(channels)
    }
}

fn check_4d(shape: &[usize]) -> Result<(usize, usize, usize)> {
    match *shape {
        [n, c, h, w] => Ok((n, c, h * w)),
        _ => Err(Error::invalid_shape(shape, "local_response_norm expects a 4D tensor")),
    }
}

/// Forward pass. Returns the output and the per-element `scale` needed by
/// [`local_response_norm_backward`].
pub fn local_response_norm<T: Float>(
    input: &Tensor<T>,
    params: LrnParams,
) -> Result<(Tensor<T>, Tensor<T>)> {
    let (n, c, hw) = check_4d(input.shape())?;
    let (k, alpha, beta) = (T::from_f64(params.k), T::from_f64(params.alpha), T::from_f64(params.beta));
    let x = input.data();

    let mut scale = vec![T::ZERO; x.len()];
    let mut out = vec![T::ZERO; x.len()];
    for b in 0..n {
        for ch in 0..c {
            for p in 0..hw {
                let mut sq = T::ZERO;
                for j in params.window(ch, c) {
                    let v = x[(b * c + j) * hw + p];
                    sq = sq + v * v;
                }
                let idx = (b * c + ch) * hw + p;
                scale[idx] = k + alpha * sq;
                out[idx] = x[idx] * scale[idx].powf(T::ZERO - beta);
            }
        }
    }
    drop(x);
    Ok((
        Tensor::from_vec(out, input.shape())?,
        Tensor::from_vec(scale, input.shape())?,
    ))
}

/// Gradient of [`local_response_norm`].
pub fn local_response_norm_backward<T: Float>(
    grad_output: &Tensor<T>,
    input: &Tensor<T>,
    scale: &Tensor<T>,
    params: LrnParams,
) -> Result<Tensor<T>> {
    let (n, c, hw) = check_4d(input.shape())?;
    if grad_output.shape() != input.shape() || scale.shape() != input.shape() {
        return Err(Error::shape_mismatch(
            "local_response_norm backward",
            input.shape(),
            grad_output.shape(),
        ));
    }
    let (alpha, beta) = (T::from_f64(params.alpha), T::from_f64(params.beta));
    let two = T::from_f64(2.0);
    let x = input.data();
    let g = grad_output.data();
    let s = scale.data();

    // g_c * x_c * scale_c^(-beta-1), shared by every channel in c's window.
    let weighted: Vec<T> = (0..x.len())
        .map(|i| g[i] * x[i] * s[i].powf(T::ZERO - beta - T::ONE))
        .collect();

    let mut grad = vec![T::ZERO; x.len()];
    for b in 0..n {
        for ch in 0..c {
            for p in 0..hw {
                let idx = (b * c + ch) * hw + p;
                let mut cross = T::ZERO;
                for j in params.window(ch, c) {
                    cross = cross + weighted[(b * c + j) * hw + p];
                }
                grad[idx] = g[idx] * s[idx].powf(T::ZERO - beta) - two * alpha * beta * x[idx] * cross;
            }
        }
    }
    drop((x, g, s));
    Tensor::from_vec(grad, input.shape())
}
