//! Batch Normalization Kernels
//!
//! Per-channel normalisation of `[N, C, H, W]` tensors:
//!
//! ```text
//! xhat = (x - mean_c) / sqrt(var_c + eps)
//! y    = gamma_c * xhat + beta_c
//! ```
//!
//! @version 0.1.0

use cnnkit_core::dtype::Float;
use cnnkit_core::error::{Error, Result};

use crate::tensor::Tensor;

fn check_4d(shape: &[usize]) -> Result<(usize, usize, usize)> {
    match *shape {
        [n, c, h, w] => Ok((n, c, h * w)),
        _ => Err(Error::invalid_shape(shape, "batch_norm2d expects a 4D tensor")),
    }
}

fn check_channel(t: &Tensor<impl Float>, c: usize, what: &str) -> Result<()> {
    if t.shape() == [c] {
        Ok(())
    } else {
        Err(Error::shape_mismatch(what, &[c], t.shape()))
    }
}

/// Mean and biased variance of every channel over batch and space.
pub fn channel_stats<T: Float>(input: &Tensor<T>) -> Result<(Tensor<T>, Tensor<T>)> {
    let (n, c, hw) = check_4d(input.shape())?;
    let count = n * hw;
    if count == 0 {
        return Err(Error::EmptyTensor);
    }
    let m = T::from_f64(count as f64);
    let x = input.data();
    let mut mean = vec![T::ZERO; c];
    let mut var = vec![T::ZERO; c];
    for ch in 0..c {
        let mut acc = T::ZERO;
        for b in 0..n {
            let base = (b * c + ch) * hw;
            acc = x[base..base + hw].iter().fold(acc, |a, &v| a + v);
        }
        mean[ch] = acc / m;
        let mut sq = T::ZERO;
        for b in 0..n {
            let base = (b * c + ch) * hw;
            sq = x[base..base + hw].iter().fold(sq, |a, &v| {
                let d = v - mean[ch];
                a + d * d
            });
        }
        var[ch] = sq / m;
    }
    drop(x);
    Ok((Tensor::from_vec(mean, &[c])?, Tensor::from_vec(var, &[c])?))
}

/// Normalises with the given statistics. Returns the output and `xhat`.
pub fn batch_norm2d<T: Float>(
    input: &Tensor<T>,
    mean: &Tensor<T>,
    var: &Tensor<T>,
    gamma: &Tensor<T>,
    beta: &Tensor<T>,
    eps: f64,
) -> Result<(Tensor<T>, Tensor<T>)> {
    let (n, c, hw) = check_4d(input.shape())?;
    check_channel(mean, c, "batch_norm2d mean")?;
    check_channel(var, c, "batch_norm2d var")?;
    check_channel(gamma, c, "batch_norm2d gamma")?;
    check_channel(beta, c, "batch_norm2d beta")?;

    let eps = T::from_f64(eps);
    let (mu, v, g, b) = (mean.to_vec(), var.to_vec(), gamma.to_vec(), beta.to_vec());
    let x = input.data();
    let mut xhat = vec![T::ZERO; x.len()];
    let mut out = vec![T::ZERO; x.len()];
    for batch in 0..n {
        for ch in 0..c {
            let inv_std = T::ONE / (v[ch] + eps).sqrt();
            let base = (batch * c + ch) * hw;
            for i in base..base + hw {
                xhat[i] = (x[i] - mu[ch]) * inv_std;
                out[i] = g[ch] * xhat[i] + b[ch];
            }
        }
    }
    drop(x);
    Ok((
        Tensor::from_vec(out, input.shape())?,
        Tensor::from_vec(xhat, input.shape())?,
    ))
}

/// Gradient of [`batch_norm2d`] when `mean` and `var` were the batch's own
/// statistics. Returns `(grad_input, grad_gamma, grad_beta)`.
pub fn batch_norm2d_backward<T: Float>(
    grad_output: &Tensor<T>,
    xhat: &Tensor<T>,
    gamma: &Tensor<T>,
    var: &Tensor<T>,
    eps: f64,
) -> Result<(Tensor<T>, Tensor<T>, Tensor<T>)> {
    let (n, c, hw) = check_4d(xhat.shape())?;
    if grad_output.shape() != xhat.shape() {
        return Err(Error::shape_mismatch(
            "batch_norm2d backward",
            xhat.shape(),
            grad_output.shape(),
        ));
    }
    check_channel(gamma, c, "batch_norm2d gamma")?;
    check_channel(var, c, "batch_norm2d var")?;

    let m = T::from_f64((n * hw) as f64);
    let eps = T::from_f64(eps);
    let (gm, v) = (gamma.to_vec(), var.to_vec());
    let g = grad_output.data();
    let xh = xhat.data();

    let mut grad_gamma = vec![T::ZERO; c];
    let mut grad_beta = vec![T::ZERO; c];
    for batch in 0..n {
        for ch in 0..c {
            let base = (batch * c + ch) * hw;
            for i in base..base + hw {
                grad_beta[ch] = grad_beta[ch] + g[i];
                grad_gamma[ch] = grad_gamma[ch] + g[i] * xh[i];
            }
        }
    }

    let mut grad_input = vec![T::ZERO; g.len()];
    for batch in 0..n {
        for ch in 0..c {
            let scale = gm[ch] / ((v[ch] + eps).sqrt() * m);
            let base = (batch * c + ch) * hw;
            for i in base..base + hw {
                grad_input[i] = scale * (m * g[i] - grad_beta[ch] - xh[i] * grad_gamma[ch]);
            }
        }
    }
    drop((g, xh));
    Ok((
        Tensor::from_vec(grad_input, xhat.shape())?,
        Tensor::from_vec(grad_gamma, &[c])?,
        Tensor::from_vec(grad_beta, &[c])?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_channel_stats() {
        // Channel 0 holds 1..4, channel 1 holds a constant.
        let x = Tensor::<f64>::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 5.0, 5.0, 5.0], &[1, 2, 2, 2])
            .unwrap();
        let (mean, var) = channel_stats(&x).unwrap();
        assert_eq!(mean.to_vec(), vec![2.5, 5.0]);
        assert_eq!(var.to_vec(), vec![1.25, 0.0]);
    }

    #[test]
    fn test_batch_norm_normalises() {
        let x = Tensor::<f64>::from_vec(vec![1.0, 3.0, 5.0, 7.0], &[2, 1, 1, 2]).unwrap();
        let (mean, var) = channel_stats(&x).unwrap();
        let gamma = Tensor::ones(&[1]);
        let beta = Tensor::zeros(&[1]);
        let (y, _) = batch_norm2d(&x, &mean, &var, &gamma, &beta, 0.0).unwrap();
        let y = y.to_vec();
        assert_relative_eq!(y.iter().sum::<f64>(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(y.iter().map(|v| v * v).sum::<f64>() / 4.0, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_batch_norm_backward_matches_finite_difference() {
        let shape = [2, 2, 1, 3];
        let data: Vec<f64> = (0..12).map(|i| ((i * 5 % 7) as f64 - 3.0) * 0.4).collect();
        let gamma = Tensor::<f64>::from_vec(vec![1.5, -0.5], &[2]).unwrap();
        let beta = Tensor::<f64>::from_vec(vec![0.1, 0.2], &[2]).unwrap();
        let weights: Vec<f64> = (0..12).map(|i| (i as f64 * 0.37).sin()).collect();
        let eps = 1e-5;

        let f = |v: &[f64]| {
            let t = Tensor::from_vec(v.to_vec(), &shape).unwrap();
            let (mean, var) = channel_stats(&t).unwrap();
            let (y, _) = batch_norm2d(&t, &mean, &var, &gamma, &beta, eps).unwrap();
            y.to_vec().iter().zip(&weights).map(|(a, b)| a * b).sum::<f64>()
        };

        let x = Tensor::from_vec(data.clone(), &shape).unwrap();
        let (mean, var) = channel_stats(&x).unwrap();
        let (_, xhat) = batch_norm2d(&x, &mean, &var, &gamma, &beta, eps).unwrap();
        let g = Tensor::from_vec(weights.clone(), &shape).unwrap();
        let (gx, _, gb) = batch_norm2d_backward(&g, &xhat, &gamma, &var, eps).unwrap();
        let gx = gx.to_vec();

        let h = 1e-6;
        for i in 0..data.len() {
            let mut plus = data.clone();
            plus[i] += h;
            let mut minus = data.clone();
            minus[i] -= h;
            assert_relative_eq!(gx[i], (f(&plus) - f(&minus)) / (2.0 * h), epsilon = 1e-5);
        }
        let expected_beta0: f64 = [0, 1, 2, 6, 7, 8].iter().map(|&i| weights[i]).sum();
        assert_relative_eq!(gb.to_vec()[0], expected_beta0, epsilon = 1e-12);
    }
}
