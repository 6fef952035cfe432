//! Weight Initialization
//!
//! Fan-in scaled initializers. Layers default to LeCun normal for weights
//! and zeros for biases.
//!
//! @version 0.1.0

use cnnkit_tensor::Tensor;

/// Creates a tensor filled with zeros.
pub fn zeros(shape: &[usize]) -> Tensor<f32> {
    cnnkit_tensor::zeros(shape)
}

/// Creates a tensor filled with ones.
pub fn ones(shape: &[usize]) -> Tensor<f32> {
    cnnkit_tensor::ones(shape)
}

/// Number of inputs feeding each output unit: every dimension after the
/// first (`[out, in]` or `[out, in, kh, kw]`).
pub fn fan_in(shape: &[usize]) -> usize {
    shape.iter().skip(1).product::<usize>().max(1)
}

/// LeCun normal: N(0, 1 / fan_in).
pub fn lecun_normal(shape: &[usize]) -> Tensor<f32> {
    let std = (1.0 / fan_in(shape) as f32).sqrt();
    cnnkit_tensor::randn(shape).mul_scalar(std)
}

/// Kaiming uniform: U(-sqrt(6 / fan_in), sqrt(6 / fan_in)).
pub fn kaiming_uniform(shape: &[usize]) -> Tensor<f32> {
    let bound = (6.0 / fan_in(shape) as f32).sqrt();
    cnnkit_tensor::uniform(shape, -bound, bound)
}
