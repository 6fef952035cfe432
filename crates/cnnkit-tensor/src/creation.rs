//! Tensor Creation Functions
//!
//! Factory functions for constant and random tensors. Random draws go
//! through the seedable thread-local generator in `cnnkit_core::random`.
//!
//! @version 0.1.0

use rand::Rng;
use rand_distr::StandardNormal;

use cnnkit_core::dtype::{Float, Numeric, Scalar};
use cnnkit_core::random::with_rng;
use cnnkit_core::{Device, Storage};

use crate::shape::{numel, Shape};
use crate::tensor::Tensor;

fn build<T: Scalar>(data: Vec<T>, shape: &[usize]) -> Tensor<T> {
    Tensor {
        storage: Storage::from_vec(data, Device::Cpu),
        shape: Shape::from_slice(shape),
    }
}

// =============================================================================
// Constant Initialization
// =============================================================================

/// Creates a tensor filled with zeros.
#[must_use]
pub fn zeros<T: Scalar>(shape: &[usize]) -> Tensor<T> {
    build(vec![T::default(); numel(shape)], shape)
}

/// Creates a tensor filled with ones.
#[must_use]
pub fn ones<T: Numeric>(shape: &[usize]) -> Tensor<T> {
    full(shape, T::ONE)
}

/// Creates a tensor filled with a specific value.
#[must_use]
pub fn full<T: Scalar>(shape: &[usize], value: T) -> Tensor<T> {
    build(vec![value; numel(shape)], shape)
}

/// Creates a tensor with the same shape as another, filled with zeros.
#[must_use]
pub fn zeros_like<T: Scalar>(other: &Tensor<T>) -> Tensor<T> {
    zeros(other.shape())
}

// =============================================================================
// Random Initialization
// =============================================================================

/// Creates a tensor with samples from the standard normal distribution.
#[must_use]
pub fn randn<T: Float>(shape: &[usize]) -> Tensor<T> {
    let data = with_rng(|rng| {
        (0..numel(shape))
            .map(|_| T::from_f64(rng.sample::<f64, _>(StandardNormal)))
            .collect()
    });
    build(data, shape)
}

/// Creates a tensor with samples uniform in `[low, high)`.
#[must_use]
pub fn uniform<T: Float>(shape: &[usize], low: T, high: T) -> Tensor<T> {
    let (lo, hi) = (low.to_f64_value(), high.to_f64_value());
    let data = with_rng(|rng| {
        (0..numel(shape))
            .map(|_| T::from_f64(lo + (hi - lo) * rng.gen::<f64>()))
            .collect()
    });
    build(data, shape)
}

// =============================================================================
// Tests
// =============================================================================
