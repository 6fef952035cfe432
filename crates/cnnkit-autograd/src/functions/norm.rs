//! Normalization Gradient Functions
//!
//! @version 0.1.0

use std::any::Any;

use cnnkit_core::error::Result;
use cnnkit_tensor::ops;
use cnnkit_tensor::Tensor;

use crate::grad_fn::{GradFn, GradientFunction};

/// Gradient function for 2D batch normalization. `next_fns` is
/// `[input, gamma, beta]`.
///
/// With `batch_stats` the mean and variance depend on the input and the full
/// batch-norm adjoint is used; otherwise they are constants and the input
/// gradient is `grad * gamma / sqrt(var + eps)`.
#[derive(Debug)]
pub struct BatchNorm2dBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_xhat: Tensor<f32>,
    saved_gamma: Tensor<f32>,
    saved_var: Tensor<f32>,
    eps: f64,
    batch_stats: bool,
}

impl BatchNorm2dBackward {
    /// Creates a new `BatchNorm2dBackward`.
    #[must_use]
    pub fn new(
        next_fns: Vec<Option<GradFn>>,
        xhat: Tensor<f32>,
        gamma: Tensor<f32>,
        var: Tensor<f32>,
        eps: f64,
        batch_stats: bool,
    ) -> Self {
        Self {
            next_fns,
            saved_xhat: xhat,
            saved_gamma: gamma,
            saved_var: var,
            eps,
            batch_stats,
        }
    }

    fn input_grad_fixed_stats(&self, grad_output: &Tensor<f32>) -> Result<Tensor<f32>> {
        let c = self.saved_gamma.numel();
        let factor: Vec<f32> = self
            .saved_gamma
            .to_vec()
            .iter()
            .zip(self.saved_var.to_vec())
            .map(|(&g, v)| g / (v + self.eps as f32).sqrt())
            .collect();
        let factor = Tensor::from_vec(factor, &[1, c, 1, 1])?;
        grad_output.mul(&factor)
    }
}

impl GradientFunction for BatchNorm2dBackward {
    fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>> {
        let (full_gx, grad_gamma, grad_beta) = ops::batch_norm2d_backward(
            grad_output,
            &self.saved_xhat,
            &self.saved_gamma,
            &self.saved_var,
            self.eps,
        )?;
        let grad_input = if self.batch_stats {
            full_gx
        } else {
            self.input_grad_fixed_stats(grad_output)?
        };
        Ok(vec![Some(grad_input), Some(grad_gamma), Some(grad_beta)])
    }

    fn name(&self) -> &'static str {
        "BatchNorm2dBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
