//! Activation Gradient Functions
//!
//! Gradient functions for `ReLU`, Tanh and dropout.
//!
//! @version 0.1.0

use std::any::Any;

use cnnkit_core::error::Result;
use cnnkit_tensor::Tensor;

use crate::grad_fn::{GradFn, GradientFunction};

// =============================================================================
// ReLU Backward
// =============================================================================

/// Gradient function for `ReLU`.
///
/// d/dx(relu(x)) = 1 if x > 0, else 0
#[derive(Debug)]
pub struct ReluBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_input: Tensor<f32>,
}

impl ReluBackward {
    /// Creates a new `ReluBackward`.
    #[must_use]
    pub fn new(input_grad_fn: Option<GradFn>, input: Tensor<f32>) -> Self {
        Self {
            next_fns: vec![input_grad_fn],
            saved_input: input,
        }
    }
}

impl GradientFunction for ReluBackward {
    fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>> {
        let grad = self
            .saved_input
            .zip_map(grad_output, |x, g| if x > 0.0 { g } else { 0.0 })?;
        Ok(vec![Some(grad)])
    }

    fn name(&self) -> &'static str {
        "ReluBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// Tanh Backward
// =============================================================================

/// Gradient function for Tanh.
///
/// d/dx(tanh(x)) = 1 - tanh(x)^2
#[derive(Debug)]
pub struct TanhBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_output: Tensor<f32>,
}

impl TanhBackward {
    /// Creates a new `TanhBackward`.
    #[must_use]
    pub fn new(input_grad_fn: Option<GradFn>, output: Tensor<f32>) -> Self {
        Self {
            next_fns: vec![input_grad_fn],
            saved_output: output,
        }
    }
}

impl GradientFunction for TanhBackward {
    fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>> {
        let grad = self
            .saved_output
            .zip_map(grad_output, |y, g| g * (1.0 - y * y))?;
        Ok(vec![Some(grad)])
    }

    fn name(&self) -> &'static str {
        "TanhBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// Dropout Backward
// =============================================================================

/// Gradient function for dropout.
///
/// The saved mask already carries the `1 / (1 - ratio)` scale, so the
/// gradient is `grad * mask`.
#[derive(Debug)]
pub struct DropoutBackward {
    next_fns: Vec<Option<GradFn>>,
    mask: Tensor<f32>,
}

impl DropoutBackward {
    /// Creates a new `DropoutBackward`.
    #[must_use]
    pub fn new(input_grad_fn: Option<GradFn>, mask: Tensor<f32>) -> Self {
        Self {
            next_fns: vec![input_grad_fn],
            mask,
        }
    }
}

impl GradientFunction for DropoutBackward {
    fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>> {
        Ok(vec![Some(grad_output.mul(&self.mask)?)])
    }

    fn name(&self) -> &'static str {
        "DropoutBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu_backward_masks_negative_inputs() {
        let input = Tensor::from_vec(vec![-1.0, 0.0, 2.0], &[3]).unwrap();
        let relu = ReluBackward::new(None, input);
        let grads = relu.apply(&Tensor::full(&[3], 3.0)).unwrap();
        assert_eq!(grads[0].as_ref().unwrap().to_vec(), vec![0.0, 0.0, 3.0]);
    }

    #[test]
    fn test_tanh_backward() {
        let out = Tensor::from_vec(vec![0.0, 0.5], &[2]).unwrap();
        let tanh = TanhBackward::new(None, out);
        let grads = tanh.apply(&Tensor::ones(&[2])).unwrap();
        assert_eq!(grads[0].as_ref().unwrap().to_vec(), vec![1.0, 0.75]);
    }
}
