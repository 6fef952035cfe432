//! Convolution Gradient Functions
//!
//! Backward passes of the spatial operations: convolution, max and average
//! pooling, and local response normalization.
//!
//! @version 0.1.0

use std::any::Any;

use cnnkit_core::error::Result;
use cnnkit_tensor::ops::{self, Conv2dGeometry, LrnParams};
use cnnkit_tensor::Tensor;

use crate::grad_fn::{GradFn, GradientFunction};

// =============================================================================
// Conv2d Backward
// =============================================================================

/// Gradient function for 2D convolution. `next_fns` is `[input, weight, bias]`.
#[derive(Debug)]
pub struct Conv2dBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_input: Tensor<f32>,
    saved_weight: Tensor<f32>,
    geometry: Conv2dGeometry,
}

impl Conv2dBackward {
    /// Creates a new `Conv2dBackward`.
    #[must_use]
    pub fn new(
        next_fns: Vec<Option<GradFn>>,
        input: Tensor<f32>,
        weight: Tensor<f32>,
        geometry: Conv2dGeometry,
    ) -> Self {
        Self {
            next_fns,
            saved_input: input,
            saved_weight: weight,
            geometry,
        }
    }
}

impl GradientFunction for Conv2dBackward {
    fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>> {
        let wants = |i: usize| self.next_fns.get(i).is_some_and(Option::is_some);

        let grad_input = if wants(0) {
            Some(ops::conv2d_grad_input(
                grad_output,
                &self.saved_weight,
                self.saved_input.shape(),
                self.geometry,
            )?)
        } else {
            None
        };
        let grad_weight = if wants(1) {
            Some(ops::conv2d_grad_weight(
                grad_output,
                &self.saved_input,
                self.saved_weight.shape(),
                self.geometry,
            )?)
        } else {
            None
        };
        let grad_bias = if wants(2) {
            Some(ops::conv2d_grad_bias(grad_output)?)
        } else {
            None
        };
        Ok(vec![grad_input, grad_weight, grad_bias])
    }

    fn name(&self) -> &'static str {
        "Conv2dBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// Pooling Backward
// =============================================================================

/// Gradient function for max pooling; routes gradient to each window's winner.
#[derive(Debug)]
pub struct MaxPool2dBackward {
    next_fns: Vec<Option<GradFn>>,
    argmax: Vec<usize>,
    input_shape: Vec<usize>,
}

impl MaxPool2dBackward {
    /// Creates a new `MaxPool2dBackward`.
    #[must_use]
    pub fn new(input_grad_fn: Option<GradFn>, argmax: Vec<usize>, input_shape: Vec<usize>) -> Self {
        Self {
            next_fns: vec![input_grad_fn],
            argmax,
            input_shape,
        }
    }
}

impl GradientFunction for MaxPool2dBackward {
    fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>> {
        let grad = ops::max_pool2d_backward(grad_output, &self.argmax, &self.input_shape)?;
        Ok(vec![Some(grad)])
    }

    fn name(&self) -> &'static str {
        "MaxPool2dBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Gradient function for average pooling.
#[derive(Debug)]
pub struct AvgPool2dBackward {
    next_fns: Vec<Option<GradFn>>,
    input_shape: Vec<usize>,
    kernel: (usize, usize),
    stride: (usize, usize),
}

impl AvgPool2dBackward {
    /// Creates a new `AvgPool2dBackward`.
    #[must_use]
    pub fn new(
        input_grad_fn: Option<GradFn>,
        input_shape: Vec<usize>,
        kernel: (usize, usize),
        stride: (usize, usize),
    ) -> Self {
        Self {
            next_fns: vec![input_grad_fn],
            input_shape,
            kernel,
            stride,
        }
    }
}

impl GradientFunction for AvgPool2dBackward {
    fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>> {
        let grad =
            ops::avg_pool2d_backward(grad_output, &self.input_shape, self.kernel, self.stride)?;
        Ok(vec![Some(grad)])
    }

    fn name(&self) -> &'static str {
        "AvgPool2dBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// LRN Backward
// =============================================================================

/// Gradient function for local response normalization.
#[derive(Debug)]
pub struct LrnBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_input: Tensor<f32>,
    saved_scale: Tensor<f32>,
    params: LrnParams,
}

impl LrnBackward {
    /// Creates a new `LrnBackward`.
    #[must_use]
    pub fn new(
        input_grad_fn: Option<GradFn>,
        input: Tensor<f32>,
        scale: Tensor<f32>,
        params: LrnParams,
    ) -> Self {
        Self {
            next_fns: vec![input_grad_fn],
            saved_input: input,
            saved_scale: scale,
            params,
        }
    }
}

impl GradientFunction for LrnBackward {
    fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>> {
        let grad = ops::local_response_norm_backward(
            grad_output,
            &self.saved_input,
            &self.saved_scale,
            self.params,
        )?;
        Ok(vec![Some(grad)])
    }

    fn name(&self) -> &'static str {
        "LrnBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
