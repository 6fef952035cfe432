//! Linear Algebra Gradient Functions
//!
//! Matrix multiplication, transpose and the fused affine map used by fully
//! connected layers.
//!
//! @version 0.1.0

use std::any::Any;

use cnnkit_core::error::Result;
use cnnkit_tensor::Tensor;

use crate::grad_fn::{GradFn, GradientFunction};

// =============================================================================
// MatMul Backward
// =============================================================================

/// Gradient function for `a @ b` with 2D operands.
///
/// dL/da = g @ b^T, dL/db = a^T @ g
#[derive(Debug)]
pub struct MatMulBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_lhs: Tensor<f32>,
    saved_rhs: Tensor<f32>,
}

impl MatMulBackward {
    /// Creates a new `MatMulBackward`.
    #[must_use]
    pub fn new(next_fns: Vec<Option<GradFn>>, lhs: Tensor<f32>, rhs: Tensor<f32>) -> Self {
        Self {
            next_fns,
            saved_lhs: lhs,
            saved_rhs: rhs,
        }
    }
}

impl GradientFunction for MatMulBackward {
    fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>> {
        let grad_lhs = grad_output.matmul(&self.saved_rhs.t()?)?;
        let grad_rhs = self.saved_lhs.t()?.matmul(grad_output)?;
        Ok(vec![Some(grad_lhs), Some(grad_rhs)])
    }

    fn name(&self) -> &'static str {
        "MatMulBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// Transpose Backward
// =============================================================================

/// Gradient function for the 2D transpose.
#[derive(Debug)]
pub struct TransposeBackward {
    next_fns: Vec<Option<GradFn>>,
}

impl TransposeBackward {
    /// Creates a new `TransposeBackward`.
    #[must_use]
    pub fn new(input_grad_fn: Option<GradFn>) -> Self {
        Self {
            next_fns: vec![input_grad_fn],
        }
    }
}

impl GradientFunction for TransposeBackward {
    fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>> {
        Ok(vec![Some(grad_output.t()?)])
    }

    fn name(&self) -> &'static str {
        "TransposeBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// Linear Backward
// =============================================================================

/// Gradient function for `y = x @ W^T + b` with `x: [N, in]`, `W: [out, in]`
/// and `b: [out]`.
///
/// The input gradient is skipped when the input does not take one, which is
/// the common case for the first layer of a network.
#[derive(Debug)]
pub struct LinearBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_input: Tensor<f32>,
    saved_weight: Tensor<f32>,
}

impl LinearBackward {
    /// Creates a new `LinearBackward`. `next_fns` is `[input, weight, bias]`.
    #[must_use]
    pub fn new(next_fns: Vec<Option<GradFn>>, input: Tensor<f32>, weight: Tensor<f32>) -> Self {
        Self {
            next_fns,
            saved_input: input,
            saved_weight: weight,
        }
    }
}

impl GradientFunction for LinearBackward {
    fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>> {
        let wants = |i: usize| self.next_fns.get(i).is_some_and(Option::is_some);

        let grad_input = if wants(0) {
            Some(grad_output.matmul(&self.saved_weight)?)
        } else {
            None
        };
        let grad_weight = if wants(1) {
            Some(grad_output.t()?.matmul(&self.saved_input)?)
        } else {
            None
        };
        let grad_bias = if wants(2) {
            let out_features = self.saved_weight.shape()[0];
            Some(grad_output.sum_to_shape(&[out_features])?)
        } else {
            None
        };
        Ok(vec![grad_input, grad_weight, grad_bias])
    }

    fn name(&self) -> &'static str {
        "LinearBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
