//! Basic Gradient Functions
//!
//! Arithmetic, reductions and reshapes.
//!
//! @version 0.1.0

use std::any::Any;

use cnnkit_core::error::Result;
use cnnkit_tensor::Tensor;

use crate::grad_fn::{GradFn, GradientFunction};

// =============================================================================
// Add Backward
// =============================================================================

/// Gradient function for broadcasting addition.
#[derive(Debug)]
pub struct AddBackward {
    next_fns: Vec<Option<GradFn>>,
    lhs_shape: Vec<usize>,
    rhs_shape: Vec<usize>,
}

impl AddBackward {
    /// Creates a new `AddBackward`.
    #[must_use]
    pub fn new(next_fns: Vec<Option<GradFn>>, lhs_shape: Vec<usize>, rhs_shape: Vec<usize>) -> Self {
        Self {
            next_fns,
            lhs_shape,
            rhs_shape,
        }
    }
}

impl GradientFunction for AddBackward {
    fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>> {
        Ok(vec![
            Some(grad_output.sum_to_shape(&self.lhs_shape)?),
            Some(grad_output.sum_to_shape(&self.rhs_shape)?),
        ])
    }

    fn name(&self) -> &'static str {
        "AddBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// Mul Backward
// =============================================================================

/// Gradient function for broadcasting elementwise multiplication.
///
/// d(a*b)/da = b, d(a*b)/db = a
#[derive(Debug)]
pub struct MulBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_lhs: Tensor<f32>,
    saved_rhs: Tensor<f32>,
}

impl MulBackward {
    /// Creates a new `MulBackward`.
    #[must_use]
    pub fn new(next_fns: Vec<Option<GradFn>>, lhs: Tensor<f32>, rhs: Tensor<f32>) -> Self {
        Self {
            next_fns,
            saved_lhs: lhs,
            saved_rhs: rhs,
        }
    }
}

impl GradientFunction for MulBackward {
    fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>> {
        let grad_lhs = grad_output
            .mul(&self.saved_rhs)?
            .sum_to_shape(self.saved_lhs.shape())?;
        let grad_rhs = grad_output
            .mul(&self.saved_lhs)?
            .sum_to_shape(self.saved_rhs.shape())?;
        Ok(vec![Some(grad_lhs), Some(grad_rhs)])
    }

    fn name(&self) -> &'static str {
        "MulBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// Mul Scalar Backward
// =============================================================================

/// Gradient function for multiplication by a constant.
#[derive(Debug)]
pub struct MulScalarBackward {
    next_fns: Vec<Option<GradFn>>,
    scalar: f32,
}

impl MulScalarBackward {
    /// Creates a new `MulScalarBackward`.
    #[must_use]
    pub fn new(input_grad_fn: Option<GradFn>, scalar: f32) -> Self {
        Self {
            next_fns: vec![input_grad_fn],
            scalar,
        }
    }
}

impl GradientFunction for MulScalarBackward {
    fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>> {
        Ok(vec![Some(grad_output.mul_scalar(self.scalar))])
    }

    fn name(&self) -> &'static str {
        "MulScalarBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// Sum Backward
// =============================================================================

/// Gradient function for summing every element into a scalar.
#[derive(Debug)]
pub struct SumBackward {
    next_fns: Vec<Option<GradFn>>,
    input_shape: Vec<usize>,
}

impl SumBackward {
    /// Creates a new `SumBackward`.
    #[must_use]
    pub fn new(input_grad_fn: Option<GradFn>, input_shape: Vec<usize>) -> Self {
        Self {
            next_fns: vec![input_grad_fn],
            input_shape,
        }
    }
}

impl GradientFunction for SumBackward {
    fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>> {
        let g = grad_output.item()?;
        Ok(vec![Some(Tensor::full(&self.input_shape, g))])
    }

    fn name(&self) -> &'static str {
        "SumBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// Mean Backward
// =============================================================================

/// Gradient function for the mean of every element.
#[derive(Debug)]
pub struct MeanBackward {
    next_fns: Vec<Option<GradFn>>,
    input_shape: Vec<usize>,
}

impl MeanBackward {
    /// Creates a new `MeanBackward`.
    #[must_use]
    pub fn new(input_grad_fn: Option<GradFn>, input_shape: Vec<usize>) -> Self {
        Self {
            next_fns: vec![input_grad_fn],
            input_shape,
        }
    }
}

impl GradientFunction for MeanBackward {
    fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>> {
        let numel: usize = self.input_shape.iter().product();
        let g = grad_output.item()? / numel.max(1) as f32;
        Ok(vec![Some(Tensor::full(&self.input_shape, g))])
    }

    fn name(&self) -> &'static str {
        "MeanBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// Reshape Backward
// =============================================================================

/// Gradient function for reshape and flatten.
#[derive(Debug)]
pub struct ReshapeBackward {
    next_fns: Vec<Option<GradFn>>,
    input_shape: Vec<usize>,
}

impl ReshapeBackward {
    /// Creates a new `ReshapeBackward`.
    #[must_use]
    pub fn new(input_grad_fn: Option<GradFn>, input_shape: Vec<usize>) -> Self {
        Self {
            next_fns: vec![input_grad_fn],
            input_shape,
        }
    }
}

impl GradientFunction for ReshapeBackward {
    fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>> {
        let shape: Vec<isize> = self.input_shape.iter().map(|&d| d as isize).collect();
        Ok(vec![Some(grad_output.reshape(&shape)?)])
    }

    fn name(&self) -> &'static str {
        "ReshapeBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_backward_reduces_broadcast() {
        let add = AddBackward::new(vec![None, None], vec![2, 3], vec![3]);
        let grads = add.apply(&Tensor::ones(&[2, 3])).unwrap();
        assert_eq!(grads[0].as_ref().unwrap().shape(), &[2, 3]);
        assert_eq!(grads[1].as_ref().unwrap().to_vec(), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_mean_backward() {
        let mean = MeanBackward::new(None, vec![4]);
        let grads = mean.apply(&Tensor::scalar(2.0)).unwrap();
        assert_eq!(grads[0].as_ref().unwrap().to_vec(), vec![0.5; 4]);
    }
}
