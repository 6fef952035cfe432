//! Loss Gradient Functions
//!
//! @version 0.1.0

use std::any::Any;

use cnnkit_core::error::Result;
use cnnkit_tensor::Tensor;

use crate::grad_fn::{GradFn, GradientFunction};

/// Gradient function for batch-mean softmax cross-entropy.
///
/// dL/dlogits = (softmax(logits) - onehot(targets)) / N
#[derive(Debug)]
pub struct SoftmaxCrossEntropyBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_probs: Tensor<f32>,
    targets: Vec<usize>,
}

impl SoftmaxCrossEntropyBackward {
    /// Creates a new `SoftmaxCrossEntropyBackward` from the row-wise
    /// softmax of the logits and the class index of every row.
    #[must_use]
    pub fn new(input_grad_fn: Option<GradFn>, probs: Tensor<f32>, targets: Vec<usize>) -> Self {
        Self {
            next_fns: vec![input_grad_fn],
            saved_probs: probs,
            targets,
        }
    }
}

impl GradientFunction for SoftmaxCrossEntropyBackward {
    fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>> {
        let scale = grad_output.item()? / self.targets.len().max(1) as f32;
        let classes = self.saved_probs.shape()[1];
        let mut grad = self.saved_probs.to_vec();
        for (row, &t) in self.targets.iter().enumerate() {
            grad[row * classes + t] -= 1.0;
        }
        grad.iter_mut().for_each(|g| *g *= scale);
        Ok(vec![Some(Tensor::from_vec(grad, self.saved_probs.shape())?)])
    }

    fn name(&self) -> &'static str {
        "SoftmaxCrossEntropyBackward"
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
    fn test_softmax_cross_entropy_backward() {
        let probs = Tensor::from_vec(vec![0.25, 0.75, 0.5, 0.5], &[2, 2]).unwrap();
        let func = SoftmaxCrossEntropyBackward::new(None, probs, vec![1, 0]);
        let grads = func.apply(&Tensor::scalar(1.0)).unwrap();
        assert_eq!(
            grads[0].as_ref().unwrap().to_vec(),
            vec![0.125, -0.125, -0.25, 0.25]
        );
    }
}
