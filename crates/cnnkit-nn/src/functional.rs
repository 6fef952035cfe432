//! Functional API - Stateless Operations
//!
//! Free-function forms of the parameterless operations used inside model
//! forward passes.
//!
//! @version 0.1.0

use cnnkit_autograd::Variable;
use cnnkit_core::error::Result;
use cnnkit_tensor::ops::LrnParams;

/// Rectified linear unit.
pub fn relu(x: &Variable) -> Variable {
    x.relu()
}

/// Hyperbolic tangent.
pub fn tanh(x: &Variable) -> Variable {
    x.tanh()
}

/// Max pooling with a square `kernel`, no padding, complete windows only.
pub fn max_pool2d(x: &Variable, kernel: usize, stride: usize) -> Result<Variable> {
    x.max_pool2d((kernel, kernel), (stride, stride))
}

/// Average pooling with a square `kernel`, no padding, complete windows only.
pub fn avg_pool2d(x: &Variable, kernel: usize, stride: usize) -> Result<Variable> {
    x.avg_pool2d((kernel, kernel), (stride, stride))
}

/// Local response normalization with n=5, k=2, alpha=1e-4, beta=0.75.
pub fn local_response_norm(x: &Variable) -> Result<Variable> {
    x.local_response_norm(LrnParams::default())
}

/// Local response normalization with explicit hyperparameters.
pub fn local_response_norm_with(x: &Variable, params: LrnParams) -> Result<Variable> {
    x.local_response_norm(params)
}

/// Inverted dropout; the identity in `Evaluating` mode.
pub fn dropout(x: &Variable, ratio: f32) -> Result<Variable> {
    x.dropout(ratio)
}

/// Collapses every dimension after the batch: `[N, ...] -> [N, D]`.
pub fn flatten(x: &Variable) -> Result<Variable> {
    x.flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cnnkit_tensor::Tensor;

    fn plane(data: Vec<f32>, shape: &[usize]) -> Variable {
        Variable::from_tensor(Tensor::from_vec(data, shape).unwrap())
    }

    #[test]
    fn test_max_pool_drops_incomplete_windows() {
        let x = plane((0..25).map(|v| v as f32).collect(), &[1, 1, 5, 5]);
        let y = max_pool2d(&x, 2, 2).unwrap();
        assert_eq!(y.shape(), vec![1, 1, 2, 2]);
        assert_eq!(y.data().to_vec(), vec![6.0, 8.0, 16.0, 18.0]);
    }

    #[test]
    fn test_overlapping_max_pool_shape() {
        let x = plane(vec![0.0; 55 * 55], &[1, 1, 55, 55]);
        assert_eq!(max_pool2d(&x, 3, 2).unwrap().shape(), vec![1, 1, 27, 27]);
    }

    #[test]
    fn test_avg_pool() {
        let x = plane(vec![1.0, 2.0, 3.0, 4.0], &[1, 1, 2, 2]);
        assert_eq!(avg_pool2d(&x, 2, 2).unwrap().data().to_vec(), vec![2.5]);
    }

    #[test]
    fn test_flatten_keeps_batch() {
        let x = plane(vec![0.0; 2 * 3 * 4 * 4], &[2, 3, 4, 4]);
        assert_eq!(flatten(&x).unwrap().shape(), vec![2, 48]);
    }

    #[test]
    fn test_activations() {
        let x = plane(vec![-1.0, 0.0, 1.0], &[3]);
        assert_eq!(relu(&x).data().to_vec(), vec![0.0, 0.0, 1.0]);
        assert_eq!(tanh(&x).data().to_vec()[1], 0.0);
    }

    #[test]
    fn test_lrn_preserves_shape() {
        let x = plane(vec![1.0; 2 * 7 * 3 * 3], &[2, 7, 3, 3]);
        assert_eq!(local_response_norm(&x).unwrap().shape(), vec![2, 7, 3, 3]);
    }
}
