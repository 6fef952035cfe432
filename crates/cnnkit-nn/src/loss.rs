//! Loss and Metric - Classification Objective
//!
//! @version 0.1.0

use cnnkit_autograd::Variable;
use cnnkit_core::error::{Error, Result};
use cnnkit_tensor::Tensor;

/// Mean softmax cross-entropy of `[N, C]` logits against `N` class indices
/// (stored as `f32`). Computed through log-sum-exp.
pub fn softmax_cross_entropy(pred: &Variable, target: &Tensor<f32>) -> Result<Variable> {
    pred.softmax_cross_entropy(target)
}

/// Fraction of rows whose argmax equals the target class.
pub fn accuracy(pred: &Variable, target: &Tensor<f32>) -> Result<f32> {
    let predicted = pred.data().argmax_rows()?;
    if predicted.len() != target.numel() {
        return Err(Error::shape_mismatch(
            "accuracy targets",
            &[predicted.len()],
            target.shape(),
        ));
    }
    if predicted.is_empty() {
        return Err(Error::EmptyTensor);
    }
    let hits = predicted
        .iter()
        .zip(target.to_vec())
        .filter(|(&p, t)| p as f32 == *t)
        .count();
    Ok(hits as f32 / predicted.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn logits() -> Variable {
        Variable::from_tensor(
            Tensor::from_vec(vec![0.1, 0.9, 0.0, 2.0, 1.0, 0.0, 0.0, 0.0, 5.0, 1.0, 3.0, 2.0], &[4, 3])
                .unwrap(),
        )
    }

    #[test]
    fn test_accuracy() {
        let target = Tensor::from_vec(vec![1.0, 0.0, 0.0, 0.0], &[4]).unwrap();
        assert_relative_eq!(accuracy(&logits(), &target).unwrap(), 0.5);
    }

    #[test]
    fn test_accuracy_batch_mismatch() {
        let target = Tensor::from_vec(vec![1.0, 0.0], &[2]).unwrap();
        assert!(accuracy(&logits(), &target).is_err());
    }

    #[test]
    fn test_cross_entropy_is_stable_for_large_logits() {
        let pred = Variable::from_tensor(Tensor::from_vec(vec![1000.0, 0.0], &[1, 2]).unwrap());
        let target = Tensor::from_vec(vec![0.0], &[1]).unwrap();
        let loss = softmax_cross_entropy(&pred, &target).unwrap();
        assert_relative_eq!(loss.data().item().unwrap(), 0.0);
        let target = Tensor::from_vec(vec![1.0], &[1]).unwrap();
        let loss = softmax_cross_entropy(&pred, &target).unwrap();
        assert_relative_eq!(loss.data().item().unwrap(), 1000.0);
    }
}
