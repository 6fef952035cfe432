//! Dataset Trait - Core Data Abstraction
//!
//! @version 0.1.0

use cnnkit_core::error::{Error, Result};
use cnnkit_tensor::Tensor;

use crate::transforms::Transform;

// =============================================================================
// Dataset Trait
// =============================================================================

/// Core trait for all datasets.
///
/// A dataset provides indexed access to `(input, target)` samples. Targets
/// of classification datasets are scalar class indices stored as `f32`.
pub trait Dataset: Send + Sync {
    /// The type of items in the dataset.
    type Item: Send;

    /// Returns the number of items in the dataset.
    fn len(&self) -> usize;

    /// Returns true if the dataset is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gets an item by index. Fails with `Error::IndexOutOfBounds` past the
    /// end, or with whatever error producing the item raised.
    fn get(&self, index: usize) -> Result<Self::Item>;
}

// =============================================================================
// TensorDataset
// =============================================================================

/// A dataset backed by two tensors whose first dimension indexes samples.
#[derive(Debug, Clone)]
pub struct TensorDataset {
    data: Tensor<f32>,
    targets: Tensor<f32>,
    len: usize,
}

impl TensorDataset {
    /// Creates a dataset from `data` `[N, ...]` and `targets` `[N, ...]`.
    pub fn new(data: Tensor<f32>, targets: Tensor<f32>) -> Result<Self> {
        let len = data.shape().first().copied().unwrap_or(0);
        let target_len = targets.shape().first().copied().unwrap_or(0);
        if data.ndim() == 0 || targets.ndim() == 0 || len != target_len {
            return Err(Error::invalid_operation(format!(
                "data {:?} and targets {:?} must share a leading sample dimension",
                data.shape(),
                targets.shape()
            )));
        }
        Ok(Self { data, targets, len })
    }

    /// Returns the per-sample input shape.
    pub fn sample_shape(&self) -> &[usize] {
        &self.data.shape()[1..]
    }
}

fn row(tensor: &Tensor<f32>, index: usize) -> Result<Tensor<f32>> {
    let item_shape = &tensor.shape()[1..];
    let row_size: usize = item_shape.iter().product();
    let start = index * row_size;
    let values = tensor.data()[start..start + row_size].to_vec();
    Tensor::from_vec(values, item_shape)
}

impl Dataset for TensorDataset {
    type Item = (Tensor<f32>, Tensor<f32>);

    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, index: usize) -> Result<Self::Item> {
        if index >= self.len {
            return Err(Error::IndexOutOfBounds {
                index,
                size: self.len,
            });
        }
        Ok((row(&self.data, index)?, row(&self.targets, index)?))
    }
}

// =============================================================================
// TransformedDataset
// =============================================================================

/// Applies an input transform to every sample of another dataset. Targets
/// pass through unchanged.
pub struct TransformedDataset<D, T> {
    dataset: D,
    transform: T,
}

impl<D, T> TransformedDataset<D, T>
where
    D: Dataset<Item = (Tensor<f32>, Tensor<f32>)>,
    T: Transform,
{
    /// Wraps `dataset` so each input goes through `transform`.
    pub fn new(dataset: D, transform: T) -> Self {
        Self { dataset, transform }
    }

    /// Returns the wrapped dataset.
    pub fn inner(&self) -> &D {
        &self.dataset
    }
}

impl<D, T> Dataset for TransformedDataset<D, T>
where
    D: Dataset<Item = (Tensor<f32>, Tensor<f32>)>,
    T: Transform,
{
    type Item = (Tensor<f32>, Tensor<f32>);

    fn len(&self) -> usize {
        self.dataset.len()
    }

    fn get(&self, index: usize) -> Result<Self::Item> {
        let (x, y) = self.dataset.get(index)?;
        Ok((self.transform.apply(&x)?, y))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::Normalize;

    fn dataset() -> TensorDataset {
        let data = Tensor::from_vec((0..12).map(|v| v as f32).collect(), &[3, 1, 2, 2]).unwrap();
        let targets = Tensor::from_vec(vec![0.0, 1.0, 2.0], &[3]).unwrap();
        TensorDataset::new(data, targets).unwrap()
    }

    #[test]
    fn test_tensor_dataset_get() {
        let ds = dataset();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.sample_shape(), &[1, 2, 2]);

        let (x, y) = ds.get(1).unwrap();
        assert_eq!(x.shape(), &[1, 2, 2]);
        assert_eq!(x.to_vec(), vec![4.0, 5.0, 6.0, 7.0]);
        assert!(y.shape().is_empty());
        assert_eq!(y.item().unwrap(), 1.0);
    }

    #[test]
    fn test_tensor_dataset_out_of_bounds() {
        assert_eq!(
            dataset().get(3).unwrap_err(),
            Error::IndexOutOfBounds { index: 3, size: 3 }
        );
    }

    #[test]
    fn test_tensor_dataset_rejects_length_mismatch() {
        let data = Tensor::<f32>::zeros(&[3, 4]);
        let targets = Tensor::<f32>::zeros(&[2]);
        assert!(TensorDataset::new(data, targets).is_err());
    }

    #[test]
    fn test_transformed_dataset() {
        let ds = TransformedDataset::new(dataset(), Normalize::new(4.0, 2.0));
        let (x, y) = ds.get(1).unwrap();
        assert_eq!(x.to_vec(), vec![0.0, 0.5, 1.0, 1.5]);
        assert_eq!(y.item().unwrap(), 1.0);
        assert_eq!(ds.len(), 3);
    }
}
