//! Iterator - Epoch-Based Batching
//!
//! [`Iterator`] walks a dataset in minibatches, one epoch per call to
//! [`Iterator::iter`]. The number of batches per epoch is fixed up front by
//! [`Iterator::max_iter`] so a training loop can average per-step metrics.
//!
//! @version 0.1.0

use rand::seq::SliceRandom;
use rayon::prelude::*;

use cnnkit_core::error::Result;
use cnnkit_core::random::with_rng;
use cnnkit_core::Device;
use cnnkit_tensor::Tensor;

use crate::collate::{collate, Batch};
use crate::dataset::Dataset;

// =============================================================================
// BatchSource
// =============================================================================

/// Anything that yields one epoch of batches at a time.
///
/// `max_iter` is the number of batches an epoch is expected to yield.
pub trait BatchSource {
    /// Number of batches in one epoch.
    fn max_iter(&self) -> usize;

    /// Starts a new epoch.
    fn epoch(&self) -> Box<dyn std::iter::Iterator<Item = Result<Batch>> + '_>;
}

// =============================================================================
// Iterator
// =============================================================================

/// Minibatch iterator over a `(input, target)` dataset.
///
/// The final batch of an epoch may be smaller than `batch_size`. With
/// shuffling on, every epoch draws a fresh permutation from the seedable
/// generator in `cnnkit_core::random`.
///
/// # Example
/// ```rust
/// use cnnkit_data::{Iterator, TensorDataset};
/// use cnnkit_tensor::Tensor;
///
/// let ds = TensorDataset::new(Tensor::zeros(&[10, 3]), Tensor::zeros(&[10])).unwrap();
/// let iter = Iterator::new(ds, 4).shuffle(true);
/// assert_eq!(iter.max_iter(), 3);
/// assert_eq!(iter.iter().count(), 3);
/// ```
pub struct Iterator<D> {
    dataset: D,
    batch_size: usize,
    shuffle: bool,
    num_workers: usize,
    device: Device,
}

impl<D> Iterator<D>
where
    D: Dataset<Item = (Tensor<f32>, Tensor<f32>)>,
{
    /// Creates a sequential iterator. A batch size of zero is treated as one.
    pub fn new(dataset: D, batch_size: usize) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            shuffle: false,
            num_workers: 0,
            device: Device::Cpu,
        }
    }

    /// Enables or disables per-epoch shuffling.
    #[must_use]
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Loads the samples of each batch on the rayon pool when non-zero.
    #[must_use]
    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Places every yielded batch on `device`.
    pub fn to_device(&mut self, device: Device) -> Result<()> {
        self.device = device.ensure_available()?;
        Ok(())
    }

    /// Device that batches are placed on.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Returns true if every epoch draws a fresh permutation.
    pub fn is_shuffled(&self) -> bool {
        self.shuffle
    }

    /// Returns the batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Returns the dataset.
    pub fn dataset(&self) -> &D {
        &self.dataset
    }

    /// Number of batches per epoch, `ceil(len / batch_size)`.
    pub fn max_iter(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Starts one epoch.
    pub fn iter(&self) -> Epoch<'_, D> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            with_rng(|rng| order.shuffle(rng));
        }
        Epoch {
            source: self,
            order,
            position: 0,
        }
    }
}

impl<D> BatchSource for Iterator<D>
where
    D: Dataset<Item = (Tensor<f32>, Tensor<f32>)>,
{
    fn max_iter(&self) -> usize {
        Iterator::max_iter(self)
    }

    fn epoch(&self) -> Box<dyn std::iter::Iterator<Item = Result<Batch>> + '_> {
        Box::new(self.iter())
    }
}

// =============================================================================
// Epoch
// =============================================================================

/// One pass over the dataset.
pub struct Epoch<'a, D> {
    source: &'a Iterator<D>,
    order: Vec<usize>,
    position: usize,
}

impl<D> Epoch<'_, D>
where
    D: Dataset<Item = (Tensor<f32>, Tensor<f32>)>,
{
    /// Batches left in this epoch.
    pub fn remaining(&self) -> usize {
        (self.order.len() - self.position).div_ceil(self.source.batch_size)
    }

    fn load(&self, indices: &[usize]) -> Result<Batch> {
        let dataset = &self.source.dataset;
        let samples = if self.source.num_workers > 0 {
            indices
                .par_iter()
                .map(|&i| dataset.get(i))
                .collect::<Result<Vec<_>>>()?
        } else {
            indices
                .iter()
                .map(|&i| dataset.get(i))
                .collect::<Result<Vec<_>>>()?
        };
        collate(samples)?.to_device(self.source.device)
    }
}

impl<D> std::iter::Iterator for Epoch<'_, D>
where
    D: Dataset<Item = (Tensor<f32>, Tensor<f32>)>,
{
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.order.len() {
            return None;
        }
        let end = (self.position + self.source.batch_size).min(self.order.len());
        let batch = self.load(&self.order[self.position..end]);
        self.position = end;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl<D> ExactSizeIterator for Epoch<'_, D> where D: Dataset<Item = (Tensor<f32>, Tensor<f32>)> {}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::TensorDataset;

    fn dataset(n: usize) -> TensorDataset {
        let data = Tensor::from_vec((0..n).map(|v| v as f32).collect(), &[n, 1]).unwrap();
        let targets = Tensor::from_vec((0..n).map(|v| v as f32).collect(), &[n]).unwrap();
        TensorDataset::new(data, targets).unwrap()
    }

    fn epoch_targets(iter: &Iterator<TensorDataset>) -> Vec<f32> {
        iter.iter()
            .flat_map(|b| b.unwrap().target.to_vec())
            .collect()
    }

    #[test]
    fn test_max_iter_rounds_up() {
        assert_eq!(Iterator::new(dataset(10), 5).max_iter(), 2);
        assert_eq!(Iterator::new(dataset(10), 3).max_iter(), 4);
        assert_eq!(Iterator::new(dataset(0), 3).max_iter(), 0);
    }

    #[test]
    fn test_sequential_epoch() {
        let iter = Iterator::new(dataset(7), 3);
        let sizes: Vec<usize> = iter.iter().map(|b| b.unwrap().len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(epoch_targets(&iter), (0..7).map(|v| v as f32).collect::<Vec<_>>());
        assert_eq!(iter.iter().len(), 3);
    }

    #[test]
    fn test_shuffle_is_a_permutation_and_reshuffles() {
        cnnkit_core::random::seed(11);
        let iter = Iterator::new(dataset(32), 8).shuffle(true);
        let first = epoch_targets(&iter);
        let second = epoch_targets(&iter);

        let mut sorted = first.clone();
        sorted.sort_by(f32::total_cmp);
        assert_eq!(sorted, (0..32).map(|v| v as f32).collect::<Vec<_>>());
        assert_ne!(first, second);
    }

    #[test]
    fn test_workers_preserve_order() {
        let iter = Iterator::new(dataset(9), 4).num_workers(2);
        assert_eq!(epoch_targets(&iter), (0..9).map(|v| v as f32).collect::<Vec<_>>());
    }

    #[test]
    fn test_to_device() {
        let mut iter = Iterator::new(dataset(4), 2);
        iter.to_device(Device::Cpu).unwrap();
        assert!(iter.to_device(Device::Cuda(0)).is_err());
        assert_eq!(iter.device(), Device::Cpu);
    }

    #[test]
    fn test_batch_source_object() {
        let iter = Iterator::new(dataset(5), 2);
        let source: &dyn BatchSource = &iter;
        assert_eq!(source.max_iter(), 3);
        assert_eq!(source.epoch().count(), 3);
    }
}
