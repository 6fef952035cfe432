//! Collate - Batch Assembly
//!
//! @version 0.1.0

use cnnkit_core::error::{Error, Result};
use cnnkit_core::Device;
use cnnkit_tensor::Tensor;

// =============================================================================
// Batch
// =============================================================================

/// One minibatch: inputs `[N, ...]` and class-index targets `[N]`.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Batched inputs.
    pub input: Tensor<f32>,
    /// Batched targets.
    pub target: Tensor<f32>,
}

impl Batch {
    /// Creates a batch, checking that the leading dimensions agree.
    pub fn new(input: Tensor<f32>, target: Tensor<f32>) -> Result<Self> {
        if input.shape().first() != target.shape().first() {
            return Err(Error::invalid_operation(format!(
                "batch input {:?} and target {:?} disagree on the batch dimension",
                input.shape(),
                target.shape()
            )));
        }
        Ok(Self { input, target })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.input.shape().first().copied().unwrap_or(0)
    }

    /// Returns true if the batch holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns this batch with both tensors on `device`.
    pub fn to_device(self, device: Device) -> Result<Self> {
        Ok(Self {
            input: self.input.to_device(device)?,
            target: self.target.to_device(device)?,
        })
    }
}

// =============================================================================
// Stacking
// =============================================================================

/// Stacks same-shaped tensors along a new leading dimension.
pub fn stack(tensors: &[Tensor<f32>]) -> Result<Tensor<f32>> {
    let Some(first) = tensors.first() else {
        return Err(Error::EmptyTensor);
    };
    let item_shape = first.shape();
    let mut values = Vec::with_capacity(first.numel() * tensors.len());
    for tensor in tensors {
        if tensor.shape() != item_shape {
            return Err(Error::shape_mismatch("stack", item_shape, tensor.shape()));
        }
        values.extend_from_slice(&tensor.data());
    }
    let mut shape = Vec::with_capacity(item_shape.len() + 1);
    shape.push(tensors.len());
    shape.extend_from_slice(item_shape);
    Tensor::from_vec(values, &shape)
}

/// Collates `(input, target)` samples into a [`Batch`].
pub fn collate(samples: Vec<(Tensor<f32>, Tensor<f32>)>) -> Result<Batch> {
    let (inputs, targets): (Vec<_>, Vec<_>) = samples.into_iter().unzip();
    let target = stack(&targets)?;
    // Scalar targets stack to [N]; [N, 1] targets are flattened to match.
    let target = if target.ndim() == 2 && target.shape()[1] == 1 {
        target.reshape(&[-1])?
    } else {
        target
    };
    Batch::new(stack(&inputs)?, target)
}

// =============================================================================
// Tests
// =============================================================================
