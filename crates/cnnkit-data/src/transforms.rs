//! Transforms - Sample Preprocessing
//!
//! Transforms map one input sample to another. They are chained with
//! [`Compose`] and attached to a dataset with
//! [`TransformedDataset`](crate::TransformedDataset).
//!
//! @version 0.1.0

use cnnkit_core::error::{Error, Result};
use cnnkit_tensor::Tensor;

// =============================================================================
// Transform Trait
// =============================================================================

/// Trait for sample transformations.
pub trait Transform: Send + Sync {
    /// Applies the transform to one sample.
    fn apply(&self, input: &Tensor<f32>) -> Result<Tensor<f32>>;
}

impl<T: Transform + ?Sized> Transform for Box<T> {
    fn apply(&self, input: &Tensor<f32>) -> Result<Tensor<f32>> {
        (**self).apply(input)
    }
}

// =============================================================================
// Compose
// =============================================================================

/// Applies transforms in order.
#[derive(Default)]
pub struct Compose {
    transforms: Vec<Box<dyn Transform>>,
}

impl Compose {
    /// Creates a composition from boxed transforms.
    pub fn new(transforms: Vec<Box<dyn Transform>>) -> Self {
        Self { transforms }
    }

    /// Appends a transform.
    #[must_use]
    pub fn add<T: Transform + 'static>(mut self, transform: T) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// Number of transforms in the chain.
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Returns true if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl Transform for Compose {
    fn apply(&self, input: &Tensor<f32>) -> Result<Tensor<f32>> {
        let mut result = input.clone();
        for transform in &self.transforms {
            result = transform.apply(&result)?;
        }
        Ok(result)
    }
}

// =============================================================================
// ToFloat
// =============================================================================

/// Rescales 8-bit pixel intensities in `[0, 255]` to `[0, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToFloat;

impl ToFloat {
    /// Creates a new `ToFloat` transform.
    pub fn new() -> Self {
        Self
    }
}

impl Transform for ToFloat {
    fn apply(&self, input: &Tensor<f32>) -> Result<Tensor<f32>> {
        Ok(input.mul_scalar(1.0 / 255.0))
    }
}

// =============================================================================
// Normalize
// =============================================================================

/// Z-score normalisation, `(x - mean) / std`.
#[derive(Debug, Clone, Copy)]
pub struct Normalize {
    mean: f32,
    std: f32,
}

impl Normalize {
    /// Creates a new Normalize transform.
    pub fn new(mean: f32, std: f32) -> Self {
        Self { mean, std }
    }

    /// Maps `[0, 1]` to `[-1, 1]` (mean 0.5, std 0.5).
    pub fn zero_centered() -> Self {
        Self::new(0.5, 0.5)
    }
}

impl Transform for Normalize {
    fn apply(&self, input: &Tensor<f32>) -> Result<Tensor<f32>> {
        if self.std == 0.0 {
            return Err(Error::invalid_operation("Normalize with zero std"));
        }
        let (mean, std) = (self.mean, self.std);
        Ok(input.map(|x| (x - mean) / std))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_to_float() {
        let x = Tensor::from_vec(vec![0.0, 51.0, 255.0], &[3]).unwrap();
        let y = ToFloat.apply(&x).unwrap().to_vec();
        assert_relative_eq!(y[1], 0.2, epsilon = 1e-6);
        assert_relative_eq!(y[2], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_normalize_zero_std() {
        let x = Tensor::<f32>::ones(&[2]);
        assert!(Normalize::new(0.0, 0.0).apply(&x).is_err());
    }

    #[test]
    fn test_compose_order() {
        let pipeline = Compose::default()
            .add(ToFloat::new())
            .add(Normalize::zero_centered());
        assert_eq!(pipeline.len(), 2);

        let x = Tensor::from_vec(vec![0.0, 255.0], &[2]).unwrap();
        let y = pipeline.apply(&x).unwrap().to_vec();
        assert_relative_eq!(y[0], -1.0, epsilon = 1e-6);
        assert_relative_eq!(y[1], 1.0, epsilon = 1e-6);
    }
}
