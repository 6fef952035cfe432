//! Parameter - Learnable Parameter Wrapper
//!
//! A `Parameter` is a named, shared handle to a leaf [`Variable`]. Clones
//! share the value and the gradient, so the handle an optimizer collected
//! at bind time sees every later update.
//!
//! A parameter may be created uninitialized by a lazily shaped layer. It is
//! filled exactly once, in place, the first time the layer sees an input.
//!
//! @version 0.1.0

use std::sync::Arc;

use cnnkit_autograd::Variable;
use cnnkit_core::error::{Error, Result};
use cnnkit_core::Device;
use cnnkit_tensor::Tensor;
use parking_lot::Mutex;

// =============================================================================
// Parameter
// =============================================================================

/// A learnable parameter of a module.
#[derive(Clone)]
pub struct Parameter {
    var: Variable,
    name: String,
    initialized: Arc<Mutex<bool>>,
}

impl Parameter {
    /// Creates an initialized parameter that requires gradients.
    pub fn named(name: impl Into<String>, data: Tensor<f32>) -> Self {
        Self {
            var: Variable::new(data, true),
            name: name.into(),
            initialized: Arc::new(Mutex::new(true)),
        }
    }

    /// Creates an empty parameter to be shaped by [`Parameter::initialize_with`].
    pub fn uninitialized(name: impl Into<String>) -> Self {
        Self {
            var: Variable::new(Tensor::zeros(&[0]), true),
            name: name.into(),
            initialized: Arc::new(Mutex::new(false)),
        }
    }

    /// Returns the parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the parameter holds a value yet.
    pub fn is_initialized(&self) -> bool {
        *self.initialized.lock()
    }

    /// Fills an uninitialized parameter with the tensor produced by `init`.
    ///
    /// Returns `true` if this call performed the initialization. Concurrent
    /// callers serialize; `init` runs at most once per parameter.
    pub fn initialize_with<F>(&self, init: F) -> Result<bool>
    where
        F: FnOnce() -> Result<Tensor<f32>>,
    {
        let mut done = self.initialized.lock();
        if *done {
            return Ok(false);
        }
        self.var.set_data(init()?);
        *done = true;
        Ok(true)
    }

    /// Returns a handle to the underlying variable.
    pub fn variable(&self) -> &Variable {
        &self.var
    }

    /// Returns the current value.
    pub fn data(&self) -> Tensor<f32> {
        self.var.data()
    }

    /// Returns the shape of the parameter.
    pub fn shape(&self) -> Vec<usize> {
        self.var.shape()
    }

    /// Returns the number of elements; zero while uninitialized.
    pub fn numel(&self) -> usize {
        if self.is_initialized() {
            self.var.numel()
        } else {
            0
        }
    }

    /// Returns the accumulated gradient, if any.
    pub fn grad(&self) -> Option<Tensor<f32>> {
        self.var.grad()
    }

    /// Clears the gradient.
    pub fn zero_grad(&self) {
        self.var.zero_grad();
    }

    /// Replaces the value. The new tensor must have the current shape.
    ///
    /// Used by optimizers to write updated weights.
    pub fn update_data(&self, new_data: Tensor<f32>) -> Result<()> {
        let shape = self.shape();
        if new_data.shape() != shape.as_slice() {
            return Err(Error::shape_mismatch(
                format!("parameter {}", self.name),
                &shape,
                new_data.shape(),
            ));
        }
        self.var.set_data(new_data);
        Ok(())
    }

    /// Moves the value to `device`.
    pub fn to_device(&self, device: Device) -> Result<()> {
        self.var.to_device(device)
    }

    /// Returns true if both handles refer to the same parameter.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.initialized, &other.initialized)
    }
}

impl std::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("shape", &self.shape())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_creation() {
        let param = Parameter::named("weight", Tensor::from_vec(vec![1.0, 2.0, 3.0], &[3]).unwrap());
        assert_eq!(param.name(), "weight");
        assert_eq!(param.shape(), vec![3]);
        assert_eq!(param.numel(), 3);
        assert!(param.variable().requires_grad());
    }

    #[test]
    fn test_lazy_initialization_is_visible_to_earlier_handles() {
        let param = Parameter::uninitialized("W");
        let earlier = param.clone();
        assert_eq!(earlier.numel(), 0);

        assert!(param.initialize_with(|| Ok(Tensor::ones(&[2, 2]))).unwrap());
        assert!(!param
            .initialize_with(|| Err(Error::invalid_operation("runs once")))
            .unwrap());

        assert!(earlier.is_initialized());
        assert_eq!(earlier.shape(), vec![2, 2]);
        assert!(earlier.ptr_eq(&param));
    }

    #[test]
    fn test_failed_initializer_leaves_parameter_empty() {
        let param = Parameter::uninitialized("W");
        assert!(param
            .initialize_with(|| Err(Error::invalid_operation("nope")))
            .is_err());
        assert!(!param.is_initialized());
    }

    #[test]
    fn test_update_data_checks_shape() {
        let param = Parameter::named("b", Tensor::zeros(&[3]));
        param.update_data(Tensor::full(&[3], 4.0)).unwrap();
        assert_eq!(param.data().to_vec(), vec![4.0; 3]);
        assert!(matches!(
            param.update_data(Tensor::zeros(&[2])),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
