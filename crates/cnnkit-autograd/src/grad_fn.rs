//! Gradient Function Traits - Differentiable Operation Interface
//!
//! Every recorded operation stores a `GradFn` describing how to push the
//! gradient of its output back to its inputs. Leaf variables that require
//! gradients are represented by `AccumulateGrad`, which writes into the
//! gradient slot shared with the variable.
//!
//! @version 0.1.0

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use cnnkit_core::error::Result;
use cnnkit_tensor::Tensor;
use parking_lot::RwLock;

// =============================================================================
// Gradient Function Trait
// =============================================================================

/// Trait for gradient computation functions.
pub trait GradientFunction: Debug + Send + Sync {
    /// Computes gradients with respect to inputs.
    ///
    /// The returned vector is aligned with [`GradientFunction::next_functions`];
    /// `None` marks an input that does not take a gradient.
    fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>>;

    /// Returns the name of this gradient function for debugging.
    fn name(&self) -> &'static str;

    /// Returns the gradient functions of this operation's inputs.
    fn next_functions(&self) -> &[Option<GradFn>];

    /// Allows downcasting to concrete types.
    fn as_any(&self) -> &dyn Any;
}

// =============================================================================
// GradFn - Arc Wrapper
// =============================================================================

/// Identifier of a `GradFn` that survives cloning.
pub type GradFnId = usize;

/// Reference-counted gradient function.
#[derive(Clone)]
pub struct GradFn {
    inner: Arc<dyn GradientFunction>,
}

impl GradFn {
    /// Creates a new `GradFn` from a gradient function.
    pub fn new<F: GradientFunction + 'static>(func: F) -> Self {
        Self {
            inner: Arc::new(func),
        }
    }

    /// Applies the gradient function.
    pub fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>> {
        self.inner.apply(grad_output)
    }

    /// Returns the name of the gradient function.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    /// Returns the next functions in the graph.
    #[must_use]
    pub fn next_functions(&self) -> &[Option<GradFn>] {
        self.inner.next_functions()
    }

    /// Stable ID taken from the data pointer of the shared allocation.
    #[must_use]
    pub fn id(&self) -> GradFnId {
        Arc::as_ptr(&self.inner).cast::<()>() as GradFnId
    }
}

impl Debug for GradFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GradFn({})", self.name())
    }
}

// =============================================================================
// Accumulate Grad - Leaf Node Gradient Function
// =============================================================================

/// Gradient slot shared between a leaf variable and its `AccumulateGrad`.
pub type GradAccumulator = Arc<RwLock<Option<Tensor<f32>>>>;

/// Gradient function for leaf variables.
pub struct AccumulateGrad {
    grad_accumulator: GradAccumulator,
}

impl AccumulateGrad {
    /// Creates an `AccumulateGrad` writing into `grad_accumulator`.
    pub fn new(grad_accumulator: GradAccumulator) -> Self {
        Self { grad_accumulator }
    }

    /// Adds `grad` to the stored gradient.
    pub fn accumulate(&self, grad: &Tensor<f32>) -> Result<()> {
        let mut guard = self.grad_accumulator.write();
        let next = match guard.as_ref() {
            Some(existing) => existing.add(grad)?,
            None => grad.clone_deep(),
        };
        *guard = Some(next);
        Ok(())
    }
}

impl Debug for AccumulateGrad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccumulateGrad").finish()
    }
}

impl GradientFunction for AccumulateGrad {
    fn apply(&self, grad_output: &Tensor<f32>) -> Result<Vec<Option<Tensor<f32>>>> {
        self.accumulate(grad_output)?;
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "AccumulateGrad"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &[]
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
    fn test_accumulate_grad() {
        let grad_acc: GradAccumulator = Arc::new(RwLock::new(None));
        let acc = AccumulateGrad::new(Arc::clone(&grad_acc));
        assert_eq!(acc.name(), "AccumulateGrad");
        assert!(acc.next_functions().is_empty());

        let grad = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[3]).unwrap();
        acc.accumulate(&grad).unwrap();
        assert_eq!(grad_acc.read().as_ref().unwrap().to_vec(), vec![1.0, 2.0, 3.0]);

        acc.accumulate(&grad).unwrap();
        assert_eq!(grad_acc.read().as_ref().unwrap().to_vec(), vec![2.0, 4.0, 6.0]);
        // The first accumulation copied; the caller's tensor is untouched.
        assert_eq!(grad.to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_accumulate_shape_mismatch() {
        let grad_acc: GradAccumulator = Arc::new(RwLock::new(None));
        let acc = AccumulateGrad::new(grad_acc);
        acc.accumulate(&Tensor::zeros(&[3])).unwrap();
        assert!(acc.accumulate(&Tensor::zeros(&[2])).is_err());
    }

    #[test]
    fn test_grad_fn_id_survives_clone() {
        let grad_fn = GradFn::new(AccumulateGrad::new(Arc::new(RwLock::new(None))));
        let other = grad_fn.clone();
        assert_eq!(grad_fn.id(), other.id());
        assert_eq!(format!("{grad_fn:?}"), "GradFn(AccumulateGrad)");
    }
}
