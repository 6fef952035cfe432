//! Optimizer Trait - Core Optimizer Interface
//!
//! @version 0.1.0

use cnnkit_core::error::Result;
use cnnkit_nn::Parameter;

/// Trait for all optimizers.
///
/// An optimizer is bound to exactly one model and updates that model's
/// parameters in place from their accumulated gradients.
pub trait Optimizer {
    /// Applies one update to every bound parameter that has a gradient.
    ///
    /// Fails with `Error::OptimizerNotBound` if no model was bound.
    fn update(&mut self) -> Result<()>;

    /// Clears the gradients of every bound parameter.
    fn zero_grad(&self) {
        for param in self.parameters() {
            param.zero_grad();
        }
    }

    /// Returns the current learning rate.
    fn lr(&self) -> f32;

    /// Sets the learning rate.
    fn set_lr(&mut self, lr: f32);

    /// Returns the bound parameters, empty if unbound.
    fn parameters(&self) -> &[Parameter];

    /// Returns whether a model has been bound.
    fn is_bound(&self) -> bool;
}
