//! cnnkit-autograd - Automatic Differentiation
//!
//! Reverse-mode automatic differentiation over `f32` tensors. Operations on
//! [`Variable`]s record a graph while the thread is in [`Mode::Training`];
//! calling [`Variable::backward`] on a scalar loss fills the gradients of
//! every leaf that requires one.
//!
//! [`Mode::Evaluating`], entered through [`NoGradGuard`] / [`no_grad`],
//! disables recording and makes dropout the identity.
//!
//! # Example
//! ```rust
//! use cnnkit_autograd::Variable;
//! use cnnkit_tensor::Tensor;
//!
//! let w = Variable::new(Tensor::from_vec(vec![2.0, 3.0], &[2]).unwrap(), true);
//! let x = Variable::from_tensor(Tensor::from_vec(vec![1.0, 4.0], &[2]).unwrap());
//! let loss = w.mul_var(&x).unwrap().sum();
//! loss.backward().unwrap();
//! assert_eq!(w.grad().unwrap().to_vec(), vec![1.0, 4.0]);
//! ```
//!
//! @version 0.1.0

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

// =============================================================================
// Modules
// =============================================================================

pub mod backward;
pub mod functions;
pub mod grad_fn;
pub mod graph;
pub mod mode;
pub mod variable;

// =============================================================================
// Re-exports
// =============================================================================

pub use backward::{gradcheck, numerical_gradient};
pub use grad_fn::{GradFn, GradientFunction};
pub use graph::{count_recorded, recorded_operations};
pub use mode::{
    current_mode, enable_grad, is_grad_enabled, no_grad, with_mode, EnableGradGuard, EvalGuard,
    Mode, ModeGuard, NoGradGuard,
};
pub use variable::Variable;

// =============================================================================
// Prelude
// =============================================================================

/// Common imports for autograd.
pub mod prelude {
    pub use crate::{no_grad, EvalGuard, Mode, NoGradGuard, Variable};
    pub use cnnkit_tensor::prelude::*;
}
