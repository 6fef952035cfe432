//! cnnkit Tensor - N-Dimensional Arrays
//!
//! The `Tensor` type plus the direct-loop kernels behind the CNN layers:
//! 2D convolution, max/average pooling and local response normalization,
//! each with its backward counterpart.
//!
//! # Example
//! ```rust
//! use cnnkit_tensor::Tensor;
//!
//! let a = Tensor::<f32>::zeros(&[2, 3]);
//! let b = Tensor::<f32>::ones(&[2, 3]);
//! let c = a.add(&b).unwrap().mul_scalar(2.0);
//! assert_eq!(c.sum().item().unwrap(), 12.0);
//! ```
//!
//! @version 0.1.0

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::return_self_not_must_use)]

// =============================================================================
// Modules
// =============================================================================

pub mod creation;
pub mod ops;
pub mod shape;
pub mod tensor;

// =============================================================================
// Re-exports
// =============================================================================

pub use cnnkit_core::{DType, Device, Error, Float, Numeric, Result, Scalar};
pub use creation::{full, ones, randn, uniform, zeros, zeros_like};
pub use shape::{Shape, Strides};
pub use tensor::Tensor;

// =============================================================================
// Prelude
// =============================================================================

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::tensor::Tensor;
    pub use crate::{full, ones, randn, zeros};
    pub use cnnkit_core::prelude::*;
}
