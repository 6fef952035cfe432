//! cnnkit-nn - Neural Network Building Blocks
//!
//! The [`Module`] trait, learnable [`Parameter`]s, the ordered [`Layers`]
//! container that models are built from, and the layers themselves:
//! [`Conv2d`], [`Linear`], [`BatchNorm2d`], [`Dropout`] and pooling. The
//! [`functional`] module holds the parameterless operations, and [`loss`]
//! the classification objective and accuracy metric.
//!
//! Layers created with `lazy` constructors infer their input-side size from
//! the first batch they see; afterwards a differently sized input fails
//! with `Error::ShapeMismatch`.
//!
//! # Example
//! ```rust
//! use cnnkit_autograd::Variable;
//! use cnnkit_nn::prelude::*;
//! use cnnkit_tensor::Tensor;
//!
//! let fc = Linear::lazy(10);
//! let x = Variable::from_tensor(Tensor::ones(&[4, 84]));
//! let logits = fc.forward(&x).unwrap();
//! assert_eq!(logits.shape(), vec![4, 10]);
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
#![allow(clippy::new_without_default)]

// =============================================================================
// Modules
// =============================================================================

pub mod container;
pub mod functional;
pub mod init;
pub mod layers;
pub mod loss;
pub mod module;
pub mod parameter;

// =============================================================================
// Re-exports
// =============================================================================

pub use container::Layers;
pub use layers::{AvgPool2d, BatchNorm2d, Conv2d, Dropout, Linear, MaxPool2d};
pub use loss::{accuracy, softmax_cross_entropy};
pub use module::Module;
pub use parameter::Parameter;

// =============================================================================
// Prelude
// =============================================================================

/// Common imports for building models.
pub mod prelude {
    pub use crate::functional as F;
    pub use crate::{
        accuracy, softmax_cross_entropy, AvgPool2d, BatchNorm2d, Conv2d, Dropout, Layers, Linear,
        MaxPool2d, Module, Parameter,
    };
}
