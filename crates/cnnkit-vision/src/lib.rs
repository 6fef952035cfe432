//! cnnkit-vision - Classic CNN Architectures
//!
//! [`LeNet5`], [`AlexNet`] and [`ZFNet`], the image transforms their input
//! pipelines need, and readers for MNIST and CIFAR-10.
//!
//! # Example
//! ```rust
//! use cnnkit_autograd::{EvalGuard, Variable};
//! use cnnkit_nn::Module;
//! use cnnkit_tensor::Tensor;
//! use cnnkit_vision::LeNet5;
//!
//! let model = LeNet5::default();
//! let _eval = EvalGuard::new();
//! let logits = model.forward(&Variable::from_tensor(Tensor::zeros(&[2, 1, 32, 32]))).unwrap();
//! assert_eq!(logits.shape(), vec![2, 10]);
//! ```
//!
//! @version 0.1.0

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::upper_case_acronyms)]

// =============================================================================
// Modules
// =============================================================================

pub mod datasets;
pub mod models;
pub mod transforms;

// =============================================================================
// Re-exports
// =============================================================================

pub use datasets::{SyntheticCIFAR10, SyntheticMNIST, CIFAR10, MNIST};
pub use models::{AlexNet, EightLayerConfig, LeNet5, ZFNet};
pub use transforms::{alexnet_pipeline, lenet_pipeline, Resize};

// =============================================================================
// Prelude
// =============================================================================

/// Common imports for vision tasks.
pub mod prelude {
    pub use crate::{
        alexnet_pipeline, lenet_pipeline, AlexNet, LeNet5, Resize, SyntheticCIFAR10,
        SyntheticMNIST, ZFNet, CIFAR10, MNIST,
    };
}
