//! cnnkit - Classic Convolutional Networks in Rust
//!
//! LeNet-5, AlexNet and ZFNet built from lazily shaped layers, plus a
//! [`Trainer`] that runs paired train/eval epochs over any
//! [`BatchSource`](cnnkit_data::BatchSource).
//!
//! # Quick Start
//!
//! ```rust
//! use cnnkit::prelude::*;
//!
//! let model = LeNet5::new(10);
//! let x = Variable::from_tensor(Tensor::zeros(&[2, 1, 32, 32]));
//! let logits = model.forward(&x).unwrap();
//! assert_eq!(logits.shape(), vec![2, 10]);
//! ```
//!
//! # Feature Flags
//!
//! - `vision` (default): model zoo, image transforms and dataset readers
//!
//! @version 0.1.0

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]

// =============================================================================
// Core Re-exports
// =============================================================================

pub use cnnkit_autograd as autograd;
pub use cnnkit_core as core;
pub use cnnkit_data as data;
pub use cnnkit_nn as nn;
pub use cnnkit_optim as optim;
pub use cnnkit_tensor as tensor;

#[cfg(feature = "vision")]
pub use cnnkit_vision as vision;

// =============================================================================
// Training Utilities
// =============================================================================

pub mod config;
pub mod logging;
pub mod trainer;

pub use config::{DataConfig, ExperimentConfig, TrainingConfig};
pub use trainer::{
    Callback, EpochReport, Phase, PhaseAccumulator, PhaseReport, StepMetrics, Trainer,
    TrainingHistory,
};

// =============================================================================
// Prelude
// =============================================================================

/// Common imports for training a model.
pub mod prelude {
    pub use cnnkit_autograd::{no_grad, EvalGuard, Mode, ModeGuard, Variable};
    pub use cnnkit_core::{Device, Error, Result};
    pub use cnnkit_data::prelude::*;
    pub use cnnkit_nn::prelude::*;
    pub use cnnkit_optim::{Adam, Optimizer};
    pub use cnnkit_tensor::Tensor;

    #[cfg(feature = "vision")]
    pub use cnnkit_vision::prelude::*;

    pub use crate::{
        Callback, DataConfig, EpochReport, ExperimentConfig, Phase, PhaseReport, Trainer,
        TrainingConfig, TrainingHistory,
    };
}
