//! cnnkit-data - Data Loading
//!
//! Datasets yield `(input, target)` samples, [`Transform`]s preprocess the
//! inputs, and [`Iterator`] groups samples into [`Batch`]es one epoch at a
//! time.
//!
//! # Example
//! ```rust
//! use cnnkit_data::prelude::*;
//! use cnnkit_tensor::Tensor;
//!
//! let ds = TensorDataset::new(Tensor::zeros(&[6, 1, 4, 4]), Tensor::zeros(&[6])).unwrap();
//! let ds = TransformedDataset::new(ds, Compose::default().add(ToFloat).add(Normalize::zero_centered()));
//! let batches = DataIterator::new(ds, 4);
//! for batch in batches.iter() {
//!     let batch = batch.unwrap();
//!     assert_eq!(&batch.input.shape()[1..], &[1, 4, 4]);
//! }
//! ```
//!
//! @version 0.1.0

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::should_implement_trait)]

// =============================================================================
// Modules
// =============================================================================

pub mod collate;
pub mod dataset;
pub mod iterator;
pub mod transforms;

// =============================================================================
// Re-exports
// =============================================================================

pub use cnnkit_core::{Error, Result};
pub use collate::{collate, stack, Batch};
pub use dataset::{Dataset, TensorDataset, TransformedDataset};
pub use iterator::{BatchSource, Epoch, Iterator};
pub use transforms::{Compose, Normalize, ToFloat, Transform};

// =============================================================================
// Prelude
// =============================================================================

/// Common imports for data loading.
pub mod prelude {
    pub use crate::iterator::Iterator as DataIterator;
    pub use crate::{
        Batch, BatchSource, Compose, Dataset, Normalize, TensorDataset, ToFloat, Transform,
        TransformedDataset,
    };
}
