//! cnnkit Core - Foundation Layer
//!
//! Device placement, the shared error type, reference-counted storage, the
//! scalar type traits and the seedable random source used by every other
//! crate in the workspace.
//!
//! # Example
//! ```rust
//! use cnnkit_core::{Device, Storage};
//!
//! let storage = Storage::<f32>::zeros(1024, Device::Cpu);
//! assert_eq!(storage.device(), Device::Cpu);
//! ```
//!
//! @version 0.1.0

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

// =============================================================================
// Modules
// =============================================================================

pub mod device;
pub mod dtype;
pub mod error;
pub mod random;
pub mod storage;

// =============================================================================
// Re-exports
// =============================================================================

pub use device::Device;
pub use dtype::{DType, Float, Numeric, Scalar};
pub use error::{Error, Result};
pub use storage::Storage;

// =============================================================================
// Prelude
// =============================================================================

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::device::Device;
    pub use crate::dtype::{DType, Float, Numeric, Scalar};
    pub use crate::error::{Error, Result};
    pub use crate::storage::Storage;
}
