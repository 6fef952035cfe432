//! cnnkit-optim - Optimization Algorithms
//!
//! Optimizers are created unbound, bound to one model with `bind`, and then
//! called once per training step with [`Optimizer::update`].
//!
//! ```rust
//! use cnnkit_nn::Conv2d;
//! use cnnkit_optim::prelude::*;
//!
//! let model = Conv2d::lazy(6, 5);
//! let mut optimizer = Adam::new(1e-4).bind(&model);
//! optimizer.update().unwrap();
//! ```
//!
//! @version 0.1.0

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod adam;
pub mod optimizer;

pub use adam::Adam;
pub use optimizer::Optimizer;

/// Common imports for optimization.
pub mod prelude {
    pub use crate::{Adam, Optimizer};
}
