//! Gradient Functions - Backward Passes of Differentiable Operations
//!
//! @version 0.1.0

mod activation;
mod basic;
mod conv;
mod linalg;
mod loss;
mod norm;

pub use activation::{DropoutBackward, ReluBackward, TanhBackward};
pub use basic::{AddBackward, MeanBackward, MulBackward, MulScalarBackward, ReshapeBackward, SumBackward};
pub use conv::{AvgPool2dBackward, Conv2dBackward, LrnBackward, MaxPool2dBackward};
pub use linalg::{LinearBackward, MatMulBackward, TransposeBackward};
pub use loss::SoftmaxCrossEntropyBackward;
pub use norm::BatchNorm2dBackward;
