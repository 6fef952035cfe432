//! Neural Network Layers
//!
//! @version 0.1.0

pub mod conv;
pub mod dropout;
pub mod linear;
pub mod norm;
pub mod pooling;

pub use conv::Conv2d;
pub use dropout::Dropout;
pub use linear::Linear;
pub use norm::BatchNorm2d;
pub use pooling::{AvgPool2d, MaxPool2d};
