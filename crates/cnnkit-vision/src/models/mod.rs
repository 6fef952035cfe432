//! Vision Models
//!
//! - **`LeNet5`**: tanh and average pooling, 32x32 grayscale input
//! - **`AlexNet`**: ReLU, LRN and dropout, 227x227 RGB input
//! - **`ZFNet`**: AlexNet with a finer first convolution and wider middle
//!
//! @version 0.1.0

pub mod alexnet;
pub mod lenet;

pub use alexnet::{AlexNet, EightLayerConfig, ZFNet};
pub use lenet::LeNet5;
