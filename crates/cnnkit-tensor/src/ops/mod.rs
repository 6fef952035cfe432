//! Kernels - Numerical Building Blocks for CNN Layers
//!
//! Forward and backward kernels for convolution, pooling, local response
//! normalization and batch normalization. The autograd crate wires these into graph nodes.
//!
//! @version 0.1.0

pub mod conv;
pub mod lrn;
pub mod norm;
pub mod pool;

pub use conv::{conv2d, conv2d_grad_bias, conv2d_grad_input, conv2d_grad_weight, Conv2dGeometry};
pub use lrn::{local_response_norm, local_response_norm_backward, LrnParams};
pub use norm::{batch_norm2d, batch_norm2d_backward, channel_stats};
pub use pool::{avg_pool2d, avg_pool2d_backward, max_pool2d, max_pool2d_backward};
