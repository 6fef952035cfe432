//! Vision Datasets
//!
//! File readers for MNIST and CIFAR-10 plus deterministic synthetic
//! stand-ins with the same item shapes.
//!
//! @version 0.1.0

pub mod cifar;
pub mod mnist;

pub use cifar::{SyntheticCIFAR10, CIFAR10};
pub use mnist::{SyntheticMNIST, MNIST};
