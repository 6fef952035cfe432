//! Pooling Layers
//!
//! Module forms of the square-window pooling operations. Windows never
//! extend past the input; trailing rows and columns that do not fill a
//! window are ignored.
//!
//! @version 0.1.0

use cnnkit_autograd::Variable;
use cnnkit_core::error::Result;

use crate::functional;
use crate::module::Module;

/// Max pooling module.
#[derive(Debug, Clone, Copy)]
pub struct MaxPool2d {
    kernel: usize,
    stride: usize,
}

impl MaxPool2d {
    /// Non-overlapping pooling (stride equals kernel).
    pub fn new(kernel: usize) -> Self {
        Self::with_stride(kernel, kernel)
    }

    /// Pooling with an explicit stride.
    pub fn with_stride(kernel: usize, stride: usize) -> Self {
        Self { kernel, stride }
    }
}

impl Module for MaxPool2d {
    fn forward(&self, input: &Variable) -> Result<Variable> {
        functional::max_pool2d(input, self.kernel, self.stride)
    }

    fn name(&self) -> &'static str {
        "MaxPool2d"
    }
}

/// Average pooling module.
#[derive(Debug, Clone, Copy)]
pub struct AvgPool2d {
    kernel: usize,
    stride: usize,
}

impl AvgPool2d {
    /// Non-overlapping pooling (stride equals kernel).
    pub fn new(kernel: usize) -> Self {
        Self::with_stride(kernel, kernel)
    }

    /// Pooling with an explicit stride.
    pub fn with_stride(kernel: usize, stride: usize) -> Self {
        Self { kernel, stride }
    }
}

impl Module for AvgPool2d {
    fn forward(&self, input: &Variable) -> Result<Variable> {
        functional::avg_pool2d(input, self.kernel, self.stride)
    }

    fn name(&self) -> &'static str {
        "AvgPool2d"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cnnkit_tensor::Tensor;

    #[test]
    fn test_pool_modules() {
        let x = Variable::from_tensor(Tensor::ones(&[1, 2, 28, 28]));
        assert_eq!(AvgPool2d::new(2).forward(&x).unwrap().shape(), vec![1, 2, 14, 14]);
        assert_eq!(
            MaxPool2d::with_stride(3, 2).forward(&x).unwrap().shape(),
            vec![1, 2, 13, 13]
        );
        assert_eq!(MaxPool2d::new(2).num_parameters(), 0);
    }
}
