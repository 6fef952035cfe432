//! Convolutional Layer
//!
//! 2D convolution whose input channel count is either given up front or
//! inferred from the first input it sees.
//!
//! @version 0.1.0

use cnnkit_autograd::Variable;
use cnnkit_core::error::{Error, Result};
use cnnkit_tensor::ops::Conv2dGeometry;
use tracing::trace;

use crate::init::{lecun_normal, zeros};
use crate::module::Module;
use crate::parameter::Parameter;

// =============================================================================
// Conv2d
// =============================================================================

/// Applies a 2D convolution over `[N, C_in, H, W]` inputs.
///
/// Output: `[N, C_out, H_out, W_out]` with
/// `H_out = (H + 2 * padding - kernel) / stride + 1`.
pub struct Conv2d {
    /// Weight of shape `[out_channels, in_channels, kernel, kernel]`.
    pub weight: Parameter,
    /// Bias of shape `[out_channels]`.
    pub bias: Option<Parameter>,
    out_channels: usize,
    kernel_size: usize,
    geometry: Conv2dGeometry,
}

impl Conv2d {
    /// Creates a convolution that infers its input channels on first use.
    pub fn lazy(out_channels: usize, kernel_size: usize) -> Self {
        Self {
            weight: Parameter::uninitialized("W"),
            bias: Some(Parameter::uninitialized("b")),
            out_channels,
            kernel_size,
            geometry: Conv2dGeometry::new(1, 0),
        }
    }

    /// Creates a convolution with known input channels, stride 1 and no padding.
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self::with_options(in_channels, out_channels, kernel_size, 1, 0, true)
    }

    /// Creates a convolution with every option.
    pub fn with_options(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        bias: bool,
    ) -> Self {
        let weight = Parameter::named(
            "W",
            lecun_normal(&[out_channels, in_channels, kernel_size, kernel_size]),
        );
        Self {
            weight,
            bias: bias.then(|| Parameter::named("b", zeros(&[out_channels]))),
            out_channels,
            kernel_size,
            geometry: Conv2dGeometry::new(stride, padding),
        }
    }

    /// Sets the stride.
    #[must_use]
    pub fn stride(mut self, stride: usize) -> Self {
        self.geometry.stride = (stride, stride);
        self
    }

    /// Sets the zero padding.
    #[must_use]
    pub fn padding(mut self, padding: usize) -> Self {
        self.geometry.padding = (padding, padding);
        self
    }

    /// Drops the bias term.
    #[must_use]
    pub fn without_bias(mut self) -> Self {
        self.bias = None;
        self
    }

    /// Number of output channels.
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Input channels, once known.
    pub fn in_channels(&self) -> Option<usize> {
        self.weight
            .is_initialized()
            .then(|| self.weight.shape()[1])
    }

    /// Stride and padding.
    pub fn geometry(&self) -> Conv2dGeometry {
        self.geometry
    }

    fn ensure_initialized(&self, input_shape: &[usize], input: &Variable) -> Result<()> {
        let channels = input_shape[1];
        let shape = [self.out_channels, channels, self.kernel_size, self.kernel_size];
        let device = input.device();
        if self
            .weight
            .initialize_with(|| lecun_normal(&shape).to_device(device))?
        {
            trace!(
                in_channels = channels,
                out_channels = self.out_channels,
                "Conv2d inferred its input channels"
            );
        }
        if let Some(bias) = &self.bias {
            bias.initialize_with(|| zeros(&[self.out_channels]).to_device(device))?;
        }
        Ok(())
    }
}

impl Module for Conv2d {
    fn forward(&self, input: &Variable) -> Result<Variable> {
        let shape = input.shape();
        if shape.len() != 4 {
            return Err(Error::invalid_shape(&shape, "Conv2d expects [N, C, H, W]"));
        }
        self.ensure_initialized(&shape, input)?;
        let expected = self.weight.shape()[1];
        if shape[1] != expected {
            return Err(Error::shape_mismatch(
                self.name(),
                &[shape[0], expected, shape[2], shape[3]],
                &shape,
            ));
        }
        input.conv2d(
            self.weight.variable(),
            self.bias.as_ref().map(Parameter::variable),
            self.geometry,
        )
    }

    fn named_parameters(&self) -> Vec<(String, Parameter)> {
        let mut params = vec![("W".to_string(), self.weight.clone())];
        if let Some(bias) = &self.bias {
            params.push(("b".to_string(), bias.clone()));
        }
        params
    }

    fn name(&self) -> &'static str {
        "Conv2d"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cnnkit_tensor::Tensor;

    fn input(shape: &[usize]) -> Variable {
        Variable::from_tensor(Tensor::ones(shape))
    }

    #[test]
    fn test_conv2d_output_shape() {
        let conv = Conv2d::new(1, 6, 5);
        let y = conv.forward(&input(&[2, 1, 32, 32])).unwrap();
        assert_eq!(y.shape(), vec![2, 6, 28, 28]);
    }

    #[test]
    fn test_lazy_conv_infers_channels_once() {
        let conv = Conv2d::lazy(4, 3).stride(2).padding(1);
        assert_eq!(conv.num_parameters(), 0);
        assert_eq!(conv.in_channels(), None);

        let y = conv.forward(&input(&[1, 3, 8, 8])).unwrap();
        assert_eq!(y.shape(), vec![1, 4, 4, 4]);
        assert_eq!(conv.in_channels(), Some(3));
        assert_eq!(conv.num_parameters(), 4 * 3 * 3 * 3 + 4);

        let err = conv.forward(&input(&[1, 2, 8, 8])).unwrap_err();
        match err {
            Error::ShapeMismatch { layer, expected, actual } => {
                assert_eq!(layer, "Conv2d");
                assert_eq!(expected, vec![1, 3, 8, 8]);
                assert_eq!(actual, vec![1, 2, 8, 8]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_conv2d_rejects_non_4d() {
        let conv = Conv2d::lazy(2, 3);
        assert!(matches!(
            conv.forward(&input(&[3, 8, 8])),
            Err(Error::InvalidShape { .. })
        ));
        assert!(!conv.weight.is_initialized());
    }

    #[test]
    fn test_conv2d_without_bias() {
        let conv = Conv2d::new(1, 2, 3).without_bias();
        assert_eq!(conv.parameters().len(), 1);
    }
}
