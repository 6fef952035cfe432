//! Linear Layer - Fully Connected Layer
//!
//! Applies `y = x W^T + b` to `[N, in_features]` inputs. The input width
//! can be left to be inferred from the first batch.
//!
//! @version 0.1.0

use cnnkit_autograd::Variable;
use cnnkit_core::error::{Error, Result};
use tracing::trace;

use crate::init::{lecun_normal, zeros};
use crate::module::Module;
use crate::parameter::Parameter;

// =============================================================================
// Linear
// =============================================================================

/// Fully connected layer.
pub struct Linear {
    /// Weight of shape `[out_features, in_features]`.
    pub weight: Parameter,
    /// Bias of shape `[out_features]`.
    pub bias: Option<Parameter>,
    out_features: usize,
}

impl Linear {
    /// Creates a layer that infers `in_features` on first use.
    pub fn lazy(out_features: usize) -> Self {
        Self {
            weight: Parameter::uninitialized("W"),
            bias: Some(Parameter::uninitialized("b")),
            out_features,
        }
    }

    /// Creates a layer with a known input width.
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Self {
            weight: Parameter::named("W", lecun_normal(&[out_features, in_features])),
            bias: Some(Parameter::named("b", zeros(&[out_features]))),
            out_features,
        }
    }

    /// Drops the bias term.
    #[must_use]
    pub fn without_bias(mut self) -> Self {
        self.bias = None;
        self
    }

    /// Output width.
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Input width, once known.
    pub fn in_features(&self) -> Option<usize> {
        self.weight
            .is_initialized()
            .then(|| self.weight.shape()[1])
    }
}

impl Module for Linear {
    fn forward(&self, input: &Variable) -> Result<Variable> {
        let shape = input.shape();
        let [batch, width] = shape[..] else {
            return Err(Error::invalid_shape(&shape, "Linear expects [N, features]"));
        };
        let device = input.device();
        let out = self.out_features;
        if self
            .weight
            .initialize_with(|| lecun_normal(&[out, width]).to_device(device))?
        {
            trace!(in_features = width, out_features = out, "Linear inferred its input width");
        }
        if let Some(bias) = &self.bias {
            bias.initialize_with(|| zeros(&[out]).to_device(device))?;
        }

        let expected = self.weight.shape()[1];
        if width != expected {
            return Err(Error::shape_mismatch(self.name(), &[batch, expected], &shape));
        }
        input.linear(self.weight.variable(), self.bias.as_ref().map(Parameter::variable))
    }

    fn named_parameters(&self) -> Vec<(String, Parameter)> {
        let mut params = vec![("W".to_string(), self.weight.clone())];
        if let Some(bias) = &self.bias {
            params.push(("b".to_string(), bias.clone()));
        }
        params
    }

    fn name(&self) -> &'static str {
        "Linear"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cnnkit_tensor::Tensor;

    #[test]
    fn test_linear_creation() {
        let linear = Linear::new(10, 5);
        assert_eq!(linear.weight.shape(), vec![5, 10]);
        assert_eq!(linear.bias.as_ref().unwrap().shape(), vec![5]);
        assert_eq!(linear.num_parameters(), 55);
    }

    #[test]
    fn test_linear_forward() {
        let linear = Linear::new(3, 2);
        let input = Variable::from_tensor(Tensor::ones(&[4, 3]));
        let output = linear.forward(&input).unwrap();
        assert_eq!(output.shape(), vec![4, 2]);
    }

    #[test]
    fn test_lazy_linear_then_mismatch() {
        let linear = Linear::lazy(7);
        let y = linear
            .forward(&Variable::from_tensor(Tensor::ones(&[2, 12])))
            .unwrap();
        assert_eq!(y.shape(), vec![2, 7]);
        assert_eq!(linear.in_features(), Some(12));

        let err = linear
            .forward(&Variable::from_tensor(Tensor::ones(&[2, 11])))
            .unwrap_err();
        assert_eq!(err, Error::shape_mismatch("Linear", &[2, 12], &[2, 11]));
    }

    #[test]
    fn test_linear_rejects_unflattened_input() {
        let linear = Linear::lazy(3);
        let input = Variable::from_tensor(Tensor::ones(&[2, 3, 4]));
        assert!(matches!(linear.forward(&input), Err(Error::InvalidShape { .. })));
    }

    #[test]
    fn test_linear_gradients_reach_parameters() {
        let linear = Linear::new(3, 2);
        let input = Variable::from_tensor(Tensor::ones(&[4, 3]));
        linear.forward(&input).unwrap().sum().backward().unwrap();
        assert_eq!(linear.weight.grad().unwrap().to_vec(), vec![4.0; 6]);
        assert_eq!(linear.bias.as_ref().unwrap().grad().unwrap().to_vec(), vec![4.0; 2]);
    }
}
