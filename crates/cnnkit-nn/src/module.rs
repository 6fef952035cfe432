//! Module Trait - Neural Network Module Interface
//!
//! Every layer and model implements [`Module`]. Parameters are enumerated in
//! declaration order so optimizers and summaries are deterministic.
//!
//! @version 0.1.0

use cnnkit_autograd::Variable;
use cnnkit_core::error::Result;
use cnnkit_core::Device;

use crate::parameter::Parameter;

// =============================================================================
// Module Trait
// =============================================================================

/// Core trait for all neural network modules.
pub trait Module: Send + Sync {
    /// Performs the forward pass.
    ///
    /// Whether a graph is recorded and whether dropout is active is decided
    /// by the thread's current [`Mode`](cnnkit_autograd::Mode).
    fn forward(&self, input: &Variable) -> Result<Variable>;

    /// Returns named parameters in declaration order, including those of
    /// child modules as `child.param`.
    fn named_parameters(&self) -> Vec<(String, Parameter)> {
        Vec::new()
    }

    /// Returns all parameters in declaration order.
    fn parameters(&self) -> Vec<Parameter> {
        self.named_parameters().into_iter().map(|(_, p)| p).collect()
    }

    /// Number of scalar parameters currently allocated. Lazily shaped layers
    /// report zero until their first forward call.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(Parameter::numel).sum()
    }

    /// Clears the gradients of every parameter.
    fn zero_grad(&self) {
        for param in self.parameters() {
            param.zero_grad();
        }
    }

    /// Moves every parameter to `device`.
    fn to_device(&self, device: Device) -> Result<()> {
        device.ensure_available()?;
        for param in self.parameters() {
            param.to_device(device)?;
        }
        Ok(())
    }

    /// Returns the module name for logs and error messages.
    fn name(&self) -> &'static str;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cnnkit_core::Error;
    use cnnkit_tensor::Tensor;

    struct Scale {
        factor: Parameter,
    }

    impl Module for Scale {
        fn forward(&self, input: &Variable) -> Result<Variable> {
            input.mul_var(self.factor.variable())
        }

        fn named_parameters(&self) -> Vec<(String, Parameter)> {
            vec![("factor".to_string(), self.factor.clone())]
        }

        fn name(&self) -> &'static str {
            "Scale"
        }
    }

    fn scale() -> Scale {
        Scale {
            factor: Parameter::named("factor", Tensor::from_vec(vec![2.0, 3.0], &[2]).unwrap()),
        }
    }

    #[test]
    fn test_default_methods() {
        let m = scale();
        assert_eq!(m.num_parameters(), 2);
        assert_eq!(m.parameters().len(), 1);

        let x = Variable::from_tensor(Tensor::ones(&[2]));
        m.forward(&x).unwrap().sum().backward().unwrap();
        assert!(m.factor.grad().is_some());
        m.zero_grad();
        assert!(m.factor.grad().is_none());
    }

    #[test]
    fn test_to_device() {
        let m = scale();
        m.to_device(Device::Cpu).unwrap();
        assert!(matches!(
            m.to_device(Device::Cuda(0)),
            Err(Error::DeviceNotAvailable { .. })
        ));
    }
}
