//! `LeNet5` - Classic Five-Layer CNN
//!
//! @version 0.1.0

use cnnkit_autograd::Variable;
use cnnkit_core::error::Result;
use cnnkit_nn::functional as F;
use cnnkit_nn::{Conv2d, Layers, Linear, Module, Parameter};

// =============================================================================
// LeNet-5
// =============================================================================

/// LeNet-5 for 32x32 single-channel digits.
///
/// Architecture:
/// - conv1 Conv2d(6, 5) -> tanh -> AvgPool(2)
/// - conv2 Conv2d(16, 5) -> tanh -> AvgPool(2)
/// - conv3 Conv2d(120, 5) -> tanh
/// - flatten
/// - fc4 Linear(84) -> tanh
/// - fc5 Linear(classes)
///
/// Input channels and the width of `fc4` are inferred from the first batch.
pub struct LeNet5 {
    layers: Layers,
    num_classes: usize,
}

impl LeNet5 {
    /// Spatial input size the architecture is designed for.
    pub const INPUT_SIZE: usize = 32;

    /// Creates a LeNet-5 with `num_classes` outputs.
    pub fn new(num_classes: usize) -> Self {
        let layers = Layers::new()
            .with("conv1", Conv2d::lazy(6, 5))
            .with("conv2", Conv2d::lazy(16, 5))
            .with("conv3", Conv2d::lazy(120, 5))
            .with("fc4", Linear::lazy(84))
            .with("fc5", Linear::lazy(num_classes));
        Self {
            layers,
            num_classes,
        }
    }

    /// Returns the number of output classes.
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Returns the layer container.
    pub fn layers(&self) -> &Layers {
        &self.layers
    }
}

impl Default for LeNet5 {
    fn default() -> Self {
        Self::new(10)
    }
}

impl Module for LeNet5 {
    fn forward(&self, input: &Variable) -> Result<Variable> {
        let x = F::tanh(&self.layers.forward("conv1", input)?);
        let x = F::avg_pool2d(&x, 2, 2)?;
        let x = F::tanh(&self.layers.forward("conv2", &x)?);
        let x = F::avg_pool2d(&x, 2, 2)?;
        let x = F::tanh(&self.layers.forward("conv3", &x)?);
        let x = F::flatten(&x)?;
        let x = F::tanh(&self.layers.forward("fc4", &x)?);
        self.layers.forward("fc5", &x)
    }

    fn named_parameters(&self) -> Vec<(String, Parameter)> {
        self.layers.named_parameters()
    }

    fn name(&self) -> &'static str {
        "LeNet5"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cnnkit_core::Error;
    use cnnkit_tensor::Tensor;

    #[test]
    fn test_lenet_output_shape() {
        let model = LeNet5::default();
        for batch in [1, 3] {
            let x = Variable::from_tensor(Tensor::randn(&[batch, 1, 32, 32]));
            let y = model.forward(&x).unwrap();
            assert_eq!(y.shape(), vec![batch, 10]);
        }
    }

    #[test]
    fn test_lenet_parameter_order_and_count() {
        let model = LeNet5::new(7);
        assert_eq!(model.num_parameters(), 0);

        let x = Variable::from_tensor(Tensor::zeros(&[1, 1, 32, 32]));
        model.forward(&x).unwrap();

        let names: Vec<String> = model.named_parameters().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            [
                "conv1.W", "conv1.b", "conv2.W", "conv2.b", "conv3.W", "conv3.b", "fc4.W",
                "fc4.b", "fc5.W", "fc5.b"
            ]
        );
        // 156 + 2416 + 48120 + 10164 + 85 * 7
        assert_eq!(model.num_parameters(), 156 + 2416 + 48120 + 10164 + 595);
    }

    #[test]
    fn test_lenet_rejects_wrong_resolution_after_first_batch() {
        let model = LeNet5::default();
        model
            .forward(&Variable::from_tensor(Tensor::zeros(&[1, 1, 32, 32])))
            .unwrap();

        // 36x36 leaves conv3 with a 2x2 map, so fc4 sees 480 features.
        let err = model
            .forward(&Variable::from_tensor(Tensor::zeros(&[1, 1, 36, 36])))
            .unwrap_err();
        match err {
            Error::ShapeMismatch {
                layer,
                expected,
                actual,
            } => {
                assert_eq!(layer, "fc4");
                assert_eq!(expected, vec![1, 120]);
                assert_eq!(actual, vec![1, 480]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_lenet_too_small_input_names_layer() {
        // 8x8 -> conv1 4x4 -> pool 2x2, too small for conv2's 5x5 kernel.
        let err = LeNet5::default()
            .forward(&Variable::from_tensor(Tensor::zeros(&[1, 1, 8, 8])))
            .unwrap_err();
        match &err {
            Error::InvalidShape { shape, message } => {
                assert_eq!(shape, &vec![1, 6, 2, 2]);
                assert!(message.starts_with("conv2: "), "{message}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("conv2"));
    }
}
