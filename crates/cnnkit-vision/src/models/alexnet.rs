//! `AlexNet` and `ZFNet` - Eight-Layer ImageNet-Style CNNs
//!
//! Both networks share one layout: five convolutions with local response
//! normalisation after the first two, three max-pools, and three fully
//! connected layers with dropout. They differ only in the first
//! convolution's kernel and stride and in the width of conv3 to conv5.
//!
//! Each model also declares `batchnorm1` and `batchnorm2`. Their parameters
//! are owned and enumerated, but the forward pass does not apply them.
//!
//! @version 0.1.0

use cnnkit_autograd::Variable;
use cnnkit_core::error::Result;
use cnnkit_nn::functional as F;
use cnnkit_nn::{BatchNorm2d, Conv2d, Layers, Linear, Module, Parameter};

// =============================================================================
// Shared Layout
// =============================================================================

/// Dropout ratio applied after fc6 and fc7.
const DROPOUT_RATIO: f32 = 0.5;

/// Hyperparameters that distinguish the eight-layer variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EightLayerConfig {
    /// conv1 kernel size.
    pub conv1_kernel: usize,
    /// conv1 stride.
    pub conv1_stride: usize,
    /// Output channels of conv3, conv4 and conv5.
    pub conv345_channels: [usize; 3],
}

impl EightLayerConfig {
    /// Krizhevsky et al. 2012.
    pub const ALEXNET: Self = Self {
        conv1_kernel: 11,
        conv1_stride: 4,
        conv345_channels: [384, 384, 256],
    };

    /// Zeiler and Fergus 2013.
    pub const ZFNET: Self = Self {
        conv1_kernel: 7,
        conv1_stride: 2,
        conv345_channels: [512, 1024, 512],
    };
}

struct EightLayerNet {
    layers: Layers,
    num_classes: usize,
}

impl EightLayerNet {
    fn new(config: EightLayerConfig, num_classes: usize) -> Self {
        let [c3, c4, c5] = config.conv345_channels;
        let layers = Layers::new()
            .with(
                "conv1",
                Conv2d::lazy(96, config.conv1_kernel).stride(config.conv1_stride),
            )
            .with("batchnorm1", BatchNorm2d::lazy())
            .with("conv2", Conv2d::lazy(256, 5).padding(2))
            .with("batchnorm2", BatchNorm2d::lazy())
            .with("conv3", Conv2d::lazy(c3, 3).padding(1))
            .with("conv4", Conv2d::lazy(c4, 3).padding(1))
            .with("conv5", Conv2d::lazy(c5, 3).padding(1))
            .with("fc6", Linear::lazy(4096))
            .with("fc7", Linear::lazy(4096))
            .with("fc8", Linear::lazy(num_classes));
        Self {
            layers,
            num_classes,
        }
    }

    fn forward(&self, input: &Variable) -> Result<Variable> {
        let layers = &self.layers;
        let x = F::relu(&layers.forward("conv1", input)?);
        let x = F::local_response_norm(&x)?;
        let x = F::max_pool2d(&x, 3, 2)?;

        let x = F::relu(&layers.forward("conv2", &x)?);
        let x = F::local_response_norm(&x)?;
        let x = F::max_pool2d(&x, 3, 2)?;

        let x = F::relu(&layers.forward("conv3", &x)?);
        let x = F::relu(&layers.forward("conv4", &x)?);
        let x = F::relu(&layers.forward("conv5", &x)?);
        let x = F::max_pool2d(&x, 3, 2)?;

        let x = F::flatten(&x)?;
        let x = F::dropout(&F::relu(&layers.forward("fc6", &x)?), DROPOUT_RATIO)?;
        let x = F::dropout(&F::relu(&layers.forward("fc7", &x)?), DROPOUT_RATIO)?;
        layers.forward("fc8", &x)
    }
}

// =============================================================================
// AlexNet
// =============================================================================

/// AlexNet for 227x227 RGB input.
///
/// Architecture:
/// - conv1 Conv2d(96, 11, stride 4) -> relu -> LRN -> MaxPool(3, 2)
/// - conv2 Conv2d(256, 5, pad 2) -> relu -> LRN -> MaxPool(3, 2)
/// - conv3 Conv2d(384, 3, pad 1) -> relu
/// - conv4 Conv2d(384, 3, pad 1) -> relu
/// - conv5 Conv2d(256, 3, pad 1) -> relu -> MaxPool(3, 2)
/// - fc6 Linear(4096) -> relu -> dropout
/// - fc7 Linear(4096) -> relu -> dropout
/// - fc8 Linear(classes)
pub struct AlexNet {
    net: EightLayerNet,
}

impl AlexNet {
    /// Spatial input size the architecture is designed for.
    pub const INPUT_SIZE: usize = 227;

    /// Creates an AlexNet with `num_classes` outputs.
    pub fn new(num_classes: usize) -> Self {
        Self {
            net: EightLayerNet::new(EightLayerConfig::ALEXNET, num_classes),
        }
    }

    /// Returns the number of output classes.
    pub fn num_classes(&self) -> usize {
        self.net.num_classes
    }

    /// Returns the layer container.
    pub fn layers(&self) -> &Layers {
        &self.net.layers
    }
}

impl Default for AlexNet {
    fn default() -> Self {
        Self::new(10)
    }
}

impl Module for AlexNet {
    fn forward(&self, input: &Variable) -> Result<Variable> {
        self.net.forward(input)
    }

    fn named_parameters(&self) -> Vec<(String, Parameter)> {
        self.net.layers.named_parameters()
    }

    fn name(&self) -> &'static str {
        "AlexNet"
    }
}

// =============================================================================
// ZFNet
// =============================================================================

/// ZFNet: AlexNet with a 7x7 stride-2 first convolution and wider
/// conv3 (512), conv4 (1024) and conv5 (512).
pub struct ZFNet {
    net: EightLayerNet,
}

impl ZFNet {
    /// Spatial input size the architecture is designed for.
    pub const INPUT_SIZE: usize = 227;

    /// Creates a ZFNet with `num_classes` outputs.
    pub fn new(num_classes: usize) -> Self {
        Self {
            net: EightLayerNet::new(EightLayerConfig::ZFNET, num_classes),
        }
    }

    /// Returns the number of output classes.
    pub fn num_classes(&self) -> usize {
        self.net.num_classes
    }

    /// Returns the layer container.
    pub fn layers(&self) -> &Layers {
        &self.net.layers
    }
}

impl Default for ZFNet {
    fn default() -> Self {
        Self::new(10)
    }
}

impl Module for ZFNet {
    fn forward(&self, input: &Variable) -> Result<Variable> {
        self.net.forward(input)
    }

    fn named_parameters(&self) -> Vec<(String, Parameter)> {
        self.net.layers.named_parameters()
    }

    fn name(&self) -> &'static str {
        "ZFNet"
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
    fn test_declaration_order() {
        let model = AlexNet::default();
        let names: Vec<&str> = model.layers().names().collect::<Vec<_>>();
        assert_eq!(
            names,
            [
                "conv1",
                "batchnorm1",
                "conv2",
                "batchnorm2",
                "conv3",
                "conv4",
                "conv5",
                "fc6",
                "fc7",
                "fc8"
            ]
        );
    }

    #[test]
    fn test_zfnet_layer_hyperparameters() {
        let model = ZFNet::new(5);
        assert_eq!(model.num_classes(), 5);
        assert_eq!(model.layers().get("conv1").map(|l| l.name()), Some("Conv2d"));
        assert_eq!(EightLayerConfig::ZFNET.conv345_channels, [512, 1024, 512]);
        assert_eq!(EightLayerConfig::ALEXNET.conv1_kernel, 11);
    }

    #[test]
    fn test_alexnet_small_input_shape() {
        // 67x67: conv1 15 -> pool 7 -> conv2 7 -> pool 3 -> conv3..5 3 -> pool 1
        let model = AlexNet::new(4);
        let x = Variable::from_tensor(Tensor::randn(&[2, 3, 67, 67]));
        let y = model.forward(&x).unwrap();
        assert_eq!(y.shape(), vec![2, 4]);
    }

    #[test]
    fn test_batchnorm_parameters_enumerated_but_unused() {
        let model = AlexNet::default();
        let x = Variable::from_tensor(Tensor::randn(&[1, 3, 67, 67]));
        model.forward(&x).unwrap().sum().backward().unwrap();

        let params = model.named_parameters();
        // Lazy batch norm never sees an input, so it stays unallocated.
        let bn: Vec<_> = params
            .iter()
            .filter(|(name, _)| name.starts_with("batchnorm"))
            .collect();
        assert_eq!(bn.len(), 4);
        assert!(bn.iter().all(|(_, p)| !p.is_initialized() && p.grad().is_none()));
        assert!(params
            .iter()
            .filter(|(name, _)| name.starts_with("conv1"))
            .all(|(_, p)| p.grad().is_some()));
    }
}
