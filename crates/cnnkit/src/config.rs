//! Configuration - Training and Experiment Settings
//!
//! Settings are plain `serde` structs with a default for every field, so a
//! TOML file only needs to name what it changes:
//!
//! ```toml
//! [training]
//! epochs = 2
//! learning_rate = 1e-4
//!
//! [data]
//! root = "data/cifar10"
//! image_size = 227
//! normalize = [0.5, 0.5]
//! ```
//!
//! @version 0.1.0

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use cnnkit_core::error::{Error, Result};
use cnnkit_core::Device;
#[cfg(feature = "vision")]
use cnnkit_data::{Compose, Dataset, Iterator as DataIterator, TransformedDataset};
#[cfg(feature = "vision")]
use cnnkit_tensor::Tensor;

// =============================================================================
// Training Configuration
// =============================================================================

/// Settings for one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfig {
    /// Number of epochs.
    pub epochs: usize,
    /// Minibatch size for both phases.
    pub batch_size: usize,
    /// Adam step size.
    pub learning_rate: f32,
    /// Reshuffle the training set every epoch.
    pub shuffle_train: bool,
    /// Reshuffle the evaluation set every epoch.
    pub shuffle_eval: bool,
    /// Emit a per-step debug event every this many steps.
    pub log_every: usize,
    /// Seed for initialisation, dropout and shuffling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// `"cpu"`, `"cuda"` or `"cuda:N"`.
    pub device: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 100,
            learning_rate: 1e-3,
            shuffle_train: true,
            shuffle_eval: false,
            log_every: 1,
            seed: None,
            device: "cpu".to_string(),
        }
    }
}

impl TrainingConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// LeNet5 on MNIST: batch 100, 10 epochs, learning rate 1e-3.
    pub fn lenet() -> Self {
        Self::default()
    }

    /// AlexNet or ZFNet on CIFAR-10: batch 100, 10 epochs, learning rate 1e-4.
    pub fn alexnet() -> Self {
        Self::default().learning_rate(1e-4)
    }

    /// Builder: set number of epochs.
    #[must_use]
    pub fn epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Builder: set batch size.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Builder: set learning rate.
    #[must_use]
    pub fn learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Builder: set per-step logging frequency.
    #[must_use]
    pub fn log_every(mut self, steps: usize) -> Self {
        self.log_every = steps.max(1);
        self
    }

    /// Builder: set seed.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builder: set device name.
    #[must_use]
    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Parses the device name.
    pub fn parse_device(&self) -> Result<Device> {
        self.device.parse()
    }

    /// The configured device if it is usable, otherwise the CPU.
    pub fn select_device(&self) -> Result<Device> {
        let device = self.parse_device()?;
        if device.is_available() {
            Ok(device)
        } else {
            warn!(requested = %device, "device not available, using cpu");
            Ok(Device::Cpu)
        }
    }

    /// Checks values that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be positive"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        self.parse_device().map(|_| ())
    }
}

// =============================================================================
// Data Configuration
// =============================================================================

/// Where the data lives and how inputs are preprocessed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    /// Dataset directory. Without one, drivers use synthetic data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Side length inputs are resized to.
    pub image_size: usize,
    /// Z-score `[mean, std]` applied after rescaling to `[0, 1]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalize: Option<[f32; 2]>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self::lenet()
    }
}

impl DataConfig {
    /// 32x32, no normalisation.
    pub fn lenet() -> Self {
        Self {
            root: None,
            image_size: 32,
            normalize: None,
        }
    }

    /// 227x227, normalised with mean 0.5 and std 0.5.
    pub fn alexnet() -> Self {
        Self {
            root: None,
            image_size: 227,
            normalize: Some([0.5, 0.5]),
        }
    }

    /// Builds the input transform this configuration describes.
    #[cfg(feature = "vision")]
    pub fn pipeline(&self) -> Compose {
        cnnkit_vision::transforms::pipeline(self.image_size, self.normalize.map(|[m, s]| (m, s)))
    }
}

// =============================================================================
// Experiment Configuration
// =============================================================================

/// A full experiment: training settings plus data settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    /// Training loop settings.
    pub training: TrainingConfig,
    /// Data settings.
    pub data: DataConfig,
}

impl ExperimentConfig {
    /// LeNet5 on MNIST.
    pub fn lenet() -> Self {
        Self {
            training: TrainingConfig::lenet(),
            data: DataConfig::lenet(),
        }
    }

    /// AlexNet or ZFNet on CIFAR-10.
    pub fn alexnet() -> Self {
        Self {
            training: TrainingConfig::alexnet(),
            data: DataConfig::alexnet(),
        }
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::config(e.to_string()))?;
        config.training.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Serialises to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Wraps a train and a test dataset in the configured pipeline and
    /// batches them. The train side follows `shuffle_train`, the test side
    /// `shuffle_eval`. Both place batches on `device`.
    #[cfg(feature = "vision")]
    pub fn iterators<D>(&self, train: D, test: D, device: Device) -> Result<IteratorPair<D>>
    where
        D: Dataset<Item = (Tensor<f32>, Tensor<f32>)>,
    {
        let batch = |dataset: D, shuffle: bool| -> Result<DataIterator<_>> {
            let mut iter = DataIterator::new(
                TransformedDataset::new(dataset, self.data.pipeline()),
                self.training.batch_size,
            )
            .shuffle(shuffle);
            iter.to_device(device)?;
            Ok(iter)
        };
        Ok((
            batch(train, self.training.shuffle_train)?,
            batch(test, self.training.shuffle_eval)?,
        ))
    }
}

/// Train and test iterators built by [`ExperimentConfig::iterators`].
#[cfg(feature = "vision")]
pub type IteratorPair<D> = (
    DataIterator<TransformedDataset<D, Compose>>,
    DataIterator<TransformedDataset<D, Compose>>,
);

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TrainingConfig::default();
        assert_eq!(config.epochs, 10);
        assert_eq!(config.batch_size, 100);
        assert!(config.shuffle_train);
        assert!(!config.shuffle_eval);
        assert_eq!(config.parse_device().unwrap(), Device::Cpu);
        assert_eq!(TrainingConfig::alexnet().learning_rate, 1e-4);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ExperimentConfig::from_toml_str(
            r#"
            [training]
            epochs = 2
            seed = 7

            [data]
            image_size = 227
            normalize = [0.5, 0.5]
            "#,
        )
        .unwrap();
        assert_eq!(config.training.epochs, 2);
        assert_eq!(config.training.seed, Some(7));
        assert_eq!(config.training.batch_size, 100);
        assert_eq!(config.data, DataConfig::alexnet());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            ExperimentConfig::from_toml_str("[training]\nbatch_size = 0\n"),
            Err(Error::Config { .. })
        ));
        assert!(ExperimentConfig::from_toml_str("[training]\ndevice = \"tpu\"\n").is_err());
        assert!(ExperimentConfig::from_toml_str("[training]\nepochz = 3\n").is_err());
    }

    #[test]
    fn test_device_names() {
        assert_eq!(
            TrainingConfig::new().device("CUDA:1").parse_device().unwrap(),
            Device::Cuda(1)
        );
        assert!(TrainingConfig::new().device("cuda:x").validate().is_err());
        assert_eq!(
            TrainingConfig::new().device("gpu").select_device().unwrap(),
            Device::Cpu
        );
    }

    #[test]
    fn test_file_round_trip() {
        let config = ExperimentConfig::alexnet();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml_string().unwrap().as_bytes())
            .unwrap();
        assert_eq!(ExperimentConfig::from_file(file.path()).unwrap(), config);
        assert!(ExperimentConfig::from_file("/nonexistent/cnnkit.toml").is_err());
    }

    #[cfg(feature = "vision")]
    #[test]
    fn test_pipeline_from_config() {
        use cnnkit_data::Transform;
        use cnnkit_tensor::Tensor;

        let x = Tensor::full(&[3, 32, 32], 255.0);
        let y = DataConfig::alexnet().pipeline().apply(&x).unwrap();
        assert_eq!(y.shape(), &[3, 227, 227]);
    }

    #[cfg(feature = "vision")]
    #[test]
    fn test_iterators_follow_shuffle_flags() {
        use cnnkit_vision::SyntheticCIFAR10;

        let mut config = ExperimentConfig::alexnet();
        config.training = config.training.batch_size(4);
        config.data.image_size = 67;
        let (train, test) = config
            .iterators(SyntheticCIFAR10::new(6), SyntheticCIFAR10::new(2), Device::Cpu)
            .unwrap();
        assert!(train.is_shuffled());
        assert!(!test.is_shuffled());
        assert_eq!(train.max_iter(), 2);

        config.training.shuffle_eval = true;
        let (_, test) = config
            .iterators(SyntheticCIFAR10::new(6), SyntheticCIFAR10::new(2), Device::Cpu)
            .unwrap();
        assert!(test.is_shuffled());

        assert!(config
            .iterators(SyntheticCIFAR10::new(1), SyntheticCIFAR10::new(1), Device::Cuda(0))
            .is_err());
    }
}
