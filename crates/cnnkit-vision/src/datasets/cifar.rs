//! CIFAR-10 Dataset - Object Recognition
//!
//! Reads the binary distribution (`cifar-10-batches-bin`). Each record is one
//! label byte followed by 3072 pixel bytes in R, G, B planes of 32x32.
//!
//! @version 0.1.0

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use tracing::debug;

use cnnkit_core::error::{Error, Result};
use cnnkit_data::Dataset;
use cnnkit_tensor::Tensor;

const SIDE: usize = 32;
const IMAGE_BYTES: usize = 3 * SIDE * SIDE;
const RECORD_BYTES: usize = 1 + IMAGE_BYTES;

// =============================================================================
// CIFAR-10 Dataset
// =============================================================================

/// The CIFAR-10 dataset.
///
/// Items are `([3, 32, 32] image in [0, 255], scalar label)`.
#[derive(Debug)]
pub struct CIFAR10 {
    pixels: Vec<u8>,
    labels: Vec<u8>,
    train: bool,
}

impl CIFAR10 {
    /// Class names in label order.
    pub const CLASSES: [&'static str; 10] = [
        "airplane",
        "automobile",
        "bird",
        "cat",
        "deer",
        "dog",
        "frog",
        "horse",
        "ship",
        "truck",
    ];

    /// Loads the training (`data_batch_1..5.bin`) or test (`test_batch.bin`)
    /// split from `root`, or from `root/cifar-10-batches-bin` if present.
    pub fn new<P: AsRef<Path>>(root: P, train: bool) -> Result<Self> {
        let mut root = root.as_ref().to_path_buf();
        let nested = root.join("cifar-10-batches-bin");
        if nested.is_dir() {
            root = nested;
        }
        let files: Vec<String> = if train {
            (1..=5).map(|i| format!("data_batch_{i}.bin")).collect()
        } else {
            vec!["test_batch.bin".to_string()]
        };

        let mut dataset = Self {
            pixels: Vec::new(),
            labels: Vec::new(),
            train,
        };
        for name in &files {
            let path = root.join(name);
            let file = File::open(&path)
                .map_err(|e| Error::data(format!("could not open {}: {e}", path.display())))?;
            dataset.read_records(BufReader::new(file))?;
        }
        debug!(
            root = %root.display(),
            train,
            samples = dataset.len(),
            "loaded CIFAR-10"
        );
        Ok(dataset)
    }

    /// Decodes records from one batch stream.
    pub fn from_reader<R: Read>(reader: R, train: bool) -> Result<Self> {
        let mut dataset = Self {
            pixels: Vec::new(),
            labels: Vec::new(),
            train,
        };
        dataset.read_records(reader)?;
        Ok(dataset)
    }

    fn read_records<R: Read>(&mut self, mut reader: R) -> Result<()> {
        let mut record = [0u8; RECORD_BYTES];
        loop {
            let mut filled = 0;
            while filled < RECORD_BYTES {
                match reader.read(&mut record[filled..]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(e) => return Err(e.into()),
                }
            }
            match filled {
                0 => return Ok(()),
                RECORD_BYTES => {}
                partial => {
                    return Err(Error::data(format!(
                        "truncated CIFAR-10 record: {partial} of {RECORD_BYTES} bytes"
                    )))
                }
            }
            if record[0] >= 10 {
                return Err(Error::data(format!("invalid CIFAR-10 label {}", record[0])));
            }
            self.labels.push(record[0]);
            self.pixels.extend_from_slice(&record[1..]);
        }
    }

    /// Returns whether this is the training split.
    pub fn is_train(&self) -> bool {
        self.train
    }

    /// Number of classes.
    pub fn num_classes(&self) -> usize {
        Self::CLASSES.len()
    }
}

impl Dataset for CIFAR10 {
    type Item = (Tensor<f32>, Tensor<f32>);

    fn len(&self) -> usize {
        self.labels.len()
    }

    fn get(&self, index: usize) -> Result<Self::Item> {
        let Some(&label) = self.labels.get(index) else {
            return Err(Error::IndexOutOfBounds {
                index,
                size: self.len(),
            });
        };
        let image = self.pixels[index * IMAGE_BYTES..(index + 1) * IMAGE_BYTES]
            .iter()
            .map(|&b| f32::from(b))
            .collect();
        Ok((
            Tensor::from_vec(image, &[3, SIDE, SIDE])?,
            Tensor::scalar(f32::from(label)),
        ))
    }
}

// =============================================================================
// Synthetic CIFAR-10
// =============================================================================

/// A deterministic CIFAR-10 stand-in for tests and demos without files.
///
/// Sample `i` has label `i % 10`: a class-coloured radial pattern with
/// index-seeded noise, in `[0, 255]`.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticCIFAR10 {
    size: usize,
}

impl SyntheticCIFAR10 {
    /// Creates a synthetic dataset with `size` samples.
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    /// 100 samples.
    pub fn small() -> Self {
        Self::new(100)
    }
}

const CLASS_COLOURS: [[f32; 3]; 10] = [
    [0.8, 0.2, 0.2],
    [0.2, 0.2, 0.8],
    [0.2, 0.8, 0.2],
    [0.8, 0.5, 0.2],
    [0.5, 0.3, 0.1],
    [0.7, 0.7, 0.2],
    [0.2, 0.6, 0.2],
    [0.6, 0.4, 0.2],
    [0.3, 0.3, 0.3],
    [0.5, 0.5, 0.8],
];

impl Dataset for SyntheticCIFAR10 {
    type Item = (Tensor<f32>, Tensor<f32>);

    fn len(&self) -> usize {
        self.size
    }

    fn get(&self, index: usize) -> Result<Self::Item> {
        if index >= self.size {
            return Err(Error::IndexOutOfBounds {
                index,
                size: self.size,
            });
        }
        let label = index % 10;
        let seed = index as u32;
        let half = SIDE as f32 / 2.0;

        let mut image = Vec::with_capacity(IMAGE_BYTES);
        for (c, &base) in CLASS_COLOURS[label].iter().enumerate() {
            for i in 0..SIDE * SIDE {
                let noise_seed = seed
                    .wrapping_mul(1_103_515_245)
                    .wrapping_add(12_345 + (c * SIDE * SIDE + i) as u32);
                let noise = ((noise_seed % 256) as f32 / 255.0 - 0.5) * 0.3;
                let y = ((i / SIDE) as f32 - half) / half;
                let x = ((i % SIDE) as f32 - half) / half;
                let pattern = (1.0 - (x * x + y * y).sqrt()).max(0.0);
                let value = base * (0.5 + 0.5 * pattern) + noise;
                image.push((value.clamp(0.0, 1.0) * 255.0).round());
            }
        }
        Ok((
            Tensor::from_vec(image, &[3, SIDE, SIDE])?,
            Tensor::scalar(label as f32),
        ))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(label: u8, fill: u8) -> Vec<u8> {
        let mut r = vec![label];
        r.extend(std::iter::repeat(fill).take(IMAGE_BYTES));
        r
    }

    #[test]
    fn test_reads_test_batch_from_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("cifar-10-batches-bin");
        std::fs::create_dir(&nested).unwrap();
        let mut bytes = record(3, 10);
        bytes.extend(record(9, 200));
        std::fs::write(nested.join("test_batch.bin"), bytes).unwrap();

        let ds = CIFAR10::new(dir.path(), false).unwrap();
        assert_eq!(ds.len(), 2);
        assert!(!ds.is_train());
        let (x, y) = ds.get(1).unwrap();
        assert_eq!(x.shape(), &[3, 32, 32]);
        assert!(x.to_vec().iter().all(|&v| v == 200.0));
        assert_eq!(y.item().unwrap(), 9.0);
        assert_eq!(CIFAR10::CLASSES[9], "truck");
    }

    #[test]
    fn test_missing_training_batches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data_batch_1.bin"), record(0, 0)).unwrap();
        let err = CIFAR10::new(dir.path(), true).unwrap_err();
        assert!(err.to_string().contains("data_batch_2.bin"));
    }

    #[test]
    fn test_rejects_truncated_and_bad_label() {
        let mut bytes = record(1, 0);
        bytes.truncate(100);
        assert!(CIFAR10::from_reader(&bytes[..], true).is_err());
        assert!(CIFAR10::from_reader(&record(12, 0)[..], true).is_err());
        assert_eq!(CIFAR10::from_reader(&[0u8; 0][..], true).unwrap().len(), 0);
    }

    #[test]
    fn test_synthetic_cifar10() {
        let ds = SyntheticCIFAR10::new(25);
        let (x, y) = ds.get(21).unwrap();
        assert_eq!(x.shape(), &[3, 32, 32]);
        assert_eq!(y.item().unwrap(), 1.0);
        assert!(x.to_vec().iter().all(|&v| (0.0..=255.0).contains(&v)));
        assert!(ds.get(25).is_err());
    }
}
