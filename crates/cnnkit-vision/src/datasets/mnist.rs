//! MNIST Dataset - Handwritten Digit Recognition
//!
//! Reads the IDX files of the MNIST distribution, gzipped or raw. Pixels are
//! yielded as raw intensities in `[0, 255]`; rescaling is left to the
//! transform pipeline.
//!
//! @version 0.1.0

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::GzDecoder;
use tracing::debug;

use cnnkit_core::error::{Error, Result};
use cnnkit_data::Dataset;
use cnnkit_tensor::Tensor;

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

// =============================================================================
// MNIST Dataset
// =============================================================================

/// The MNIST dataset of handwritten digits.
///
/// Items are `([1, rows, cols] image, scalar label)`.
#[derive(Debug)]
pub struct MNIST {
    pixels: Vec<u8>,
    labels: Vec<u8>,
    rows: usize,
    cols: usize,
    train: bool,
}

impl MNIST {
    /// Loads the training or test split from `root`.
    ///
    /// Expected files, each optionally with a `.gz` suffix:
    /// - `train-images-idx3-ubyte` and `train-labels-idx1-ubyte`
    /// - `t10k-images-idx3-ubyte` and `t10k-labels-idx1-ubyte`
    pub fn new<P: AsRef<Path>>(root: P, train: bool) -> Result<Self> {
        let root = root.as_ref();
        let (images_file, labels_file) = if train {
            ("train-images-idx3-ubyte", "train-labels-idx1-ubyte")
        } else {
            ("t10k-images-idx3-ubyte", "t10k-labels-idx1-ubyte")
        };
        let dataset = Self::from_readers(
            open_idx(root, images_file)?,
            open_idx(root, labels_file)?,
            train,
        )?;
        debug!(
            root = %root.display(),
            train,
            samples = dataset.len(),
            "loaded MNIST"
        );
        Ok(dataset)
    }

    /// Decodes an already opened (and decompressed) pair of IDX streams.
    pub fn from_readers<I: Read, L: Read>(mut images: I, mut labels: L, train: bool) -> Result<Self> {
        let (count, rows, cols) = read_images_header(&mut images)?;
        let mut pixels = vec![0u8; count * rows * cols];
        images.read_exact(&mut pixels)?;

        let label_count = read_header(&mut labels, LABELS_MAGIC)?;
        let mut label_bytes = vec![0u8; label_count];
        labels.read_exact(&mut label_bytes)?;

        if count != label_count {
            return Err(Error::data(format!(
                "MNIST image count ({count}) does not match label count ({label_count})"
            )));
        }
        Ok(Self {
            pixels,
            labels: label_bytes,
            rows,
            cols,
            train,
        })
    }

    /// Returns whether this is the training split.
    pub fn is_train(&self) -> bool {
        self.train
    }

    /// Number of classes (digits 0-9).
    pub fn num_classes(&self) -> usize {
        10
    }

    /// Image `(rows, cols)`.
    pub fn image_size(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

fn read_header<R: Read>(reader: &mut R, magic: u32) -> Result<usize> {
    let found = reader.read_u32::<BigEndian>()?;
    if found != magic {
        return Err(Error::data(format!(
            "invalid IDX magic number {found}, expected {magic}"
        )));
    }
    Ok(reader.read_u32::<BigEndian>()? as usize)
}

fn read_images_header<R: Read>(reader: &mut R) -> Result<(usize, usize, usize)> {
    let count = read_header(reader, IMAGES_MAGIC)?;
    let rows = reader.read_u32::<BigEndian>()? as usize;
    let cols = reader.read_u32::<BigEndian>()? as usize;
    Ok((count, rows, cols))
}

/// Opens `root/name.gz` through a gzip decoder, or `root/name` as is.
fn open_idx(root: &Path, name: &str) -> Result<Box<dyn Read>> {
    let gz: PathBuf = root.join(format!("{name}.gz"));
    if gz.exists() {
        return Ok(Box::new(GzDecoder::new(BufReader::new(File::open(gz)?))));
    }
    let raw = root.join(name);
    if raw.exists() {
        return Ok(Box::new(BufReader::new(File::open(raw)?)));
    }
    Err(Error::data(format!(
        "could not find {name} or {name}.gz in {}",
        root.display()
    )))
}

impl Dataset for MNIST {
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
        let size = self.rows * self.cols;
        let image = self.pixels[index * size..(index + 1) * size]
            .iter()
            .map(|&b| f32::from(b))
            .collect();
        Ok((
            Tensor::from_vec(image, &[1, self.rows, self.cols])?,
            Tensor::scalar(f32::from(label)),
        ))
    }
}

// =============================================================================
// Synthetic MNIST
// =============================================================================

/// A deterministic MNIST stand-in for tests and demos without files.
///
/// Sample `i` has label `i % 10` and a radial blob whose width depends on
/// the label, plus index-seeded noise. Pixel range is `[0, 255]`.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticMNIST {
    size: usize,
}

impl SyntheticMNIST {
    /// Creates a synthetic dataset with `size` samples.
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    /// 100 samples.
    pub fn small() -> Self {
        Self::new(100)
    }
}

impl Dataset for SyntheticMNIST {
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
        let label = (index % 10) as u8;
        let seed = index as u32;
        let width = 50.0 + f32::from(label) * 10.0;

        let image = (0..28 * 28)
            .map(|i| {
                let noise = (seed.wrapping_mul(1_103_515_245).wrapping_add(12_345 + i as u32) % 256)
                    as f32
                    / 255.0;
                let (y, x) = ((i / 28) as f32 - 14.0, (i % 28) as f32 - 14.0);
                let blob = (-(y * y + x * x) / width).exp();
                ((noise * 0.3 + blob * 0.7).clamp(0.0, 1.0) * 255.0).round()
            })
            .collect();
        Ok((
            Tensor::from_vec(image, &[1, 28, 28])?,
            Tensor::scalar(f32::from(label)),
        ))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn idx_images(count: u32, rows: u32, cols: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(IMAGES_MAGIC).unwrap();
        buf.write_u32::<BigEndian>(count).unwrap();
        buf.write_u32::<BigEndian>(rows).unwrap();
        buf.write_u32::<BigEndian>(cols).unwrap();
        buf.extend((0..count * rows * cols).map(|v| (v % 256) as u8));
        buf
    }

    fn idx_labels(labels: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(LABELS_MAGIC).unwrap();
        buf.write_u32::<BigEndian>(labels.len() as u32).unwrap();
        buf.extend_from_slice(labels);
        buf
    }

    #[test]
    fn test_reads_raw_and_gzipped_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("train-images-idx3-ubyte"), idx_images(3, 2, 2)).unwrap();
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(&idx_labels(&[7, 1, 4])).unwrap();
        std::fs::write(
            dir.path().join("train-labels-idx1-ubyte.gz"),
            gz.finish().unwrap(),
        )
        .unwrap();

        let ds = MNIST::new(dir.path(), true).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.image_size(), (2, 2));
        assert!(ds.is_train());

        let (x, y) = ds.get(1).unwrap();
        assert_eq!(x.shape(), &[1, 2, 2]);
        assert_eq!(x.to_vec(), vec![4.0, 5.0, 6.0, 7.0]);
        assert_eq!(y.item().unwrap(), 1.0);
        assert!(ds.get(3).is_err());
    }

    #[test]
    fn test_rejects_bad_magic_and_count_mismatch() {
        let mut bad = idx_images(1, 2, 2);
        bad[3] = 0;
        let err = MNIST::from_readers(&bad[..], &idx_labels(&[0])[..], false).unwrap_err();
        assert!(matches!(err, Error::Data { .. }));

        let err =
            MNIST::from_readers(&idx_images(2, 2, 2)[..], &idx_labels(&[0])[..], false).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            MNIST::new(dir.path(), false),
            Err(Error::Data { .. })
        ));
    }

    #[test]
    fn test_synthetic_mnist() {
        let ds = SyntheticMNIST::small();
        assert_eq!(ds.len(), 100);
        let (x, y) = ds.get(13).unwrap();
        assert_eq!(x.shape(), &[1, 28, 28]);
        assert_eq!(y.item().unwrap(), 3.0);
        assert!(x.to_vec().iter().all(|&v| (0.0..=255.0).contains(&v)));
        assert_eq!(ds.get(13).unwrap().0.to_vec(), x.to_vec());
    }
}
