//! Image Transforms - Resizing and Preset Pipelines
//!
//! @version 0.1.0

use cnnkit_core::error::{Error, Result};
use cnnkit_data::{Compose, Normalize, ToFloat, Transform};
use cnnkit_tensor::Tensor;

// =============================================================================
// Resize
// =============================================================================

/// Resizes `[H, W]` or `[C, H, W]` images with bilinear interpolation.
///
/// Sample positions use pixel centres, so a resize to the same size is the
/// identity and edges are clamped rather than extrapolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resize {
    height: usize,
    width: usize,
}

impl Resize {
    /// Creates a new Resize transform.
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    /// Creates a square Resize transform.
    pub fn square(size: usize) -> Self {
        Self::new(size, size)
    }

    /// Output `(height, width)`.
    pub fn size(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}

/// Source coordinate and interpolation weight for one output position.
fn sample_points(old: usize, new: usize) -> Vec<(usize, usize, f32)> {
    let scale = old as f32 / new as f32;
    (0..new)
        .map(|i| {
            let src = ((i as f32 + 0.5) * scale - 0.5).max(0.0);
            let lo = (src.floor() as usize).min(old - 1);
            let hi = (lo + 1).min(old - 1);
            (lo, hi, src - lo as f32)
        })
        .collect()
}

impl Transform for Resize {
    fn apply(&self, input: &Tensor<f32>) -> Result<Tensor<f32>> {
        let shape = input.shape();
        let (channels, old_h, old_w) = match *shape {
            [h, w] => (1, h, w),
            [c, h, w] => (c, h, w),
            _ => {
                return Err(Error::invalid_shape(
                    shape,
                    "Resize expects [H, W] or [C, H, W]",
                ))
            }
        };
        if old_h == 0 || old_w == 0 || self.height == 0 || self.width == 0 {
            return Err(Error::invalid_shape(shape, "Resize needs non-empty images"));
        }
        let (new_h, new_w) = (self.height, self.width);
        let rows = sample_points(old_h, new_h);
        let cols = sample_points(old_w, new_w);

        let data = input.data();
        let mut out = Vec::with_capacity(channels * new_h * new_w);
        for c in 0..channels {
            let plane = &data[c * old_h * old_w..(c + 1) * old_h * old_w];
            for &(y0, y1, dy) in &rows {
                for &(x0, x1, dx) in &cols {
                    let top = plane[y0 * old_w + x0] * (1.0 - dx) + plane[y0 * old_w + x1] * dx;
                    let bottom = plane[y1 * old_w + x0] * (1.0 - dx) + plane[y1 * old_w + x1] * dx;
                    out.push(top * (1.0 - dy) + bottom * dy);
                }
            }
        }
        drop(data);

        let out_shape: Vec<usize> = if shape.len() == 2 {
            vec![new_h, new_w]
        } else {
            vec![channels, new_h, new_w]
        };
        Tensor::from_vec(out, &out_shape)?.to_device(input.device())
    }
}

// =============================================================================
// Preset Pipelines
// =============================================================================

/// Resize to 32x32 then rescale to `[0, 1]`, for [`LeNet5`](crate::LeNet5).
pub fn lenet_pipeline() -> Compose {
    Compose::default()
        .add(Resize::square(32))
        .add(ToFloat::new())
}

/// Resize to 227x227, rescale to `[0, 1]`, then map to `[-1, 1]`, for
/// [`AlexNet`](crate::AlexNet) and [`ZFNet`](crate::ZFNet).
pub fn alexnet_pipeline() -> Compose {
    pipeline(227, Some((0.5, 0.5)))
}

/// Resize to `size`, rescale to `[0, 1]`, and optionally z-score normalise.
pub fn pipeline(size: usize, normalize: Option<(f32, f32)>) -> Compose {
    let compose = Compose::default()
        .add(Resize::square(size))
        .add(ToFloat::new());
    match normalize {
        Some((mean, std)) => compose.add(Normalize::new(mean, std)),
        None => compose,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_resize_same_size_is_identity() {
        let x = Tensor::from_vec((0..12).map(|v| v as f32).collect(), &[3, 2, 2]).unwrap();
        let y = Resize::square(2).apply(&x).unwrap();
        assert_eq!(y.shape(), &[3, 2, 2]);
        assert_eq!(y.to_vec(), x.to_vec());
    }

    #[test]
    fn test_resize_upsample_interpolates() {
        let x = Tensor::from_vec(vec![0.0, 4.0], &[1, 2]).unwrap();
        let y = Resize::new(1, 4).apply(&x).unwrap().to_vec();
        // Output centres map to source 0, 0.25, 0.75, 1 (clamped at the edges).
        assert_relative_eq!(y[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(y[1], 1.0, epsilon = 1e-6);
        assert_relative_eq!(y[2], 3.0, epsilon = 1e-6);
        assert_relative_eq!(y[3], 4.0, epsilon = 1e-6);
    }

    #[test]
    fn test_resize_constant_image() {
        let x = Tensor::full(&[1, 28, 28], 7.0);
        let y = Resize::square(32).apply(&x).unwrap();
        assert_eq!(y.shape(), &[1, 32, 32]);
        assert!(y.to_vec().iter().all(|&v| (v - 7.0).abs() < 1e-5));
    }

    #[test]
    fn test_resize_rejects_batches() {
        let x = Tensor::<f32>::zeros(&[2, 1, 4, 4]);
        assert!(Resize::square(2).apply(&x).is_err());
    }

    #[test]
    fn test_presets() {
        let x = Tensor::full(&[3, 32, 32], 255.0);
        let y = alexnet_pipeline().apply(&x).unwrap();
        assert_eq!(y.shape(), &[3, 227, 227]);
        assert!(y.to_vec().iter().all(|&v| (v - 1.0).abs() < 1e-5));

        let x = Tensor::zeros(&[1, 28, 28]);
        let y = lenet_pipeline().apply(&x).unwrap();
        assert_eq!(y.shape(), &[1, 32, 32]);
        assert_eq!(lenet_pipeline().len(), 2);
    }
}
