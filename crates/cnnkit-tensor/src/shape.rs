//! Shape and Strides - Tensor Dimension Management
//!
//! Shapes, row-major strides, broadcasting and reshape inference.
//!
//! @version 0.1.0

use smallvec::SmallVec;

use cnnkit_core::error::{Error, Result};

// =============================================================================
// Type Aliases
// =============================================================================

/// Shape type - dimensions of a tensor.
/// Uses `SmallVec` so shapes of up to six dimensions stay on the stack.
pub type Shape = SmallVec<[usize; 6]>;

/// Strides type - step sizes for each dimension.
pub type Strides = SmallVec<[usize; 6]>;

// =============================================================================
// Shape Utilities
// =============================================================================

/// Computes the total number of elements from a shape.
#[must_use]
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Computes row-major (C-order) strides for a shape.
#[must_use]
pub fn contiguous_strides(shape: &[usize]) -> Strides {
    let mut strides = Strides::with_capacity(shape.len());
    let mut stride = 1usize;
    for &dim in shape.iter().rev() {
        strides.push(stride);
        stride *= dim;
    }
    strides.reverse();
    strides
}

/// Computes the linear index from multi-dimensional indices.
#[must_use]
pub fn linear_index(indices: &[usize], strides: &[usize]) -> usize {
    debug_assert_eq!(indices.len(), strides.len());
    indices.iter().zip(strides).map(|(&i, &s)| i * s).sum()
}

/// Converts a linear index to multi-dimensional indices.
#[must_use]
pub fn unravel_index(mut linear: usize, shape: &[usize]) -> Vec<usize> {
    let mut indices = vec![0; shape.len()];
    for (i, &dim) in shape.iter().enumerate().rev() {
        indices[i] = linear % dim;
        linear /= dim;
    }
    indices
}

// =============================================================================
// Broadcasting
// =============================================================================

/// Computes the broadcast shape of two shapes.
///
/// Shapes are aligned from the right; dimensions are compatible if equal or
/// one of them is 1; missing dimensions are treated as 1.
pub fn broadcast_shape(shape1: &[usize], shape2: &[usize]) -> Result<Shape> {
    let max_ndim = shape1.len().max(shape2.len());
    let mut result = Shape::with_capacity(max_ndim);

    for i in 0..max_ndim {
        let d1 = if i < shape1.len() {
            shape1[shape1.len() - 1 - i]
        } else {
            1
        };
        let d2 = if i < shape2.len() {
            shape2[shape2.len() - 1 - i]
        } else {
            1
        };

        if d1 == d2 || d2 == 1 {
            result.push(d1);
        } else if d1 == 1 {
            result.push(d2);
        } else {
            return Err(Error::BroadcastError {
                shape1: shape1.to_vec(),
                shape2: shape2.to_vec(),
            });
        }
    }

    result.reverse();
    Ok(result)
}

/// Strides that read `shape` as if it had `target_shape` (0 on broadcast dims).
#[must_use]
pub fn broadcast_strides(shape: &[usize], target_shape: &[usize]) -> Strides {
    let strides = contiguous_strides(shape);
    let offset = target_shape.len() - shape.len();
    target_shape
        .iter()
        .enumerate()
        .map(|(i, _)| {
            if i < offset || shape[i - offset] == 1 {
                0
            } else {
                strides[i - offset]
            }
        })
        .collect()
}

// =============================================================================
// Shape Manipulation
// =============================================================================

/// Resolves a reshape target, inferring at most one `-1` dimension.
pub fn reshape(old_shape: &[usize], new_shape: &[isize]) -> Result<Shape> {
    let old_numel = numel(old_shape);
    let mut result = Shape::with_capacity(new_shape.len());
    let mut infer_idx = None;
    let mut known_numel = 1usize;

    for (i, &dim) in new_shape.iter().enumerate() {
        if dim == -1 {
            if infer_idx.is_some() {
                return Err(Error::invalid_operation("Can only have one -1 in reshape"));
            }
            infer_idx = Some(i);
            result.push(0);
        } else if dim < 0 {
            return Err(Error::invalid_operation("Invalid dimension in reshape"));
        } else {
            let d = dim as usize;
            known_numel *= d;
            result.push(d);
        }
    }

    if let Some(idx) = infer_idx {
        if known_numel == 0 || old_numel % known_numel != 0 {
            return Err(Error::invalid_shape(
                old_shape,
                format!("cannot infer -1 in reshape to {new_shape:?}"),
            ));
        }
        result[idx] = old_numel / known_numel;
    } else if known_numel != old_numel {
        return Err(Error::shape_mismatch("reshape", old_shape, &result));
    }

    Ok(result)
}

/// Output length of a sliding window: `(input + 2*pad - kernel) / stride + 1`.
///
/// Returns `None` when the window does not fit even once.
#[must_use]
pub fn window_output_size(input: usize, kernel: usize, stride: usize, pad: usize) -> Option<usize> {
    let padded = input + 2 * pad;
    if stride == 0 || kernel == 0 || padded < kernel {
        return None;
    }
    Some((padded - kernel) / stride + 1)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numel_and_strides() {
        assert_eq!(numel(&[2, 3, 4]), 24);
        assert_eq!(numel(&[]), 1);
        assert_eq!(contiguous_strides(&[2, 3, 4]).as_slice(), &[12, 4, 1]);
    }

    #[test]
    fn test_index_roundtrip() {
        let shape = [2, 3, 4];
        let strides = contiguous_strides(&shape);
        let idx = unravel_index(17, &shape);
        assert_eq!(idx, vec![1, 1, 1]);
        assert_eq!(linear_index(&idx, &strides), 17);
    }

    #[test]
    fn test_broadcast_shape() {
        assert_eq!(broadcast_shape(&[2, 3], &[3]).unwrap().as_slice(), &[2, 3]);
        assert_eq!(broadcast_shape(&[4, 1], &[1, 5]).unwrap().as_slice(), &[4, 5]);
        assert!(broadcast_shape(&[2, 3], &[4]).is_err());
    }

    #[test]
    fn test_broadcast_strides() {
        assert_eq!(broadcast_strides(&[3], &[2, 3]).as_slice(), &[0, 1]);
        assert_eq!(broadcast_strides(&[2, 1], &[2, 3]).as_slice(), &[1, 0]);
    }

    #[test]
    fn test_reshape_infer() {
        assert_eq!(reshape(&[4, 3, 2], &[4, -1]).unwrap().as_slice(), &[4, 6]);
        assert!(reshape(&[4, 3], &[5, -1]).is_err());
        assert!(reshape(&[4, 3], &[-1, -1]).is_err());
        assert!(matches!(
            reshape(&[4, 3], &[5, 2]),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_window_output_size() {
        assert_eq!(window_output_size(227, 11, 4, 0), Some(55));
        assert_eq!(window_output_size(55, 3, 2, 0), Some(27));
        assert_eq!(window_output_size(27, 5, 1, 2), Some(27));
        assert_eq!(window_output_size(3, 5, 1, 0), None);
    }
}
