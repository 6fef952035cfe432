//! Tensor - Core N-Dimensional Array Type
//!
//! `Tensor` is a contiguous, row-major array over reference-counted storage.
//! Cloning a tensor or reshaping it shares the buffer; arithmetic allocates a
//! fresh one. In-place writes are limited to [`Tensor::assign`], which the
//! optimizer uses to update parameters.
//!
//! @version 0.1.0

use core::fmt;

use cnnkit_core::dtype::{Float, Numeric, Scalar};
use cnnkit_core::error::{Error, Result};
use cnnkit_core::storage::{Storage, StorageReadGuard};
use cnnkit_core::Device;
use rayon::prelude::*;

use crate::shape::{broadcast_shape, broadcast_strides, linear_index, numel, unravel_index, Shape};

// =============================================================================
// Tensor Struct
// =============================================================================

/// An N-dimensional array of numeric values.
#[derive(Clone)]
pub struct Tensor<T: Scalar> {
    /// Underlying data storage (reference-counted).
    pub(crate) storage: Storage<T>,
    /// Shape of the tensor (dimensions).
    pub(crate) shape: Shape,
}

impl<T: Scalar> Tensor<T> {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Creates a new tensor from storage with the given shape.
    pub fn from_storage(storage: Storage<T>, shape: &[usize]) -> Result<Self> {
        if numel(shape) != storage.len() {
            return Err(Error::shape_mismatch("tensor", &[storage.len()], shape));
        }
        Ok(Self {
            storage,
            shape: Shape::from_slice(shape),
        })
    }

    /// Creates a new tensor from a vector with the given shape.
    pub fn from_vec(data: Vec<T>, shape: &[usize]) -> Result<Self> {
        Self::from_storage(Storage::from_vec(data, Device::Cpu), shape)
    }

    /// Creates a new tensor from a slice with the given shape.
    pub fn from_slice(data: &[T], shape: &[usize]) -> Result<Self> {
        Self::from_vec(data.to_vec(), shape)
    }

    /// Creates a scalar tensor (0-dimensional).
    #[must_use]
    pub fn scalar(value: T) -> Self {
        Self {
            storage: Storage::from_vec(vec![value], Device::Cpu),
            shape: Shape::new(),
        }
    }

    /// Creates a tensor filled with `T::default()` (zero for numeric types).
    #[must_use]
    pub fn zeros(shape: &[usize]) -> Self {
        crate::creation::zeros(shape)
    }

    /// Creates a tensor filled with `value`.
    #[must_use]
    pub fn full(shape: &[usize], value: T) -> Self {
        crate::creation::full(shape, value)
    }

    /// Builds a tensor on `device` from already-laid-out data.
    pub(crate) fn with_device(data: Vec<T>, shape: &[usize], device: Device) -> Result<Self> {
        Self::from_storage(Storage::from_vec(data, device), shape)
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Returns the shape of the tensor.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the total number of elements.
    #[must_use]
    pub fn numel(&self) -> usize {
        numel(&self.shape)
    }

    /// Returns true if the tensor has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.numel() == 0
    }

    /// Returns true if this is a scalar (0-dimensional) tensor.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    /// Returns the device this tensor is on.
    #[must_use]
    pub fn device(&self) -> Device {
        self.storage.device()
    }

    /// Returns the underlying storage handle.
    #[must_use]
    pub fn storage(&self) -> &Storage<T> {
        &self.storage
    }

    /// Returns true if both tensors share one buffer.
    #[must_use]
    pub fn shares_storage(&self, other: &Self) -> bool {
        self.storage.ptr_eq(&other.storage)
    }

    // =========================================================================
    // Element Access
    // =========================================================================

    /// Borrows the elements in row-major order.
    #[must_use]
    pub fn data(&self) -> StorageReadGuard<'_, T> {
        self.storage.as_slice()
    }

    /// Copies the elements into a vector in row-major order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.storage.to_vec()
    }

    /// Gets the element at the given indices.
    pub fn get(&self, indices: &[usize]) -> Result<T> {
        if indices.len() != self.ndim() {
            return Err(Error::invalid_operation(format!(
                "expected {} indices, got {}",
                self.ndim(),
                indices.len()
            )));
        }
        for (&idx, &dim) in indices.iter().zip(self.shape.iter()) {
            if idx >= dim {
                return Err(Error::IndexOutOfBounds {
                    index: idx,
                    size: dim,
                });
            }
        }
        let strides = crate::shape::contiguous_strides(&self.shape);
        Ok(self.data()[linear_index(indices, &strides)])
    }

    /// Returns the single value of a one-element tensor.
    pub fn item(&self) -> Result<T> {
        if self.numel() != 1 {
            return Err(Error::invalid_operation(format!(
                "item() requires a single-element tensor, got shape {:?}",
                self.shape()
            )));
        }
        Ok(self.data()[0])
    }

    // =========================================================================
    // Shape Operations
    // =========================================================================

    /// Returns a tensor with a new shape sharing this tensor's storage.
    ///
    /// One dimension may be `-1` and is inferred from the element count.
    pub fn reshape(&self, new_shape: &[isize]) -> Result<Self> {
        let shape = crate::shape::reshape(&self.shape, new_shape)?;
        Ok(Self {
            storage: self.storage.clone(),
            shape,
        })
    }

    /// Collapses every dimension after the first: `[N, ...] -> [N, prod(...)]`.
    pub fn flatten_batch(&self) -> Result<Self> {
        match self.shape.first() {
            Some(&n) => self.reshape(&[n as isize, -1]),
            None => Err(Error::invalid_shape(&self.shape, "cannot flatten a scalar")),
        }
    }

    /// Transposes a 2D tensor.
    pub fn t(&self) -> Result<Self> {
        if self.ndim() != 2 {
            return Err(Error::invalid_shape(&self.shape, "t() expects a 2D tensor"));
        }
        let (rows, cols) = (self.shape[0], self.shape[1]);
        let src = self.data();
        let mut out = Vec::with_capacity(src.len());
        for c in 0..cols {
            for r in 0..rows {
                out.push(src[r * cols + c]);
            }
        }
        drop(src);
        Self::with_device(out, &[cols, rows], self.device())
    }

    // =========================================================================
    // Device and Copy
    // =========================================================================

    /// Returns a copy of this tensor on `device`.
    pub fn to_device(&self, device: Device) -> Result<Self> {
        if device == self.device() {
            return Ok(self.clone());
        }
        Ok(Self {
            storage: self.storage.to_device(device)?,
            shape: self.shape.clone(),
        })
    }

    /// Returns a copy that does not share storage with this tensor.
    #[must_use]
    pub fn clone_deep(&self) -> Self {
        Self {
            storage: self.storage.deep_clone(),
            shape: self.shape.clone(),
        }
    }

    /// Overwrites this tensor's elements with `other`'s, in place.
    ///
    /// Every handle sharing the storage observes the new values.
    pub fn assign(&self, other: &Self) -> Result<()> {
        if self.shape != other.shape {
            return Err(Error::shape_mismatch("assign", &self.shape, &other.shape));
        }
        self.storage.copy_from(&other.storage)
    }

    /// Applies `f` to every element.
    #[must_use]
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(T) -> T,
    {
        let out: Vec<T> = self.data().iter().map(|&x| f(x)).collect();
        Self {
            storage: Storage::from_vec(out, self.device()),
            shape: self.shape.clone(),
        }
    }

    /// Combines two same-shaped tensors elementwise.
    pub fn zip_map<F>(&self, other: &Self, f: F) -> Result<Self>
    where
        F: Fn(T, T) -> T,
    {
        if self.shape != other.shape {
            return Err(Error::shape_mismatch("zip_map", &self.shape, &other.shape));
        }
        let a = self.data();
        let b = other.data();
        let out: Vec<T> = a.iter().zip(b.iter()).map(|(&x, &y)| f(x, y)).collect();
        drop((a, b));
        Self::with_device(out, &self.shape, self.device())
    }

    /// Applies `f` with broadcasting between the two operands.
    fn broadcast_with<F>(&self, other: &Self, f: F) -> Result<Self>
    where
        F: Fn(T, T) -> T,
    {
        if self.shape == other.shape {
            return self.zip_map(other, f);
        }
        let out_shape = broadcast_shape(&self.shape, &other.shape)?;
        let a_strides = broadcast_strides(&self.shape, &out_shape);
        let b_strides = broadcast_strides(&other.shape, &out_shape);
        let a = self.data();
        let b = other.data();
        let total = numel(&out_shape);
        let mut out = Vec::with_capacity(total);
        for i in 0..total {
            let idx = unravel_index(i, &out_shape);
            out.push(f(
                a[linear_index(&idx, &a_strides)],
                b[linear_index(&idx, &b_strides)],
            ));
        }
        drop((a, b));
        Self::with_device(out, &out_shape, self.device())
    }
}

// =============================================================================
// Numeric Operations
// =============================================================================

impl<T: Numeric> Tensor<T> {
    /// Creates a tensor filled with ones.
    #[must_use]
    pub fn ones(shape: &[usize]) -> Self {
        crate::creation::full(shape, T::ONE)
    }

    /// Element-wise addition with broadcasting.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.broadcast_with(other, |a, b| a + b)
    }

    /// Element-wise subtraction with broadcasting.
    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.broadcast_with(other, |a, b| a - b)
    }

    /// Element-wise multiplication with broadcasting.
    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.broadcast_with(other, |a, b| a * b)
    }

    /// Element-wise division with broadcasting.
    pub fn div(&self, other: &Self) -> Result<Self> {
        self.broadcast_with(other, |a, b| a / b)
    }

    /// Adds a scalar to every element.
    #[must_use]
    pub fn add_scalar(&self, scalar: T) -> Self {
        self.map(|x| x + scalar)
    }

    /// Multiplies every element by a scalar.
    #[must_use]
    pub fn mul_scalar(&self, scalar: T) -> Self {
        self.map(|x| x * scalar)
    }

    /// Element-wise negation.
    #[must_use]
    pub fn neg(&self) -> Self {
        self.map(|x| T::ZERO - x)
    }

    /// Sum of all elements as a scalar tensor.
    #[must_use]
    pub fn sum(&self) -> Self {
        let total = self.data().iter().fold(T::ZERO, |acc, &x| acc + x);
        Self::scalar(total)
    }

    /// Sums a broadcast result back down to `target` shape.
    ///
    /// This is the adjoint of broadcasting `target` up to `self.shape()`.
    pub fn sum_to_shape(&self, target: &[usize]) -> Result<Self> {
        if self.shape() == target {
            return Ok(self.clone());
        }
        let check = broadcast_shape(target, &self.shape)?;
        if check.as_slice() != self.shape() {
            return Err(Error::BroadcastError {
                shape1: target.to_vec(),
                shape2: self.shape.to_vec(),
            });
        }
        let strides = broadcast_strides(target, &self.shape);
        let mut out = vec![T::ZERO; numel(target)];
        let src = self.data();
        for (i, &v) in src.iter().enumerate() {
            let idx = unravel_index(i, &self.shape);
            let dst = linear_index(&idx, &strides);
            out[dst] = out[dst] + v;
        }
        drop(src);
        Self::with_device(out, target, self.device())
    }

    /// Index of the largest element in each row of a 2D tensor.
    pub fn argmax_rows(&self) -> Result<Vec<usize>> {
        if self.ndim() != 2 {
            return Err(Error::invalid_shape(
                &self.shape,
                "argmax_rows expects [rows, cols]",
            ));
        }
        let cols = self.shape[1];
        if cols == 0 {
            return Err(Error::EmptyTensor);
        }
        let data = self.data();
        Ok(data
            .chunks(cols)
            .map(|row| {
                let mut best = 0;
                for (j, v) in row.iter().enumerate() {
                    if *v > row[best] {
                        best = j;
                    }
                }
                best
            })
            .collect())
    }

    /// Matrix multiplication of 2D tensors: `[m, k] @ [k, n] -> [m, n]`.
    ///
    /// Output rows are computed in parallel.
    pub fn matmul(&self, other: &Self) -> Result<Self> {
        if self.ndim() != 2 || other.ndim() != 2 {
            return Err(Error::invalid_operation(format!(
                "matmul requires 2D tensors, got {:?} and {:?}",
                self.shape(),
                other.shape()
            )));
        }
        let (m, k) = (self.shape[0], self.shape[1]);
        let (k2, n) = (other.shape[0], other.shape[1]);
        if k != k2 {
            return Err(Error::shape_mismatch("matmul", &[m, k], &[k2, n]));
        }

        let a_guard = self.data();
        let b_guard = other.data();
        let (a, b): (&[T], &[T]) = (&a_guard, &b_guard);
        let mut c = vec![T::ZERO; m * n];
        if n > 0 {
            c.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
                let a_row = &a[i * k..(i + 1) * k];
                for (p, &a_ip) in a_row.iter().enumerate() {
                    let b_row = &b[p * n..(p + 1) * n];
                    for (c_ij, &b_pj) in row.iter_mut().zip(b_row) {
                        *c_ij = *c_ij + a_ip * b_pj;
                    }
                }
            });
        }
        drop((a_guard, b_guard));
        Self::with_device(c, &[m, n], self.device())
    }
}

// =============================================================================
// Floating Point Operations
// =============================================================================

impl<T: Float> Tensor<T> {
    /// Creates a tensor from the standard normal distribution.
    #[must_use]
    pub fn randn(shape: &[usize]) -> Self {
        crate::creation::randn(shape)
    }

    /// Creates a tensor uniformly distributed in `[low, high)`.
    #[must_use]
    pub fn uniform(shape: &[usize], low: T, high: T) -> Self {
        crate::creation::uniform(shape, low, high)
    }

    /// Mean of all elements as a scalar tensor.
    pub fn mean(&self) -> Result<Self> {
        if self.is_empty() {
            return Err(Error::EmptyTensor);
        }
        let n = T::from_f64(self.numel() as f64);
        let total = self.data().iter().fold(T::ZERO, |acc, &x| acc + x);
        Ok(Self::scalar(total / n))
    }

    /// Rectified linear unit.
    #[must_use]
    pub fn relu(&self) -> Self {
        self.map(|x| if x > T::ZERO { x } else { T::ZERO })
    }

    /// Hyperbolic tangent.
    #[must_use]
    pub fn tanh(&self) -> Self {
        self.map(num_traits::Float::tanh)
    }

    /// Element-wise exponential.
    #[must_use]
    pub fn exp(&self) -> Self {
        self.map(num_traits::Float::exp)
    }

    /// Element-wise natural logarithm.
    #[must_use]
    pub fn ln(&self) -> Self {
        self.map(num_traits::Float::ln)
    }

    /// Element-wise square root.
    #[must_use]
    pub fn sqrt(&self) -> Self {
        self.map(num_traits::Float::sqrt)
    }

    /// Returns true if every element is finite.
    #[must_use]
    pub fn all_finite(&self) -> bool {
        self.data().iter().all(|x| x.is_finite())
    }
}

// =============================================================================
// Display Implementation
// =============================================================================

impl<T: Scalar> fmt::Debug for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor(shape={:?}, device={}", self.shape(), self.device())?;
        if self.numel() <= 10 {
            write!(f, ", data={:?}", &*self.data())?;
        }
        write!(f, ")")
    }
}

impl<T: Scalar + fmt::Display> fmt::Display for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data();
        if self.is_scalar() {
            write!(f, "{}", data[0])
        } else if self.ndim() == 1 {
            write!(f, "[")?;
            for (i, val) in data.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{val}")?;
            }
            write!(f, "]")
        } else {
            write!(f, "Tensor(shape={:?})", self.shape())
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec() {
        let t = Tensor::<f32>::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.numel(), 6);
        assert_eq!(t.get(&[1, 2]).unwrap(), 6.0);
        assert!(t.get(&[2, 0]).is_err());
        assert!(Tensor::<f32>::from_vec(vec![1.0], &[2]).is_err());
    }

    #[test]
    fn test_reshape_shares_storage() {
        let t = Tensor::<f32>::from_vec((0..24).map(|x| x as f32).collect(), &[2, 3, 4]).unwrap();
        let r = t.flatten_batch().unwrap();
        assert_eq!(r.shape(), &[2, 12]);
        assert!(r.shares_storage(&t));
    }

    #[test]
    fn test_transpose() {
        let t = Tensor::<f32>::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        let tt = t.t().unwrap();
        assert_eq!(tt.shape(), &[3, 2]);
        assert_eq!(tt.to_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_arithmetic() {
        let a = Tensor::<f32>::from_vec(vec![1.0, 2.0, 3.0], &[3]).unwrap();
        let b = Tensor::<f32>::from_vec(vec![4.0, 5.0, 6.0], &[3]).unwrap();
        assert_eq!(a.add(&b).unwrap().to_vec(), vec![5.0, 7.0, 9.0]);
        assert_eq!(b.sub(&a).unwrap().to_vec(), vec![3.0, 3.0, 3.0]);
        assert_eq!(a.mul(&b).unwrap().to_vec(), vec![4.0, 10.0, 18.0]);
        assert_eq!(a.mul_scalar(2.0).to_vec(), vec![2.0, 4.0, 6.0]);
        assert_eq!(a.neg().to_vec(), vec![-1.0, -2.0, -3.0]);
    }

    #[test]
    fn test_broadcasting_and_reduction() {
        let a = Tensor::<f32>::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        let bias = Tensor::<f32>::from_vec(vec![10.0, 20.0, 30.0], &[3]).unwrap();
        let c = a.add(&bias).unwrap();
        assert_eq!(c.to_vec(), vec![11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);
        let back = c.sum_to_shape(&[3]).unwrap();
        assert_eq!(back.to_vec(), vec![25.0, 47.0, 69.0]);
    }

    #[test]
    fn test_matmul() {
        let a = Tensor::<f32>::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
        let b = Tensor::<f32>::from_vec(vec![5.0, 6.0, 7.0, 8.0], &[2, 2]).unwrap();
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.to_vec(), vec![19.0, 22.0, 43.0, 50.0]);

        let bad = Tensor::<f32>::zeros(&[3, 2]);
        assert!(matches!(a.matmul(&bad), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_assign_is_visible_through_clones() {
        let a = Tensor::<f32>::zeros(&[2]);
        let alias = a.clone();
        a.assign(&Tensor::from_vec(vec![1.0, 2.0], &[2]).unwrap()).unwrap();
        assert_eq!(alias.to_vec(), vec![1.0, 2.0]);
        assert!(a.assign(&Tensor::zeros(&[3])).is_err());
    }

    #[test]
    fn test_argmax_rows_and_mean() {
        let t = Tensor::<f32>::from_vec(vec![0.1, 0.8, 0.1, 0.9, 0.05, 0.05], &[2, 3]).unwrap();
        assert_eq!(t.argmax_rows().unwrap(), vec![1, 0]);
        let m = t.mean().unwrap().item().unwrap();
        assert!((m - 2.0 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_to_device() {
        let t = Tensor::<f32>::zeros(&[2]);
        assert!(t.to_device(Device::Cuda(0)).is_err());
        assert_eq!(t.to_device(Device::Cpu).unwrap().device(), Device::Cpu);
    }
}
