//! Storage - Shared Buffers Behind Tensors
//!
//! Storage is reference-counted so reshapes and detached copies of a tensor
//! can share one buffer. Every buffer is tagged with the device it lives on.
//!
//! # Example
//! ```rust
//! use cnnkit_core::{Device, Storage};
//!
//! let storage = Storage::<f32>::zeros(100, Device::Cpu);
//! assert_eq!(storage.len(), 100);
//! ```
//!
//! @version 0.1.0

use core::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::device::Device;
use crate::dtype::Scalar;
use crate::error::{Error, Result};

// =============================================================================
// Storage Struct
// =============================================================================

/// Raw memory storage for tensor data.
#[derive(Debug)]
pub struct Storage<T: Scalar> {
    inner: Arc<RwLock<StorageInner<T>>>,
}

#[derive(Debug)]
struct StorageInner<T: Scalar> {
    data: Vec<T>,
    device: Device,
}

impl<T: Scalar> Storage<T> {
    /// Creates new storage with the given length, initialized to zero.
    #[must_use]
    pub fn zeros(len: usize, device: Device) -> Self {
        Self::from_vec(vec![T::default(); len], device)
    }

    /// Creates storage from an existing vector.
    #[must_use]
    pub fn from_vec(data: Vec<T>, device: Device) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StorageInner { data, device })),
        }
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().data.len()
    }

    /// Returns true if the storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the device this storage is on.
    #[must_use]
    pub fn device(&self) -> Device {
        self.inner.read().device
    }

    /// Returns true if this storage is uniquely owned (not shared).
    #[must_use]
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }

    /// Returns true if both handles point at the same buffer.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns a read guard over the data.
    #[must_use]
    pub fn as_slice(&self) -> StorageReadGuard<'_, T> {
        StorageReadGuard {
            guard: self.inner.read(),
        }
    }

    /// Returns a write guard over the data.
    #[must_use]
    pub fn as_slice_mut(&self) -> StorageWriteGuard<'_, T> {
        StorageWriteGuard {
            guard: self.inner.write(),
        }
    }

    /// Copies the elements into a fresh vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.inner.read().data.clone()
    }

    /// Copies data from another storage of equal length into this one.
    pub fn copy_from(&self, other: &Self) -> Result<()> {
        if self.ptr_eq(other) {
            return Ok(());
        }
        let src = other.inner.read();
        let mut dst = self.inner.write();
        if dst.data.len() != src.data.len() {
            return Err(Error::invalid_shape(
                &[src.data.len()],
                format!("cannot copy into storage of length {}", dst.data.len()),
            ));
        }
        dst.data.copy_from_slice(&src.data);
        Ok(())
    }

    /// Returns a deep copy of this storage on `device`.
    pub fn to_device(&self, device: Device) -> Result<Self> {
        device.ensure_available()?;
        let inner = self.inner.read();
        Ok(Self::from_vec(inner.data.clone(), device))
    }

    /// Returns a deep copy of this storage on the same device.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        let inner = self.inner.read();
        Self::from_vec(inner.data.clone(), inner.device)
    }
}

impl<T: Scalar> Clone for Storage<T> {
    /// Shallow clone: the new handle shares the buffer.
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

// =============================================================================
// Guards
// =============================================================================

/// Read guard dereferencing to the storage slice.
pub struct StorageReadGuard<'a, T: Scalar> {
    guard: parking_lot::RwLockReadGuard<'a, StorageInner<T>>,
}

impl<T: Scalar> Deref for StorageReadGuard<'_, T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.guard.data
    }
}

/// Write guard dereferencing to the mutable storage slice.
pub struct StorageWriteGuard<'a, T: Scalar> {
    guard: parking_lot::RwLockWriteGuard<'a, StorageInner<T>>,
}

impl<T: Scalar> Deref for StorageWriteGuard<'_, T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.guard.data
    }
}

impl<T: Scalar> DerefMut for StorageWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard.data
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_zeros() {
        let storage = Storage::<f32>::zeros(10, Device::Cpu);
        assert_eq!(storage.len(), 10);
        assert!(storage.as_slice().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_shallow_clone_shares_buffer() {
        let a = Storage::from_vec(vec![1.0f32, 2.0, 3.0], Device::Cpu);
        let b = a.clone();
        b.as_slice_mut()[0] = 9.0;
        assert_eq!(a.as_slice()[0], 9.0);
        assert!(a.ptr_eq(&b));
        assert!(!a.is_unique());
    }

    #[test]
    fn test_deep_clone_is_independent() {
        let a = Storage::from_vec(vec![1.0f32, 2.0], Device::Cpu);
        let b = a.deep_clone();
        b.as_slice_mut()[0] = 5.0;
        assert_eq!(a.as_slice()[0], 1.0);
    }

    #[test]
    fn test_copy_from_length_check() {
        let a = Storage::<f32>::zeros(3, Device::Cpu);
        let b = Storage::from_vec(vec![1.0f32, 2.0, 3.0], Device::Cpu);
        a.copy_from(&b).unwrap();
        assert_eq!(a.to_vec(), vec![1.0, 2.0, 3.0]);

        let c = Storage::<f32>::zeros(2, Device::Cpu);
        assert!(a.copy_from(&c).is_err());
    }

    #[test]
    fn test_to_unavailable_device() {
        let a = Storage::<f32>::zeros(3, Device::Cpu);
        assert!(a.to_device(Device::Cuda(0)).is_err());
        assert_eq!(a.to_device(Device::Cpu).unwrap().device(), Device::Cpu);
    }
}
