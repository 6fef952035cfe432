//! Data Types - Tensor Element Types
//!
//! Tensors are generic over their element type. Training runs in `f32`;
//! `f64` is kept for finite-difference gradient checks, where the extra
//! precision matters.
//!
//! @version 0.1.0

use core::fmt::Debug;
use num_traits::{Float as NumFloat, Num, NumCast, One, Zero};

// =============================================================================
// DType Enum
// =============================================================================

/// Runtime representation of tensor data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DType {
    /// 32-bit floating point.
    #[default]
    F32,
    /// 64-bit floating point.
    F64,
}

impl DType {
    /// Returns the size in bytes of this data type.
    #[must_use]
    pub const fn size_of(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Returns the name of this data type as a string.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }
}

impl core::fmt::Display for DType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Scalar Traits
// =============================================================================

/// Trait for all scalar types that can be stored in a tensor.
pub trait Scalar: Copy + Clone + Debug + Default + Send + Sync + 'static {
    /// The runtime dtype for this scalar type.
    const DTYPE: DType;

    /// Returns the dtype for this type.
    #[must_use]
    fn dtype() -> DType {
        Self::DTYPE
    }
}

/// Trait for numeric types that support arithmetic operations.
pub trait Numeric: Scalar + Num + NumCast + PartialOrd + Zero + One {
    /// The zero value for this type.
    const ZERO: Self;
    /// The one value for this type.
    const ONE: Self;
}

/// Trait for floating point types.
pub trait Float: Numeric + NumFloat {
    /// Converts an `f64` constant into this type.
    fn from_f64(value: f64) -> Self;

    /// Converts this value into `f64`.
    fn to_f64_value(self) -> f64;
}

macro_rules! impl_float {
    ($ty:ty, $dtype:expr) => {
        impl Scalar for $ty {
            const DTYPE: DType = $dtype;
        }

        impl Numeric for $ty {
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;
        }

        impl Float for $ty {
            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            #[inline]
            fn to_f64_value(self) -> f64 {
                self as f64
            }
        }
    };
}

impl_float!(f32, DType::F32);
impl_float!(f64, DType::F64);

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dtype_properties() {
        assert_eq!(f32::dtype(), DType::F32);
        assert_eq!(f64::dtype(), DType::F64);
        assert_eq!(DType::F32.size_of(), 4);
        assert_eq!(DType::default(), DType::F32);
        assert_eq!(format!("{}", DType::F64), "f64");
    }

    #[test]
    fn test_float_conversions() {
        assert_relative_eq!(f32::from_f64(0.25), 0.25);
        assert_relative_eq!(2.5f32.to_f64_value(), 2.5);
        assert_relative_eq!(f32::from_f64(1.0 / 3.0), 1.0 / 3.0, epsilon = 1e-7);
        assert_eq!(<f32 as Numeric>::ONE, 1.0);
    }
}
