//! Error Types - cnnkit Error Handling
//!
//! One error type shared by every crate in the workspace. Errors raised by a
//! layer carry the layer name and the offending shapes so a failed forward
//! pass can be diagnosed from the message alone.
//!
//! @version 0.1.0

use thiserror::Error;

use crate::device::Device;

// =============================================================================
// Error Types
// =============================================================================

/// The main error type for cnnkit operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Shape mismatch between a layer's expectation and its input.
    #[error("Shape mismatch in {layer}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Layer or operation that rejected the input.
        layer: String,
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape.
        actual: Vec<usize>,
    },

    /// A shape that cannot be used for the requested operation.
    #[error("Invalid shape {shape:?}: {message}")]
    InvalidShape {
        /// The rejected shape.
        shape: Vec<usize>,
        /// Why it was rejected.
        message: String,
    },

    /// Broadcasting failed between shapes.
    #[error("Cannot broadcast shapes {shape1:?} and {shape2:?}")]
    BroadcastError {
        /// The first shape.
        shape1: Vec<usize>,
        /// The second shape.
        shape2: Vec<usize>,
    },

    /// Index out of bounds.
    #[error("Index out of bounds: index {index} for dimension of size {size}")]
    IndexOutOfBounds {
        /// The invalid index.
        index: usize,
        /// The size of the dimension.
        size: usize,
    },

    /// Device not available.
    #[error("Device not available: {device}")]
    DeviceNotAvailable {
        /// The unavailable device.
        device: Device,
    },

    /// Invalid operation for the given tensor.
    #[error("Invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Operation not supported on empty tensor.
    #[error("Operation not supported on empty tensor")]
    EmptyTensor,

    /// Gradient computation error.
    #[error("Gradient error: {message}")]
    GradientError {
        /// Description of the gradient error.
        message: String,
    },

    /// `update` was called on an optimizer that has no model bound.
    #[error("Optimizer {optimizer} is not bound to a model; call bind() before update()")]
    OptimizerNotBound {
        /// Optimizer name.
        optimizer: &'static str,
    },

    /// A phase consumed a different number of batches than its iterator reported.
    #[error("{phase} phase ran {actual} steps but the iterator reported {expected}")]
    StepCountMismatch {
        /// Phase name ("train" or "eval").
        phase: &'static str,
        /// Steps reported by the iterator.
        expected: usize,
        /// Steps actually taken.
        actual: usize,
    },

    /// Dataset read or decode failure.
    #[error("Data error: {message}")]
    Data {
        /// Description of the failure.
        message: String,
    },

    /// Configuration parse failure.
    #[error("Config error: {message}")]
    Config {
        /// Description of the failure.
        message: String,
    },
}

// =============================================================================
// Result Type
// =============================================================================

/// A specialized Result type for cnnkit operations.
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// Helper Functions
// =============================================================================

impl Error {
    /// Creates a new shape mismatch error attributed to `layer`.
    #[must_use]
    pub fn shape_mismatch(layer: impl Into<String>, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            layer: layer.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Creates a new invalid shape error.
    #[must_use]
    pub fn invalid_shape(shape: &[usize], message: impl Into<String>) -> Self {
        Self::InvalidShape {
            shape: shape.to_vec(),
            message: message.into(),
        }
    }

    /// Creates a new invalid operation error.
    #[must_use]
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a new gradient error.
    #[must_use]
    pub fn gradient(message: impl Into<String>) -> Self {
        Self::GradientError {
            message: message.into(),
        }
    }

    /// Creates a new data error.
    #[must_use]
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Creates a new config error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Attributes a shape error to `layer`.
    ///
    /// A mismatch takes `layer` as its name. An invalid shape gets a
    /// `"layer: "` message prefix, added once. Other errors pass through.
    #[must_use]
    pub fn in_layer(self, layer: &str) -> Self {
        match self {
            Self::ShapeMismatch {
                expected, actual, ..
            } => Self::ShapeMismatch {
                layer: layer.to_string(),
                expected,
                actual,
            },
            Self::InvalidShape { shape, message } => {
                let prefix = format!("{layer}: ");
                let message = if message.starts_with(&prefix) {
                    message
                } else {
                    prefix + &message
                };
                Self::InvalidShape { shape, message }
            }
            other => other,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::data(err.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::shape_mismatch("fc4", &[120], &[480]);
        let msg = err.to_string();
        assert!(msg.contains("Shape mismatch"));
        assert!(msg.contains("fc4"));
        assert!(msg.contains("480"));
    }

    #[test]
    fn test_error_equality() {
        let err1 = Error::EmptyTensor;
        let err2 = Error::EmptyTensor;
        assert_eq!(err1, err2);
    }

    #[test]
    fn test_in_layer_rewrites_only_shape_errors() {
        let err = Error::shape_mismatch("matmul", &[2, 3], &[4, 5]).in_layer("fc6");
        assert!(matches!(err, Error::ShapeMismatch { ref layer, .. } if layer == "fc6"));

        let err = Error::EmptyTensor.in_layer("fc6");
        assert_eq!(err, Error::EmptyTensor);
    }

    #[test]
    fn test_in_layer_prefixes_invalid_shape_once() {
        let err = Error::invalid_shape(&[1, 6, 2, 2], "kernel does not fit")
            .in_layer("conv2")
            .in_layer("conv2");
        assert_eq!(
            err,
            Error::InvalidShape {
                shape: vec![1, 6, 2, 2],
                message: "conv2: kernel does not fit".to_string(),
            }
        );
        assert!(err.to_string().contains("conv2"));
    }

    #[test]
    fn test_optimizer_not_bound_message() {
        let err = Error::OptimizerNotBound { optimizer: "Adam" };
        assert!(err.to_string().contains("bind()"));
    }
}
