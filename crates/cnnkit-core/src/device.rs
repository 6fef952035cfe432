//! Device Abstraction - Where Tensors Live
//!
//! A binary placement switch: every tensor is tagged with the device it was
//! allocated on. Only the CPU backend is compiled in, so accelerator devices
//! report themselves unavailable and transfers to them fail with
//! [`Error::DeviceNotAvailable`](crate::Error::DeviceNotAvailable).
//!
//! # Example
//! ```rust
//! use cnnkit_core::Device;
//!
//! let cpu = Device::Cpu;
//! assert!(cpu.is_available());
//! assert!(!Device::Cuda(0).is_available());
//! assert_eq!("cuda:1".parse::<Device>().unwrap(), Device::Cuda(1));
//! ```
//!
//! @version 0.1.0

use core::fmt;
use core::str::FromStr;

use crate::error::{Error, Result};

// =============================================================================
// Device Enum
// =============================================================================

/// Represents a compute device where tensors can be allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    /// CPU device (always available).
    #[default]
    Cpu,

    /// CUDA GPU device with device index.
    Cuda(usize),
}

impl Device {
    /// Returns true if this device is available on the current system.
    #[must_use]
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Cpu)
    }

    /// Returns true if this is a CPU device.
    #[must_use]
    pub const fn is_cpu(self) -> bool {
        matches!(self, Self::Cpu)
    }

    /// Returns true if this is a GPU device.
    #[must_use]
    pub const fn is_gpu(self) -> bool {
        !self.is_cpu()
    }

    /// Returns the device index for GPU devices, or 0 for CPU.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Cpu => 0,
            Self::Cuda(idx) => idx,
        }
    }

    /// Returns the name of this device type.
    #[must_use]
    pub const fn device_type(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda(_) => "cuda",
        }
    }

    /// Returns `Ok(self)` if the device can hold tensors, an error otherwise.
    pub fn ensure_available(self) -> Result<Self> {
        if self.is_available() {
            Ok(self)
        } else {
            Err(Error::DeviceNotAvailable { device: self })
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(idx) => write!(f, "cuda:{idx}"),
        }
    }
}

impl FromStr for Device {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda(0)),
            _ => {
                let index = s
                    .strip_prefix("cuda:")
                    .or_else(|| s.strip_prefix("gpu:"))
                    .and_then(|idx| idx.parse::<usize>().ok())
                    .ok_or_else(|| Error::config(format!("unknown device '{s}'")))?;
                Ok(Self::Cuda(index))
            }
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
    fn test_cpu_device() {
        let device = Device::Cpu;
        assert!(device.is_cpu());
        assert!(!device.is_gpu());
        assert!(device.is_available());
        assert_eq!(device.device_type(), "cpu");
    }

    #[test]
    fn test_cuda_unavailable() {
        let device = Device::Cuda(0);
        assert!(device.is_gpu());
        assert!(!device.is_available());
        assert_eq!(
            device.ensure_available(),
            Err(Error::DeviceNotAvailable { device })
        );
    }

    #[test]
    fn test_device_display_roundtrip() {
        assert_eq!(format!("{}", Device::Cpu), "cpu");
        assert_eq!(format!("{}", Device::Cuda(2)), "cuda:2");
        assert_eq!("CPU".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("gpu".parse::<Device>().unwrap(), Device::Cuda(0));
        assert!("tpu".parse::<Device>().is_err());
    }

    #[test]
    fn test_device_default() {
        assert_eq!(Device::default(), Device::Cpu);
    }
}
