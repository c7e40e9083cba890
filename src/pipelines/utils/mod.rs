//! Device selection.

use crate::error::{PipelineError, Result};
use candle_core::Device;

/// Where inference runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DeviceRequest {
    /// Run on the CPU (default).
    #[default]
    Cpu,
    /// Run on the CUDA GPU with this ordinal.
    Cuda(usize),
}

impl DeviceRequest {
    /// Map an integer selector: any negative value is the CPU, `n >= 0` is GPU `n`.
    pub fn from_index(index: i64) -> Self {
        match usize::try_from(index) {
            Ok(i) => DeviceRequest::Cuda(i),
            Err(_) => DeviceRequest::Cpu,
        }
    }

    /// Initialise the candle device.
    pub fn resolve(self) -> Result<Device> {
        match self {
            DeviceRequest::Cpu => Ok(Device::Cpu),
            DeviceRequest::Cuda(i) => Device::new_cuda(i).map_err(|e| {
                PipelineError::Device(format!(
                    "Failed to init CUDA device {i}: {e}. Try CPU as fallback."
                ))
            }),
        }
    }
}

impl std::fmt::Display for DeviceRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceRequest::Cpu => write!(f, "cpu"),
            DeviceRequest::Cuda(i) => write!(f, "cuda:{i}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_index_means_cpu() {
        assert_eq!(DeviceRequest::from_index(-1), DeviceRequest::Cpu);
        assert_eq!(DeviceRequest::from_index(-7), DeviceRequest::Cpu);
        assert_eq!(DeviceRequest::from_index(0), DeviceRequest::Cuda(0));
        assert_eq!(DeviceRequest::from_index(3), DeviceRequest::Cuda(3));
    }

    #[test]
    fn display_names_the_device() {
        assert_eq!(DeviceRequest::Cpu.to_string(), "cpu");
        assert_eq!(DeviceRequest::Cuda(2).to_string(), "cuda:2");
    }

    #[test]
    fn cpu_always_resolves() {
        assert!(DeviceRequest::Cpu.resolve().unwrap().is_cpu());
    }
}
