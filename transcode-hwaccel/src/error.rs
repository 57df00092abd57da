//! Error types for hardware acceleration.

use thiserror::Error;
use transcode_core::Error as CoreError;

/// Hardware acceleration error.
#[derive(Error, Debug)]
pub enum HwAccelError {
    /// Accelerator not supported on this platform.
    #[error("Accelerator {0} not supported on this platform")]
    NotSupported(String),

    /// Device initialization failed.
    #[error("Failed to initialize device: {0}")]
    DeviceInit(String),

    /// Every surface of a pool is in use.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Memory transfer error.
    #[error("Failed to transfer data: {0}")]
    Transfer(String),

    /// Surface mapping refused.
    #[error("Cannot map surface: {0}")]
    Map(String),

    /// Configuration error.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Surface memory could not be allocated.
    #[error("Out of memory: {requested} bytes requested")]
    OutOfMemory { requested: usize },
}

/// Result type for hardware acceleration operations.
pub type Result<T> = std::result::Result<T, HwAccelError>;

impl From<HwAccelError> for CoreError {
    fn from(err: HwAccelError) -> Self {
        match err {
            HwAccelError::NotSupported(_) => CoreError::unsupported(err.to_string()),
            HwAccelError::ResourceExhausted(_) => CoreError::ResourceExhausted(err.to_string()),
            HwAccelError::Map(_) | HwAccelError::DeviceInit(_) => {
                CoreError::invalid_state(err.to_string())
            }
            HwAccelError::Transfer(_) | HwAccelError::Config(_) => {
                CoreError::invalid_config(err.to_string())
            }
            HwAccelError::OutOfMemory { requested } => CoreError::OutOfMemory { requested },
        }
    }
}

impl From<CoreError> for HwAccelError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::OutOfMemory { requested } => HwAccelError::OutOfMemory { requested },
            other => HwAccelError::Config(other.to_string()),
        }
    }
}
