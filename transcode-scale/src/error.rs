//! Error types for video format adaptation.

use thiserror::Error;
use transcode_core::{Error as CoreError, PixelFormat};

/// Result type for scaling operations.
pub type Result<T> = std::result::Result<T, ScaleError>;

/// Errors that can occur while converting pictures.
#[derive(Debug, Error)]
pub enum ScaleError {
    /// Pixel format the converter does not handle.
    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(PixelFormat),

    /// Zero or oversized picture dimensions.
    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// A plane is too small for the declared picture.
    #[error("Plane {plane} holds {actual} bytes, {expected} expected")]
    PlaneTooSmall {
        plane: usize,
        actual: usize,
        expected: usize,
    },

    /// Input picture does not match the configured input format.
    #[error("Input format mismatch: configured for {expected}, got {actual}")]
    FormatMismatch { expected: String, actual: String },

    /// Worker pool could not be created.
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

impl From<ScaleError> for CoreError {
    fn from(err: ScaleError) -> Self {
        match err {
            ScaleError::UnsupportedFormat(_) => CoreError::unsupported(err.to_string()),
            ScaleError::PlaneTooSmall { .. } => CoreError::corrupt(err.to_string()),
            ScaleError::ThreadPool(_) => CoreError::ResourceExhausted(err.to_string()),
            _ => CoreError::invalid_config(err.to_string()),
        }
    }
}
