//! Error types for audio format adaptation.

use thiserror::Error;
use transcode_core::Error as CoreError;

/// Result type for resampling operations.
pub type Result<T> = std::result::Result<T, ResampleError>;

/// Errors that can occur during audio format adaptation.
#[derive(Debug, Error)]
pub enum ResampleError {
    /// Invalid sample rate specified.
    #[error("Invalid sample rate: {rate} Hz (must be > 0)")]
    InvalidSampleRate { rate: u32 },

    /// Invalid channel count.
    #[error("Invalid channel count: {count} (must be > 0)")]
    InvalidChannelCount { count: usize },

    /// Invalid window size for sinc resampler.
    #[error("Invalid window size: {size} (must be > 0 and even)")]
    InvalidWindowSize { size: usize },

    /// Input buffer too small for its declared sample count.
    #[error("Buffer holds {actual} bytes, {expected} expected")]
    BufferSizeMismatch { actual: usize, expected: usize },

    /// Input buffer does not match the configured input format.
    #[error("Input format mismatch: configured for {expected}, got {actual}")]
    FormatMismatch { expected: String, actual: String },

    /// Resampling ratio too extreme.
    #[error("Resampling ratio {ratio} exceeds maximum supported ratio")]
    RatioTooExtreme { ratio: f64 },
}

impl From<ResampleError> for CoreError {
    fn from(err: ResampleError) -> Self {
        match err {
            ResampleError::BufferSizeMismatch { .. } => CoreError::corrupt(err.to_string()),
            _ => CoreError::invalid_config(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_core_error() {
        let err: CoreError = ResampleError::BufferSizeMismatch {
            actual: 3,
            expected: 4,
        }
        .into();
        assert!(err.is_recoverable());
        let err: CoreError = ResampleError::InvalidSampleRate { rate: 0 }.into();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }
}
