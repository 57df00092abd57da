//! # Transcode Resample
//!
//! The audio format adapter: sample format, channel layout and sample rate
//! conversion behind [`transcode_core::FormatAdapter`].
//!
//! - **Sample formats**: any packed or planar format to any other
//! - **Channel remix**: mono/stereo up and down mix, 5.1 and 7.1 folding
//! - **Rate conversion**: linear interpolation or windowed sinc
//! - **Framing**: optional fixed `frame_size` output with continuous pts
//!
//! ## Example
//!
//! ```ignore
//! use transcode_resample::{AudioAdapter, AudioAdapterConfig};
//! use transcode_core::{AdapterStage, MediaFormat};
//!
//! let adapter = AudioAdapter::new(AudioAdapterConfig::new().with_frame_size(1024));
//! let mut stage = AdapterStage::new(adapter, MediaFormat::Audio(target));
//! stage.configure(StageParams::new(input_stream))?;
//! stage.open()?;
//! ```

pub mod adapter;
pub mod convert;
pub mod error;
pub mod linear;
pub mod remix;
pub mod resampler;
pub mod sinc;

pub use adapter::{AudioAdapter, AudioAdapterConfig};
pub use error::{ResampleError, Result};
pub use linear::LinearInterpolator;
pub use remix::RemixMatrix;
pub use resampler::{Interpolator, Resampler, ResamplerConfig, ResamplerType};
pub use sinc::{SincInterpolator, WindowFunction};

/// Calculate the greatest common divisor.
pub(crate) fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gcd() {
        assert_eq!(gcd(44100, 48000), 300);
        assert_eq!(gcd(48000, 96000), 48000);
        assert_eq!(gcd(44100, 22050), 22050);
    }
}
