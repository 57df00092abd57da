//! # Transcode Scale
//!
//! The picture format adapter: pixel format conversion and resizing behind
//! [`transcode_core::FormatAdapter`].
//!
//! Supported formats are the 8-bit ones: `yuv420p`, `yuv422p`, `yuv444p`,
//! `nv12`, `nv21`, `rgb24`, `bgr24`, `rgba`, `bgra` and `gray`. Colour
//! conversion uses full-range BT.601. Resizing is nearest neighbour or
//! bilinear, with destination rows spread over a rayon pool.
//!
//! ## Example
//!
//! ```ignore
//! use transcode_scale::{ScaleConfig, ScaleFilter, VideoAdapter};
//!
//! let mut adapter = VideoAdapter::new(ScaleConfig::new().with_filter(ScaleFilter::Nearest));
//! adapter.configure(MediaFormat::Video(input), MediaFormat::Video(output))?;
//! adapter.open()?;
//! adapter.convert(&picture, &mut scaled)?;
//! ```

pub mod adapter;
pub mod color;
pub mod error;
pub mod image;
pub mod scaler;

pub use adapter::{ScaleConfig, VideoAdapter};
pub use error::{Result, ScaleError};
pub use image::{ColorModel, Image};
pub use scaler::ScaleFilter;
