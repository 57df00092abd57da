//! # Transcode
//!
//! The driver of the staged media pipeline: it reads opaque compressed units,
//! decodes them, optionally runs a filter graph and a format conversion,
//! encodes, optionally rewrites the encoded stream, and writes units back out.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use transcode::{CodecId, InputConfig, PixelFormat, TranscodeOptions, Transcoder};
//!
//! fn main() -> transcode::Result<()> {
//!     let options = TranscodeOptions::new()
//!         .input_config(
//!             InputConfig::new("input.yuv", CodecId::RawVideo).video(640, 480, PixelFormat::Yuv420p),
//!         )
//!         .output("output.rgb")
//!         .filters("scale=w=320:h=-1")
//!         .video_pixel_format(PixelFormat::Rgb24);
//!
//!     let mut transcoder = Transcoder::new(options)?;
//!     let stats = transcoder.run()?;
//!     println!("{} units written", stats.units_written);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - `transcode-core`: buffers, the stage protocol, chains and adapters
//! - `transcode-codecs`: raw codecs and stream filters
//! - `transcode-pipeline`: the filter graph
//! - `transcode-resample`, `transcode-scale`: format adapters
//! - `transcode-hwaccel`: the emulated device
//!
//! This crate re-exports the most commonly used types.

mod io;
mod options;
pub mod prelude;
mod transcoder;

pub use transcode_core::{
    AudioFormat, Buffer, ChannelLayout, CodecId, Error, GraphError, Logger, MediaType,
    PixelFormat, Rational, Result, SampleFormat, Stage, StageParams, StreamParams, TimeBase,
    VideoFormat,
};

pub use transcode_codecs::{codecs, CodecInfo};
pub use transcode_pipeline::{Graph, GraphConfig, GraphStage, FILTER_KINDS};

pub use io::{MemorySink, MemorySource, RawFileSink, RawFileSource, Unit, UnitSink, UnitSource};
pub use options::{AudioConfig, InputConfig, OutputConfig, TranscodeOptions, VideoConfig};
pub use transcoder::{ProgressCallback, TranscodeStats, Transcoder};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string.
pub fn version() -> &'static str {
    VERSION
}
