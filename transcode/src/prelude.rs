//! Prelude module for convenient imports.
//!
//! ```rust
//! use transcode::prelude::*;
//! ```

pub use crate::{Error, Result};

pub use crate::{AudioFormat, ChannelLayout, PixelFormat, SampleFormat, VideoFormat};

pub use crate::{Buffer, CodecId, Rational, TimeBase};

pub use crate::{Graph, GraphConfig, GraphStage, Stage, StageParams};

pub use crate::{UnitSink, UnitSource};

pub use crate::{AudioConfig, InputConfig, OutputConfig, VideoConfig};
pub use crate::{TranscodeOptions, TranscodeStats, Transcoder};
