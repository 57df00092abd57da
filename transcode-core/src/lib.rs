//! # Transcode Core
//!
//! Media buffers and the staged processing protocol shared by every
//! Transcode component.
//!
//! - [`Buffer`]: reference-counted, copy-on-write media unit
//! - [`Stage`]: the submit/retrieve state machine every transformation speaks
//! - [`Session`] and [`Processor`]: the generic stage codecs and filters plug into
//! - [`Chain`]: stages composed linearly
//! - [`FormatAdapter`]: resample/rescale interface
//! - [`Device`], [`SurfacePool`], [`Surface`]: accelerator abstractions
//! - [`OptionSchema`]: typed, validated stage options

pub mod adapter;
pub mod buffer;
pub mod chain;
pub mod error;
pub mod format;
pub mod frame;
pub mod hw;
pub mod log;
pub mod metrics;
pub mod nal;
pub mod options;
pub mod pool;
pub mod rational;
pub mod sample;
pub mod session;
pub mod side_data;
pub mod stage;
pub mod timestamp;

pub use adapter::{AdapterStage, FormatAdapter};
pub use buffer::{AllocRequest, Buffer, BufferKind, MediaFormat, Plane, Storage};
pub use chain::Chain;
pub use error::{Error, GraphError, PadDirection, Result};
pub use format::{CodecId, MediaType};
pub use frame::{PixelFormat, VideoFormat};
pub use hw::{transfer_data, Device, DeviceRef, Surface, SurfacePool};
pub use log::Logger;
pub use options::{OptionMap, OptionSchema, Options, UnknownOptionPolicy};
pub use pool::{BufferPool, PoolLayout};
pub use rational::Rational;
pub use sample::{AudioFormat, ChannelLayout, SampleFormat};
pub use session::{OpenContext, Processor, Session, StageStats};
pub use side_data::{BufferFlags, SideData, SideDataType};
pub use stage::{
    ProtocolGuard, RetrieveStatus, Stage, StageParams, StageState, StreamParams, SubmitStatus,
};
pub use timestamp::{TimeBase, Timestamp};

#[doc(hidden)]
#[cfg(feature = "metrics")]
pub use ::metrics as __metrics;
