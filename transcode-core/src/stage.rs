//! The submit/retrieve stage protocol.
//!
//! Every transformation (decoder, encoder, stream filter, graph, adapter)
//! implements [`Stage`]. A stage moves through
//! `Unconfigured → Configured → Opened → Draining → Closed`:
//!
//! ```ignore
//! stage.configure(params)?;
//! stage.open()?;
//! for unit in units {
//!     let mut unit = unit;
//!     while stage.submit(Some(&mut unit))? == SubmitStatus::Busy {
//!         while stage.retrieve(&mut out)? == RetrieveStatus::Produced {
//!             write(&out);
//!         }
//!     }
//!     while stage.retrieve(&mut out)? == RetrieveStatus::Produced {
//!         write(&out);
//!     }
//! }
//! stage.submit(None)?;
//! while stage.retrieve(&mut out)? != RetrieveStatus::EndOfStream {
//!     write(&out);
//! }
//! ```
//!
//! After `Busy`, the caller must `retrieve` before offering the same unit
//! again; [`ProtocolGuard`] enforces this and the other ordering rules so
//! misuse fails with [`Error::InvalidState`] instead of losing data.

use crate::buffer::{Buffer, MediaFormat};
use crate::error::{Error, Result};
use crate::format::{CodecId, MediaType};
use crate::frame::VideoFormat;
use crate::hw::DeviceRef;
use crate::options::{OptionMap, UnknownOptionPolicy};
use crate::rational::Rational;
use crate::sample::AudioFormat;
use crate::timestamp::TimeBase;
use std::fmt;

/// Outcome of [`Stage::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    /// The unit was consumed (the caller's buffer is now empty).
    Accepted,
    /// Internal buffering is full; retrieve output, then resubmit. The
    /// caller's buffer is untouched.
    Busy,
}

/// Outcome of [`Stage::retrieve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrieveStatus {
    /// The output buffer now holds a unit.
    Produced,
    /// No output ready; submit more input.
    NeedsInput,
    /// Draining finished; nothing more will be produced.
    EndOfStream,
}

/// Lifecycle state of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageState {
    /// Created, no parameters yet.
    Unconfigured,
    /// Parameters set, not opened.
    Configured,
    /// Accepting input.
    Opened,
    /// End of stream signalled; only retrieval is legal.
    Draining,
    /// Drained or explicitly closed.
    Closed,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfigured => write!(f, "unconfigured"),
            Self::Configured => write!(f, "configured"),
            Self::Opened => write!(f, "opened"),
            Self::Draining => write!(f, "draining"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Description of a stream entering or leaving a stage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamParams {
    /// Codec of compressed units, `None` for decoded streams.
    pub codec: Option<CodecId>,
    /// Picture properties (coded or decoded).
    pub video: Option<VideoFormat>,
    /// Audio properties (coded or decoded).
    pub audio: Option<AudioFormat>,
    /// Time base of unit timestamps.
    pub time_base: TimeBase,
    /// Nominal frame rate, when known.
    pub frame_rate: Option<Rational>,
    /// Codec-specific header data.
    pub extradata: Vec<u8>,
}

impl StreamParams {
    /// Parameters of a compressed stream.
    pub fn compressed(codec: CodecId, time_base: TimeBase) -> Self {
        Self {
            codec: Some(codec),
            time_base,
            ..Default::default()
        }
    }

    /// Parameters of a decoded picture stream.
    pub fn video(format: VideoFormat, time_base: TimeBase) -> Self {
        Self {
            video: Some(format),
            time_base,
            ..Default::default()
        }
    }

    /// Parameters of a decoded audio stream, in a 1/sample_rate time base.
    pub fn audio(format: AudioFormat) -> Self {
        Self {
            audio: Some(format),
            time_base: TimeBase::for_sample_rate(format.sample_rate),
            ..Default::default()
        }
    }

    /// Set picture properties.
    #[must_use]
    pub fn with_video(mut self, format: VideoFormat) -> Self {
        self.video = Some(format);
        self
    }

    /// Set audio properties.
    #[must_use]
    pub fn with_audio(mut self, format: AudioFormat) -> Self {
        self.audio = Some(format);
        self
    }

    /// Set extradata.
    #[must_use]
    pub fn with_extradata(mut self, extradata: Vec<u8>) -> Self {
        self.extradata = extradata;
        self
    }

    /// Set the frame rate.
    #[must_use]
    pub fn with_frame_rate(mut self, rate: Rational) -> Self {
        self.frame_rate = Some(rate);
        self
    }

    /// Get the media type.
    pub fn media_type(&self) -> Option<MediaType> {
        match (self.codec, self.video, self.audio) {
            (Some(codec), _, _) => Some(codec.media_type()),
            (None, Some(_), _) => Some(MediaType::Video),
            (None, None, Some(_)) => Some(MediaType::Audio),
            (None, None, None) => None,
        }
    }

    /// Get the format descriptor units of this stream carry.
    pub fn media_format(&self) -> MediaFormat {
        match (self.codec, self.video, self.audio) {
            (Some(codec), _, _) => MediaFormat::Compressed(codec),
            (None, Some(v), _) => MediaFormat::Video(v),
            (None, None, Some(a)) => MediaFormat::Audio(a),
            (None, None, None) => MediaFormat::Unset,
        }
    }

    /// Parameters of a decoded stream carrying `format`.
    pub fn decoded(format: MediaFormat, time_base: TimeBase) -> Result<Self> {
        match format {
            MediaFormat::Video(v) => Ok(Self::video(v, time_base)),
            MediaFormat::Audio(a) => Ok(Self {
                time_base,
                ..Self::audio(a)
            }),
            other => Err(Error::invalid_config(format!(
                "'{other}' does not describe decoded data"
            ))),
        }
    }
}

/// Everything a stage needs at configure time.
#[derive(Debug, Clone, Default)]
pub struct StageParams {
    /// Input stream description.
    pub stream: StreamParams,
    /// Stage options.
    pub options: OptionMap,
    /// Policy for options the stage does not know.
    pub unknown_options: UnknownOptionPolicy,
    /// Accelerator device for stages that can use one.
    pub device: Option<DeviceRef>,
}

impl StageParams {
    /// Create parameters for an input stream.
    pub fn new(stream: StreamParams) -> Self {
        Self {
            stream,
            ..Default::default()
        }
    }

    /// Set the options.
    #[must_use]
    pub fn with_options(mut self, options: OptionMap) -> Self {
        self.options = options;
        self
    }

    /// Set one option.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.options.set(key, value);
        self
    }

    /// Ignore options the stage does not recognise.
    #[must_use]
    pub fn ignore_unknown_options(mut self) -> Self {
        self.unknown_options = UnknownOptionPolicy::Ignore;
        self
    }

    /// Set the device.
    #[must_use]
    pub fn with_device(mut self, device: DeviceRef) -> Self {
        self.device = Some(device);
        self
    }
}

/// A processing unit speaking the submit/retrieve protocol.
pub trait Stage: Send {
    /// Get the instance name.
    fn name(&self) -> &str;

    /// Get the lifecycle state.
    fn state(&self) -> StageState;

    /// Set stream identity and tunables. Valid while unconfigured or configured.
    fn configure(&mut self, params: StageParams) -> Result<()>;

    /// Validate the configuration and allocate internal state.
    fn open(&mut self) -> Result<()>;

    /// Offer one unit, or `None` to signal end of stream.
    ///
    /// On `Accepted` the unit is moved out of `input`; on `Busy` it is left
    /// in place.
    fn submit(&mut self, input: Option<&mut Buffer>) -> Result<SubmitStatus>;

    /// Take one unit of output. `output` is unreferenced first.
    fn retrieve(&mut self, output: &mut Buffer) -> Result<RetrieveStatus>;

    /// Drop all buffered data and return to `Opened`.
    fn flush(&mut self) -> Result<()>;

    /// Release internal state. Valid from any state; idempotent.
    fn close(&mut self);

    /// Output stream description, known once the first unit was produced.
    fn output_params(&self) -> Option<&StreamParams>;
}

impl<S: Stage + ?Sized> Stage for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn state(&self) -> StageState {
        (**self).state()
    }

    fn configure(&mut self, params: StageParams) -> Result<()> {
        (**self).configure(params)
    }

    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn submit(&mut self, input: Option<&mut Buffer>) -> Result<SubmitStatus> {
        (**self).submit(input)
    }

    fn retrieve(&mut self, output: &mut Buffer) -> Result<RetrieveStatus> {
        (**self).retrieve(output)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn output_params(&self) -> Option<&StreamParams> {
        (**self).output_params()
    }
}

/// Lifecycle and call-ordering checks shared by every stage implementation.
#[derive(Debug, Clone)]
pub struct ProtocolGuard {
    state: StageState,
    awaiting_retrieve: bool,
    closed_by_caller: bool,
}

impl ProtocolGuard {
    /// Create a guard in `Unconfigured`.
    pub fn new() -> Self {
        Self {
            state: StageState::Unconfigured,
            awaiting_retrieve: false,
            closed_by_caller: false,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> StageState {
        self.state
    }

    /// Check if draining completed.
    pub fn is_drained(&self) -> bool {
        self.state == StageState::Closed && !self.closed_by_caller
    }

    /// Check if end of stream was signalled.
    pub fn eos_signalled(&self) -> bool {
        matches!(self.state, StageState::Draining) || self.is_drained()
    }

    /// Enter `Configured`.
    pub fn configure(&mut self) -> Result<()> {
        match self.state {
            StageState::Unconfigured | StageState::Configured => {
                self.state = StageState::Configured;
                Ok(())
            }
            other => Err(Error::invalid_state(format!("configure while {other}"))),
        }
    }

    /// Check that `open` may proceed.
    pub fn check_open(&self) -> Result<()> {
        match self.state {
            StageState::Configured => Ok(()),
            StageState::Unconfigured => Err(Error::invalid_state("open before configure")),
            other => Err(Error::invalid_state(format!("open while {other}"))),
        }
    }

    /// Enter `Opened` after a successful open.
    pub fn opened(&mut self) {
        self.state = StageState::Opened;
        self.awaiting_retrieve = false;
    }

    /// Check that `submit` may proceed.
    pub fn check_submit(&self) -> Result<()> {
        match self.state {
            StageState::Unconfigured | StageState::Configured => {
                Err(Error::invalid_state("submit before open"))
            }
            StageState::Closed if self.closed_by_caller => {
                Err(Error::invalid_state("submit after close"))
            }
            StageState::Draining | StageState::Closed => Err(Error::Closed),
            StageState::Opened if self.awaiting_retrieve => Err(Error::invalid_state(
                "submit after Busy without an intervening retrieve",
            )),
            StageState::Opened => Ok(()),
        }
    }

    /// Record a `Busy` answer.
    pub fn busy(&mut self) {
        self.awaiting_retrieve = true;
    }

    /// Record end of stream; enter `Draining`.
    pub fn end_of_stream(&mut self) {
        self.state = StageState::Draining;
    }

    /// Check that `retrieve` may proceed. `Ok(false)` means the stage is
    /// drained and the caller should answer `EndOfStream`.
    pub fn check_retrieve(&mut self) -> Result<bool> {
        match self.state {
            StageState::Unconfigured | StageState::Configured => {
                Err(Error::invalid_state("retrieve before open"))
            }
            StageState::Closed if self.closed_by_caller => {
                Err(Error::invalid_state("retrieve after close"))
            }
            StageState::Closed => Ok(false),
            StageState::Opened | StageState::Draining => {
                self.awaiting_retrieve = false;
                Ok(true)
            }
        }
    }

    /// Record that draining finished.
    pub fn drained(&mut self) {
        self.state = StageState::Closed;
    }

    /// Check that `flush` may proceed, then return to `Opened`.
    pub fn flush(&mut self) -> Result<()> {
        match self.state {
            StageState::Opened | StageState::Draining => {
                self.opened();
                Ok(())
            }
            other => Err(Error::invalid_state(format!("flush while {other}"))),
        }
    }

    /// Enter `Closed` by caller request. Returns `false` if already closed
    /// this way.
    pub fn close(&mut self) -> bool {
        if self.closed_by_caller {
            return false;
        }
        self.state = StageState::Closed;
        self.closed_by_caller = true;
        self.awaiting_retrieve = false;
        true
    }
}

impl Default for ProtocolGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    fn opened() -> ProtocolGuard {
        let mut guard = ProtocolGuard::new();
        guard.configure().unwrap();
        guard.check_open().unwrap();
        guard.opened();
        guard
    }

    #[test]
    fn test_submit_before_open() {
        let guard = ProtocolGuard::new();
        assert!(matches!(guard.check_submit(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_busy_requires_retrieve() {
        let mut guard = opened();
        guard.busy();
        assert!(matches!(guard.check_submit(), Err(Error::InvalidState(_))));
        assert!(guard.check_retrieve().unwrap());
        assert!(guard.check_submit().is_ok());
    }

    #[test]
    fn test_submit_after_eos_is_closed() {
        let mut guard = opened();
        guard.end_of_stream();
        assert!(matches!(guard.check_submit(), Err(Error::Closed)));
        guard.drained();
        assert!(matches!(guard.check_submit(), Err(Error::Closed)));
        assert!(!guard.check_retrieve().unwrap());
    }

    #[test]
    fn test_close_idempotent() {
        let mut guard = opened();
        assert!(guard.close());
        assert!(!guard.close());
        assert_eq!(guard.state(), StageState::Closed);
        assert!(matches!(guard.check_submit(), Err(Error::InvalidState(_))));
        assert!(guard.flush().is_err());
    }

    #[test]
    fn test_flush_returns_to_opened() {
        let mut guard = opened();
        guard.end_of_stream();
        guard.flush().unwrap();
        assert_eq!(guard.state(), StageState::Opened);
        assert!(guard.check_submit().is_ok());
    }

    #[test]
    fn test_flush_after_drain_fails() {
        let mut guard = opened();
        guard.end_of_stream();
        guard.drained();
        assert_eq!(guard.state(), StageState::Closed);
        assert!(matches!(guard.flush(), Err(Error::InvalidState(_))));
        assert_eq!(guard.state(), StageState::Closed);
    }

    #[test]
    fn test_configure_after_open_fails() {
        let mut guard = opened();
        assert!(guard.configure().is_err());
    }

    #[test]
    fn test_stream_params_media_format() {
        let fmt = VideoFormat::new(4, 4, PixelFormat::Gray8);
        let params = StreamParams::video(fmt, TimeBase::MILLISECONDS);
        assert_eq!(params.media_format(), MediaFormat::Video(fmt));
        assert_eq!(params.media_type(), Some(MediaType::Video));

        let coded = StreamParams::compressed(CodecId::RawVideo, TimeBase::MPEG).with_video(fmt);
        assert_eq!(coded.media_format(), MediaFormat::Compressed(CodecId::RawVideo));
        assert!(StreamParams::decoded(coded.media_format(), TimeBase::MPEG).is_err());
    }
}
