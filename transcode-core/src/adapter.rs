//! Format adapters: resampling and rescaling behind one interface.
//!
//! An adapter converts decoded buffers from one [`MediaFormat`] to another.
//! Picture adapters are one-in/one-out; audio adapters may hold samples back
//! (filter delay, output framing), reported by [`FormatAdapter::pending_delay`]
//! and released by [`FormatAdapter::drain`].
//!
//! [`AdapterStage`] exposes any adapter as a [`Stage`] so it can sit in a
//! [`Chain`](crate::chain::Chain).

use crate::buffer::{Buffer, MediaFormat};
use crate::error::{Error, Result};
use crate::log::Logger;
use crate::options::UnknownOptionPolicy;
use crate::stage::{
    ProtocolGuard, RetrieveStatus, Stage, StageParams, StageState, StreamParams, SubmitStatus,
};
use crate::timestamp::TimeBase;
use tracing::debug;

/// Converter between two decoded formats.
pub trait FormatAdapter: Send {
    /// Get the adapter name.
    fn name(&self) -> &'static str;

    /// Set input and output formats. Only valid while closed.
    fn configure(&mut self, input: MediaFormat, output: MediaFormat) -> Result<()>;

    /// Validate the configured formats and allocate state.
    fn open(&mut self) -> Result<()>;

    /// Check if the adapter is open.
    fn is_open(&self) -> bool;

    /// Get the configured output format.
    fn output_format(&self) -> MediaFormat;

    /// Check if another input buffer can be pushed before output is pulled.
    fn has_capacity(&self) -> bool {
        true
    }

    /// Feed one input buffer, or `None` to flush delayed content.
    fn push(&mut self, input: Option<&Buffer>) -> Result<()>;

    /// Take converted output. `NeedsInput` when nothing is ready yet,
    /// `EndOfStream` once flushed content is exhausted.
    fn pull(&mut self, output: &mut Buffer) -> Result<RetrieveStatus>;

    /// Convert `input` and place whatever is ready into `output`.
    fn convert(&mut self, input: &Buffer, output: &mut Buffer) -> Result<RetrieveStatus> {
        self.push(Some(input))?;
        self.pull(output)
    }

    /// Flush delayed content by feeding an empty input.
    fn drain(&mut self) -> Result<()> {
        self.push(None)
    }

    /// Amount of input held back, in output units (samples for audio).
    fn pending_delay(&self) -> usize {
        0
    }

    /// Drop held content and forget end of stream.
    fn reset(&mut self);

    /// Release state. The adapter may be configured again afterwards.
    fn close(&mut self);
}

/// A [`Stage`] running a [`FormatAdapter`] toward a fixed target format.
pub struct AdapterStage<A> {
    adapter: A,
    target: MediaFormat,
    guard: ProtocolGuard,
    input: Option<StreamParams>,
    negotiated: Option<StreamParams>,
    output: Option<StreamParams>,
    logger: Logger,
}

impl<A: FormatAdapter> AdapterStage<A> {
    /// Create a stage converting to `target`.
    pub fn new(adapter: A, target: MediaFormat) -> Self {
        Self {
            adapter,
            target,
            guard: ProtocolGuard::new(),
            input: None,
            negotiated: None,
            output: None,
            logger: Logger::disabled(),
        }
    }

    /// Set the logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Get the adapter.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }
}

impl<A: FormatAdapter> Stage for AdapterStage<A> {
    fn name(&self) -> &str {
        self.adapter.name()
    }

    fn state(&self) -> StageState {
        self.guard.state()
    }

    fn configure(&mut self, params: StageParams) -> Result<()> {
        if params.unknown_options == UnknownOptionPolicy::Reject {
            if let Some((key, _)) = params.options.iter().next() {
                return Err(Error::UnknownOption(key.to_string()));
            }
        }
        if !matches!(
            params.stream.media_format(),
            MediaFormat::Video(_) | MediaFormat::Audio(_)
        ) {
            return Err(Error::invalid_config(format!(
                "{} adapter needs decoded input, got '{}'",
                self.adapter.name(),
                params.stream.media_format()
            )));
        }
        self.guard.configure()?;
        self.input = Some(params.stream);
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        self.guard.check_open()?;
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| Error::invalid_state("open before configure"))?;
        if self.adapter.is_open() {
            self.adapter.close();
        }
        self.adapter.configure(input.media_format(), self.target)?;
        self.adapter.open()?;
        let time_base = match self.target {
            MediaFormat::Audio(a) => TimeBase::for_sample_rate(a.sample_rate),
            _ => input.time_base,
        };
        let mut output = StreamParams::decoded(self.target, time_base)?;
        output.frame_rate = input.frame_rate;
        debug!(
            parent: self.logger.span(),
            adapter = self.adapter.name(),
            from = %input.media_format(),
            to = %self.target,
            "opened"
        );
        self.negotiated = Some(output);
        self.guard.opened();
        Ok(())
    }

    fn submit(&mut self, input: Option<&mut Buffer>) -> Result<SubmitStatus> {
        self.guard.check_submit()?;
        match input {
            None => {
                self.adapter.drain()?;
                self.guard.end_of_stream();
            }
            Some(buffer) => {
                if !buffer.has_storage() {
                    return Err(Error::invalid_state(
                        "submitted buffer holds no data; pass None to signal end of stream",
                    ));
                }
                if !self.adapter.has_capacity() {
                    self.guard.busy();
                    return Ok(SubmitStatus::Busy);
                }
                self.adapter.push(Some(buffer))?;
                buffer.unreference();
            }
        }
        Ok(SubmitStatus::Accepted)
    }

    fn retrieve(&mut self, output: &mut Buffer) -> Result<RetrieveStatus> {
        output.unreference();
        if !self.guard.check_retrieve()? {
            return Ok(RetrieveStatus::EndOfStream);
        }
        let status = self.adapter.pull(output)?;
        match status {
            RetrieveStatus::Produced if self.output.is_none() => {
                self.output = self.negotiated.clone();
            }
            RetrieveStatus::EndOfStream => self.guard.drained(),
            RetrieveStatus::NeedsInput if self.guard.state() == StageState::Draining => {
                self.guard.drained();
                return Ok(RetrieveStatus::EndOfStream);
            }
            _ => {}
        }
        Ok(status)
    }

    fn flush(&mut self) -> Result<()> {
        self.guard.flush()?;
        self.adapter.reset();
        Ok(())
    }

    fn close(&mut self) {
        if self.guard.close() {
            self.adapter.close();
        }
    }

    fn output_params(&self) -> Option<&StreamParams> {
        self.output.as_ref()
    }
}
