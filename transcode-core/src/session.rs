//! Generic stage built around a [`Processor`].
//!
//! Codecs and stream filters implement the small [`Processor`] trait and are
//! wrapped in a [`Session`], which owns the lifecycle checks, option
//! resolution, statistics and logging so individual processors only deal with
//! their own data.
//!
//! # Example
//!
//! ```ignore
//! use transcode_core::{Session, Stage, StageParams};
//!
//! let mut stage = Session::new(MyDecoder::default()).with_logger(logger);
//! stage.configure(StageParams::new(stream).with_option("queue_size", 2))?;
//! stage.open()?;
//! ```

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::hw::DeviceRef;
use crate::log::Logger;
use crate::options::{OptionSchema, Options};
use crate::stage::{
    ProtocolGuard, RetrieveStatus, Stage, StageParams, StageState, StreamParams, SubmitStatus,
};
use crate::record_counter;
use tracing::{debug, trace, warn};

/// What a processor sees when it is opened.
#[derive(Debug, Clone, Copy)]
pub struct OpenContext<'a> {
    /// Input stream description.
    pub stream: &'a StreamParams,
    /// Options resolved against [`Processor::option_schema`].
    pub options: &'a Options,
    /// Accelerator device, when one was configured.
    pub device: Option<&'a DeviceRef>,
    /// Logger of the owning stage.
    pub logger: &'a Logger,
}

/// The data path of a stage.
///
/// A processor must be able to make progress: when [`has_capacity`] is
/// false, [`pull`] has to produce something.
///
/// [`has_capacity`]: Processor::has_capacity
/// [`pull`]: Processor::pull
pub trait Processor: Send {
    /// Get the processor name.
    fn name(&self) -> &'static str;

    /// Options this processor understands.
    fn option_schema(&self) -> OptionSchema {
        OptionSchema::new()
    }

    /// Validate the input stream and options, allocate state.
    fn open(&mut self, ctx: &OpenContext<'_>) -> Result<()>;

    /// Check if another input unit can be accepted.
    fn has_capacity(&self) -> bool;

    /// Take ownership of one input unit.
    fn push(&mut self, input: Buffer) -> Result<()>;

    /// End of input: everything held must become available to [`Processor::pull`].
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    /// Move one output unit into `output`. Returns `false` when none is ready.
    fn pull(&mut self, output: &mut Buffer) -> Result<bool>;

    /// Describe the output stream. Consulted after each produced unit.
    fn output_params(&self) -> Option<StreamParams>;

    /// Drop buffered data.
    fn reset(&mut self);

    /// Release resources.
    fn close(&mut self) {}
}

/// Unit counters of a stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    /// Units accepted by `submit`.
    pub units_in: u64,
    /// Units produced by `retrieve`.
    pub units_out: u64,
    /// `Busy` answers.
    pub busy: u64,
    /// Bytes accepted.
    pub bytes_in: u64,
}

/// A [`Stage`] driving a [`Processor`].
pub struct Session<P> {
    name: String,
    processor: P,
    guard: ProtocolGuard,
    params: Option<StageParams>,
    options: Options,
    output: Option<StreamParams>,
    stats: StageStats,
    logger: Logger,
}

impl<P: Processor> Session<P> {
    /// Create a session named after its processor.
    pub fn new(processor: P) -> Self {
        Self {
            name: processor.name().to_string(),
            processor,
            guard: ProtocolGuard::new(),
            params: None,
            options: Options::default(),
            output: None,
            stats: StageStats::default(),
            logger: Logger::disabled(),
        }
    }

    /// Set the instance name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Get the processor.
    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Get the processor mutably.
    pub fn processor_mut(&mut self) -> &mut P {
        &mut self.processor
    }

    /// Get the resolved options (empty before `open`).
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Get the statistics.
    pub fn stats(&self) -> StageStats {
        self.stats
    }

    fn refresh_output_params(&mut self) {
        if let Some(params) = self.processor.output_params() {
            if self.output.as_ref() != Some(&params) {
                debug!(parent: self.logger.span(), stage = %self.name, ?params, "output parameters");
                self.output = Some(params);
            }
        }
    }
}

impl<P: Processor> Stage for Session<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> StageState {
        self.guard.state()
    }

    fn configure(&mut self, params: StageParams) -> Result<()> {
        self.guard.configure()?;
        self.params = Some(params);
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        self.guard.check_open()?;
        let params = self
            .params
            .as_ref()
            .ok_or_else(|| Error::invalid_state("open before configure"))?;
        let options = self
            .processor
            .option_schema()
            .resolve(&params.options, params.unknown_options)?;
        let ctx = OpenContext {
            stream: &params.stream,
            options: &options,
            device: params.device.as_ref(),
            logger: &self.logger,
        };
        if let Err(e) = self.processor.open(&ctx) {
            warn!(parent: self.logger.span(), stage = %self.name, error = %e, "open failed");
            return Err(e);
        }
        self.options = options;
        self.guard.opened();
        debug!(parent: self.logger.span(), stage = %self.name, "opened");
        Ok(())
    }

    fn submit(&mut self, input: Option<&mut Buffer>) -> Result<SubmitStatus> {
        self.guard.check_submit()?;
        let Some(input) = input else {
            self.processor.finish()?;
            self.guard.end_of_stream();
            debug!(parent: self.logger.span(), stage = %self.name, "end of stream");
            return Ok(SubmitStatus::Accepted);
        };
        if !input.has_storage() {
            return Err(Error::invalid_state(
                "submitted buffer holds no data; pass None to signal end of stream",
            ));
        }
        if !self.processor.has_capacity() {
            self.guard.busy();
            self.stats.busy += 1;
            trace!(parent: self.logger.span(), stage = %self.name, "busy");
            return Ok(SubmitStatus::Busy);
        }
        let mut unit = Buffer::new();
        unit.move_ref(input);
        let size = unit.size() as u64;
        self.processor.push(unit)?;
        self.stats.units_in += 1;
        self.stats.bytes_in += size;
        record_counter!("stage.units_in", 1);
        Ok(SubmitStatus::Accepted)
    }

    fn retrieve(&mut self, output: &mut Buffer) -> Result<RetrieveStatus> {
        output.unreference();
        if !self.guard.check_retrieve()? {
            return Ok(RetrieveStatus::EndOfStream);
        }
        if self.processor.pull(output)? {
            self.stats.units_out += 1;
            record_counter!("stage.units_out", 1);
            self.refresh_output_params();
            return Ok(RetrieveStatus::Produced);
        }
        if self.guard.state() == StageState::Draining {
            self.guard.drained();
            debug!(
                parent: self.logger.span(),
                stage = %self.name,
                units_in = self.stats.units_in,
                units_out = self.stats.units_out,
                "drained"
            );
            return Ok(RetrieveStatus::EndOfStream);
        }
        Ok(RetrieveStatus::NeedsInput)
    }

    fn flush(&mut self) -> Result<()> {
        self.guard.flush()?;
        self.processor.reset();
        debug!(parent: self.logger.span(), stage = %self.name, "flushed");
        Ok(())
    }

    fn close(&mut self) {
        if self.guard.close() {
            self.processor.close();
            debug!(parent: self.logger.span(), stage = %self.name, "closed");
        }
    }

    fn output_params(&self) -> Option<&StreamParams> {
        self.output.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::CodecId;
    use crate::timestamp::TimeBase;
    use std::collections::VecDeque;

    /// Doubles each unit, holding at most two inputs.
    #[derive(Default)]
    struct Doubler {
        queue: VecDeque<Buffer>,
        limit: usize,
    }

    impl Processor for Doubler {
        fn name(&self) -> &'static str {
            "doubler"
        }

        fn option_schema(&self) -> OptionSchema {
            OptionSchema::new().int("limit", 2, 1, 8, "queued units")
        }

        fn open(&mut self, ctx: &OpenContext<'_>) -> Result<()> {
            self.limit = ctx.options.usize("limit")?;
            Ok(())
        }

        fn has_capacity(&self) -> bool {
            self.queue.len() < self.limit
        }

        fn push(&mut self, input: Buffer) -> Result<()> {
            self.queue.push_back(input);
            Ok(())
        }

        fn pull(&mut self, output: &mut Buffer) -> Result<bool> {
            match self.queue.pop_front() {
                Some(mut unit) => {
                    let doubled: Vec<u8> = unit.data().iter().map(|b| b.wrapping_mul(2)).collect();
                    unit.set_data(doubled);
                    output.move_ref(&mut unit);
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        fn output_params(&self) -> Option<StreamParams> {
            Some(StreamParams::compressed(CodecId::RawVideo, TimeBase::MPEG))
        }

        fn reset(&mut self) {
            self.queue.clear();
        }
    }

    fn open_session() -> Session<Doubler> {
        let mut session = Session::new(Doubler::default());
        session
            .configure(StageParams::new(StreamParams::compressed(
                CodecId::RawVideo,
                TimeBase::MPEG,
            )))
            .unwrap();
        session.open().unwrap();
        session
    }

    fn unit(byte: u8) -> Buffer {
        Buffer::from_packet(vec![byte; 4], CodecId::RawVideo)
    }

    #[test]
    fn test_busy_leaves_input_untouched() {
        let mut session = open_session();
        assert_eq!(session.submit(Some(&mut unit(1))).unwrap(), SubmitStatus::Accepted);
        assert_eq!(session.submit(Some(&mut unit(2))).unwrap(), SubmitStatus::Accepted);
        let mut third = unit(3);
        assert_eq!(session.submit(Some(&mut third)).unwrap(), SubmitStatus::Busy);
        assert_eq!(third.data(), &[3, 3, 3, 3]);

        // resubmitting without retrieving is a protocol violation
        assert!(matches!(
            session.submit(Some(&mut third)),
            Err(Error::InvalidState(_))
        ));

        let mut out = Buffer::new();
        assert_eq!(session.retrieve(&mut out).unwrap(), RetrieveStatus::Produced);
        assert_eq!(out.data(), &[2, 2, 2, 2]);
        assert_eq!(session.submit(Some(&mut third)).unwrap(), SubmitStatus::Accepted);
        assert!(!third.has_storage());
    }

    #[test]
    fn test_drain_then_end_of_stream_forever() {
        let mut session = open_session();
        session.submit(Some(&mut unit(5))).unwrap();
        session.submit(None).unwrap();
        assert_eq!(session.state(), StageState::Draining);

        let mut out = Buffer::new();
        assert_eq!(session.retrieve(&mut out).unwrap(), RetrieveStatus::Produced);
        assert_eq!(session.retrieve(&mut out).unwrap(), RetrieveStatus::EndOfStream);
        assert!(!out.has_storage());
        assert_eq!(session.state(), StageState::Closed);
        assert_eq!(session.retrieve(&mut out).unwrap(), RetrieveStatus::EndOfStream);
        assert!(matches!(session.submit(Some(&mut unit(1))), Err(Error::Closed)));
    }

    #[test]
    fn test_unknown_option_rejected_at_open() {
        let mut session = Session::new(Doubler::default());
        session
            .configure(
                StageParams::new(StreamParams::default()).with_option("bogus", 1),
            )
            .unwrap();
        assert!(matches!(session.open(), Err(Error::UnknownOption(_))));
        assert_eq!(session.state(), StageState::Configured);
    }

    #[test]
    fn test_unknown_option_ignored_by_policy() {
        let mut session = Session::new(Doubler::default());
        session
            .configure(
                StageParams::new(StreamParams::default())
                    .with_option("bogus", 1)
                    .with_option("limit", 3)
                    .ignore_unknown_options(),
            )
            .unwrap();
        session.open().unwrap();
        assert_eq!(session.options().int("limit").unwrap(), 3);
    }

    #[test]
    fn test_empty_input_rejected() {
        let mut session = open_session();
        assert!(matches!(
            session.submit(Some(&mut Buffer::new())),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_flush_discards_and_reopens() {
        let mut session = open_session();
        session.submit(Some(&mut unit(1))).unwrap();
        session.submit(None).unwrap();
        session.flush().unwrap();
        let mut out = Buffer::new();
        assert_eq!(session.retrieve(&mut out).unwrap(), RetrieveStatus::NeedsInput);
        assert_eq!(session.submit(Some(&mut unit(1))).unwrap(), SubmitStatus::Accepted);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut session = open_session();
        session.close();
        session.close();
        assert_eq!(session.state(), StageState::Closed);
        assert!(session.flush().is_err());
        assert!(matches!(
            session.retrieve(&mut Buffer::new()),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_stats() {
        let mut session = open_session();
        session.submit(Some(&mut unit(1))).unwrap();
        let mut out = Buffer::new();
        session.retrieve(&mut out).unwrap();
        let stats = session.stats();
        assert_eq!(stats.units_in, 1);
        assert_eq!(stats.units_out, 1);
        assert_eq!(stats.bytes_in, 4);
        assert!(session.output_params().is_some());
    }
}
