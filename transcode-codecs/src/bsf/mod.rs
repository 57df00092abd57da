//! Bitstream filters.
//!
//! A bitstream filter rewrites compressed units without decoding them:
//! converting NAL framing, moving parameter sets between extradata and the
//! stream, adjusting timestamps. Each filter implements the small
//! [`BitstreamFilter`] trait; [`BsfProcessor`] turns it into a
//! [`Processor`] holding at most one unit, so a second submit without a
//! retrieve in between answers `Busy`.
//!
//! # Example
//!
//! ```ignore
//! use transcode_codecs::bsf;
//!
//! let mut chain = bsf::parse_bsf_list("setts=offset=10,chomp")?;
//! chain.configure(StageParams::new(stream))?;
//! chain.open()?;
//! ```

mod annexb;
mod extradata;
mod simple;
mod timing;

pub use annexb::{AvcConfig, H264Mp4ToAnnexB};
pub use extradata::{DumpExtra, ExtractExtradata, RemoveExtra};
pub use simple::{Chomp, NullFilter};
pub use timing::Setts;

use tracing::debug;
use transcode_core::{
    Buffer, Chain, Error, OpenContext, OptionMap, OptionSchema, Processor, Result, Session, Stage,
    StageParams, StreamParams,
};

/// A stream-rewriting filter over compressed units.
pub trait BitstreamFilter: Send {
    /// Get the filter name.
    fn name(&self) -> &'static str;

    /// Options this filter understands.
    fn option_schema(&self) -> OptionSchema {
        OptionSchema::new()
    }

    /// Validate the input stream and options and describe the output stream.
    fn init(&mut self, ctx: &OpenContext<'_>) -> Result<StreamParams>;

    /// Rewrite one unit in place. `params` is the output description and may
    /// be updated as the stream reveals more about itself.
    ///
    /// Returns `false` when the unit is dropped.
    fn filter(&mut self, unit: &mut Buffer, params: &mut StreamParams) -> Result<bool>;

    /// Forget per-stream state (seek).
    fn reset(&mut self) {}
}

/// Adapts a [`BitstreamFilter`] to the [`Processor`] interface with a single
/// unit of buffering.
pub struct BsfProcessor<F> {
    filter: F,
    slot: Option<Buffer>,
    params: Option<StreamParams>,
}

impl<F: BitstreamFilter> BsfProcessor<F> {
    /// Wrap a filter.
    pub fn new(filter: F) -> Self {
        Self {
            filter,
            slot: None,
            params: None,
        }
    }

    /// Get the wrapped filter.
    pub fn filter(&self) -> &F {
        &self.filter
    }
}

impl<F: BitstreamFilter> Processor for BsfProcessor<F> {
    fn name(&self) -> &'static str {
        self.filter.name()
    }

    fn option_schema(&self) -> OptionSchema {
        self.filter.option_schema()
    }

    fn open(&mut self, ctx: &OpenContext<'_>) -> Result<()> {
        if ctx.stream.codec.is_none() {
            return Err(Error::invalid_config(format!(
                "bitstream filter '{}' needs a compressed stream",
                self.filter.name()
            )));
        }
        self.params = Some(self.filter.init(ctx)?);
        Ok(())
    }

    fn has_capacity(&self) -> bool {
        self.slot.is_none()
    }

    fn push(&mut self, mut input: Buffer) -> Result<()> {
        let params = self
            .params
            .as_mut()
            .ok_or_else(|| Error::invalid_state("filter is not open"))?;
        if self.filter.filter(&mut input, params)? {
            self.slot = Some(input);
        }
        Ok(())
    }

    fn pull(&mut self, output: &mut Buffer) -> Result<bool> {
        match self.slot.take() {
            Some(mut unit) => {
                output.move_ref(&mut unit);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn output_params(&self) -> Option<StreamParams> {
        self.params.clone()
    }

    fn reset(&mut self) {
        self.slot = None;
        self.filter.reset();
    }
}

/// Names of every registered bitstream filter.
pub const BSF_NAMES: &[&str] = &[
    "null",
    "h264_mp4toannexb",
    "extract_extradata",
    "dump_extra",
    "remove_extra",
    "setts",
    "chomp",
];

fn session<F: BitstreamFilter + 'static>(filter: F) -> Box<dyn Stage> {
    let name = filter.name();
    Box::new(Session::new(BsfProcessor::new(filter)).with_name(name))
}

/// Create a bitstream filter stage by name.
pub fn create_bsf(name: &str) -> Result<Box<dyn Stage>> {
    let stage = match name {
        "null" => session(NullFilter),
        "h264_mp4toannexb" => session(H264Mp4ToAnnexB::default()),
        "extract_extradata" => session(ExtractExtradata::default()),
        "dump_extra" => session(DumpExtra::default()),
        "remove_extra" => session(RemoveExtra::default()),
        "setts" => session(Setts::default()),
        "chomp" => session(Chomp),
        other => {
            return Err(Error::unsupported(format!(
                "no bitstream filter named '{other}'"
            )))
        }
    };
    Ok(stage)
}

/// Parse a filter list such as `"setts=offset=10:time_base=1/1000,chomp"`
/// into a [`Chain`].
///
/// Filters are separated by `,`; a filter's options follow `=` as
/// `key=value` pairs separated by `:`.
pub fn parse_bsf_list(list: &str) -> Result<Chain> {
    let mut chain = Chain::new(list);
    for entry in list.split(',').map(str::trim) {
        if entry.is_empty() {
            return Err(Error::invalid_config(format!(
                "empty entry in bitstream filter list '{list}'"
            )));
        }
        let (name, args) = entry.split_once('=').unwrap_or((entry, ""));
        let options = OptionMap::parse(args)?;
        debug!(filter = name, options = options.len(), "bitstream filter added");
        chain.push(
            create_bsf(name.trim())?,
            StageParams::default().with_options(options),
        );
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use transcode_core::{CodecId, RetrieveStatus, StageState, SubmitStatus, TimeBase};

    fn h264() -> StreamParams {
        StreamParams::compressed(CodecId::H264, TimeBase::MPEG)
    }

    #[test]
    fn test_one_slot_buffering() {
        let mut stage = create_bsf("null").unwrap();
        stage.configure(StageParams::new(h264())).unwrap();
        stage.open().unwrap();
        let mut a = Buffer::from_packet(vec![1], CodecId::H264);
        let mut b = Buffer::from_packet(vec![2], CodecId::H264);
        assert_eq!(stage.submit(Some(&mut a)).unwrap(), SubmitStatus::Accepted);
        assert_eq!(stage.submit(Some(&mut b)).unwrap(), SubmitStatus::Busy);
        let mut out = Buffer::new();
        assert_eq!(stage.retrieve(&mut out).unwrap(), RetrieveStatus::Produced);
        assert_eq!(out.data(), &[1]);
        assert_eq!(stage.submit(Some(&mut b)).unwrap(), SubmitStatus::Accepted);
    }

    #[test]
    fn test_unknown_filter() {
        assert!(matches!(create_bsf("nope"), Err(Error::Unsupported(_))));
        assert!(matches!(parse_bsf_list("null,nope"), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_empty_list_entry() {
        assert!(matches!(parse_bsf_list("null,,chomp"), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_parsed_list_runs() {
        let mut chain = parse_bsf_list("setts=offset=10,chomp").unwrap();
        assert_eq!(chain.len(), 2);
        chain.configure(StageParams::new(h264())).unwrap();
        chain.open().unwrap();

        let mut unit = Buffer::from_packet(vec![7, 7, 0, 0], CodecId::H264);
        unit.pts = 5;
        unit.dts = 5;
        unit.time_base = TimeBase::MPEG;
        assert_eq!(chain.submit(Some(&mut unit)).unwrap(), SubmitStatus::Accepted);
        let mut out = Buffer::new();
        assert_eq!(chain.retrieve(&mut out).unwrap(), RetrieveStatus::Produced);
        assert_eq!(out.pts, 15);
        assert_eq!(out.data(), &[7, 7]);

        chain.submit(None).unwrap();
        assert_eq!(chain.retrieve(&mut out).unwrap(), RetrieveStatus::EndOfStream);
        assert_eq!(chain.state(), StageState::Closed);
    }

    #[test]
    fn test_unknown_option_rejected_at_open() {
        let mut chain = parse_bsf_list("chomp=level=3").unwrap();
        chain.configure(StageParams::new(h264())).unwrap();
        assert!(matches!(chain.open(), Err(Error::UnknownOption(_))));
        assert_eq!(chain.state(), StageState::Configured);
    }
}
