//! `buffer` and `abuffer`: where units enter the graph.

use crate::node::{FilterNode, NodeContext};
use crate::pad::{LinkFormat, MemoryKind, PadDescriptor};
use std::collections::VecDeque;
use tracing::trace;
use transcode_core::{
    AudioFormat, Buffer, Error, MediaFormat, MediaType, OptionSchema, Options, Rational, Result,
    RetrieveStatus, StreamParams, TimeBase, VideoFormat,
};

/// A FIFO the caller feeds with [`Graph::push`](crate::Graph::push).
///
/// The source is fixed to one format: a unit of any other format is
/// rejected, so a format change means building a new graph.
#[derive(Debug)]
pub struct BufferSource {
    format: LinkFormat,
    pads: Vec<PadDescriptor>,
    queue: VecDeque<Buffer>,
    capacity: usize,
    eof: bool,
}

impl BufferSource {
    /// Create a source producing `format`.
    pub fn new(format: LinkFormat) -> Result<Self> {
        let pad = match format.media_type() {
            Some(MediaType::Video) if format.stream.codec.is_none() => PadDescriptor::video("default"),
            Some(MediaType::Audio) if format.stream.codec.is_none() => PadDescriptor::audio("default"),
            _ => {
                return Err(Error::invalid_config(format!(
                    "a graph source needs decoded data, got '{}'",
                    format.stream.media_format()
                )))
            }
        };
        Ok(Self {
            format,
            pads: vec![pad],
            queue: VecDeque::new(),
            capacity: 1,
            eof: false,
        })
    }

    pub(crate) fn video_schema() -> OptionSchema {
        OptionSchema::new()
            .image_size("video_size", "picture size")
            .pixel_format("pix_fmt", None, "pixel format")
            .rational("time_base", Some(Rational::new(1, 25)), "timestamp unit")
            .rational("frame_rate", None, "nominal frame rate")
            .choice("memory", "host", &["host", "device"], "where pictures live")
    }

    pub(crate) fn audio_schema() -> OptionSchema {
        OptionSchema::new()
            .optional_int("sample_rate", 1, 768_000, "sample rate")
            .sample_format("sample_fmt", None, "sample format")
            .channel_layout("channel_layout", None, "channel layout")
            .rational("time_base", None, "timestamp unit, 1/sample_rate by default")
    }

    pub(crate) fn from_video_options(options: &Options) -> Result<Self> {
        let (width, height) = options.image_size("video_size")?;
        let format = VideoFormat::new(width, height, options.pixel_format("pix_fmt")?);
        let mut stream = StreamParams::video(format, TimeBase(options.rational("time_base")?));
        if options.is_set("frame_rate") {
            stream.frame_rate = Some(options.rational("frame_rate")?);
        }
        let link = match options.string("memory")?.as_str() {
            "device" => LinkFormat::device(stream),
            _ => LinkFormat::host(stream),
        };
        Self::new(link)
    }

    pub(crate) fn from_audio_options(options: &Options) -> Result<Self> {
        let format = AudioFormat::new(
            options.sample_format("sample_fmt")?,
            options.channel_layout("channel_layout")?,
            options.usize("sample_rate")? as u32,
        );
        let mut stream = StreamParams::audio(format);
        if options.is_set("time_base") {
            stream.time_base = TimeBase(options.rational("time_base")?);
        }
        Self::new(LinkFormat::host(stream))
    }

    /// Get the format this source produces.
    pub fn format(&self) -> &LinkFormat {
        &self.format
    }

    /// Get the number of queued units.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    fn check(&self, unit: &Buffer) -> Result<()> {
        let expected = self.format.stream.media_format();
        if unit.format() != expected {
            return Err(Error::invalid_config(format!(
                "source produces '{expected}' but received '{}'; rebuild the graph to change formats",
                unit.format()
            )));
        }
        let memory = if unit.is_hardware() {
            MemoryKind::Device
        } else {
            MemoryKind::Host
        };
        if memory != self.format.memory {
            return Err(Error::invalid_config(format!(
                "source takes {} memory, received {memory} memory",
                self.format.memory
            )));
        }
        Ok(())
    }
}

impl FilterNode for BufferSource {
    fn kind(&self) -> &'static str {
        match self.pads[0].media {
            MediaType::Video => "buffer",
            MediaType::Audio => "abuffer",
        }
    }

    fn inputs(&self) -> &[PadDescriptor] {
        &[]
    }

    fn outputs(&self) -> &[PadDescriptor] {
        &self.pads
    }

    fn init(&mut self, _inputs: &[LinkFormat], ctx: &NodeContext<'_>) -> Result<Vec<LinkFormat>> {
        match self.format.stream.media_format() {
            MediaFormat::Video(v) => v.validate()?,
            MediaFormat::Audio(a) => a.validate()?,
            _ => {}
        }
        self.capacity = ctx.config.queue_size.max(1);
        Ok(vec![self.format.clone()])
    }

    fn has_capacity(&self, _pad: usize) -> bool {
        !self.eof && self.queue.len() < self.capacity
    }

    fn push(&mut self, _pad: usize, input: Option<Buffer>) -> Result<()> {
        if self.eof {
            return Err(Error::Closed);
        }
        let Some(mut unit) = input else {
            self.eof = true;
            return Ok(());
        };
        self.check(&unit)?;
        let time_base = self.format.time_base();
        if unit.time_base != time_base && unit.pts != transcode_core::Timestamp::NONE {
            unit.rescale_ts(time_base);
        }
        unit.time_base = time_base;
        trace!(pts = unit.pts, queued = self.queue.len() + 1, "unit queued");
        self.queue.push_back(unit);
        Ok(())
    }

    fn pull(&mut self, _pad: usize, output: &mut Buffer) -> Result<RetrieveStatus> {
        match self.queue.pop_front() {
            Some(mut unit) => {
                output.move_ref(&mut unit);
                Ok(RetrieveStatus::Produced)
            }
            None if self.eof => Ok(RetrieveStatus::EndOfStream),
            None => Ok(RetrieveStatus::NeedsInput),
        }
    }

    fn is_starved(&self) -> bool {
        self.queue.is_empty() && !self.eof
    }

    fn reset(&mut self) {
        self.queue.clear();
        self.eof = false;
    }

    fn uninit(&mut self) {
        self.reset();
    }
}
