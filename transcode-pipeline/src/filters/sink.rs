//! `buffersink` and `abuffersink`: where units leave the graph.

use super::{parse_list, UnitSlot};
use crate::node::{FilterNode, NodeContext};
use crate::pad::{
    AudioConstraint, FormatConstraint, LinkFormat, MemoryKind, PadDescriptor, VideoConstraint,
};
use transcode_core::{Buffer, MediaType, OptionSchema, Options, Result, RetrieveStatus};

/// Holds one unit for [`Graph::pull`](crate::Graph::pull).
#[derive(Debug)]
pub struct BufferSink {
    constraint: FormatConstraint,
    pads: Vec<PadDescriptor>,
    format: Option<LinkFormat>,
    slot: UnitSlot,
}

impl BufferSink {
    /// Create a sink accepting formats allowed by `constraint`.
    pub fn new(constraint: FormatConstraint) -> Self {
        let pads = vec![PadDescriptor::new("default", constraint.media_type())];
        Self {
            constraint,
            pads,
            format: None,
            slot: UnitSlot::default(),
        }
    }

    /// Create a sink accepting anything of `media`.
    pub fn any(media: MediaType) -> Self {
        Self::new(FormatConstraint::any(media))
    }

    pub(crate) fn video_schema() -> OptionSchema {
        OptionSchema::new()
            .string("pix_fmts", "accepted pixel formats, '|' separated")
            .image_size("size", "required picture size")
            .choice("memory", "any", &["any", "host", "device"], "accepted memory")
    }

    pub(crate) fn audio_schema() -> OptionSchema {
        OptionSchema::new()
            .string("sample_fmts", "accepted sample formats, '|' separated")
            .string("sample_rates", "accepted sample rates, '|' separated")
            .string("channel_layouts", "accepted channel layouts, '|' separated")
    }

    pub(crate) fn video_constraint(options: &Options) -> Result<VideoConstraint> {
        let mut constraint = VideoConstraint::new().with_pixel_formats(parse_list(options, "pix_fmts")?);
        if options.is_set("size") {
            let (w, h) = options.image_size("size")?;
            constraint = constraint.with_size(w, h);
        }
        match options.string("memory")?.as_str() {
            "host" => constraint = constraint.with_memory(MemoryKind::Host),
            "device" => constraint = constraint.with_memory(MemoryKind::Device),
            _ => {}
        }
        Ok(constraint)
    }

    pub(crate) fn audio_constraint(options: &Options) -> Result<AudioConstraint> {
        Ok(AudioConstraint::new()
            .with_sample_formats(parse_list(options, "sample_fmts")?)
            .with_sample_rates(parse_list(options, "sample_rates")?)
            .with_channel_layouts(parse_list(options, "channel_layouts")?))
    }

    pub(crate) fn from_video_options(options: &Options) -> Result<Self> {
        Ok(Self::new(FormatConstraint::Video(Self::video_constraint(options)?)))
    }

    pub(crate) fn from_audio_options(options: &Options) -> Result<Self> {
        Ok(Self::new(FormatConstraint::Audio(Self::audio_constraint(options)?)))
    }

    /// Get the negotiated input format.
    pub fn format(&self) -> Option<&LinkFormat> {
        self.format.as_ref()
    }
}

impl FilterNode for BufferSink {
    fn kind(&self) -> &'static str {
        match self.pads[0].media {
            MediaType::Video => "buffersink",
            MediaType::Audio => "abuffersink",
        }
    }

    fn inputs(&self) -> &[PadDescriptor] {
        &self.pads
    }

    fn outputs(&self) -> &[PadDescriptor] {
        &[]
    }

    fn input_constraint(&self, _pad: usize, _negotiated: &[Option<LinkFormat>]) -> FormatConstraint {
        self.constraint.clone()
    }

    fn init(&mut self, inputs: &[LinkFormat], _ctx: &NodeContext<'_>) -> Result<Vec<LinkFormat>> {
        self.format = inputs.first().cloned();
        Ok(Vec::new())
    }

    fn has_capacity(&self, _pad: usize) -> bool {
        self.slot.has_room()
    }

    fn push(&mut self, _pad: usize, input: Option<Buffer>) -> Result<()> {
        match input {
            Some(unit) => self.slot.put(unit),
            None => {
                self.slot.finish();
                Ok(())
            }
        }
    }

    fn pull(&mut self, _pad: usize, output: &mut Buffer) -> Result<RetrieveStatus> {
        Ok(self.slot.take(output))
    }

    fn reset(&mut self) {
        self.slot.clear();
    }

    fn uninit(&mut self) {
        self.slot.clear();
        self.format = None;
    }
}
