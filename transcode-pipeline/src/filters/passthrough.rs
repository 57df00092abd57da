//! `null`, `anull`, `format` and `aformat`.

use super::{BufferSink, UnitSlot};
use crate::node::{FilterNode, NodeContext};
use crate::pad::{FormatConstraint, LinkFormat, PadDescriptor};
use transcode_core::{Buffer, MediaType, OptionSchema, Options, Result, RetrieveStatus};

/// Forwards units unchanged. With a constraint it pins the format of its
/// input link, which makes negotiation convert upstream.
#[derive(Debug)]
pub struct Passthrough {
    kind: &'static str,
    constraint: FormatConstraint,
    inputs: Vec<PadDescriptor>,
    outputs: Vec<PadDescriptor>,
    slot: UnitSlot,
}

impl Passthrough {
    fn new(kind: &'static str, constraint: FormatConstraint) -> Self {
        let media = constraint.media_type();
        Self {
            kind,
            constraint,
            inputs: vec![PadDescriptor::new("default", media)],
            outputs: vec![PadDescriptor::new("default", media)],
            slot: UnitSlot::default(),
        }
    }

    /// `null` or `anull`.
    pub fn null(media: MediaType) -> Self {
        let kind = match media {
            MediaType::Video => "null",
            MediaType::Audio => "anull",
        };
        Self::new(kind, FormatConstraint::any(media))
    }

    /// `format` or `aformat` with an explicit constraint.
    pub fn format(constraint: FormatConstraint) -> Self {
        let kind = match constraint.media_type() {
            MediaType::Video => "format",
            MediaType::Audio => "aformat",
        };
        Self::new(kind, constraint)
    }

    pub(crate) fn video_schema() -> OptionSchema {
        BufferSink::video_schema()
    }

    pub(crate) fn audio_schema() -> OptionSchema {
        BufferSink::audio_schema()
    }

    pub(crate) fn from_video_options(options: &Options) -> Result<Self> {
        let constraint = BufferSink::video_constraint(options)?;
        Ok(Self::format(FormatConstraint::Video(constraint)))
    }

    pub(crate) fn from_audio_options(options: &Options) -> Result<Self> {
        let constraint = BufferSink::audio_constraint(options)?;
        Ok(Self::format(FormatConstraint::Audio(constraint)))
    }
}

impl FilterNode for Passthrough {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn inputs(&self) -> &[PadDescriptor] {
        &self.inputs
    }

    fn outputs(&self) -> &[PadDescriptor] {
        &self.outputs
    }

    fn input_constraint(&self, _pad: usize, _negotiated: &[Option<LinkFormat>]) -> FormatConstraint {
        self.constraint.clone()
    }

    fn init(&mut self, inputs: &[LinkFormat], _ctx: &NodeContext<'_>) -> Result<Vec<LinkFormat>> {
        Ok(inputs.to_vec())
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
}
