//! `interleave` and `ainterleave`: merge several inputs in pts order.

use crate::node::{FilterNode, NodeContext};
use crate::pad::{FormatConstraint, LinkFormat, PadDescriptor};
use transcode_core::{
    Buffer, Error, MediaType, OptionSchema, Options, Result, RetrieveStatus, TimeBase,
};

/// Emits the earliest unit once every live input has one queued.
///
/// Every input carries the format of input 0; timestamps are rescaled to
/// its time base.
#[derive(Debug)]
pub struct Interleave {
    media: MediaType,
    inputs: Vec<PadDescriptor>,
    outputs: Vec<PadDescriptor>,
    time_base: TimeBase,
    slots: Vec<Option<Buffer>>,
    ended: Vec<bool>,
}

impl Interleave {
    /// Create a merger with `inputs` input pads.
    pub fn new(media: MediaType, inputs: usize) -> Self {
        Self {
            media,
            inputs: (0..inputs)
                .map(|i| PadDescriptor::new(format!("input{i}"), media))
                .collect(),
            outputs: vec![PadDescriptor::new("default", media)],
            time_base: TimeBase::default(),
            slots: (0..inputs).map(|_| None).collect(),
            ended: vec![false; inputs],
        }
    }

    pub(crate) fn schema() -> OptionSchema {
        OptionSchema::new().int("nb_inputs", 2, 1, 64, "number of inputs")
    }

    pub(crate) fn from_options(media: MediaType, options: &Options) -> Result<Self> {
        Ok(Self::new(media, options.usize("nb_inputs")?))
    }

    fn decidable(&self) -> bool {
        self.slots
            .iter()
            .zip(&self.ended)
            .all(|(slot, &ended)| slot.is_some() || ended)
    }
}

impl FilterNode for Interleave {
    fn kind(&self) -> &'static str {
        match self.media {
            MediaType::Video => "interleave",
            MediaType::Audio => "ainterleave",
        }
    }

    fn inputs(&self) -> &[PadDescriptor] {
        &self.inputs
    }

    fn outputs(&self) -> &[PadDescriptor] {
        &self.outputs
    }

    fn input_constraint(&self, pad: usize, negotiated: &[Option<LinkFormat>]) -> FormatConstraint {
        match negotiated.first().and_then(Option::as_ref) {
            Some(first) if pad > 0 => FormatConstraint::exact(first),
            _ => FormatConstraint::any(self.media),
        }
    }

    fn init(&mut self, inputs: &[LinkFormat], _ctx: &NodeContext<'_>) -> Result<Vec<LinkFormat>> {
        let first = inputs
            .first()
            .ok_or_else(|| Error::invalid_state("interleave initialised without inputs"))?;
        let expected = FormatConstraint::exact(first);
        if let Some((pad, other)) = inputs.iter().enumerate().find(|(_, f)| !expected.accepts(f)) {
            return Err(Error::invalid_config(format!(
                "interleave input {pad} carries '{other}', input 0 carries '{first}'"
            )));
        }
        self.time_base = first.time_base();
        Ok(vec![first.clone()])
    }

    fn has_capacity(&self, pad: usize) -> bool {
        self.slots.get(pad).is_some_and(Option::is_none) && !self.ended.get(pad).copied().unwrap_or(true)
    }

    fn push(&mut self, pad: usize, input: Option<Buffer>) -> Result<()> {
        if pad >= self.slots.len() {
            return Err(Error::invalid_state(format!("interleave has no input {pad}")));
        }
        match input {
            Some(mut unit) => {
                if !self.has_capacity(pad) {
                    return Err(Error::invalid_state(format!("interleave input {pad} is full")));
                }
                unit.rescale_ts(self.time_base);
                self.slots[pad] = Some(unit);
            }
            None => self.ended[pad] = true,
        }
        Ok(())
    }

    fn pull(&mut self, _pad: usize, output: &mut Buffer) -> Result<RetrieveStatus> {
        if !self.decidable() {
            return Ok(RetrieveStatus::NeedsInput);
        }
        let earliest = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(pad, slot)| slot.as_ref().map(|unit| (unit.pts, pad)))
            .min();
        match earliest.and_then(|(_, pad)| self.slots[pad].take()) {
            Some(mut unit) => {
                output.move_ref(&mut unit);
                Ok(RetrieveStatus::Produced)
            }
            None => Ok(RetrieveStatus::EndOfStream),
        }
    }

    fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.ended.iter_mut().for_each(|e| *e = false);
    }

    fn uninit(&mut self) {
        self.reset();
    }
}
