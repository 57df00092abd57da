//! `split` and `asplit`: one input fanned out to several outputs.

use crate::node::{FilterNode, NodeContext};
use crate::pad::{LinkFormat, PadDescriptor};
use std::collections::VecDeque;
use transcode_core::{
    Buffer, Error, MediaType, OptionSchema, Options, Result, RetrieveStatus,
};

/// Hands every input unit to each output. Outputs share storage.
///
/// Input is refused while any output queue is full, so the slowest
/// consumer paces the others.
#[derive(Debug)]
pub struct Split {
    media: MediaType,
    inputs: Vec<PadDescriptor>,
    outputs: Vec<PadDescriptor>,
    queues: Vec<VecDeque<Buffer>>,
    capacity: usize,
    eof: bool,
}

impl Split {
    /// Create a splitter with `outputs` output pads.
    pub fn new(media: MediaType, outputs: usize) -> Self {
        Self {
            media,
            inputs: vec![PadDescriptor::new("default", media)],
            outputs: (0..outputs)
                .map(|i| PadDescriptor::new(format!("output{i}"), media))
                .collect(),
            queues: (0..outputs).map(|_| VecDeque::new()).collect(),
            capacity: 1,
            eof: false,
        }
    }

    pub(crate) fn schema() -> OptionSchema {
        OptionSchema::new().int("outputs", 2, 1, 32, "number of outputs")
    }

    pub(crate) fn from_options(media: MediaType, options: &Options) -> Result<Self> {
        Ok(Self::new(media, options.usize("outputs")?))
    }
}

impl FilterNode for Split {
    fn kind(&self) -> &'static str {
        match self.media {
            MediaType::Video => "split",
            MediaType::Audio => "asplit",
        }
    }

    fn inputs(&self) -> &[PadDescriptor] {
        &self.inputs
    }

    fn outputs(&self) -> &[PadDescriptor] {
        &self.outputs
    }

    fn init(&mut self, inputs: &[LinkFormat], ctx: &NodeContext<'_>) -> Result<Vec<LinkFormat>> {
        let link = inputs
            .first()
            .ok_or_else(|| Error::invalid_state("split initialised without input"))?;
        self.capacity = ctx.config.queue_size.max(1);
        Ok(vec![link.clone(); self.outputs.len()])
    }

    fn has_capacity(&self, _pad: usize) -> bool {
        !self.eof && self.queues.iter().all(|q| q.len() < self.capacity)
    }

    fn push(&mut self, _pad: usize, input: Option<Buffer>) -> Result<()> {
        let Some(unit) = input else {
            self.eof = true;
            return Ok(());
        };
        if !self.has_capacity(0) {
            return Err(Error::invalid_state("split output queue is full"));
        }
        if let Some((last, rest)) = self.queues.split_last_mut() {
            for queue in rest {
                queue.push_back(unit.share()?);
            }
            last.push_back(unit);
        }
        Ok(())
    }

    fn pull(&mut self, pad: usize, output: &mut Buffer) -> Result<RetrieveStatus> {
        let queue = self
            .queues
            .get_mut(pad)
            .ok_or_else(|| Error::invalid_state(format!("split has no output {pad}")))?;
        match queue.pop_front() {
            Some(mut unit) => {
                output.move_ref(&mut unit);
                Ok(RetrieveStatus::Produced)
            }
            None if self.eof => Ok(RetrieveStatus::EndOfStream),
            None => Ok(RetrieveStatus::NeedsInput),
        }
    }

    fn reset(&mut self) {
        self.queues.iter_mut().for_each(VecDeque::clear);
        self.eof = false;
    }

    fn uninit(&mut self) {
        self.reset();
    }
}
